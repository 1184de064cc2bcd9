//! Route table and path matching.
//!
//! Routes are declared statically (see `gateway::routes`) and compiled into
//! a regex table at startup. Matching is a linear scan; the table is small
//! and fixed, and a request is dominated by the backend round trip, not by
//! the lookup.

use crate::auth::AuthorizationGate;
use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Placeholder names must be identifiers: `{id}`, `{request_id}`.
static PARAM_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("param name regex should be valid"));

/// Inline capacity for path/query parameter vectors.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Parameter storage that avoids heap allocation for typical requests.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// How auth failures on a route are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Browser-facing page: failures redirect to the login page with an
    /// error code in the query string.
    Page,
    /// JSON API: failures answer with a status code and a JSON error body.
    Api,
}

/// Who may use a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// No credential required; requests are served anonymously.
    Public,
    /// A valid credential holding at least one of these roles. An empty
    /// list admits any authenticated identity.
    Roles(&'static [&'static str]),
}

/// A route declaration before compilation.
#[derive(Debug, Clone)]
pub struct RouteDef {
    pub method: Method,
    /// Path pattern with `{name}` placeholders, e.g.
    /// `/admin/api/service-requests/{id}/status`.
    pub pattern: &'static str,
    pub kind: RouteKind,
    pub access: Access,
    /// Registry key of the handler that serves this route.
    pub handler_name: &'static str,
}

impl RouteDef {
    pub fn page(
        method: Method,
        pattern: &'static str,
        access: Access,
        handler_name: &'static str,
    ) -> Self {
        Self {
            method,
            pattern,
            kind: RouteKind::Page,
            access,
            handler_name,
        }
    }

    pub fn api(
        method: Method,
        pattern: &'static str,
        access: Access,
        handler_name: &'static str,
    ) -> Self {
        Self {
            method,
            pattern,
            kind: RouteKind::Api,
            access,
            handler_name,
        }
    }
}

/// A compiled route.
#[derive(Debug, Clone)]
pub struct RouteMeta {
    pub method: Method,
    pub pattern: &'static str,
    pub kind: RouteKind,
    pub access: Access,
    /// `None` for public routes, otherwise the compiled role requirement.
    pub gate: Option<AuthorizationGate>,
    pub handler_name: &'static str,
}

impl RouteMeta {
    pub fn is_public(&self) -> bool {
        matches!(self.access, Access::Public)
    }
}

/// Result of matching a request against the table.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<RouteMeta>,
    pub path_params: ParamVec,
    pub handler_name: &'static str,
}

/// Compiled routing table.
#[derive(Debug)]
pub struct Router {
    routes: Vec<(Method, Regex, Arc<RouteMeta>, Vec<Arc<str>>)>,
}

impl Router {
    /// Compile a route table.
    ///
    /// Returns an error if any pattern produces an invalid regex; with a
    /// static table that is a programming error caught by the route tests.
    pub fn new(defs: Vec<RouteDef>) -> anyhow::Result<Self> {
        let mut routes = Vec::with_capacity(defs.len());
        for def in defs {
            let (regex_src, param_names) = path_to_regex(def.pattern);
            for name in &param_names {
                if !PARAM_NAME_REGEX.is_match(name) {
                    anyhow::bail!(
                        "invalid placeholder {{{name}}} in route pattern {}",
                        def.pattern
                    );
                }
            }
            let regex = Regex::new(&regex_src).map_err(|e| {
                anyhow::anyhow!("invalid route pattern {}: {e}", def.pattern)
            })?;
            let gate = match def.access {
                Access::Public => None,
                Access::Roles(roles) => Some(AuthorizationGate::any_of(roles.iter().copied())),
            };
            let meta = Arc::new(RouteMeta {
                method: def.method.clone(),
                pattern: def.pattern,
                kind: def.kind,
                access: def.access,
                gate,
                handler_name: def.handler_name,
            });
            routes.push((def.method.clone(), regex, meta, param_names));
        }
        Ok(Self { routes })
    }

    /// Match a method and path (without query string) against the table.
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let start = Instant::now();
        for (route_method, regex, meta, param_names) in &self.routes {
            if route_method != method {
                continue;
            }
            if let Some(captures) = regex.captures(path) {
                let mut path_params = ParamVec::new();
                for (i, name) in param_names.iter().enumerate() {
                    if let Some(value) = captures.get(i + 1) {
                        path_params.push((Arc::clone(name), value.as_str().to_string()));
                    }
                }
                let elapsed = start.elapsed();
                if elapsed.as_millis() > 1 {
                    warn!(path = %path, elapsed_us = elapsed.as_micros() as u64, "slow route match");
                }
                debug!(
                    method = %method,
                    path = %path,
                    pattern = meta.pattern,
                    handler = meta.handler_name,
                    "route matched"
                );
                return Some(RouteMatch {
                    route: Arc::clone(meta),
                    path_params,
                    handler_name: meta.handler_name,
                });
            }
        }
        None
    }

    /// True when some route accepts this path under a different method.
    /// Drives 405 instead of 404.
    pub fn path_known(&self, path: &str) -> bool {
        self.routes
            .iter()
            .any(|(_, regex, _, _)| regex.is_match(path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Convert a `{name}`-style pattern into an anchored regex plus the ordered
/// parameter names.
fn path_to_regex(pattern: &str) -> (String, Vec<Arc<str>>) {
    let mut regex_src = String::from("^");
    let mut param_names = Vec::new();
    if pattern == "/" {
        return ("^/$".to_string(), param_names);
    }
    for segment in pattern.trim_start_matches('/').split('/') {
        if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            regex_src.push_str("/([^/]+)");
            param_names.push(Arc::from(name));
        } else {
            regex_src.push('/');
            regex_src.push_str(&regex::escape(segment));
        }
    }
    regex_src.push('$');
    (regex_src, param_names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Router {
        Router::new(vec![
            RouteDef::page(Method::GET, "/admin/login", Access::Public, "login_page"),
            RouteDef::api(
                Method::GET,
                "/admin/api/service-requests/{id}",
                Access::Roles(&["ADMIN"]),
                "get_service_request",
            ),
            RouteDef::api(
                Method::PUT,
                "/admin/api/service-requests/{id}/status",
                Access::Roles(&["ADMIN"]),
                "update_status",
            ),
        ])
        .expect("compile test routes")
    }

    #[test]
    fn static_paths_match_exactly() {
        let router = table();
        let m = router.route(&Method::GET, "/admin/login").expect("match");
        assert_eq!(m.handler_name, "login_page");
        assert!(router.route(&Method::GET, "/admin/login/extra").is_none());
        assert!(router.route(&Method::POST, "/admin/login").is_none());
    }

    #[test]
    fn placeholders_capture_path_params() {
        let router = table();
        let m = router
            .route(&Method::PUT, "/admin/api/service-requests/42/status")
            .expect("match");
        assert_eq!(m.handler_name, "update_status");
        assert_eq!(m.path_params.len(), 1);
        assert_eq!(m.path_params[0].0.as_ref(), "id");
        assert_eq!(m.path_params[0].1, "42");
    }

    #[test]
    fn placeholder_does_not_cross_segments() {
        let router = table();
        assert!(router
            .route(&Method::GET, "/admin/api/service-requests/1/2")
            .is_none());
    }

    #[test]
    fn known_path_with_wrong_method_is_detected() {
        let router = table();
        assert!(router.path_known("/admin/api/service-requests/42/status"));
        assert!(!router.path_known("/nope"));
    }

    #[test]
    fn root_pattern_compiles() {
        let (src, names) = path_to_regex("/");
        assert_eq!(src, "^/$");
        assert!(names.is_empty());
    }

    #[test]
    fn malformed_placeholder_is_rejected() {
        let err = Router::new(vec![RouteDef::api(
            Method::GET,
            "/admin/api/items/{item-id}",
            Access::Roles(&["ADMIN"]),
            "get_item",
        )])
        .expect_err("hyphenated placeholder should not compile");
        assert!(err.to_string().contains("invalid placeholder"));
    }
}
