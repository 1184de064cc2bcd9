//! The gateway request pipeline.
//!
//! One [`GatewayService::call`] per request, on its own coroutine:
//!
//! 1. parse the raw request
//! 2. answer infrastructure endpoints (`/health`, `/metrics`) directly
//! 3. match the route table
//! 4. open the session named by the cookie
//! 5. middleware `before`
//! 6. resolve, validate, and authorize the credential
//! 7. invoke the handler with the identity bound to the security context
//! 8. middleware `after`, session cookie, write the response
//!
//! Auth runs as a fixed stage rather than per-handler code, so no route can
//! forget it. A failure anywhere leaves nothing half-done: the session is
//! only ever written by resolution or login, and the context guard clears
//! the identity even on a handler panic.

use super::request::{parse_request, ParsedRequest};
use super::response::{write_handler_response, write_json_error};
use crate::auth::{AuthError, SecurityContext, SharedIdentity};
use crate::gateway::{default_registry, Gateway, HandlerRegistry};
use crate::handler::{HandlerRequest, HandlerResponse};
use crate::ids::RequestId;
use crate::middleware::{CorsMiddleware, MetricsMiddleware, Middleware};
use crate::router::{RouteKind, RouteMatch, Router};
use crate::session::SessionHandle;
use http::Method;
use may_minihttp::{HttpService, Request, Response};
use serde_json::json;
use std::fmt::Write as _;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct GatewayService {
    gateway: Arc<Gateway>,
    router: Arc<Router>,
    registry: Arc<HandlerRegistry>,
    middlewares: Vec<Arc<dyn Middleware>>,
    metrics: Option<Arc<MetricsMiddleware>>,
    cors: Option<Arc<CorsMiddleware>>,
}

impl GatewayService {
    /// Build the service around shared gateway state. Fails only if the
    /// route table does not compile.
    pub fn new(gateway: Arc<Gateway>) -> anyhow::Result<Self> {
        let router = Arc::new(crate::gateway::build_router()?);
        Ok(Self {
            gateway,
            router,
            registry: Arc::new(default_registry()),
            middlewares: Vec::new(),
            metrics: None,
            cors: None,
        })
    }

    /// Attach the standard middleware stack: metrics and permissive CORS.
    pub fn with_default_middleware(mut self) -> Self {
        let metrics = Arc::new(MetricsMiddleware::new());
        let cors = Arc::new(CorsMiddleware::default());
        self.metrics = Some(Arc::clone(&metrics));
        self.cors = Some(Arc::clone(&cors));
        self.middlewares.push(metrics);
        self.middlewares.push(cors);
        self
    }

    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsMiddleware>> {
        self.metrics.as_ref()
    }

    /// Resolve, validate, and authorize the request's credential.
    ///
    /// Public routes skip the whole stage and serve anonymously. For
    /// protected routes the missing/invalid/forbidden distinction is kept
    /// intact so 401 and 403 are never conflated.
    fn authenticate(
        &self,
        route_match: &RouteMatch,
        parsed: &ParsedRequest,
        session: &SessionHandle<'_>,
    ) -> Result<Option<SharedIdentity>, (AuthError, HandlerResponse)> {
        let route = &route_match.route;
        if route.is_public() {
            return Ok(None);
        }

        let resolved = self.gateway.resolver.resolve(
            parsed.get_query("token"),
            parsed.get_header("authorization"),
            session,
        );
        let Some(resolved) = resolved else {
            let error = AuthError::NoCredential;
            let response = auth_failure_response(route.kind, &error);
            return Err((error, response));
        };

        match self.gateway.validator.validate(&resolved.token) {
            Ok(identity) => {
                if let Some(gate) = &route.gate {
                    if let Err(error) = gate.authorize(&identity) {
                        let response = auth_failure_response(route.kind, &error);
                        return Err((error, response));
                    }
                }
                Ok(Some(Arc::new(identity)))
            }
            Err(error) => {
                let response = auth_failure_response(route.kind, &error);
                Err((error, response))
            }
        }
    }

    fn invoke_handler(
        &self,
        request: &HandlerRequest,
        identity: Option<&SharedIdentity>,
    ) -> HandlerResponse {
        let Some(handler) = self.registry.get(request.handler_name) else {
            error!(handler = request.handler_name, "handler not registered");
            return HandlerResponse::error(500, "Internal Server Error");
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            // The guard drops before catch_unwind returns, panicking or not,
            // so the identity never outlives this invocation.
            let _guard = identity.map(|id| SecurityContext::bind(Arc::clone(id)));
            handler(&self.gateway, request)
        }));
        match result {
            Ok(response) => response,
            Err(_) => {
                error!(handler = request.handler_name, "handler panicked");
                HandlerResponse::error(500, "Internal Server Error")
            }
        }
    }

    /// Prometheus text exposition of the gateway counters.
    fn metrics_exposition(&self) -> String {
        let mut out = String::new();
        if let Some(metrics) = &self.metrics {
            let _ = writeln!(out, "# TYPE servicebay_requests_total counter");
            let _ = writeln!(out, "servicebay_requests_total {}", metrics.request_count());
            let _ = writeln!(out, "# TYPE servicebay_top_level_requests_total counter");
            let _ = writeln!(
                out,
                "servicebay_top_level_requests_total {}",
                metrics.top_level_request_count()
            );
            let _ = writeln!(out, "# TYPE servicebay_auth_failures_total counter");
            let _ = writeln!(
                out,
                "servicebay_auth_failures_total {}",
                metrics.auth_failures()
            );
            let _ = writeln!(out, "# TYPE servicebay_forbidden_total counter");
            let _ = writeln!(
                out,
                "servicebay_forbidden_total {}",
                metrics.forbidden_count()
            );
            let _ = writeln!(out, "# TYPE servicebay_backend_errors_total counter");
            let _ = writeln!(
                out,
                "servicebay_backend_errors_total {}",
                metrics.backend_errors()
            );
            let _ = writeln!(out, "# TYPE servicebay_request_latency_seconds gauge");
            let _ = writeln!(
                out,
                "servicebay_request_latency_seconds {:.6}",
                metrics.average_latency().as_secs_f64()
            );
            let (stack_size, used_stack) = metrics.stack_usage();
            let _ = writeln!(out, "# TYPE servicebay_coroutine_stack_bytes gauge");
            let _ = writeln!(out, "servicebay_coroutine_stack_bytes {stack_size}");
            let _ = writeln!(out, "# TYPE servicebay_coroutine_stack_used_bytes gauge");
            let _ = writeln!(out, "servicebay_coroutine_stack_used_bytes {used_stack}");
        }
        let stats = self.gateway.validator.cache_stats();
        let _ = writeln!(out, "# TYPE servicebay_claims_cache_hits_total counter");
        let _ = writeln!(out, "servicebay_claims_cache_hits_total {}", stats.hits);
        let _ = writeln!(out, "# TYPE servicebay_claims_cache_misses_total counter");
        let _ = writeln!(out, "servicebay_claims_cache_misses_total {}", stats.misses);
        let _ = writeln!(out, "# TYPE servicebay_claims_cache_evictions_total counter");
        let _ = writeln!(
            out,
            "servicebay_claims_cache_evictions_total {}",
            stats.evictions
        );
        let _ = writeln!(out, "# TYPE servicebay_claims_cache_size gauge");
        let _ = writeln!(out, "servicebay_claims_cache_size {}", stats.size);
        let _ = writeln!(out, "# TYPE servicebay_sessions_active gauge");
        let _ = writeln!(out, "servicebay_sessions_active {}", self.gateway.sessions.len());
        out
    }
}

fn auth_failure_response(kind: RouteKind, error: &AuthError) -> HandlerResponse {
    match kind {
        RouteKind::Api => HandlerResponse::error(error.status(), error.public_message()),
        RouteKind::Page => HandlerResponse::redirect(&format!(
            "/admin/login?error={}",
            error.redirect_code()
        )),
    }
}

impl HttpService for GatewayService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let parsed = parse_request(req);
        let request_id = RequestId::from_header_or_new(parsed.get_header("x-request-id"));

        // infrastructure endpoints bypass routing and auth
        if parsed.method == "GET" && parsed.path == "/health" {
            if let Some(metrics) = &self.metrics {
                metrics.inc_top_level_request();
            }
            write_handler_response(res, HandlerResponse::json(200, json!({ "status": "ok" })));
            return Ok(());
        }
        if parsed.method == "GET" && parsed.path == "/metrics" {
            if let Some(metrics) = &self.metrics {
                metrics.inc_top_level_request();
            }
            let body = self.metrics_exposition();
            res.status_code(200, "OK");
            res.header("Content-Type: text/plain; version=0.0.4");
            res.body_vec(body.into_bytes());
            return Ok(());
        }

        let Ok(method) = parsed.method.parse::<Method>() else {
            write_json_error(res, 400, json!({ "error": "Unsupported method" }));
            return Ok(());
        };

        // answer preflight before routing; the table has no OPTIONS routes
        if method == Method::OPTIONS {
            if let Some(cors) = &self.cors {
                write_handler_response(res, cors.preflight_response());
            } else {
                write_json_error(res, 404, json!({ "error": "Not Found" }));
            }
            return Ok(());
        }

        let Some(route_match) = self.router.route(&method, &parsed.path) else {
            if self.router.path_known(&parsed.path) {
                write_json_error(res, 405, json!({ "error": "Method Not Allowed" }));
            } else {
                warn!(method = %method, path = %parsed.path, "no route matched");
                write_json_error(
                    res,
                    404,
                    json!({ "error": "Not Found", "method": method.as_str(), "path": parsed.path }),
                );
            }
            return Ok(());
        };

        let session = self
            .gateway
            .sessions
            .open(parsed.get_cookie(self.gateway.cookie_name()));

        let request = HandlerRequest {
            request_id,
            method,
            path: parsed.path.clone(),
            handler_name: route_match.handler_name,
            path_params: route_match.path_params.clone(),
            query_params: parsed.query_params.clone(),
            headers: parsed.headers.clone(),
            cookies: parsed.cookies.clone(),
            body: parsed.body.clone(),
            session_id: session.id(),
            session_fresh: session.started_fresh(),
        };

        let mut early_response = None;
        for middleware in &self.middlewares {
            if early_response.is_none() {
                early_response = middleware.before(&request);
            }
        }

        let start = Instant::now();
        let (mut response, latency) = if let Some(early) = early_response {
            (early, Duration::ZERO)
        } else {
            match self.authenticate(&route_match, &parsed, &session) {
                Ok(identity) => {
                    let response = self.invoke_handler(&request, identity.as_ref());
                    (response, start.elapsed())
                }
                Err((error, response)) => {
                    error.log();
                    if let Some(metrics) = &self.metrics {
                        match error {
                            AuthError::Forbidden { .. } => metrics.inc_forbidden(),
                            _ => metrics.inc_auth_failure(),
                        }
                    }
                    (response, start.elapsed())
                }
            }
        };

        for middleware in &self.middlewares {
            middleware.after(&request, &mut response, latency);
        }

        // a session entry created during this request gets its cookie now
        if session.started_fresh() && session.exists() {
            response.set_header(
                "Set-Cookie",
                format!(
                    "{}={}; Path=/; HttpOnly; SameSite=Lax",
                    self.gateway.cookie_name(),
                    session.id()
                ),
            );
        }

        info!(
            request_id = %request.request_id,
            method = %request.method,
            path = %request.path,
            status = response.status,
            latency_ms = latency.as_millis() as u64,
            "request completed"
        );
        write_handler_response(res, response);
        Ok(())
    }
}
