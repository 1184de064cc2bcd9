//! The gateway application: shared state, route table, and handler registry.
//!
//! Handlers are plain functions looked up by name; the route table binds a
//! path pattern to a handler name and an access rule. Everything a handler
//! needs beyond the request itself lives in [`Gateway`].

mod handlers;
mod pages;

use crate::auth::roles::names::{ADMIN, SERVICE_ADVISOR};
use crate::auth::{SessionWritePolicy, TokenResolver, TokenValidator};
use crate::config::GatewayConfig;
use crate::forward::BackendClient;
use crate::handler::{HandlerRequest, HandlerResponse};
use crate::router::{Access, RouteDef, Router};
use crate::session::SessionStore;
use anyhow::Context;
use http::Method;
use std::collections::HashMap;

/// Shared state for the whole gateway.
#[derive(Debug)]
pub struct Gateway {
    pub config: GatewayConfig,
    pub sessions: SessionStore,
    pub resolver: TokenResolver,
    pub validator: TokenValidator,
    pub backend: BackendClient,
}

impl Gateway {
    /// Build the gateway from configuration. Fails fast on an empty JWT
    /// secret or an unusable backend URL rather than serving 500s later.
    pub fn from_config(config: GatewayConfig) -> anyhow::Result<Self> {
        if config.auth.jwt_secret.trim().is_empty() {
            anyhow::bail!(
                "jwt_secret is empty; set auth.jwt_secret or SERVICEBAY_JWT_SECRET"
            );
        }
        url::Url::parse(&config.backend.base_url)
            .with_context(|| format!("invalid backend base URL {}", config.backend.base_url))?;

        let validator = TokenValidator::new(config.auth.jwt_secret.as_bytes())
            .leeway(config.auth.leeway_secs)
            .claims_cache_size(config.auth.claims_cache_size);
        let policy = if config.auth.persist_header_tokens {
            SessionWritePolicy::Rehydrate
        } else {
            SessionWritePolicy::Never
        };
        let backend = BackendClient::new(
            &config.backend.base_url,
            config.backend.connect_timeout(),
            config.backend.read_timeout(),
        )?;
        Ok(Self {
            sessions: SessionStore::new(config.session.ttl()),
            resolver: TokenResolver::with_write_policy(policy),
            validator,
            backend,
            config,
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.session.cookie_name
    }
}

/// A request handler. Invoked inline on the request coroutine with the
/// validated identity already bound to the security context.
pub type Handler = fn(&Gateway, &HandlerRequest) -> HandlerResponse;

/// Name-to-handler lookup filled at startup.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, handler: Handler) {
        self.handlers.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// The static route table.
///
/// Page routes render (or redirect) for browsers; API routes speak JSON.
/// Every protected admin surface requires `ADMIN`; the advisor surface
/// requires `SERVICEADVISOR`. Role names are normalized when the table is
/// compiled, so the spelling here is cosmetic.
pub fn routes() -> Vec<RouteDef> {
    vec![
        // pages
        RouteDef::page(Method::GET, "/admin/login", Access::Public, "admin_login_page"),
        RouteDef::page(Method::GET, "/admin/logout", Access::Public, "logout"),
        RouteDef::page(
            Method::GET,
            "/admin/dashboard",
            Access::Roles(&[ADMIN]),
            "admin_dashboard_page",
        ),
        RouteDef::page(
            Method::GET,
            "/admin/service-requests",
            Access::Roles(&[ADMIN]),
            "admin_service_requests_page",
        ),
        RouteDef::page(
            Method::GET,
            "/admin/customers",
            Access::Roles(&[ADMIN]),
            "admin_customers_page",
        ),
        RouteDef::page(
            Method::GET,
            "/advisor/dashboard",
            Access::Roles(&[SERVICE_ADVISOR]),
            "advisor_dashboard_page",
        ),
        // login proxy
        RouteDef::api(Method::POST, "/admin/api/login", Access::Public, "login"),
        // admin API proxies
        RouteDef::api(
            Method::GET,
            "/admin/api/customers",
            Access::Roles(&[ADMIN]),
            "list_customers",
        ),
        RouteDef::api(
            Method::POST,
            "/admin/api/customers",
            Access::Roles(&[ADMIN]),
            "create_customer",
        ),
        RouteDef::api(
            Method::GET,
            "/admin/api/service-requests",
            Access::Roles(&[ADMIN]),
            "list_service_requests",
        ),
        RouteDef::api(
            Method::POST,
            "/admin/api/service-requests",
            Access::Roles(&[ADMIN]),
            "create_service_request",
        ),
        RouteDef::api(
            Method::GET,
            "/admin/api/service-requests/{id}",
            Access::Roles(&[ADMIN]),
            "get_service_request",
        ),
        RouteDef::api(
            Method::PUT,
            "/admin/api/service-requests/{id}/assign",
            Access::Roles(&[ADMIN]),
            "assign_service_request",
        ),
        RouteDef::api(
            Method::PUT,
            "/admin/api/service-requests/{id}/status",
            Access::Roles(&[ADMIN]),
            "update_service_request_status",
        ),
        RouteDef::api(
            Method::GET,
            "/admin/api/service-advisors",
            Access::Roles(&[ADMIN]),
            "list_service_advisors",
        ),
        RouteDef::api(
            Method::GET,
            "/admin/api/vehicles/under-service",
            Access::Roles(&[ADMIN]),
            "vehicles_under_service",
        ),
        RouteDef::api(
            Method::GET,
            "/admin/api/vehicles/completed",
            Access::Roles(&[ADMIN]),
            "completed_services",
        ),
        RouteDef::api(
            Method::GET,
            "/admin/api/invoices/{id}/download",
            Access::Roles(&[ADMIN]),
            "download_invoice",
        ),
        // advisor API proxies
        RouteDef::api(
            Method::GET,
            "/advisor/api/service-requests",
            Access::Roles(&[SERVICE_ADVISOR]),
            "advisor_service_requests",
        ),
        RouteDef::api(
            Method::PUT,
            "/advisor/api/service-requests/{id}/status",
            Access::Roles(&[SERVICE_ADVISOR]),
            "advisor_update_status",
        ),
    ]
}

/// Compile the route table.
pub fn build_router() -> anyhow::Result<Router> {
    Router::new(routes())
}

/// Registry with every handler the route table names.
pub fn default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    // pages
    registry.register("admin_login_page", pages::admin_login_page);
    registry.register("logout", pages::logout);
    registry.register("admin_dashboard_page", pages::admin_dashboard_page);
    registry.register(
        "admin_service_requests_page",
        pages::admin_service_requests_page,
    );
    registry.register("admin_customers_page", pages::admin_customers_page);
    registry.register("advisor_dashboard_page", pages::advisor_dashboard_page);
    // api
    registry.register("login", handlers::login);
    registry.register("list_customers", handlers::list_customers);
    registry.register("create_customer", handlers::create_customer);
    registry.register("list_service_requests", handlers::list_service_requests);
    registry.register("create_service_request", handlers::create_service_request);
    registry.register("get_service_request", handlers::get_service_request);
    registry.register("assign_service_request", handlers::assign_service_request);
    registry.register(
        "update_service_request_status",
        handlers::update_service_request_status,
    );
    registry.register("list_service_advisors", handlers::list_service_advisors);
    registry.register("vehicles_under_service", handlers::vehicles_under_service);
    registry.register("completed_services", handlers::completed_services);
    registry.register("download_invoice", handlers::download_invoice);
    registry.register("advisor_service_requests", handlers::advisor_service_requests);
    registry.register("advisor_update_status", handlers::advisor_update_status);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_has_a_registered_handler() {
        let registry = default_registry();
        for def in routes() {
            assert!(
                registry.get(def.handler_name).is_some(),
                "no handler registered for {}",
                def.handler_name
            );
        }
    }

    #[test]
    fn route_table_compiles() {
        let router = build_router().expect("compile route table");
        assert_eq!(router.len(), routes().len());
    }

    #[test]
    fn protected_routes_all_carry_a_role_requirement() {
        for def in routes() {
            match def.access {
                Access::Public => {
                    assert!(
                        def.pattern == "/admin/login"
                            || def.pattern == "/admin/logout"
                            || def.pattern == "/admin/api/login",
                        "unexpected public route {}",
                        def.pattern
                    );
                }
                Access::Roles(roles) => {
                    assert!(!roles.is_empty(), "{} admits any role", def.pattern);
                }
            }
        }
    }
}
