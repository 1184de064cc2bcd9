//! # ServiceBay
//!
//! **ServiceBay** is the authenticating HTTP gateway for a vehicle service
//! center: admin and service-advisor web surfaces on the front, a REST
//! backend that owns all business data behind it. The gateway runs on the
//! `may` coroutine runtime, one coroutine per connection, and owns exactly
//! one problem: deciding which credential a request carries, what that
//! credential makes the caller, and whether the caller may reach the route,
//! before proxying the work upstream.
//!
//! ## Architecture
//!
//! - **[`auth`]** - credential resolution, HS256 validation with a claims
//!   cache, role normalization, the authorization gate, and the
//!   request-scoped security context
//! - **[`session`]** - server-side session store binding browser cookies to
//!   bearer tokens
//! - **[`forward`]** - blocking HTTP client that relays requests to the
//!   backend and classifies transport failures
//! - **[`router`]** - static route table compiled to regex matchers
//! - **[`gateway`]** - shared state, route declarations, page and API proxy
//!   handlers
//! - **[`server`]** - the `may_minihttp` service: parsing, the auth
//!   pipeline, response writing
//! - **[`middleware`]** - metrics and CORS around handler dispatch
//! - **[`config`]**, **[`logging`]**, **[`runtime_config`]**, **[`cli`]** -
//!   the operational shell
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as GatewayService<br/>(may_minihttp)
//!     participant Resolver as TokenResolver
//!     participant Validator as TokenValidator
//!     participant Gate as AuthorizationGate
//!     participant Handler as Handler
//!     participant Backend as REST Backend
//!
//!     Client->>Server: GET /admin/api/service-requests
//!     Server->>Server: parse request, match route,<br/>open session from cookie
//!     Server->>Resolver: resolve(param, header, session)
//!     Resolver->>Resolver: token param? bearer header?<br/>session binding?
//!     alt No credential
//!         Server-->>Client: 401 JSON or login redirect
//!     end
//!     Resolver-->>Server: token + source
//!     Server->>Validator: validate(token)
//!     Validator->>Validator: claims cache, HS256,<br/>exp with leeway, roles
//!     alt Invalid or expired
//!         Server-->>Client: 401 JSON or login redirect
//!     end
//!     Validator-->>Server: Identity { subject, roles }
//!     Server->>Gate: authorize(identity)
//!     alt Missing required role
//!         Server-->>Client: 403 JSON or access_denied redirect
//!     end
//!     Server->>Handler: invoke with identity bound<br/>to the security context
//!     Handler->>Backend: forward with Bearer token
//!     Backend-->>Handler: status + body (verbatim)
//!     Handler-->>Server: HandlerResponse
//!     Server-->>Client: response (+ session cookie when<br/>a binding was created)
//! ```
//!
//! ## Credential precedence
//!
//! The resolver checks exactly three places, in order: the `token` query
//! parameter, the `Authorization: Bearer` header, and the session binding.
//! First hit wins. A parameter token is written to the session immediately
//! (that is how link-based logins become cookie-based sessions); header
//! tokens stay out of the session unless rehydration is switched on; no
//! credential at all simply means an anonymous request, which only public
//! routes accept.
//!
//! ## Quick Start
//!
//! ```bash
//! SERVICEBAY_JWT_SECRET=change-me \
//!   servicebay serve --addr 0.0.0.0:8080 --backend http://localhost:8081
//! ```
//!
//! ```rust,no_run
//! use servicebay::config::GatewayConfig;
//! use servicebay::gateway::Gateway;
//! use servicebay::server::{GatewayService, HttpServer};
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut config = GatewayConfig::default();
//!     config.auth.jwt_secret = "change-me".into();
//!     let gateway = Arc::new(Gateway::from_config(config)?);
//!     let service = GatewayService::new(Arc::clone(&gateway))?.with_default_middleware();
//!     let handle = HttpServer(service).start("0.0.0.0:8080")?;
//!     handle.join().ok();
//!     Ok(())
//! }
//! ```
//!
//! ## Runtime Considerations
//!
//! Handlers run on may coroutines; the backend client is blocking reqwest,
//! so a slow backend occupies its worker thread for the duration of the
//! configured timeouts. Stack size is tunable via `SERVICEBAY_STACK_SIZE`
//! (see [`runtime_config`]).

pub mod auth;
pub mod cli;
pub mod config;
pub mod forward;
pub mod gateway;
pub mod handler;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod router;
pub mod runtime_config;
pub mod server;
pub mod session;

pub use auth::{
    AuthError, AuthorizationGate, Identity, Role, RoleSet, SecurityContext, SessionWritePolicy,
    TokenResolver, TokenValidator,
};
pub use forward::{BackendClient, BackendReply, ForwardError};
pub use gateway::Gateway;
pub use handler::{HandlerRequest, HandlerResponse};
pub use session::SessionStore;
