//! Request middleware.
//!
//! Middleware wraps handler invocation inside the server pipeline: `before`
//! may short-circuit with a response, `after` observes the response and the
//! handler latency. Authentication is not middleware here; it is a fixed
//! pipeline stage that runs for every route ahead of dispatch.

mod core;
mod cors;
mod metrics;

pub use core::Middleware;
pub use cors::CorsMiddleware;
pub use metrics::MetricsMiddleware;
