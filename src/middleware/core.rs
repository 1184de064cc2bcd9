use std::time::Duration;

use crate::handler::{HandlerRequest, HandlerResponse};

pub trait Middleware: Send + Sync {
    /// Runs before the handler. Returning a response short-circuits dispatch.
    fn before(&self, _req: &HandlerRequest) -> Option<HandlerResponse> {
        None
    }

    /// Runs after the handler (or after a short-circuit) with the measured
    /// handler latency.
    fn after(&self, _req: &HandlerRequest, _res: &mut HandlerResponse, _latency: Duration) {}
}
