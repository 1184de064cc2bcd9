use std::time::Duration;

use http::Method;

use super::Middleware;
use crate::handler::{HandlerRequest, HandlerResponse, HeaderVec, ResponseBody};

/// CORS middleware.
///
/// Answers preflight OPTIONS requests and stamps CORS headers onto every
/// response. The defaults are permissive enough for a same-host admin UI
/// plus local development; production deployments pass explicit origins.
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_headers: Vec<String>,
    allowed_methods: Vec<Method>,
}

impl CorsMiddleware {
    pub fn new(
        allowed_origins: Vec<String>,
        allowed_headers: Vec<String>,
        allowed_methods: Vec<Method>,
    ) -> Self {
        Self {
            allowed_origins,
            allowed_headers,
            allowed_methods,
        }
    }

    /// Stamp the configured CORS headers onto a response.
    ///
    /// Shared between `after()` and the server's preflight short-circuit,
    /// which answers OPTIONS before routing.
    pub fn apply_headers(&self, res: &mut HandlerResponse) {
        res.set_header(
            "Access-Control-Allow-Origin",
            self.allowed_origins.join(", "),
        );
        res.set_header(
            "Access-Control-Allow-Headers",
            self.allowed_headers.join(", "),
        );
        let methods = self
            .allowed_methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        res.set_header("Access-Control-Allow-Methods", methods);
    }

    /// The 204 answer for a preflight request, headers included.
    pub fn preflight_response(&self) -> HandlerResponse {
        let mut response = HandlerResponse::new(204, HeaderVec::new(), ResponseBody::Empty);
        self.apply_headers(&mut response);
        response
    }
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".into()],
            allowed_headers: vec!["Content-Type".into(), "Authorization".into()],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ],
        }
    }
}

impl Middleware for CorsMiddleware {
    fn before(&self, req: &HandlerRequest) -> Option<HandlerResponse> {
        if req.method == Method::OPTIONS {
            Some(self.preflight_response())
        } else {
            None
        }
    }

    fn after(&self, _req: &HandlerRequest, res: &mut HandlerResponse, _latency: Duration) {
        self.apply_headers(res);
    }
}
