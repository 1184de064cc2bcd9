use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::Middleware;
use crate::handler::{HandlerRequest, HandlerResponse};

/// Middleware collecting Prometheus-compatible counters.
///
/// All counters use relaxed atomics; metrics are eventually consistent and
/// never block a request.
///
/// Tracked:
/// - total routed requests and average latency
/// - coroutine stack size (for tuning `SERVICEBAY_STACK_SIZE`)
/// - top-level requests (infrastructure endpoints like `/health`)
/// - authentication failures (401s minted by the gateway)
/// - authorization denials (403s minted by the gateway)
/// - backend errors (502/504 responses)
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    total_latency_ns: AtomicU64,
    stack_size: AtomicUsize,
    used_stack: AtomicUsize,
    top_level_requests: AtomicUsize,
    auth_failures: AtomicUsize,
    forbidden: AtomicUsize,
    backend_errors: AtomicUsize,
}

impl Default for MetricsMiddleware {
    fn default() -> Self {
        Self {
            request_count: AtomicUsize::new(0),
            total_latency_ns: AtomicU64::new(0),
            stack_size: AtomicUsize::new(0),
            used_stack: AtomicUsize::new(0),
            top_level_requests: AtomicUsize::new(0),
            auth_failures: AtomicUsize::new(0),
            forbidden: AtomicUsize::new(0),
            backend_errors: AtomicUsize::new(0),
        }
    }
}

impl MetricsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Mean handler latency across all routed requests. Zero when nothing
    /// has been processed yet.
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    /// `(total_stack_size, peak_used_stack)` of the serving coroutines.
    pub fn stack_usage(&self) -> (usize, usize) {
        (
            self.stack_size.load(Ordering::Relaxed),
            self.used_stack.load(Ordering::Relaxed),
        )
    }

    /// Count an infrastructure request (`/health`, `/metrics`) that bypasses
    /// routing and dispatch.
    pub fn inc_top_level_request(&self) {
        self.top_level_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn top_level_request_count(&self) -> usize {
        self.top_level_requests.load(Ordering::Relaxed)
    }

    /// Count a gateway-minted 401.
    pub fn inc_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn auth_failures(&self) -> usize {
        self.auth_failures.load(Ordering::Relaxed)
    }

    /// Count a gateway-minted 403.
    pub fn inc_forbidden(&self) {
        self.forbidden.fetch_add(1, Ordering::Relaxed);
    }

    pub fn forbidden_count(&self) -> usize {
        self.forbidden.load(Ordering::Relaxed)
    }

    pub fn backend_errors(&self) -> usize {
        self.backend_errors.load(Ordering::Relaxed)
    }
}

impl Middleware for MetricsMiddleware {
    fn before(&self, _req: &HandlerRequest) -> Option<HandlerResponse> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn after(&self, _req: &HandlerRequest, res: &mut HandlerResponse, latency: Duration) {
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        if res.status == 502 || res.status == 504 {
            self.backend_errors.fetch_add(1, Ordering::Relaxed);
        }
        // record stack metrics for the current coroutine when available
        if may::coroutine::is_coroutine() {
            let co = may::coroutine::current();
            self.stack_size.store(co.stack_size(), Ordering::Relaxed);
            // may does not expose actual usage
            self.used_stack.store(0, Ordering::Relaxed);
        } else {
            self.stack_size
                .store(may::config().get_stack_size(), Ordering::Relaxed);
            self.used_stack.store(0, Ordering::Relaxed);
        }
    }
}
