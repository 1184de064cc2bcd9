//! Request-scoped security context.
//!
//! The validated identity is bound for exactly the span of one handler
//! invocation. Binding returns an RAII guard; dropping the guard clears the
//! slot, including during a panic unwind, so an identity can never leak into
//! whatever request this thread or coroutine serves next.

use super::SharedIdentity;
use std::cell::RefCell;
use std::marker::PhantomData;
use tracing::warn;

thread_local! {
    static CURRENT_IDENTITY: RefCell<Option<SharedIdentity>> = const { RefCell::new(None) };
}

/// Access point for the identity bound to the current request.
pub struct SecurityContext;

impl SecurityContext {
    /// Bind an identity for the scope of the returned guard.
    ///
    /// Nested binds are not supported: the guard clears the slot outright on
    /// drop rather than restoring an outer identity. The pipeline binds once
    /// per request, immediately around the handler call.
    #[must_use = "dropping the guard immediately would clear the context"]
    pub fn bind(identity: SharedIdentity) -> ContextGuard {
        CURRENT_IDENTITY.with(|slot| {
            let previous = slot.borrow_mut().replace(identity);
            if let Some(stale) = previous {
                // A leftover identity here means a guard was leaked somewhere.
                warn!(subject = %stale.subject, "replacing stale identity in security context");
            }
        });
        ContextGuard {
            _not_send: PhantomData,
        }
    }

    /// The identity bound to the current request, if any.
    pub fn current() -> Option<SharedIdentity> {
        CURRENT_IDENTITY.with(|slot| slot.borrow().clone())
    }

    /// Convenience accessor for the current subject.
    pub fn current_subject() -> Option<String> {
        Self::current().map(|identity| identity.subject.clone())
    }
}

/// Clears the security context when dropped.
///
/// `!Send`: the guard must drop on the thread that created it, since the
/// bound identity lives in thread-local storage.
pub struct ContextGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT_IDENTITY.with(|slot| {
            slot.borrow_mut().take();
        });
    }
}
