use std::future::Future;

use futures::future::{AbortHandle, AbortRegistration, Abortable};

/// One-shot cancellation signal tied to the lifetime of a backdrop.
///
/// The token is triggered exactly once, on disposal, and never resets. Any
/// asynchronous work started on behalf of the backdrop either polls
/// [`LifecycleToken::is_cancelled`] or is wrapped with [`LifecycleGuard::guard`]
/// so that it resolves as soon as the token fires.
#[derive(Debug, Clone)]
pub struct LifecycleToken {
    handle: AbortHandle,
}

/// The receiving half of a [`LifecycleToken`]. Consumed by the first guarded future.
#[derive(Debug)]
pub struct LifecycleGuard {
    registration: AbortRegistration,
}

impl LifecycleToken {
    pub fn pair() -> (Self, LifecycleGuard) {
        let (handle, registration) = AbortHandle::new_pair();
        (Self { handle }, LifecycleGuard { registration })
    }

    /// Triggers the token. Returns `true` only for the call that actually fired it.
    pub fn cancel(&self) -> bool {
        if self.handle.is_aborted() {
            return false;
        }
        self.handle.abort();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_aborted()
    }
}

impl LifecycleGuard {
    /// Wraps `future` so that it resolves to `Err(Aborted)` once the token fires.
    pub fn guard<F: Future>(self, future: F) -> Abortable<F> {
        Abortable::new(future, self.registration)
    }
}
