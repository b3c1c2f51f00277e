use std::sync::atomic::{AtomicBool, Ordering};

/// Open/closed state shared by a client and every stub it handed out.
#[derive(Debug, Default)]
pub struct ClientLifecycle {
    closed: AtomicBool,
}

impl ClientLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the client closed. Returns `true` only for the call that
    /// performed the transition.
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}
