//! Exit Rendezvous
//!
//! Single-slot channel between an exiting process and the parent waiting
//! on it. The child's exit path signals it once; the parent's wait
//! consumes it once. The slot is keyed by child identity simply by living
//! inside the child's [`super::Process`].

use core::sync::atomic::{AtomicBool, Ordering};

use spin::Once;

pub struct ExitRendezvous {
    status: Once<i32>,
    reaped: AtomicBool,
}

impl ExitRendezvous {
    pub const fn new() -> Self {
        Self {
            status: Once::new(),
            reaped: AtomicBool::new(false),
        }
    }

    /// Publish the exit status. Only the first call has any effect;
    /// returns whether this call was it.
    pub fn signal(&self, status: i32) -> bool {
        let mut first = false;
        self.status.call_once(|| {
            first = true;
            status
        });
        first
    }

    /// The published status, if any, without consuming it.
    pub fn peek(&self) -> Option<i32> {
        self.status.get().copied()
    }

    /// Consume the published status. Succeeds at most once.
    pub fn take(&self) -> Option<i32> {
        let status = self.peek()?;
        self.reaped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(status)
    }

    pub fn is_reaped(&self) -> bool {
        self.reaped.load(Ordering::Acquire)
    }
}

impl Default for ExitRendezvous {
    fn default() -> Self {
        Self::new()
    }
}
