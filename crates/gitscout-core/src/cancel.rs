//! Shared stop signal for worker pools.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative stop signal.
///
/// Clones share state: once any clone calls [`StopSignal::trigger`], every
/// holder observes it. Workers check the signal between tasks, finish what is
/// in flight, and exit; nothing is interrupted mid-request.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. All clones observe it.
    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
