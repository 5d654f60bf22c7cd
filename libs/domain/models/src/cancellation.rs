//! A shareable flag a caller can flip to ask in-flight pipeline work to stop
//! at its next checkpoint. Checked cooperatively, not preemptively: nothing
//! here interrupts a call already in flight to the store, it only stops the
//! next one from starting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
