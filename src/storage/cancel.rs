//! Caller-driven cancellation for long reads (archives, deep history walks).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::storage::error::{StorageError, StorageResult};

/// A cloneable flag checked between object reads.
///
/// Cancelling only ever aborts reads; refs are never touched by the
/// operations that observe it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// bail out with `Cancelled` once the flag is set
    pub fn check(&self) -> StorageResult<()> {
        if self.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        Ok(())
    }
}
