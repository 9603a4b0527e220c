// Failure bookkeeping: slice errors collected from every worker of one upload.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::UploadError;

/// A slice that did not make it, in the order it was reported.
#[derive(Debug)]
pub struct FailureRecord {
    pub index: usize,
    pub error: UploadError,
}

/// Append-only, shared collection of slice failures.
///
/// Recording never blocks a worker for longer than a push, and nothing here
/// signals sibling workers to stop.
#[derive(Debug, Default)]
pub struct FailureAggregator {
    records: Mutex<Vec<FailureRecord>>,
}

impl FailureAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, index: usize, error: UploadError) {
        self.lock().push(FailureRecord { index, error });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All records, earliest first.
    pub fn into_records(self) -> Vec<FailureRecord> {
        self.records
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // A worker that panicked mid-push cannot leave a half-written Vec behind,
    // so a poisoned lock is still safe to read.
    fn lock(&self) -> MutexGuard<'_, Vec<FailureRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
