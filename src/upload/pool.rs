// Worker pool: a fixed number of threads draining one shared task queue.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use indicatif::ProgressBar;

use super::failures::FailureAggregator;
use super::plan::{Slice, SlicePlan};
use super::staging::{SourceFile, StagedSlice};
use super::{SliceTransport, UploadTarget};
use crate::error::{chain, UploadError};

/// One slice bound to the endpoint it is sent to.
#[derive(Debug, Clone, Copy)]
pub struct UploadTask<'a> {
    pub slice: Slice,
    pub target: &'a UploadTarget,
}

/// FIFO of upload tasks, filled once before any worker starts.
///
/// `pop` hands every task out exactly once no matter how many workers race
/// for it.
#[derive(Debug)]
pub struct TaskQueue<'a> {
    tasks: Mutex<VecDeque<UploadTask<'a>>>,
}

impl<'a> TaskQueue<'a> {
    pub fn from_plan(plan: &SlicePlan, target: &'a UploadTarget) -> Self {
        let tasks = plan
            .slices()
            .iter()
            .map(|&slice| UploadTask { slice, target })
            .collect();
        TaskQueue {
            tasks: Mutex::new(tasks),
        }
    }

    pub fn pop(&self) -> Option<UploadTask<'a>> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What the pool did once the queue ran dry.
#[derive(Debug)]
pub struct DrainSummary {
    pub uploaded_slices: usize,
    pub uploaded_bytes: u64,
    pub failures: FailureAggregator,
}

/// Uploads queued slices with `workers` concurrent threads.
pub struct WorkerPool<'a, T: SliceTransport> {
    workers: usize,
    transport: &'a T,
    source: &'a SourceFile,
    staging_dir: &'a Path,
    progress: ProgressBar,
}

impl<'a, T: SliceTransport> WorkerPool<'a, T> {
    pub fn new(
        workers: usize,
        transport: &'a T,
        source: &'a SourceFile,
        staging_dir: &'a Path,
        progress: ProgressBar,
    ) -> Self {
        WorkerPool {
            workers: workers.max(1),
            transport,
            source,
            staging_dir,
            progress,
        }
    }

    /// Run until every task has been attempted.
    ///
    /// A failed slice is recorded and the worker moves straight on to the
    /// next task; nothing cancels work that is already in flight.
    pub fn drain(&self, queue: &TaskQueue<'_>) -> DrainSummary {
        let failures = FailureAggregator::new();
        let uploaded_slices = AtomicUsize::new(0);
        let uploaded_bytes = AtomicU64::new(0);

        std::thread::scope(|scope| {
            for worker in 0..self.workers {
                let failures = &failures;
                let uploaded_slices = &uploaded_slices;
                let uploaded_bytes = &uploaded_bytes;
                scope.spawn(move || {
                    let _span = tracing::debug_span!("upload_worker", worker).entered();
                    while let Some(task) = queue.pop() {
                        let index = task.slice.index;
                        match self.upload_one(&task) {
                            Ok(()) => {
                                uploaded_slices.fetch_add(1, Ordering::Relaxed);
                                uploaded_bytes.fetch_add(task.slice.length, Ordering::Relaxed);
                                self.progress.inc(task.slice.length);
                                tracing::info!(
                                    index,
                                    kib = task.slice.length as f64 / 1024.0,
                                    "uploaded slice"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(index, error = %chain(&e), "slice failed");
                                failures.record(index, e);
                            }
                        }
                    }
                });
            }
        });

        DrainSummary {
            uploaded_slices: uploaded_slices.into_inner(),
            uploaded_bytes: uploaded_bytes.into_inner(),
            failures,
        }
    }

    fn upload_one(&self, task: &UploadTask<'_>) -> Result<(), UploadError> {
        let index = task.slice.index;
        let staged = StagedSlice::stage(self.source, &task.slice, self.staging_dir)
            .map_err(|source| UploadError::SliceIo { index, source })?;
        self.transport
            .upload_slice(task.target, &staged)
            .map_err(|source| UploadError::SliceUploadFailed { index, source })
    }
}
