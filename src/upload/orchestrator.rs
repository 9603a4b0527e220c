// Orchestration: one sliced upload from opening the source to the final report.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indicatif::ProgressBar;

use super::plan::{SlicePlan, DEFAULT_MAX_SLICE_SIZE};
use super::pool::{TaskQueue, WorkerPool};
use super::staging::SourceFile;
use super::{SliceTransport, UploadTarget};
use crate::error::{chain, UploadError};

/// Knobs for one sliced upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Explicit slice count; derived from `max_slice_size` when unset.
    pub slices: Option<usize>,
    pub workers: usize,
    pub max_slice_size: u64,
    /// Where scratch files go. Defaults to the system temp dir.
    pub staging_dir: Option<PathBuf>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        UploadOptions {
            slices: None,
            workers: 1,
            max_slice_size: DEFAULT_MAX_SLICE_SIZE,
            staging_dir: None,
        }
    }
}

/// Outcome of an upload where every slice was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub slices: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Drives a complete sliced upload of one archive.
pub struct UploadOrchestrator<'a, T: SliceTransport> {
    transport: &'a T,
    options: UploadOptions,
    progress: ProgressBar,
}

impl<'a, T: SliceTransport> UploadOrchestrator<'a, T> {
    pub fn new(transport: &'a T, options: UploadOptions) -> Self {
        UploadOrchestrator {
            transport,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report progress (in bytes) on `bar`; its length is set once the file
    /// size is known.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    /// Plan, prepare, then push every slice through the worker pool.
    ///
    /// A rejected prepare call aborts before any slice is attempted. Slice
    /// failures do not stop the drain; once it finishes the earliest
    /// recorded failure is returned.
    pub fn upload(&self, path: &Path, target: &UploadTarget) -> Result<UploadReport, UploadError> {
        let started = Instant::now();
        let source = SourceFile::open(path).map_err(|source| UploadError::Source {
            path: path.to_path_buf(),
            source,
        })?;

        let plan = SlicePlan::compute(source.len(), self.options.slices, self.options.max_slice_size)?;
        self.transport
            .prepare_upload(target, &plan.lengths())
            .map_err(UploadError::PrepareFailed)?;
        tracing::info!(
            version = %target.version_id,
            kind = %target.asset_kind,
            slices = plan.len(),
            bytes = plan.total_bytes(),
            "prepared sliced upload"
        );

        let queue = TaskQueue::from_plan(&plan, target);
        let staging_dir = self
            .options
            .staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        self.progress.set_length(plan.total_bytes());
        let pool = WorkerPool::new(
            self.options.workers,
            self.transport,
            &source,
            &staging_dir,
            self.progress.clone(),
        );
        let summary = pool.drain(&queue);

        let mut records = summary.failures.into_records().into_iter();
        if let Some(first) = records.next() {
            self.progress.abandon();
            for other in records {
                tracing::warn!(index = other.index, error = %chain(&other.error), "additional slice failure");
            }
            return Err(first.error);
        }

        self.progress.finish();
        Ok(UploadReport {
            slices: summary.uploaded_slices,
            bytes: summary.uploaded_bytes,
            elapsed: started.elapsed(),
        })
    }
}
