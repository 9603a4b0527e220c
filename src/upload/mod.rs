//! Sliced upload of large archives.
//!
//! A file is cut into bounded slices ([`plan`]), the server is told the
//! slice sizes up front, and a fixed pool of workers ([`pool`]) stages each
//! slice to a scratch file ([`staging`]) and sends it. A failed slice is
//! recorded ([`failures`]) without disturbing the others;
//! [`orchestrator`] ties the steps together and reports the first failure
//! once everything has been attempted.

pub mod failures;
pub mod orchestrator;
pub mod plan;
pub mod pool;
pub mod staging;

pub use failures::{FailureAggregator, FailureRecord};
pub use orchestrator::{UploadOptions, UploadOrchestrator, UploadReport};
pub use plan::{Slice, SlicePlan, DEFAULT_MAX_SLICE_SIZE};
pub use pool::{DrainSummary, TaskQueue, UploadTask, WorkerPool};
pub use staging::{SourceFile, StagedSlice};

use crate::error::ApiError;

/// Package version and asset kind every slice of one upload is sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub version_id: String,
    /// Unity editor version the package is built for.
    pub asset_kind: String,
}

/// The two remote calls a sliced upload needs.
///
/// Implemented by [`crate::api::ApiClient`]; tests use in-memory fakes.
pub trait SliceTransport: Sync {
    /// Announce the slice lengths, in index order, before any slice is sent.
    fn prepare_upload(&self, target: &UploadTarget, slice_lengths: &[u64]) -> Result<(), ApiError>;

    /// Send one staged slice. Slices may arrive in any order.
    fn upload_slice(&self, target: &UploadTarget, staged: &StagedSlice) -> Result<(), ApiError>;
}
