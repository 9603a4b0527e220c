// Error types shared by the API client and the upload engine.
//
// The CLI layer works with `anyhow::Result` like the rest of the binary;
// the library keeps typed errors so callers (and tests) can tell a rejected
// prepare call apart from an isolated slice failure. Messages name only their
// own layer; the cause is reachable through `source()`.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// A failed call to the storefront REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with something other than 200/204.
    #[error("{method} {url} failed with status {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: StatusCode,
        body: String,
    },

    /// The request never produced a response (connect, timeout, TLS...).
    #[error("request failed")]
    Transport(#[from] reqwest::Error),

    /// The response body was not the JSON we expected.
    #[error("unexpected response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// A local file meant for a multipart body could not be opened.
    #[error("cannot read {}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An authenticated endpoint was called before logging in.
    #[error("not authenticated: {0} is missing")]
    MissingCredential(&'static str),

    /// A token contained bytes that cannot go into a header.
    #[error("invalid authorization header")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

/// Errors produced by a sliced upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Bad slice-plan parameters.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The source archive could not be opened or measured.
    #[error("cannot open source {}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote side rejected the prepare call. No slice was attempted.
    #[error("prepare call failed")]
    PrepareFailed(#[source] ApiError),

    /// One slice was rejected by the remote side.
    #[error("slice {index} upload failed")]
    SliceUploadFailed {
        index: usize,
        #[source]
        source: ApiError,
    },

    /// Reading the source range or writing the scratch file failed.
    #[error("slice {index} staging failed")]
    SliceIo {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    /// Index of the slice this error belongs to, if any.
    pub fn slice_index(&self) -> Option<usize> {
        match self {
            UploadError::SliceUploadFailed { index, .. } | UploadError::SliceIo { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }
}

/// `err` followed by each of its causes, joined with `": "`.
pub fn chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut cause = err.source();
    while let Some(e) = cause {
        out.push_str(": ");
        out.push_str(&e.to_string());
        cause = e.source();
    }
    out
}
