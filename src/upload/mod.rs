//! # Stage: Upload Sessions
//!
//! ## Responsibility
//! Turn a local file path into an upload declaration, bind a declaration to
//! the client that submits it, and hand it to the worker that processes it.
//!
//! ## Guarantees
//! - A declaration is submitted at most once: submission consumes it
//! - Bounded: the processing queue has a fixed capacity and applies
//!   backpressure to submitters
//! - Every worker outcome is reported to the submitting client only
//!
//! ## NOT Responsible For
//! - Transferring bytes to remote storage (a custom [`UploadProcessor`])
//! - Authenticating clients

pub mod coordinator;
pub mod worker;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use coordinator::UploadCoordinator;
pub use worker::{spawn_upload_worker, DigestProcessor, ProgressReporter, UploadProcessor};

/// Lifecycle of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    /// Validated and waiting for a submit.
    Declared,
    /// Bound to a client id and waiting for queue room.
    Submitted,
    /// Placed on the processing queue.
    Enqueued,
}

/// One file inside a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFile {
    /// Path relative to the declaration root, `/`-separated.
    pub path: String,
    /// Size in bytes at declaration time.
    pub size: u64,
}

/// A declared upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDeclaration {
    /// Opaque session id (32 hex chars).
    pub upload_id: String,
    /// Directory containing the declared files.
    pub root: String,
    /// Declared files.
    pub files: Vec<UploadFile>,
    /// Client the session was submitted by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Current lifecycle state.
    pub state: UploadState,
}

impl UploadDeclaration {
    /// Absolute path of `file` on disk.
    pub fn file_path(&self, file: &UploadFile) -> PathBuf {
        PathBuf::from(&self.root).join(&file.path)
    }

    /// Sum of the declared file sizes.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Errors raised while declaring, submitting or processing uploads.
#[derive(Debug, Error)]
pub enum UploadError {
    /// No path given.
    #[error("absolute path is empty")]
    EmptyPath,

    /// Path is relative.
    #[error("path is not absolute: {0}")]
    NotAbsolute(String),

    /// Nothing exists at the path.
    #[error("path does not exist: {0}")]
    NotExists(String),

    /// Path exists but is not a regular file.
    #[error("path is not a file: {0}")]
    NotAFile(String),

    /// Extension is not an accepted model format.
    #[error("file extension not allowed: {0}")]
    ExtensionNotAllowed(String),

    /// Submitting client id missing or empty.
    #[error("invalid client id")]
    InvalidClientId,

    /// Upload id missing or empty.
    #[error("upload id is empty")]
    EmptyUploadId,

    /// No pending declaration under this id.
    #[error("unknown upload id: {0}")]
    UnknownUploadId(String),

    /// The processing queue has shut down.
    #[error("upload queue is closed")]
    QueueClosed,

    /// Reading a declared file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being read.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A processor rejected the upload.
    #[error("upload processing failed: {0}")]
    Processing(String),
}
