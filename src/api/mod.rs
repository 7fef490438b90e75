//! Transport-independent API vocabulary: stable error codes, response
//! envelopes and request validation.
//!
//! The axum layer in `web_api` renders these; the upload worker reuses the
//! same [`ErrorBody`] shape for WebSocket `error` events.

pub mod models;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CacheError;
use crate::registry::RegistryError;
use crate::rewrite::RewriteError;
use crate::upload::UploadError;

/// Stable numeric error codes exposed to clients.
///
/// The leading three digits are the HTTP status the code is served with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `absolute_path` missing or empty.
    EmptyAbsPath,
    /// Path is not absolute.
    NotAbsolutePath,
    /// Path does not exist.
    PathNotExists,
    /// Path is not a regular file.
    NotAFile,
    /// File extension not accepted.
    ExtensionNotAllowed,
    /// `clientId` missing or empty.
    InvalidClientId,
    /// `upload_id` missing or empty.
    EmptyUploadId,
    /// No pending declaration with this id.
    UnknownUploadId,
    /// Model name missing or empty.
    EmptyModelName,
    /// Model name contains `/`.
    InvalidModelName,
    /// Model type missing or not accepted.
    InvalidModelType,
    /// `versions` missing or not a list.
    InvalidVersions,
    /// Two versions share a name.
    DuplicateVersion,
    /// Version name missing or empty.
    EmptyVersion,
    /// Version name contains `/`.
    InvalidVersionName,
    /// Version base model missing or empty.
    EmptyBaseModel,
    /// Version path missing or empty.
    EmptyVersionPath,
    /// Version sign missing or empty.
    EmptySign,
    /// Query mode not one of `my`, `my_fork`, `publicity`.
    InvalidQueryMode,
    /// Paging parameters out of range.
    InvalidPage,
    /// Path id is not a positive integer.
    InvalidModelId,
    /// Share id contains characters outside `[A-Za-z0-9_-]`.
    InvalidShareId,
    /// Request body could not be decoded.
    InvalidBody,
    /// Category has no remote type and no static entries.
    UnknownCategory,
    /// A graph references a file that does not exist.
    UnresolvedFile,
    /// The registry call failed.
    Registry,
    /// Processing an upload failed.
    UploadFailed,
    /// The processing queue is closed.
    QueueClosed,
    /// Request body exceeds the configured limit.
    PayloadTooLarge,
}

impl ErrorCode {
    /// Numeric code carried in envelopes.
    pub fn code(self) -> u32 {
        match self {
            Self::EmptyAbsPath => 400_101,
            Self::NotAbsolutePath => 400_102,
            Self::PathNotExists => 400_103,
            Self::NotAFile => 400_104,
            Self::ExtensionNotAllowed => 400_105,
            Self::InvalidClientId => 400_110,
            Self::EmptyUploadId => 400_111,
            Self::UnknownUploadId => 404_112,
            Self::EmptyModelName => 400_120,
            Self::InvalidModelName => 400_121,
            Self::InvalidModelType => 400_122,
            Self::InvalidVersions => 400_123,
            Self::DuplicateVersion => 400_124,
            Self::EmptyVersion => 400_125,
            Self::InvalidVersionName => 400_126,
            Self::EmptyBaseModel => 400_127,
            Self::EmptyVersionPath => 400_128,
            Self::EmptySign => 400_129,
            Self::InvalidQueryMode => 400_130,
            Self::InvalidPage => 400_131,
            Self::InvalidModelId => 400_132,
            Self::InvalidShareId => 400_133,
            Self::InvalidBody => 400_150,
            Self::UnknownCategory => 404_140,
            Self::UnresolvedFile => 400_141,
            Self::Registry => 502_001,
            Self::UploadFailed => 500_010,
            Self::QueueClosed => 503_001,
            Self::PayloadTooLarge => 413_001,
        }
    }

    /// HTTP status the code is served with.
    pub fn status(self) -> u16 {
        // code() always has six digits with the status in front.
        u16::try_from(self.code() / 1000).unwrap_or(500)
    }

    /// Default human-readable message.
    pub fn message(self) -> &'static str {
        match self {
            Self::EmptyAbsPath => "absolute path is empty",
            Self::NotAbsolutePath => "path is not absolute",
            Self::PathNotExists => "path does not exist",
            Self::NotAFile => "path is not a file",
            Self::ExtensionNotAllowed => "file extension is not allowed",
            Self::InvalidClientId => "invalid client id",
            Self::EmptyUploadId => "upload id is empty",
            Self::UnknownUploadId => "unknown upload id",
            Self::EmptyModelName => "model name is empty",
            Self::InvalidModelName => "model name must not contain '/'",
            Self::InvalidModelType => "invalid model type",
            Self::InvalidVersions => "versions must be a list",
            Self::DuplicateVersion => "duplicate version name",
            Self::EmptyVersion => "version name is empty",
            Self::InvalidVersionName => "version name must not contain '/'",
            Self::EmptyBaseModel => "base model is empty",
            Self::EmptyVersionPath => "version path is empty",
            Self::EmptySign => "version sign is empty",
            Self::InvalidQueryMode => "mode must be one of my, my_fork, publicity",
            Self::InvalidPage => "invalid paging parameters",
            Self::InvalidModelId => "invalid model id",
            Self::InvalidShareId => "share id may only contain letters, digits, '_' and '-'",
            Self::InvalidBody => "request body could not be decoded",
            Self::UnknownCategory => "unknown model category",
            Self::UnresolvedFile => "referenced file is not available",
            Self::Registry => "model registry request failed",
            Self::UploadFailed => "upload processing failed",
            Self::QueueClosed => "upload queue is closed",
            Self::PayloadTooLarge => "request body too large",
        }
    }
}

/// Error envelope: `{code, message, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Numeric [`ErrorCode`].
    pub code: u32,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default)]
    pub data: Value,
}

impl ErrorBody {
    /// Envelope with the code's default message and no detail.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_string(),
            data: Value::Null,
        }
    }

    /// Replace the message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attach structured detail.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Success envelope: `{data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    /// Payload.
    pub data: T,
}

impl From<&UploadError> for ErrorCode {
    fn from(err: &UploadError) -> Self {
        match err {
            UploadError::EmptyPath => Self::EmptyAbsPath,
            UploadError::NotAbsolute(_) => Self::NotAbsolutePath,
            UploadError::NotExists(_) => Self::PathNotExists,
            UploadError::NotAFile(_) => Self::NotAFile,
            UploadError::ExtensionNotAllowed(_) => Self::ExtensionNotAllowed,
            UploadError::InvalidClientId => Self::InvalidClientId,
            UploadError::EmptyUploadId => Self::EmptyUploadId,
            UploadError::UnknownUploadId(_) => Self::UnknownUploadId,
            UploadError::QueueClosed => Self::QueueClosed,
            UploadError::Io { .. } | UploadError::Processing(_) => Self::UploadFailed,
        }
    }
}

impl From<&CacheError> for ErrorCode {
    fn from(err: &CacheError) -> Self {
        match err {
            CacheError::UnknownCategory(_) => Self::UnknownCategory,
            CacheError::InvalidShareId(_) => Self::InvalidShareId,
            CacheError::Registry(_) => Self::Registry,
        }
    }
}

impl From<&RewriteError> for ErrorCode {
    fn from(err: &RewriteError) -> Self {
        match err {
            RewriteError::Unresolved { .. } => Self::UnresolvedFile,
            RewriteError::Cache(inner) => inner.into(),
        }
    }
}

impl From<&RegistryError> for ErrorCode {
    fn from(_: &RegistryError) -> Self {
        Self::Registry
    }
}

/// Build the error envelope for an upload failure.
pub fn upload_error_body(err: &UploadError) -> ErrorBody {
    ErrorBody::new(err.into()).with_message(err.to_string())
}
