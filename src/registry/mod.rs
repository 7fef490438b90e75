//! # Stage: Remote Model Registry Boundary
//!
//! ## Responsibility
//! Define the RPC surface this crate consumes from the remote model registry
//! ([`ModelRegistry`]) and ship one concrete HTTP implementation
//! ([`HttpRegistry`]).
//!
//! ## Guarantees
//! - Object-safe: callers hold `Arc<dyn ModelRegistry>`, tests substitute fakes
//! - Explicit emptiness: a listing without usable data is [`FetchOutcome::Empty`],
//!   distinct from a transport failure
//!
//! ## NOT Responsible For
//! - Retries or backoff (the registry's own contract)
//! - Caching (that belongs to `cache`)

#[cfg(test)]
pub(crate) mod fake;
pub mod http;
pub mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use http::HttpRegistry;
pub use types::{ModelDraft, ModelQuery, ModelVersion, Page, QueryMode};

/// One `(label, real_path)` pair returned by a file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilenameEntry {
    /// User-facing identifier as it appears inside pipeline graphs.
    pub label: String,
    /// Concrete remote location the label resolves to.
    pub real_path: String,
}

impl FilenameEntry {
    /// Build an entry from anything string-like.
    pub fn new(label: impl Into<String>, real_path: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            real_path: real_path.into(),
        }
    }
}

/// Result of a file listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The registry answered with a file list (possibly zero entries).
    Files(Vec<FilenameEntry>),
    /// The registry answered without usable data.
    Empty,
}

/// Failures crossing the registry boundary.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("registry transport failure: {0}")]
    Transport(String),

    /// The registry answered with a non-success HTTP status.
    #[error("registry returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The registry answered with an application-level error code.
    #[error("registry error {code}: {message}")]
    Remote {
        /// Registry error code.
        code: i64,
        /// Registry error message.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("registry response could not be decoded: {0}")]
    Decode(String),
}

/// RPC surface of the remote model registry.
///
/// Implementations must be thread-safe (Send + Sync) for use across tasks.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// List files of one remote model type, optionally scoped to a share namespace.
    async fn fetch_files(
        &self,
        model_type: &str,
        share_id: Option<&str>,
    ) -> Result<FetchOutcome, RegistryError>;

    /// Look up the calling user's profile.
    async fn user_info(&self) -> Result<Value, RegistryError>;

    /// Publish a new model with its versions.
    async fn commit_model(&self, draft: &ModelDraft) -> Result<Value, RegistryError>;

    /// Replace name, type and versions of an existing model.
    async fn update_model(&self, model_id: u64, draft: &ModelDraft)
        -> Result<Value, RegistryError>;

    /// Delete a model.
    async fn delete_model(&self, model_id: u64) -> Result<Value, RegistryError>;

    /// Fetch the detail view of a model.
    async fn model_detail(&self, model_id: u64, source: &str) -> Result<Value, RegistryError>;

    /// Fork one model version into the caller's space.
    async fn fork_model_version(&self, version_id: u64) -> Result<Value, RegistryError>;

    /// Paged model search in one of the listing modes.
    async fn query_models(
        &self,
        mode: QueryMode,
        page: Page,
        query: &ModelQuery,
    ) -> Result<Value, RegistryError>;
}
