//! # Stage: Filename Cache
//!
//! ## Responsibility
//! Keep, per category, the most recent `label → real_path` mapping fetched
//! from the registry, and the flags deciding when that mapping is stale.
//!
//! ## Guarantees
//! - A category's entry is either absent or exactly the result of one fetch
//! - Locks are never held across an `.await`
//! - Listings only contain labels with an accepted model-file extension
//!
//! ## NOT Responsible For
//! - Talking HTTP (that belongs to `registry`)
//! - Rewriting graphs (that belongs to `rewrite`)

pub mod filename;
pub mod refresh;

use thiserror::Error;

use crate::registry::RegistryError;

pub use filename::FilenameCache;
pub use refresh::RefreshRegistry;

/// Errors returned by cache reads.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The category has no remote model type and no static entries.
    #[error("unknown model category '{0}'")]
    UnknownCategory(String),

    /// The share id is empty or contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid share id '{0}'")]
    InvalidShareId(String),

    /// The registry fetch failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// `true` if `share_id` is a non-empty run of ASCII letters, digits, `_` or `-`.
pub fn is_valid_share_id(share_id: &str) -> bool {
    !share_id.is_empty()
        && share_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// `true` if `label` ends with one of `extensions` (ASCII case-insensitive).
///
/// # Panics
///
/// This function never panics.
pub fn has_accepted_extension(label: &str, extensions: &[String]) -> bool {
    let lower = label.to_ascii_lowercase();
    extensions
        .iter()
        .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
}
