//! # Stage: Prompt Rewriting
//!
//! ## Responsibility
//! Replace label-based file references inside a pipeline graph with the real
//! paths held by the [`FilenameCache`].
//!
//! ## Guarantees
//! - Pure with respect to its input: the caller's graph is never modified
//! - Stable: two rewrites of the same graph against the same cache are equal
//! - Loud: a reference that resolves nowhere is an error naming the field,
//!   the value and the labels that were available
//!
//! ## NOT Responsible For
//! - Choosing compute endpoints (that belongs to `routing`)
//! - Deciding when the cache refreshes (that belongs to `cache`)

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{CacheError, FilenameCache};
use crate::graph::PipelineGraph;

/// Node inputs holding file labels, with the category each one lives in.
pub const REWRITE_FIELDS: [(&str, &str); 2] =
    [("lora_name", "loras"), ("control_net_name", "controlnet")];

/// Errors produced while rewriting a graph.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// A label was found neither in the cache nor in the category listing.
    #[error("{field} '{value}' is not available; known files: {available:?}")]
    Unresolved {
        /// Input name (e.g. `lora_name`).
        field: String,
        /// The label that failed to resolve.
        value: String,
        /// Labels offered by the category at the time of the lookup.
        available: Vec<String>,
    },

    /// Populating the cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Rewrites graph file references through a shared [`FilenameCache`].
#[derive(Clone)]
pub struct PromptRewriter {
    cache: Arc<FilenameCache>,
}

impl PromptRewriter {
    /// Create a rewriter over `cache`.
    pub fn new(cache: Arc<FilenameCache>) -> Self {
        Self { cache }
    }

    /// Return a copy of `graph` with every label in [`REWRITE_FIELDS`]
    /// replaced by its real path.
    ///
    /// A label missing from the cache triggers a category listing (which may
    /// fetch) and a second cache lookup. A label present in the listing
    /// without a remote mapping, such as a static catalog entry, is kept.
    /// Non-string values (node links) are left untouched.
    ///
    /// # Errors
    ///
    /// - [`RewriteError::Unresolved`] if a label is unknown.
    /// - [`RewriteError::Cache`] if the listing fails.
    pub async fn rewrite(&self, graph: &PipelineGraph) -> Result<PipelineGraph, RewriteError> {
        let mut out = graph.clone();

        for (node_id, node) in out.iter_mut() {
            for (field, category) in REWRITE_FIELDS {
                let label = match node.inputs.get(field) {
                    Some(Value::String(label)) => label.clone(),
                    _ => continue,
                };

                let real = match self.cache.resolve(category, &label) {
                    Some(real) => real,
                    None => {
                        let available = self.cache.filename_list(category).await?;
                        match self.cache.resolve(category, &label) {
                            Some(real) => real,
                            None if available.contains(&label) => {
                                debug!(node_id = %node_id, field, label = %label, "kept local label");
                                continue;
                            }
                            None => {
                                warn!(node_id = %node_id, field, label = %label, "unresolved file label");
                                return Err(RewriteError::Unresolved {
                                    field: field.to_string(),
                                    value: label,
                                    available,
                                });
                            }
                        }
                    }
                };

                node.inputs.insert(field.to_string(), Value::String(real));
            }
        }

        Ok(out)
    }
}
