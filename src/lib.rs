//! # model-hub-router
//!
//! Resolves symbolic model-file references inside generation pipeline graphs
//! to concrete remote locations, routes loader nodes to compute endpoints,
//! and coordinates upload sessions whose progress is pushed to WebSocket
//! clients.
//!
//! ## Architecture
//!
//! ```text
//! graph ─► PromptRewriter ─► FilenameCache ─► ModelRegistry (RPC)
//!   └────► ModelRouter ─► RoutingTable
//!
//! declare ─► UploadCoordinator ─► queue(64) ─► upload worker ─► ClientNotifier ─► socket
//! ```

// ── Lint policy ───────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod api;
pub mod cache;
pub mod config;
pub mod graph;
pub mod hub;
pub mod metrics;
pub mod notify;
pub mod registry;
pub mod rewrite;
pub mod routing;
pub mod upload;

#[cfg(feature = "web-api")]
pub mod web_api;

// Re-exports for convenience
pub use cache::{CacheError, FilenameCache, RefreshRegistry};
pub use config::HubConfig;
pub use graph::{ClassTypeFlags, PipelineGraph, PipelineNode};
pub use hub::{Hub, PreparedPrompt};
pub use notify::ClientNotifier;
pub use registry::{FetchOutcome, FilenameEntry, HttpRegistry, ModelRegistry, RegistryError};
pub use rewrite::{PromptRewriter, RewriteError};
pub use routing::{ModelRouter, NodeRoute, RoutingTable};
pub use upload::{UploadCoordinator, UploadDeclaration, UploadError};

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"`: structured JSON output for log aggregators
/// - anything else (including unset): human-readable pretty output
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`HubError::Other`] if the global subscriber has already been set.
///
/// # Panics
///
/// This function never panics.
///
/// # Example
///
/// ```no_run
/// # use model_hub_router::{init_tracing, HubError};
/// # fn example() -> Result<(), HubError> {
/// init_tracing()?;
/// # Ok(()) }
/// ```
pub fn init_tracing() -> Result<(), HubError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| HubError::Other(format!("tracing init failed: {e}")))
}

/// Top-level hub errors.
///
/// Each module owns its error enum; this type aggregates them for callers
/// that drive the whole hub (the binary, integration code).
#[derive(Error, Debug)]
pub enum HubError {
    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] config::validation::ConfigError),

    /// The routing section could not be compiled.
    #[error(transparent)]
    Routing(#[from] routing::RoutingError),

    /// A registry call failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A cache read failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A graph could not be rewritten.
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    /// An upload operation failed.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Binding or serving the listener failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}
