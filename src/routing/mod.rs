//! # Stage: Loader Endpoint Routing
//!
//! ## Responsibility
//! Pick the remote compute endpoint that should serve each loader node of a
//! pipeline graph. Model names are matched against an ordered rule table;
//! companion nodes elsewhere in the graph can redirect a family to a
//! specialised endpoint and force some of the loader's inputs.
//!
//! ## Guarantees
//! - Deterministic: the same graph and table always produce the same routes
//! - Immutable table: compiled once at startup, shared read-only
//! - First match wins, both for rules and for overrides
//! - Non-loader nodes are never inspected or modified
//!
//! ## NOT Responsible For
//! - Calling the endpoint (the caller dispatches the graph)
//! - Resolving file labels (that belongs to `rewrite`)

pub mod router;
pub mod table;

pub use router::{ModelRouter, NodeRoute, ROUTED_INPUTS};
pub use table::{EndpointOverride, RoutingError, RoutingRule, RoutingTable, ServiceConfig};
