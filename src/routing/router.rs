//! Loader endpoint resolution.
//!
//! The [`ModelRouter`] looks at the model-name inputs of a loader node, picks
//! a family from the [`RoutingTable`], then lets companion nodes present in
//! the same graph redirect the family to a specialised endpoint.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::table::RoutingTable;
use crate::graph::{ClassTypeFlags, PipelineGraph, PipelineNode};

/// Loader inputs inspected for a model name, in priority order.
pub const ROUTED_INPUTS: [&str; 3] = ["ckpt_name", "unet_name", "vae_name"];

/// Endpoint chosen for one node of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRoute {
    /// Node id inside the graph.
    pub node_id: String,
    /// Full endpoint URL.
    pub endpoint: String,
}

/// Resolves compute endpoints for loader nodes.
///
/// Cheap to clone; the table is shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    table: Arc<RoutingTable>,
}

impl ModelRouter {
    /// Create a router over `table`.
    pub fn new(table: Arc<RoutingTable>) -> Self {
        Self { table }
    }

    /// The table this router consults.
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Endpoint for `node`, or `None` when the caller should use its default.
    ///
    /// Only loader nodes are considered. The first of [`ROUTED_INPUTS`] whose
    /// lowercased string value matches a rule decides the family. If an
    /// override for that family has a companion in `class_types`, its route
    /// is used and its forced inputs are written into `node`.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn resolve_endpoint(
        &self,
        node: &mut PipelineNode,
        class_types: &ClassTypeFlags,
    ) -> Option<String> {
        if !node.is_loader() {
            return None;
        }

        let key = ROUTED_INPUTS.iter().find_map(|field| {
            let value = node.str_input(field)?.to_lowercase();
            self.table.match_config(&value)
        })?;
        let service = self.table.service(key)?;

        let chosen = self
            .table
            .overrides_for(key)
            .find(|o| class_types.contains_any(&o.companions));

        match chosen {
            Some(ov) => {
                for (name, value) in &ov.inputs {
                    node.inputs
                        .insert(name.clone(), Value::String(value.clone()));
                }
                debug!(config = key, route = %ov.route, "companion override applied");
                Some(format!("{}{}", service.service_address, ov.route))
            }
            None => Some(service.endpoint()),
        }
    }

    /// Resolve every node of `graph`, applying overrides in place.
    ///
    /// Companion flags are derived from the whole graph before any node is
    /// resolved. Nodes without a route are omitted from the result.
    pub fn route_graph(&self, graph: &mut PipelineGraph) -> Vec<NodeRoute> {
        let flags = ClassTypeFlags::from_graph(graph);
        graph
            .iter_mut()
            .filter_map(|(id, node)| {
                self.resolve_endpoint(node, &flags).map(|endpoint| NodeRoute {
                    node_id: id.clone(),
                    endpoint,
                })
            })
            .collect()
    }
}
