//! Pipeline graph types.
//!
//! A pipeline graph is an ordered map from node id to [`PipelineNode`]. Each
//! node carries a `class_type` tag and an `inputs` object; any other fields
//! the producer attached are preserved verbatim through (de)serialization.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One node of a generation pipeline graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineNode {
    /// Node class tag, e.g. `"CheckpointLoaderSimple"`.
    pub class_type: String,
    /// Input name → value. Values are strings, numbers, or node links.
    #[serde(default)]
    pub inputs: Map<String, Value>,
    /// Fields this crate does not interpret (e.g. `_meta`).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PipelineNode {
    /// Create a node with the given class tag and no inputs.
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            class_type: class_type.into(),
            inputs: Map::new(),
            extra: Map::new(),
        }
    }

    /// Builder-style helper setting a string input.
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), Value::String(value.into()));
        self
    }

    /// Return the input as a string slice if it is present and a string.
    pub fn str_input(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).and_then(Value::as_str)
    }

    /// `true` if the class tag names a loader node (case-insensitive).
    pub fn is_loader(&self) -> bool {
        self.class_type.to_lowercase().contains("loader")
    }
}

/// Ordered node-id → node mapping.
pub type PipelineGraph = BTreeMap<String, PipelineNode>;

/// Set of class types present in a graph.
///
/// Used by the router to detect companion nodes (e.g. a LoRA loader next to
/// a checkpoint loader).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassTypeFlags {
    present: HashSet<String>,
}

impl ClassTypeFlags {
    /// Collect the class types of every node in `graph`.
    pub fn from_graph(graph: &PipelineGraph) -> Self {
        Self {
            present: graph.values().map(|n| n.class_type.clone()).collect(),
        }
    }

    /// `true` if a node with this exact class type is present.
    pub fn contains(&self, class_type: &str) -> bool {
        self.present.contains(class_type)
    }

    /// `true` if any of the given class types is present.
    pub fn contains_any<S: AsRef<str>>(&self, class_types: &[S]) -> bool {
        class_types.iter().any(|c| self.contains(c.as_ref()))
    }
}

impl<S: Into<String>> FromIterator<S> for ClassTypeFlags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            present: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_deserializes_and_keeps_unknown_fields() {
        let raw = json!({
            "class_type": "LoraLoader",
            "inputs": {"lora_name": "a.safetensors", "model": ["4", 0]},
            "_meta": {"title": "Load LoRA"}
        });
        let node: PipelineNode = serde_json::from_value(raw.clone()).expect("test: node");
        assert_eq!(node.str_input("lora_name"), Some("a.safetensors"));
        assert_eq!(node.str_input("model"), None);
        assert_eq!(serde_json::to_value(&node).expect("test: ser"), raw);
    }

    #[test]
    fn test_is_loader_is_case_insensitive() {
        assert!(PipelineNode::new("CheckpointLoaderSimple").is_loader());
        assert!(PipelineNode::new("UNETLOADER").is_loader());
        assert!(!PipelineNode::new("KSampler").is_loader());
    }

    #[test]
    fn test_class_type_flags_from_graph() {
        let mut graph = PipelineGraph::new();
        graph.insert("1".into(), PipelineNode::new("UNETLoader"));
        graph.insert("2".into(), PipelineNode::new("ApplyPulidFlux"));
        let flags = ClassTypeFlags::from_graph(&graph);
        assert!(flags.contains("ApplyPulidFlux"));
        assert!(flags.contains_any(&["LoraLoader", "UNETLoader"]));
        assert!(!flags.contains("LoraLoader"));
    }
}
