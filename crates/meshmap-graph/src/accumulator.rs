//! Graph accumulator
//!
//! Owns the mutable state of one build: an insertion-ordered node table, the
//! edge list and the warnings. Nodes are merged on revisit, never duplicated.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::warn;

use crate::model::{EdgeKind, GraphEdge, GraphNode, NodeType, Properties};
use crate::resolver::NodeSpec;

/// Append `value` to the array property `key`, creating it if needed.
///
/// Values already present are skipped when `dedupe` is set. A non-array
/// value under `key` is replaced.
pub fn append_property(properties: &mut Properties, key: &str, value: Value, dedupe: bool) {
    let entry = properties
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        *entry = Value::Array(Vec::new());
    }
    if let Value::Array(items) = entry {
        if !(dedupe && items.contains(&value)) {
            items.push(value);
        }
    }
}

/// Mutable state of one graph build
#[derive(Debug, Default)]
pub struct GraphAccumulator {
    nodes: Vec<GraphNode>,
    node_index: HashMap<String, usize>,
    edges: Vec<GraphEdge>,
    edge_ids: HashSet<String>,
    warnings: Vec<String>,
}

impl GraphAccumulator {
    /// Empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the node or merge into the existing one; returns its id.
    ///
    /// Merging keeps existing property values and only adds missing keys. An
    /// `unknown` placeholder is upgraded to the incoming type.
    pub fn upsert_node(&mut self, spec: NodeSpec) -> String {
        match self.node_index.get(&spec.id) {
            Some(&idx) => {
                let node = &mut self.nodes[idx];
                if node.node_type == NodeType::Unknown && spec.node_type != NodeType::Unknown {
                    node.node_type = spec.node_type;
                }
                for (key, value) in spec.properties {
                    node.properties.entry(key).or_insert(value);
                }
            }
            None => {
                self.node_index.insert(spec.id.clone(), self.nodes.len());
                self.nodes.push(GraphNode {
                    id: spec.id.clone(),
                    node_type: spec.node_type,
                    properties: spec.properties,
                });
            }
        }
        spec.id
    }

    /// Node by id
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.node_index.get(id).map(|&idx| &self.nodes[idx])
    }

    /// Mutable node by id
    pub fn node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        match self.node_index.get(id) {
            Some(&idx) => Some(&mut self.nodes[idx]),
            None => None,
        }
    }

    /// Append to an array property of a node; no-op for unknown ids
    pub fn append_node_property(&mut self, id: &str, key: &str, value: Value, dedupe: bool) {
        if let Some(node) = self.node_mut(id) {
            append_property(&mut node.properties, key, value, dedupe);
        }
    }

    /// Add an edge; a taken id gets a `#<n>` suffix so ids stay unique.
    ///
    /// Returns the index of the new edge.
    pub fn add_edge(
        &mut self,
        kind: EdgeKind,
        id: String,
        source: &str,
        target: &str,
        properties: Properties,
    ) -> usize {
        let mut unique = id.clone();
        let mut n = 1;
        while self.edge_ids.contains(&unique) {
            n += 1;
            unique = format!("{}#{}", id, n);
        }
        self.edge_ids.insert(unique.clone());
        self.edges.push(GraphEdge {
            id: unique,
            kind,
            source: source.to_string(),
            target: target.to_string(),
            properties,
        });
        self.edges.len() - 1
    }

    /// Edges added so far
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Nodes added so far
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Nodes and mutable edges at once, for post-processing passes
    pub fn nodes_and_edges_mut(&mut self) -> (&[GraphNode], &mut [GraphEdge]) {
        (&self.nodes, &mut self.edges)
    }

    /// Record a warning about `resource` and mirror it to the log
    pub fn warn(&mut self, resource: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(resource = %resource, warning = %message, "Graph build warning");
        self.warnings.push(message);
    }

    /// Warnings recorded so far
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Consume into `(nodes, edges, warnings)`
    pub fn into_parts(self) -> (Vec<GraphNode>, Vec<GraphEdge>, Vec<String>) {
        (self.nodes, self.edges, self.warnings)
    }
}
