//! Graph assembly
//!
//! Freezes the accumulated state into a [`GraphResponse`]. Order is kept
//! exactly as accumulated; nothing is re-sorted.

use std::collections::HashSet;

use chrono::Utc;
use meshmap_common::ResourceSnapshot;

use crate::accumulator::GraphAccumulator;
use crate::builder::BuildOptions;
use crate::error::GraphError;
use crate::model::{GraphEdge, GraphNode, GraphResponse, Summary};

const PHASE: &str = "assemble";

/// Check that ids are unique and every edge endpoint is a node of the graph
pub fn check_integrity(nodes: &[GraphNode], edges: &[GraphEdge]) -> Result<(), GraphError> {
    let mut node_ids: HashSet<&str> = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !node_ids.insert(node.id.as_str()) {
            return Err(GraphError::internal(
                PHASE,
                format!("duplicate node id {}", node.id),
            ));
        }
    }

    let mut edge_ids: HashSet<&str> = HashSet::with_capacity(edges.len());
    for edge in edges {
        if !edge_ids.insert(edge.id.as_str()) {
            return Err(GraphError::internal(
                PHASE,
                format!("duplicate edge id {}", edge.id),
            ));
        }
        for endpoint in [&edge.source, &edge.target] {
            if !node_ids.contains(endpoint.as_str()) {
                return Err(GraphError::internal(
                    PHASE,
                    format!("edge {} references missing node {}", edge.id, endpoint),
                ));
            }
        }
    }
    Ok(())
}

/// Counters over the input snapshot's primary namespace and the built graph
pub fn summarize(
    snapshot: &ResourceSnapshot,
    nodes: &[GraphNode],
    edges: &[GraphEdge],
    options: BuildOptions,
) -> Summary {
    let primary = &snapshot.primary;
    Summary {
        nodes: nodes.len(),
        edges: edges.len(),
        virtual_services: primary.virtual_services.len(),
        destination_rules: primary.destination_rules.len(),
        service_entries: primary.service_entries.len(),
        gateways: primary.gateways.len(),
        workload_entries: primary.workload_entries.len(),
        pods: options.expand_containers.then_some(primary.pods.len()),
    }
}

/// Produce the final response, failing on an inconsistent graph
pub fn assemble(
    snapshot: &ResourceSnapshot,
    acc: GraphAccumulator,
    options: BuildOptions,
) -> Result<GraphResponse, GraphError> {
    let (nodes, edges, warnings) = acc.into_parts();
    check_integrity(&nodes, &edges)?;

    Ok(GraphResponse {
        namespace: snapshot.namespace().to_string(),
        generated_at: Utc::now(),
        summary: summarize(snapshot, &nodes, &edges, options),
        nodes,
        edges,
        warnings,
    })
}
