//! Diagnostics engine
//!
//! Runs over completed traffic edges, after every node has its final type.
//! Diagnostics only annotate; they never add or remove nodes and edges.

use std::collections::{HashMap, HashSet};

use meshmap_common::mesh::WELL_KNOWN_HTTP_PORTS;
use serde_json::{json, Value};

use crate::accumulator::{append_property, GraphAccumulator};
use crate::model::{Diagnostic, EdgeKind, GraphEdge, GraphNode, NodeType, Severity, DIAGNOSTICS_KEY};
use crate::route::Protocol;

/// Target host is external and no ServiceEntry declares it
pub const MISSING_SERVICEENTRY: &str = "MISSING_SERVICEENTRY";
/// TLS route to an external host
pub const POSSIBLE_MTLS_MISMATCH: &str = "POSSIBLE_MTLS_MISMATCH";
/// TCP route to a port that usually carries HTTP
pub const PROTOCOL_MISMATCH: &str = "PROTOCOL_MISMATCH";

/// Whether the node is a destination no Service or ServiceEntry backs
pub fn is_unresolved_external(node: &GraphNode) -> bool {
    node.node_type == NodeType::ExternalService
        && node.property("resolved") == Some(&Value::Bool(false))
}

/// Diagnostics for one traffic edge given its target node
pub fn diagnose_edge(edge: &GraphEdge, target: &GraphNode) -> Vec<Diagnostic> {
    let mut found = Vec::new();
    let protocol = edge.property("protocol").and_then(Value::as_str);
    let host = target
        .property("host")
        .and_then(Value::as_str)
        .unwrap_or(&target.id);

    if is_unresolved_external(target) {
        found.push(Diagnostic::new(
            Severity::Warning,
            MISSING_SERVICEENTRY,
            format!("No ServiceEntry found for external host {}", host),
            format!("Create a ServiceEntry for '{}' with proper port", host),
        ));
    }

    if target.node_type.is_external() && protocol == Some(Protocol::Tls.as_str()) {
        found.push(Diagnostic::new(
            Severity::Info,
            POSSIBLE_MTLS_MISMATCH,
            format!(
                "Edge uses TLS to external host {}; verify the destination supports mTLS",
                host
            ),
            "If the external service does not support mTLS, configure DestinationRule TLS origination or change PeerAuthentication",
        ));
    }

    let port = edge
        .property("port")
        .and_then(Value::as_u64)
        .and_then(|p| u32::try_from(p).ok());
    if let Some(port) = port {
        if protocol == Some(Protocol::Tcp.as_str()) && WELL_KNOWN_HTTP_PORTS.contains(&port) {
            found.push(Diagnostic::new(
                Severity::Info,
                PROTOCOL_MISMATCH,
                format!("Edge uses TCP to port {} which is usually HTTP", port),
                "Ensure port naming and protocol are correct in the Service, ServiceEntry or DestinationRule",
            ));
        }
    }

    found
}

/// Attach diagnostics to every traffic edge.
///
/// The missing-ServiceEntry warning is recorded once per host even when many
/// edges target it; the diagnostic itself goes on every such edge.
pub fn run(acc: &mut GraphAccumulator) {
    let mut warnings = Vec::new();
    {
        let (nodes, edges) = acc.nodes_and_edges_mut();
        let by_id: HashMap<&str, &GraphNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let mut warned_hosts: HashSet<String> = HashSet::new();

        for edge in edges.iter_mut().filter(|e| e.kind == EdgeKind::Traffic) {
            let Some(target) = by_id.get(edge.target.as_str()) else {
                continue;
            };
            for diagnostic in diagnose_edge(edge, target) {
                if diagnostic.code == MISSING_SERVICEENTRY
                    && warned_hosts.insert(target.id.clone())
                {
                    warnings.push((target.id.clone(), diagnostic.message.clone()));
                }
                append_property(&mut edge.properties, DIAGNOSTICS_KEY, json!(diagnostic), false);
            }
        }
    }
    for (resource, warning) in warnings {
        acc.warn(&resource, warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Properties;
    use crate::resolver::NodeSpec;

    fn edge(target: &str, protocol: &str, port: Option<u32>) -> GraphEdge {
        let mut properties = Properties::new();
        properties.insert("protocol".to_string(), json!(protocol));
        if let Some(port) = port {
            properties.insert("port".to_string(), json!(port));
        }
        GraphEdge {
            id: format!("traffic:{protocol}:{target}"),
            kind: EdgeKind::Traffic,
            source: "mesh".to_string(),
            target: target.to_string(),
            properties,
        }
    }

    fn unresolved(host: &str) -> GraphNode {
        let mut node = GraphNode::new(format!("external:{host}"), NodeType::ExternalService);
        node.properties.insert("host".to_string(), json!(host));
        node.properties.insert("resolved".to_string(), json!(false));
        node
    }

    fn codes(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(|d| d.code.as_str()).collect()
    }

    #[test]
    fn test_missing_service_entry() {
        let target = unresolved("payments.external.com");
        let found = diagnose_edge(&edge(&target.id, "HTTP", None), &target);
        assert_eq!(codes(&found), vec![MISSING_SERVICEENTRY]);
        assert_eq!(found[0].severity, Severity::Warning);
        assert_eq!(
            found[0].message,
            "No ServiceEntry found for external host payments.external.com"
        );
    }

    #[test]
    fn test_tls_to_external_flags_mtls() {
        let mut target = GraphNode::new("external:api.example.com", NodeType::ExternalService);
        target
            .properties
            .insert("serviceEntry".to_string(), json!("demo/api"));
        let found = diagnose_edge(&edge(&target.id, "TLS", Some(443)), &target);
        assert_eq!(codes(&found), vec![POSSIBLE_MTLS_MISMATCH]);
        assert_eq!(found[0].severity, Severity::Info);
    }

    #[test]
    fn test_tcp_to_http_port() {
        let target = GraphNode::new("host:db.demo.svc.cluster.local", NodeType::Service);
        for port in WELL_KNOWN_HTTP_PORTS {
            let found = diagnose_edge(&edge(&target.id, "TCP", Some(port)), &target);
            assert_eq!(codes(&found), vec![PROTOCOL_MISMATCH]);
        }
        assert!(diagnose_edge(&edge(&target.id, "TCP", Some(5432)), &target).is_empty());
        assert!(diagnose_edge(&edge(&target.id, "HTTP", Some(80)), &target).is_empty());
        assert!(diagnose_edge(&edge(&target.id, "TCP", None), &target).is_empty());
    }

    #[test]
    fn test_run_warns_once_per_host() {
        let mut acc = GraphAccumulator::new();
        let target = unresolved("payments.external.com");
        acc.upsert_node(NodeSpec {
            id: target.id.clone(),
            node_type: target.node_type,
            properties: target.properties.clone(),
        });
        for n in 0..2 {
            let e = edge(&target.id, "HTTP", None);
            acc.add_edge(e.kind, format!("{}:{n}", e.id), &e.source, &e.target, e.properties);
        }

        run(&mut acc);

        assert_eq!(acc.warnings().len(), 1);
        for edge in acc.edges() {
            assert_eq!(codes(&edge.diagnostics()), vec![MISSING_SERVICEENTRY]);
        }
    }
}
