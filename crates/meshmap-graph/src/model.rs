//! Graph output model
//!
//! The JSON contract consumed by callers. Node and edge ids are stable
//! strings derived from canonical hosts and resource names, never from
//! counters or randomness, so two builds over the same snapshot serialize
//! identically apart from `generatedAt`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form node/edge properties, serialized with sorted keys
pub type Properties = BTreeMap<String, Value>;

/// Id of the node standing for the whole mesh
pub const MESH_NODE_ID: &str = "mesh";

/// Property key holding the diagnostics attached to an edge or node
pub const DIAGNOSTICS_KEY: &str = "diagnostics";

/// Property key holding free-form string annotations on an edge
pub const ANNOTATIONS_KEY: &str = "annotations";

/// Annotation added to edges of routes bound to a non-mesh gateway
pub const VIA_GATEWAY_ANNOTATION: &str = "via-gateway";

/// Annotation added to composite edges that leave the mesh through an egress gateway
pub const VIA_EGRESS_ANNOTATION: &str = "via-egress";

// =============================================================================
// Node ids
// =============================================================================

/// `host:<canonicalHost>`
pub fn host_node_id(canonical: &str) -> String {
    format!("host:{}", canonical)
}

/// `external:<canonicalHost>`
pub fn external_node_id(canonical: &str) -> String {
    format!("external:{}", canonical)
}

/// `serviceEntry:<namespace>/<name>`
pub fn service_entry_node_id(namespace: &str, name: &str) -> String {
    format!("serviceEntry:{}/{}", namespace, name)
}

/// `workloadEntry:<namespace>/<name>`
pub fn workload_entry_node_id(namespace: &str, name: &str) -> String {
    format!("workloadEntry:{}/{}", namespace, name)
}

/// `gateway:<namespace>/<name>`
pub fn gateway_node_id(namespace: &str, name: &str) -> String {
    format!("gateway:{}/{}", namespace, name)
}

/// `container:<namespace>/<pod>/<container>`
pub fn container_node_id(namespace: &str, pod: &str, container: &str) -> String {
    format!("container:{}/{}/{}", namespace, pod, container)
}

// =============================================================================
// Nodes and edges
// =============================================================================

/// Kind of identity a node stands for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    /// Kubernetes Service
    Service,
    /// Host with no backing resource (unresolved VirtualService host)
    Host,
    /// Workload narrowed below the service level
    Workload,
    /// Host outside the service registry (ServiceEntry-backed or unresolved)
    ExternalService,
    /// ServiceEntry resource
    ServiceEntry,
    /// WorkloadEntry resource
    WorkloadEntry,
    /// Istio Gateway
    Gateway,
    /// The whole mesh
    Mesh,
    /// Referenced but absent from the snapshot
    Unknown,
    /// Application container of a pod
    AppContainer,
    /// Sidecar proxy container of a pod
    SidecarContainer,
}

impl NodeType {
    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Service => "service",
            NodeType::Host => "host",
            NodeType::Workload => "workload",
            NodeType::ExternalService => "externalService",
            NodeType::ServiceEntry => "serviceEntry",
            NodeType::WorkloadEntry => "workloadEntry",
            NodeType::Gateway => "gateway",
            NodeType::Mesh => "mesh",
            NodeType::Unknown => "unknown",
            NodeType::AppContainer => "appContainer",
            NodeType::SidecarContainer => "sidecarContainer",
        }
    }

    /// Whether the node lies outside the Kubernetes service registry
    pub fn is_external(&self) -> bool {
        matches!(self, NodeType::ExternalService | NodeType::ServiceEntry)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vertex of the topology graph
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique, deterministic id
    pub id: String,
    /// Node type
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Accumulated properties
    pub properties: Properties,
}

impl GraphNode {
    /// Create a node with no properties
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            properties: Properties::new(),
        }
    }

    /// Property lookup
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Relationship an edge expresses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    /// Routed traffic declared by a VirtualService
    Traffic,
    /// Containers sharing a pod, or a service selecting a pod
    PodLink,
    /// ServiceEntry declaring a host
    ServiceEntryHost,
    /// Egress gateway forwarding to an external host
    EgressRoute,
    /// Composite of a route into an egress gateway and the gateway's onward route
    ViaEgress,
}

impl EdgeKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Traffic => "traffic",
            EdgeKind::PodLink => "podLink",
            EdgeKind::ServiceEntryHost => "serviceEntryHost",
            EdgeKind::EgressRoute => "egressRoute",
            EdgeKind::ViaEgress => "viaEgress",
        }
    }
}

/// A directed edge between two nodes of the same graph
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Unique, deterministic id
    pub id: String,
    /// Edge kind
    pub kind: EdgeKind,
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Edge properties
    pub properties: Properties,
}

impl GraphEdge {
    /// Property lookup
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Diagnostics attached to the edge
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.properties
            .get(DIAGNOSTICS_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// String annotations attached to the edge
    pub fn annotations(&self) -> Vec<String> {
        self.properties
            .get(ANNOTATIONS_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Diagnostic severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Worth knowing, probably fine
    Info,
    /// Likely misconfiguration
    Warning,
    /// Broken configuration
    Error,
}

/// A finding attached to an edge or node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Stable machine-readable code
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// Suggested remediation
    pub suggestion: String,
}

impl Diagnostic {
    /// Create a diagnostic
    pub fn new(
        severity: Severity,
        code: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}

// =============================================================================
// Response
// =============================================================================

/// Counters over the built graph and its input
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Number of nodes
    pub nodes: usize,
    /// Number of edges
    pub edges: usize,
    /// VirtualServices in the primary namespace
    pub virtual_services: usize,
    /// DestinationRules in the primary namespace
    pub destination_rules: usize,
    /// ServiceEntries in the primary namespace
    pub service_entries: usize,
    /// Gateways in the primary namespace
    pub gateways: usize,
    /// WorkloadEntries in the primary namespace
    pub workload_entries: usize,
    /// Pods in the primary namespace, reported when containers are expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<usize>,
}

/// Result of one graph build
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphResponse {
    /// Inspected namespace
    pub namespace: String,
    /// Wall-clock time of the build
    pub generated_at: DateTime<Utc>,
    /// Counters
    pub summary: Summary,
    /// Nodes in insertion order
    pub nodes: Vec<GraphNode>,
    /// Edges in insertion order
    pub edges: Vec<GraphEdge>,
    /// Non-fatal problems found while building
    pub warnings: Vec<String>,
}

impl GraphResponse {
    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Look up an edge by id
    pub fn edge(&self, id: &str) -> Option<&GraphEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Edges of one kind, in order
    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    /// Nodes of one type, in order
    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(move |n| n.node_type == node_type)
    }
}
