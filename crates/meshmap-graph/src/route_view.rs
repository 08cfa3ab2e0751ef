//! Per-VirtualService route view
//!
//! Regroups a built graph by the VirtualService that declared each route:
//! one group per VirtualService, listing the hosts and gateways it binds and
//! its edges with a short human-readable rule summary. Derived from the
//! [`GraphResponse`] alone, so a cached graph can be regrouped without
//! reloading.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{EdgeKind, GraphEdge, GraphNode, GraphResponse, NodeType, Severity};
use crate::route::MatchCondition;

/// Endpoint of a rendered route
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteNodeView {
    /// Graph node id
    pub id: String,
    /// Short display name
    pub label: String,
    /// Namespace, when the node belongs to one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Node type
    #[serde(rename = "type")]
    pub node_type: NodeType,
}

/// A rendered route between two endpoints
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEdgeView {
    /// Graph edge id
    pub id: String,
    /// Where traffic comes from
    pub source: RouteNodeView,
    /// Where traffic goes
    pub target: RouteNodeView,
    /// Rule summaries, most significant first
    pub rules: Vec<String>,
}

/// Routes of one VirtualService
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteGroupView {
    /// `virtualService:<namespace>/<name>`
    pub id: String,
    /// VirtualService name
    pub label: String,
    /// VirtualService namespace
    pub namespace: String,
    /// Hosts the VirtualService declares routes for
    pub hosts: Vec<String>,
    /// Gateways the routes are bound to
    pub gateways: Vec<String>,
    /// Traffic and composite egress edges, in graph order
    pub edges: Vec<RouteEdgeView>,
}

/// Route groups of one namespace
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesResponse {
    /// Inspected namespace
    pub namespace: String,
    /// Build time of the graph the view was derived from
    pub generated_at: DateTime<Utc>,
    /// One group per VirtualService, ordered by `<namespace>/<name>`
    pub routes: Vec<RouteGroupView>,
}

impl RoutesResponse {
    /// Group a graph's routes by VirtualService
    pub fn from_graph(graph: &GraphResponse) -> Self {
        let by_id: HashMap<&str, &GraphNode> =
            graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let mut groups: BTreeMap<String, RouteGroupView> = BTreeMap::new();

        for node in &graph.nodes {
            for qualified in strings(node.property("virtualServices")) {
                let group = group_for(&mut groups, &qualified);
                match node.id.strip_prefix("gateway:") {
                    Some(gateway) => push_unique(&mut group.gateways, gateway),
                    None => push_unique(&mut group.hosts, &node_host(node)),
                }
            }
        }

        for edge in graph
            .edges
            .iter()
            .filter(|e| matches!(e.kind, EdgeKind::Traffic | EdgeKind::ViaEgress))
        {
            let Some(qualified) = edge.property("virtualService").and_then(Value::as_str) else {
                continue;
            };
            let group = group_for(&mut groups, qualified);
            for gateway in strings(edge.property("gateways")) {
                push_unique(&mut group.gateways, &gateway);
            }
            group.edges.push(RouteEdgeView {
                id: edge.id.clone(),
                source: node_view(&by_id, &edge.source),
                target: node_view(&by_id, &edge.target),
                rules: rules(edge),
            });
        }

        Self {
            namespace: graph.namespace.clone(),
            generated_at: graph.generated_at,
            routes: groups.into_values().collect(),
        }
    }

    /// Group by its `<namespace>/<name>`
    pub fn group(&self, qualified: &str) -> Option<&RouteGroupView> {
        self.routes
            .iter()
            .find(|g| g.id.strip_prefix("virtualService:") == Some(qualified))
    }
}

fn group_for<'g>(
    groups: &'g mut BTreeMap<String, RouteGroupView>,
    qualified: &str,
) -> &'g mut RouteGroupView {
    groups.entry(qualified.to_string()).or_insert_with(|| {
        let (namespace, name) = qualified.split_once('/').unwrap_or(("", qualified));
        RouteGroupView {
            id: format!("virtualService:{}", qualified),
            label: name.to_string(),
            namespace: namespace.to_string(),
            hosts: Vec::new(),
            gateways: Vec::new(),
            edges: Vec::new(),
        }
    })
}

fn push_unique(items: &mut Vec<String>, item: &str) {
    if !items.iter().any(|i| i == item) {
        items.push(item.to_string());
    }
}

fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn string_property<'n>(node: &'n GraphNode, key: &str) -> Option<&'n str> {
    node.property(key).and_then(Value::as_str)
}

fn node_host(node: &GraphNode) -> String {
    string_property(node, "host")
        .unwrap_or(node.id.as_str())
        .to_string()
}

fn node_view(by_id: &HashMap<&str, &GraphNode>, id: &str) -> RouteNodeView {
    match by_id.get(id) {
        Some(node) => RouteNodeView {
            id: node.id.clone(),
            label: string_property(node, "name")
                .or_else(|| string_property(node, "host"))
                .unwrap_or(node.id.as_str())
                .to_string(),
            subtitle: string_property(node, "namespace").map(str::to_string),
            node_type: node.node_type,
        },
        None => RouteNodeView {
            id: id.to_string(),
            label: id.to_string(),
            subtitle: None,
            node_type: NodeType::Unknown,
        },
    }
}

/// One-line summaries of what an edge's route does
fn rules(edge: &GraphEdge) -> Vec<String> {
    let p = &edge.properties;
    let mut rules = Vec::new();

    if edge.kind == EdgeKind::ViaEgress {
        if let Some(via) = p.get("via").and_then(Value::as_str) {
            rules.push(format!("via egress {}", via));
        }
        let port_map = p.get("portMap");
        let from = port_map.and_then(|m| m.get("fromPort")).and_then(Value::as_u64);
        let to = port_map.and_then(|m| m.get("toPort")).and_then(Value::as_u64);
        match (from, to) {
            (Some(from), Some(to)) => rules.push(format!("port {} -> {}", from, to)),
            (Some(port), None) | (None, Some(port)) => rules.push(format!("port {}", port)),
            (None, None) => {}
        }
        return rules;
    }

    if let (Some(protocol), Some(index)) = (
        p.get("protocol").and_then(Value::as_str),
        p.get("routeIndex").and_then(Value::as_u64),
    ) {
        rules.push(format!("{} route {}", protocol, index));
    }
    let matches: Vec<MatchCondition> = p
        .get("matches")
        .and_then(|m| serde_json::from_value(m.clone()).ok())
        .unwrap_or_default();
    for m in matches {
        rules.push(format!("{} {} {}", m.field, m.kind, m.value));
    }
    if p.get("mirror").and_then(Value::as_bool) == Some(true) {
        match p.get("mirrorPercentage").and_then(Value::as_f64) {
            Some(percentage) => rules.push(format!("mirror {}%", percentage)),
            None => rules.push("mirror".to_string()),
        }
    } else if let Some(weight) = p.get("weight").and_then(Value::as_i64) {
        rules.push(format!("weight {}", weight));
    }
    if let Some(subset) = p.get("subset").and_then(Value::as_str) {
        rules.push(format!("subset {}", subset));
    }
    if let Some(port) = p.get("port").and_then(Value::as_u64) {
        rules.push(format!("port {}", port));
    }
    if let Some(mode) = p
        .get("trafficPolicy")
        .and_then(|policy| policy.get("tls"))
        .and_then(|tls| tls.get("mode"))
        .and_then(Value::as_str)
    {
        rules.push(format!("tls {}", mode));
    }
    for diagnostic in edge.diagnostics() {
        let severity = match diagnostic.severity {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        rules.push(format!("{} {}", severity, diagnostic.code));
    }
    rules
}
