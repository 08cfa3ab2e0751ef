//! Graph builder
//!
//! One build is a single synchronous pass over an already materialized
//! snapshot. VirtualServices are walked first; the ServiceEntries,
//! WorkloadEntries and Gateways of the primary namespace follow, then
//! egress-gateway following, the optional container refinement, diagnostics
//! and assembly. Every index and
//! accumulator is created fresh per call, so builders can be shared freely
//! across threads.

use std::collections::{BTreeMap, HashSet};

use meshmap_common::mesh::MESH_GATEWAY;
use meshmap_common::resources::{ResourceMeta, VirtualServiceSpec};
use meshmap_common::{canonical_host, ResourceSnapshot};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::accumulator::{append_property, GraphAccumulator};
use crate::assembler;
use crate::containers;
use crate::diagnostics;
use crate::egress;
use crate::error::GraphError;
use crate::index::{DestinationRuleRecord, ExternalServiceRecord, Indexes};
use crate::model::{
    gateway_node_id, workload_entry_node_id, EdgeKind, GraphResponse, NodeType, Properties,
    ANNOTATIONS_KEY, MESH_NODE_ID, VIA_GATEWAY_ANNOTATION,
};
use crate::resolver::{NodeSpec, Resolution, ResolvedHost, WorkloadResolver};
use crate::route::{routes_of, RouteKind, RouteTarget};

/// Options of a graph build
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Refine the service-level graph with pod containers
    pub expand_containers: bool,
}

/// Builds [`GraphResponse`]s from resource snapshots
#[derive(Clone, Copy, Debug, Default)]
pub struct GraphBuilder {
    options: BuildOptions,
}

impl GraphBuilder {
    /// Create a builder
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    /// Options this builder applies
    pub fn options(&self) -> BuildOptions {
        self.options
    }

    /// Build the graph of a snapshot's primary namespace.
    ///
    /// Malformed resources become warnings on the result. An `Err` means the
    /// accumulated graph broke an internal invariant.
    pub fn build(&self, snapshot: &ResourceSnapshot) -> Result<GraphResponse, GraphError> {
        let indexes = Indexes::build(snapshot);
        let mut pass = BuildPass::new(snapshot, &indexes);

        pass.virtual_services();
        pass.service_entries();
        pass.workload_entries();
        pass.gateways();

        let mut acc = pass.acc;
        egress::follow(&mut acc, &pass.resolver, snapshot);
        if self.options.expand_containers {
            containers::expand(&mut acc, &pass.resolver, &snapshot.primary);
        }
        diagnostics::run(&mut acc);

        let response = assembler::assemble(snapshot, acc, self.options)?;
        info!(
            namespace = %response.namespace,
            nodes = response.summary.nodes,
            edges = response.summary.edges,
            warnings = response.warnings.len(),
            "Built mesh graph"
        );
        Ok(response)
    }
}

/// A VirtualService host acting as the source of its routes
struct RouteSource {
    node_id: String,
    host: String,
}

/// The VirtualService whose routes are being walked
struct VirtualServiceContext<'a> {
    namespace: &'a str,
    name: &'a str,
    qualified: String,
    spec: &'a VirtualServiceSpec,
}

/// Mutable state of one build
struct BuildPass<'a> {
    snapshot: &'a ResourceSnapshot,
    indexes: &'a Indexes,
    resolver: WorkloadResolver<'a>,
    acc: GraphAccumulator,
    /// Nodes whose DestinationRule subsets are already attached
    subset_nodes: HashSet<String>,
    /// `(namespace, name)` of referenced gateways with the binding VirtualService
    gateway_bindings: Vec<((String, String), String)>,
}

impl<'a> BuildPass<'a> {
    fn new(snapshot: &'a ResourceSnapshot, indexes: &'a Indexes) -> Self {
        Self {
            snapshot,
            indexes,
            resolver: WorkloadResolver::new(indexes, snapshot),
            acc: GraphAccumulator::new(),
            subset_nodes: HashSet::new(),
            gateway_bindings: Vec::new(),
        }
    }

    // =========================================================================
    // VirtualServices
    // =========================================================================

    fn virtual_services(&mut self) {
        let snapshot = self.snapshot;
        let primary = &snapshot.primary;
        for vs in &primary.virtual_services {
            let qualified = vs.qualified_name(&primary.namespace);
            let Some(spec) = vs.spec.as_ref() else {
                self.acc
                    .warn(&qualified, format!("VirtualService {} missing spec", qualified));
                continue;
            };
            debug!(virtual_service = %qualified, "Processing VirtualService");

            let ctx = VirtualServiceContext {
                namespace: vs.namespace_or(&primary.namespace),
                name: vs.name(),
                qualified,
                spec,
            };
            let sources = self.sources(&ctx);
            for gateway in &spec.gateways {
                self.bind_gateway(&ctx, gateway);
            }
            for (route_index, route) in routes_of(spec) {
                self.route(&ctx, &sources, route_index, route);
            }
        }
    }

    /// Source nodes of a VirtualService: one per distinct host, or the mesh
    fn sources(&mut self, ctx: &VirtualServiceContext<'a>) -> Vec<RouteSource> {
        let mut sources: Vec<RouteSource> = Vec::new();
        for raw in ctx.spec.hosts.iter().filter(|h| !h.trim().is_empty()) {
            let resolved = self.resolver.resolve(raw, ctx.namespace);
            let node_id = self.acc.upsert_node(resolved.source_node());
            if sources.iter().any(|s| s.node_id == node_id) {
                continue;
            }
            self.acc
                .append_node_property(&node_id, "virtualServices", json!(ctx.qualified), true);
            sources.push(RouteSource {
                node_id,
                host: resolved.host(),
            });
        }

        if sources.is_empty() {
            self.acc.warn(
                &ctx.qualified,
                format!(
                    "VirtualService {} has no hosts; routes are attributed to the mesh",
                    ctx.qualified
                ),
            );
            let node_id = self.acc.upsert_node(NodeSpec {
                id: MESH_NODE_ID.to_string(),
                node_type: NodeType::Mesh,
                properties: Properties::new(),
            });
            self.acc
                .append_node_property(&node_id, "virtualServices", json!(ctx.qualified), true);
            sources.push(RouteSource {
                node_id,
                host: MESH_NODE_ID.to_string(),
            });
        }
        sources
    }

    fn route(
        &mut self,
        ctx: &VirtualServiceContext<'a>,
        sources: &[RouteSource],
        route_index: usize,
        route: RouteKind<'a>,
    ) {
        let protocol = route.protocol();
        let targets = route.destinations();
        if targets.is_empty() {
            self.acc.warn(
                &ctx.qualified,
                format!(
                    "VirtualService {} {} route {} has no destinations",
                    ctx.qualified, protocol, route_index
                ),
            );
            return;
        }

        let gateways = self.route_gateways(ctx, &route);
        let via_gateway = gateways.iter().any(|g| g != MESH_GATEWAY);
        let matches = route.matches();
        let raw_route = route.raw();

        for target in &targets {
            let Some(host) = target.host() else {
                self.acc.warn(
                    &ctx.qualified,
                    format!(
                        "VirtualService {} {} route {} destination {} missing host",
                        ctx.qualified, protocol, route_index, target.index
                    ),
                );
                continue;
            };

            let resolved = self.resolver.resolve(host, ctx.namespace);
            let target_id = self.acc.upsert_node(resolved.destination_node());
            self.acc.append_node_property(
                &target_id,
                "references",
                json!({
                    "kind": "VirtualService",
                    "name": ctx.name,
                    "namespace": ctx.namespace,
                    "destination": target.raw,
                }),
                false,
            );
            self.attach_subsets(&target_id, host, ctx.namespace, &resolved);

            let mut properties = Properties::new();
            properties.insert("protocol".to_string(), json!(protocol));
            properties.insert("virtualService".to_string(), json!(ctx.qualified));
            properties.insert("routeIndex".to_string(), json!(route_index));
            properties.insert("destinationIndex".to_string(), json!(target.index));
            properties.insert("destinationHost".to_string(), json!(resolved.host()));
            properties.insert("route".to_string(), raw_route.clone());
            properties.insert("destination".to_string(), target.raw.clone());
            properties.insert("matches".to_string(), json!(matches));
            self.target_properties(&mut properties, host, ctx.namespace, target, &resolved);

            if !gateways.is_empty() {
                properties.insert("gateways".to_string(), json!(gateways));
            }
            if via_gateway {
                properties.insert("viaGateway".to_string(), json!(true));
                append_property(
                    &mut properties,
                    ANNOTATIONS_KEY,
                    json!(VIA_GATEWAY_ANNOTATION),
                    true,
                );
            }
            for filter in self.envoy_filters_for(&resolved) {
                append_property(
                    &mut properties,
                    ANNOTATIONS_KEY,
                    json!(format!("envoyfilter:{}", filter)),
                    true,
                );
            }

            for source in sources {
                let mut edge_properties = properties.clone();
                edge_properties.insert("sourceHost".to_string(), json!(source.host));
                let id = format!(
                    "traffic:{}:{}:{}:{}:{}->{}",
                    protocol,
                    ctx.qualified,
                    route_index,
                    target.index,
                    source.host,
                    resolved.host()
                );
                self.acc.add_edge(
                    EdgeKind::Traffic,
                    id,
                    &source.node_id,
                    &target_id,
                    edge_properties,
                );
            }
        }
    }

    /// Weight, subset, port, mirror and traffic-policy properties of one destination
    fn target_properties(
        &self,
        properties: &mut Properties,
        raw_host: &str,
        namespace: &str,
        target: &RouteTarget<'_>,
        resolved: &ResolvedHost<'_>,
    ) {
        properties.insert("weight".to_string(), json!(target.effective_weight()));
        properties.insert("mirror".to_string(), json!(target.mirror));
        if let Some(percentage) = target.mirror_percentage {
            properties.insert("mirrorPercentage".to_string(), json!(percentage.value));
        }
        if let Some(subset) = target.subset() {
            properties.insert("subset".to_string(), json!(subset));
        }
        if let Some(port) = target.port() {
            properties.insert("port".to_string(), json!(port));
        }

        // Rules are keyed by the spelling their own namespace canonicalizes
        // to, which for cross-namespace hosts is not the Service FQDN.
        let rules = &self.indexes.destination_rules;
        let found = rules
            .find_traffic_policy(raw_host, namespace, target.subset())
            .or_else(|| rules.find_traffic_policy(&resolved.host(), namespace, target.subset()));
        if let Some(found) = found {
            properties.insert("trafficPolicy".to_string(), json!(found.policy));
            properties.insert("trafficPolicySource".to_string(), found.source());
        }
    }

    /// Effective gateways of a route: its match-level gateways, else the
    /// VirtualService's, qualified as `<namespace>/<name>`
    fn route_gateways(
        &mut self,
        ctx: &VirtualServiceContext<'a>,
        route: &RouteKind<'a>,
    ) -> Vec<String> {
        let declared: Vec<&str> = {
            let from_matches = route.match_gateways();
            if from_matches.is_empty() {
                ctx.spec.gateways.iter().map(String::as_str).collect()
            } else {
                from_matches
            }
        };

        let mut qualified: Vec<String> = Vec::new();
        for gateway in declared {
            if let Some(q) = self.bind_gateway(ctx, gateway) {
                if !qualified.contains(&q) {
                    qualified.push(q);
                }
            }
        }
        qualified
    }

    /// Record that the VirtualService binds `gateway`; returns its qualified name
    fn bind_gateway(&mut self, ctx: &VirtualServiceContext<'a>, gateway: &str) -> Option<String> {
        let gateway = gateway.trim();
        if gateway.is_empty() {
            return None;
        }
        if gateway == MESH_GATEWAY {
            return Some(MESH_GATEWAY.to_string());
        }
        let (namespace, name) = gateway
            .split_once('/')
            .unwrap_or((ctx.namespace, gateway));
        let key = (namespace.to_string(), name.to_string());
        let binding = (key, ctx.qualified.clone());
        if !self.gateway_bindings.contains(&binding) {
            self.gateway_bindings.push(binding);
        }
        Some(format!("{}/{}", namespace, name))
    }

    /// Names of primary-namespace EnvoyFilters applying to the resolved target
    fn envoy_filters_for(&self, resolved: &ResolvedHost<'_>) -> Vec<&'a str> {
        let no_selector = BTreeMap::new();
        let selector = match resolved.resolution {
            Resolution::Service(record) => &record.selector,
            _ => &no_selector,
        };
        let snapshot: &'a ResourceSnapshot = self.snapshot;
        snapshot
            .primary
            .envoy_filters
            .iter()
            .filter(|filter| filter.applies_to(selector))
            .map(|filter| filter.name())
            .collect()
    }

    /// Attach the DestinationRule subsets of a destination node, once per node.
    ///
    /// Rules keyed by the reference's own spelling come before rules keyed by
    /// the resolved host.
    fn attach_subsets(
        &mut self,
        node_id: &str,
        raw_host: &str,
        namespace: &str,
        resolved: &ResolvedHost<'a>,
    ) {
        if !self.subset_nodes.insert(node_id.to_string()) {
            return;
        }
        let indexes: &'a Indexes = self.indexes;
        let index = &indexes.destination_rules;
        let mut rules: Vec<&'a DestinationRuleRecord> = Vec::new();
        let spellings = [canonical_host(raw_host, namespace), resolved.host()];
        for rule in spellings.iter().flat_map(|host| index.rules_for(host)) {
            if !rules.iter().any(|r| std::ptr::eq(*r, rule)) {
                rules.push(rule);
            }
        }
        if rules.is_empty() {
            return;
        }

        let (service_selector, workload_namespace) = match resolved.resolution {
            Resolution::Service(record) => (record.selector.clone(), record.namespace.as_str()),
            Resolution::External(record) => (BTreeMap::new(), record.namespace.as_str()),
            Resolution::Mesh | Resolution::Unresolved => (BTreeMap::new(), namespace),
        };

        let mut subsets = Map::new();
        for rule in rules {
            self.acc.append_node_property(
                node_id,
                "destinationRules",
                json!(rule.qualified_name()),
                true,
            );
            for subset in rule.subsets() {
                let Some(name) = subset.name.as_deref() else {
                    continue;
                };
                if subsets.contains_key(name) {
                    continue;
                }
                let mut selector = service_selector.clone();
                selector.extend(subset.labels.clone());

                let mut endpoints: Vec<String> = self
                    .resolver
                    .pods_selected_by(workload_namespace, &selector)
                    .iter()
                    .map(|pod| pod.name().to_string())
                    .collect();
                endpoints.extend(
                    self.resolver
                        .workload_entries_selected_by(workload_namespace, &selector)
                        .iter()
                        .map(|entry| entry.name().to_string()),
                );

                subsets.insert(
                    name.to_string(),
                    json!({
                        "labels": subset.labels,
                        "endpoints": endpoints,
                        "destinationRule": rule.qualified_name(),
                    }),
                );
            }
        }

        if !subsets.is_empty() {
            if let Some(node) = self.acc.node_mut(node_id) {
                node.properties
                    .entry("subsets".to_string())
                    .or_insert(Value::Object(subsets));
            }
        }
    }

    // =========================================================================
    // ServiceEntries, WorkloadEntries and Gateways
    // =========================================================================

    fn service_entries(&mut self) {
        let snapshot = self.snapshot;
        let primary = &snapshot.primary;
        for entry in &primary.service_entries {
            let qualified = entry.qualified_name(&primary.namespace);
            if entry.spec.is_none() {
                self.acc
                    .warn(&qualified, format!("ServiceEntry {} missing spec", qualified));
                continue;
            }
            debug!(service_entry = %qualified, "Processing ServiceEntry");

            let record = ExternalServiceRecord::from_service_entry(entry, &primary.namespace);
            let entry_id = self.acc.upsert_node(NodeSpec {
                id: record.node_id(),
                node_type: NodeType::ServiceEntry,
                properties: record.entry_properties(),
            });

            for host in &record.hosts {
                let resolved = self.resolver.resolve(host, &record.namespace);
                let host_id = self.acc.upsert_node(resolved.destination_node());

                let mut properties = Properties::new();
                properties.insert("serviceEntry".to_string(), json!(qualified));
                properties.insert("host".to_string(), json!(host));
                self.acc.add_edge(
                    EdgeKind::ServiceEntryHost,
                    format!("serviceEntryHost:{}->{}", qualified, host),
                    &entry_id,
                    &host_id,
                    properties,
                );
            }
        }
    }

    fn workload_entries(&mut self) {
        let snapshot = self.snapshot;
        let primary = &snapshot.primary;
        for entry in &primary.workload_entries {
            let qualified = entry.qualified_name(&primary.namespace);
            let Some(spec) = entry.spec.as_ref() else {
                self.acc
                    .warn(&qualified, format!("WorkloadEntry {} missing spec", qualified));
                continue;
            };
            let namespace = entry.namespace_or(&primary.namespace);

            let mut properties = Properties::new();
            properties.insert("name".to_string(), json!(entry.name()));
            properties.insert("namespace".to_string(), json!(namespace));
            properties.insert("labels".to_string(), json!(spec.labels));
            properties.insert("ports".to_string(), json!(spec.ports));
            let optional = [
                ("address", spec.address.as_ref().map(|v| json!(v))),
                ("network", spec.network.as_ref().map(|v| json!(v))),
                ("serviceAccount", spec.service_account.as_ref().map(|v| json!(v))),
                ("locality", spec.locality.as_ref().map(|v| json!(v))),
                ("weight", spec.weight.map(|v| json!(v))),
            ];
            for (key, value) in optional {
                if let Some(value) = value {
                    properties.insert(key.to_string(), value);
                }
            }

            self.acc.upsert_node(NodeSpec {
                id: workload_entry_node_id(namespace, entry.name()),
                node_type: NodeType::WorkloadEntry,
                properties,
            });
        }
    }

    /// Gateway resources first, then placeholders for referenced gateways the
    /// snapshot does not contain
    fn gateways(&mut self) {
        let snapshot = self.snapshot;
        let primary = &snapshot.primary;
        for gateway in &primary.gateways {
            let qualified = gateway.qualified_name(&primary.namespace);
            let Some(spec) = gateway.spec.as_ref() else {
                self.acc
                    .warn(&qualified, format!("Gateway {} missing spec", qualified));
                continue;
            };
            let namespace = gateway.namespace_or(&primary.namespace);

            let mut hosts: Vec<&str> = Vec::new();
            for host in spec.servers.iter().flat_map(|s| s.hosts.iter()) {
                if !hosts.contains(&host.as_str()) {
                    hosts.push(host);
                }
            }
            let ports: Vec<u32> = spec
                .servers
                .iter()
                .filter_map(|s| s.port.as_ref().and_then(|p| p.number))
                .collect();

            let mut properties = Properties::new();
            properties.insert("name".to_string(), json!(gateway.name()));
            properties.insert("namespace".to_string(), json!(namespace));
            properties.insert("selector".to_string(), json!(spec.selector));
            properties.insert("hosts".to_string(), json!(hosts));
            properties.insert("ports".to_string(), json!(ports));

            self.acc.upsert_node(NodeSpec {
                id: gateway_node_id(namespace, gateway.name()),
                node_type: NodeType::Gateway,
                properties,
            });
        }

        for ((namespace, name), virtual_service) in std::mem::take(&mut self.gateway_bindings) {
            let mut properties = Properties::new();
            properties.insert("name".to_string(), json!(name));
            properties.insert("namespace".to_string(), json!(namespace));
            let id = self.acc.upsert_node(NodeSpec {
                id: gateway_node_id(&namespace, &name),
                node_type: NodeType::Unknown,
                properties,
            });
            self.acc
                .append_node_property(&id, "virtualServices", json!(virtual_service), true);
        }
    }
}
