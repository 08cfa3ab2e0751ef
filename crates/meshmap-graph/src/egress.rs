//! Egress-gateway following
//!
//! A traffic edge whose destination is an egress gateway is followed to the
//! hosts the gateway forwards to. Onward routes are the routes bound to an
//! egress gateway, plus every route declared in the control-plane namespace.
//! Routes whose VirtualService shares a host with the origin edge's source
//! are preferred; without any, every onward route applies. When nothing is
//! routed onward, the ServiceEntry declaring the origin's source host stands
//! in for the hop.
//!
//! Each hop becomes an `egressRoute` edge leaving the gateway node. Each
//! origin edge also gets a `viaEgress` composite from its source straight to
//! the external host, naming the gateway in `via` and the ports on both sides
//! in `portMap`.

use std::collections::HashSet;

use meshmap_common::mesh::{EGRESS_GATEWAY_FRAGMENTS, ISTIO_SYSTEM_NAMESPACE};
use meshmap_common::resources::ResourceMeta;
use meshmap_common::{canonical_host, ResourceSnapshot};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::accumulator::{append_property, GraphAccumulator};
use crate::model::{EdgeKind, Properties, ANNOTATIONS_KEY, VIA_EGRESS_ANNOTATION};
use crate::resolver::{Resolution, WorkloadResolver};
use crate::route::{routes_of, Protocol};

/// Whether a host or gateway name looks like an egress gateway
pub fn is_egress_gateway(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    EGRESS_GATEWAY_FRAGMENTS
        .iter()
        .any(|fragment| name.contains(fragment))
}

/// A route leaving an egress gateway
#[derive(Clone, Debug, PartialEq)]
pub struct EgressRoute {
    /// `<namespace>/<name>` of the declaring VirtualService
    pub virtual_service: String,
    /// Namespace the VirtualService was declared in
    pub namespace: String,
    /// Canonical hosts of the VirtualService
    pub hosts: Vec<String>,
    /// Protocol of the route block
    pub protocol: Protocol,
    /// Index of the route within its protocol block
    pub route_index: usize,
    /// Index of the destination within the route
    pub destination_index: usize,
    /// Destination host as declared
    pub host: String,
    /// Destination port, when declared
    pub port: Option<u32>,
}

/// Onward routes of every namespace in the snapshot, in listing order.
///
/// Destinations without a dot, or that are themselves egress gateways, are
/// skipped.
pub fn egress_routes(snapshot: &ResourceSnapshot) -> Vec<EgressRoute> {
    let mut out = Vec::new();
    for resources in snapshot.all_namespaces() {
        for vs in &resources.virtual_services {
            let Some(spec) = vs.spec.as_ref() else {
                continue;
            };
            let namespace = vs.namespace_or(&resources.namespace);
            let control_plane = namespace == ISTIO_SYSTEM_NAMESPACE;
            let hosts: Vec<String> = spec
                .hosts
                .iter()
                .map(|h| canonical_host(h, namespace))
                .collect();

            for (route_index, route) in routes_of(spec) {
                let from_matches = route.match_gateways();
                let bound = if from_matches.is_empty() {
                    spec.gateways.iter().any(|g| is_egress_gateway(g))
                } else {
                    from_matches.iter().any(|g| is_egress_gateway(g))
                };
                if !bound && !control_plane {
                    continue;
                }
                for target in route.destinations() {
                    let Some(host) = target.host() else {
                        continue;
                    };
                    if !host.contains('.') || is_egress_gateway(host) {
                        continue;
                    }
                    out.push(EgressRoute {
                        virtual_service: vs.qualified_name(&resources.namespace),
                        namespace: namespace.to_string(),
                        hosts: hosts.clone(),
                        protocol: route.protocol(),
                        route_index,
                        destination_index: target.index,
                        host: host.to_string(),
                        port: target.port(),
                    });
                }
            }
        }
    }
    out
}

/// A traffic edge entering an egress gateway
struct Origin {
    edge_id: String,
    source: String,
    gateway: String,
    gateway_host: String,
    source_host: String,
    virtual_service: Option<String>,
    protocol: Option<String>,
    port: Option<u64>,
}

/// The hop taken out of the gateway for one origin
struct Hop {
    target: String,
    host: String,
    port: Option<u32>,
    provenance: (&'static str, String),
}

fn origins(acc: &GraphAccumulator) -> Vec<Origin> {
    let string = |value: Option<&Value>| value.and_then(Value::as_str).map(str::to_string);
    acc.edges()
        .iter()
        .filter(|e| e.kind == EdgeKind::Traffic)
        .filter_map(|edge| {
            let gateway_host = string(edge.property("destinationHost"))?;
            if !is_egress_gateway(&gateway_host) {
                return None;
            }
            Some(Origin {
                edge_id: edge.id.clone(),
                source: edge.source.clone(),
                gateway: edge.target.clone(),
                gateway_host,
                source_host: string(edge.property("sourceHost")).unwrap_or_default(),
                virtual_service: string(edge.property("virtualService")),
                protocol: string(edge.property("protocol")),
                port: edge.property("port").and_then(|p| p.as_u64()),
            })
        })
        .collect()
}

/// Follow every traffic edge entering an egress gateway
pub fn follow(
    acc: &mut GraphAccumulator,
    resolver: &WorkloadResolver<'_>,
    snapshot: &ResourceSnapshot,
) {
    let origins = origins(acc);
    if origins.is_empty() {
        return;
    }
    let routes = egress_routes(snapshot);
    let mut added: HashSet<String> = HashSet::new();

    for origin in &origins {
        if let Some(node) = acc.node_mut(&origin.gateway) {
            node.properties
                .insert("egressGateway".to_string(), json!(true));
        }

        let matching: Vec<&EgressRoute> = routes
            .iter()
            .filter(|r| r.hosts.contains(&origin.source_host))
            .collect();
        let onward: Vec<&EgressRoute> = if matching.is_empty() {
            routes.iter().collect()
        } else {
            matching
        };

        let mut hops = Vec::new();
        for route in onward {
            let resolved = resolver.resolve(&route.host, &route.namespace);
            if matches!(resolved.resolution, Resolution::Service(_) | Resolution::Mesh) {
                continue;
            }
            let target = acc.upsert_node(resolved.destination_node());
            let hop = Hop {
                target,
                host: resolved.host(),
                port: route.port,
                provenance: ("egressVirtualService", route.virtual_service.clone()),
            };
            let id = format!(
                "egressRoute:{}:{}:{}:{}:{}->{}",
                route.protocol,
                route.virtual_service,
                route.route_index,
                route.destination_index,
                origin.gateway_host,
                hop.host
            );
            if added.insert(id.clone()) {
                let mut properties = hop_properties(&hop, &origin.gateway_host);
                properties.insert("protocol".to_string(), json!(route.protocol));
                properties.insert("routeIndex".to_string(), json!(route.route_index));
                properties.insert(
                    "destinationIndex".to_string(),
                    json!(route.destination_index),
                );
                append_property(
                    &mut properties,
                    ANNOTATIONS_KEY,
                    json!(format!("egress-virtualservice:{}", route.virtual_service)),
                    true,
                );
                acc.add_edge(EdgeKind::EgressRoute, id, &origin.gateway, &hop.target, properties);
            }
            hops.push(hop);
        }

        if hops.is_empty() {
            if let Some(hop) = service_entry_hop(acc, resolver, snapshot, origin) {
                let id = format!(
                    "egressRoute:{}:{}->{}",
                    hop.provenance.1, origin.gateway_host, hop.host
                );
                if added.insert(id.clone()) {
                    let mut properties = hop_properties(&hop, &origin.gateway_host);
                    append_property(
                        &mut properties,
                        ANNOTATIONS_KEY,
                        json!(format!("serviceentry:{}", hop.provenance.1)),
                        true,
                    );
                    acc.add_edge(EdgeKind::EgressRoute, id, &origin.gateway, &hop.target, properties);
                }
                hops.push(hop);
            }
        }

        if hops.is_empty() {
            debug!(edge = %origin.edge_id, "No onward route out of egress gateway");
        }
        for hop in &hops {
            let id = format!("viaEgress:{}->{}", origin.edge_id, hop.host);
            if !added.insert(id.clone()) {
                continue;
            }
            acc.add_edge(
                EdgeKind::ViaEgress,
                id,
                &origin.source,
                &hop.target,
                composite_properties(origin, hop),
            );
        }
    }
}

/// Hop backed by the ServiceEntry declaring the origin's source host
fn service_entry_hop(
    acc: &mut GraphAccumulator,
    resolver: &WorkloadResolver<'_>,
    snapshot: &ResourceSnapshot,
    origin: &Origin,
) -> Option<Hop> {
    let resolved = resolver.resolve(&origin.source_host, snapshot.namespace());
    let Resolution::External(record) = resolved.resolution else {
        return None;
    };
    let target = acc.upsert_node(resolved.destination_node());
    Some(Hop {
        target,
        host: resolved.host(),
        port: None,
        provenance: ("serviceEntry", record.qualified_name()),
    })
}

fn hop_properties(hop: &Hop, gateway_host: &str) -> Properties {
    let mut properties = Properties::new();
    properties.insert("sourceHost".to_string(), json!(gateway_host));
    properties.insert("destinationHost".to_string(), json!(hop.host));
    properties.insert(hop.provenance.0.to_string(), json!(hop.provenance.1));
    if let Some(port) = hop.port {
        properties.insert("port".to_string(), json!(port));
    }
    properties
}

fn composite_properties(origin: &Origin, hop: &Hop) -> Properties {
    let mut port_map = Map::new();
    if let Some(port) = origin.port {
        port_map.insert("fromPort".to_string(), json!(port));
    }
    if let Some(port) = hop.port {
        port_map.insert("toPort".to_string(), json!(port));
    }

    let mut properties = Properties::new();
    properties.insert("via".to_string(), json!(origin.gateway));
    properties.insert("trafficEdge".to_string(), json!(origin.edge_id));
    properties.insert("sourceHost".to_string(), json!(origin.source_host));
    properties.insert("destinationHost".to_string(), json!(hop.host));
    properties.insert("portMap".to_string(), port_map.into());
    properties.insert(hop.provenance.0.to_string(), json!(hop.provenance.1));
    if let Some(protocol) = &origin.protocol {
        properties.insert("protocol".to_string(), json!(protocol));
    }
    if let Some(virtual_service) = &origin.virtual_service {
        properties.insert("virtualService".to_string(), json!(virtual_service));
    }
    append_property(
        &mut properties,
        ANNOTATIONS_KEY,
        json!(VIA_EGRESS_ANNOTATION),
        true,
    );
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuildOptions, GraphBuilder};
    use crate::model::GraphResponse;

    fn build(yaml: &str) -> GraphResponse {
        let snapshot = ResourceSnapshot::from_manifests("demo", yaml).expect("fixture");
        GraphBuilder::new(BuildOptions::default())
            .build(&snapshot)
            .expect("build")
    }

    const EGRESS_SERVICE: &str = r#"
apiVersion: v1
kind: Service
metadata: {name: istio-egressgateway, namespace: istio-system}
spec:
  selector: {istio: egressgateway}
  ports: [{name: http, port: 80}, {name: tls, port: 443}]
"#;

    const GATEWAY_HOST: &str = "istio-egressgateway.istio-system.svc.cluster.local";

    #[test]
    fn test_egress_gateway_names() {
        assert!(is_egress_gateway(GATEWAY_HOST));
        assert!(is_egress_gateway("istio-system/Egress-Gateway"));
        assert!(!is_egress_gateway("istio-ingressgateway"));
        assert!(!is_egress_gateway("mesh"));
    }

    #[test]
    fn story_route_through_egress_gateway_reaches_external_host() {
        let yaml = format!(
            "{EGRESS_SERVICE}---\n{}",
            r#"
apiVersion: networking.istio.io/v1beta1
kind: ServiceEntry
metadata: {name: cnn, namespace: demo}
spec:
  hosts: [edition.cnn.com]
  ports: [{number: 80, name: http, protocol: HTTP}]
  resolution: DNS
---
apiVersion: networking.istio.io/v1beta1
kind: VirtualService
metadata: {name: cnn-through-egress, namespace: demo}
spec:
  hosts: [edition.cnn.com]
  gateways: [istio-egressgateway, mesh]
  http:
  - match:
    - gateways: [mesh]
      port: 80
    route:
    - destination:
        host: istio-egressgateway.istio-system.svc.cluster.local
        port: {number: 80}
  - match:
    - gateways: [istio-egressgateway]
      port: 80
    route:
    - destination:
        host: edition.cnn.com
        port: {number: 8080}
"#
        );
        let graph = build(&yaml);

        let gateway = graph.node(&format!("host:{GATEWAY_HOST}")).expect("gateway");
        assert_eq!(gateway.properties["egressGateway"], true);

        let hops: Vec<_> = graph.edges_of_kind(EdgeKind::EgressRoute).collect();
        assert_eq!(hops.len(), 1);
        assert_eq!(
            hops[0].id,
            format!("egressRoute:HTTP:demo/cnn-through-egress:1:0:{GATEWAY_HOST}->edition.cnn.com")
        );
        assert_eq!(hops[0].source, format!("host:{GATEWAY_HOST}"));
        assert_eq!(hops[0].target, "external:edition.cnn.com");
        assert_eq!(
            hops[0].annotations(),
            vec!["egress-virtualservice:demo/cnn-through-egress".to_string()]
        );

        let composites: Vec<_> = graph.edges_of_kind(EdgeKind::ViaEgress).collect();
        assert_eq!(composites.len(), 1);
        let composite = composites[0];
        assert_eq!(composite.source, "external:edition.cnn.com");
        assert_eq!(composite.target, "external:edition.cnn.com");
        assert_eq!(composite.properties["via"], format!("host:{GATEWAY_HOST}"));
        assert_eq!(
            composite.properties["portMap"],
            json!({"fromPort": 80, "toPort": 8080})
        );
        assert_eq!(composite.properties["virtualService"], "demo/cnn-through-egress");
        assert_eq!(composite.annotations(), vec![VIA_EGRESS_ANNOTATION.to_string()]);
        let origin = composite.properties["trafficEdge"].as_str().expect("origin id");
        assert_eq!(graph.edge(origin).expect("origin edge").kind, EdgeKind::Traffic);
    }

    #[test]
    fn story_service_entry_stands_in_for_missing_onward_route() {
        let yaml = format!(
            "{EGRESS_SERVICE}---\n{}",
            r#"
apiVersion: networking.istio.io/v1beta1
kind: ServiceEntry
metadata: {name: api, namespace: demo}
spec:
  hosts: [api.example.com]
  ports: [{number: 443, name: tls, protocol: TLS}]
---
apiVersion: networking.istio.io/v1beta1
kind: VirtualService
metadata: {name: api, namespace: demo}
spec:
  hosts: [api.example.com]
  tls:
  - match:
    - sniHosts: [api.example.com]
    route:
    - destination:
        host: istio-egressgateway.istio-system.svc.cluster.local
        port: {number: 443}
"#
        );
        let graph = build(&yaml);

        let hop = graph
            .edges_of_kind(EdgeKind::EgressRoute)
            .next()
            .expect("hop");
        assert_eq!(hop.properties["serviceEntry"], "demo/api");
        assert_eq!(hop.annotations(), vec!["serviceentry:demo/api".to_string()]);

        let composite = graph
            .edges_of_kind(EdgeKind::ViaEgress)
            .next()
            .expect("composite");
        assert_eq!(composite.target, "external:api.example.com");
        assert_eq!(composite.properties["portMap"], json!({"fromPort": 443}));
        assert_eq!(composite.properties["protocol"], "TLS");
    }

    #[test]
    fn test_no_egress_edges_without_egress_traffic() {
        let graph = build(
            r#"
apiVersion: networking.istio.io/v1beta1
kind: VirtualService
metadata: {name: vs, namespace: demo}
spec:
  hosts: [frontend]
  gateways: [istio-egressgateway]
  http:
  - route:
    - destination: {host: api.example.com}
"#,
        );
        assert_eq!(graph.edges_of_kind(EdgeKind::EgressRoute).count(), 0);
        assert_eq!(graph.edges_of_kind(EdgeKind::ViaEgress).count(), 0);
    }

    #[test]
    fn test_control_plane_routes_are_onward_routes() {
        let snapshot = ResourceSnapshot::from_manifests(
            "demo",
            r#"
apiVersion: networking.istio.io/v1beta1
kind: VirtualService
metadata: {name: egress-out, namespace: istio-system}
spec:
  hosts: [httpbin.org]
  http:
  - route:
    - destination: {host: istio-egressgateway.istio-system.svc.cluster.local}
    - destination: {host: httpbin.org, port: {number: 80}}
    - destination: {host: local}
"#,
        )
        .expect("fixture");
        let routes = egress_routes(&snapshot);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].virtual_service, "istio-system/egress-out");
        assert_eq!(routes[0].destination_index, 1);
        assert_eq!(routes[0].hosts, vec!["httpbin.org".to_string()]);
        assert_eq!(routes[0].port, Some(80));
    }
}
