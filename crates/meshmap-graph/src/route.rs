//! Route kinds
//!
//! HTTP, TCP and TLS routes differ in their match shape and in whether a
//! mirror destination exists. [`RouteKind`] wraps the three and exposes the
//! common `(matches, destinations)` view the builder walks.

use std::fmt;

use meshmap_common::mesh::DEFAULT_ROUTE_WEIGHT;
use meshmap_common::resources::{
    Destination, HttpMatchRequest, HttpRoute, Percent, RouteDestination, TcpRoute, TlsRoute,
    VirtualServiceSpec,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Protocol of a route block
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    /// `spec.http`
    Http,
    /// `spec.tcp`
    Tcp,
    /// `spec.tls`
    Tls,
}

impl Protocol {
    /// Tag used in edge ids and properties
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Tcp => "TCP",
            Protocol::Tls => "TLS",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flattened match condition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCondition {
    /// Matched attribute (`uri`, `headers.end-user`, `port`, `sniHosts`, ...)
    pub field: String,
    /// `exact`, `prefix` or `regex`
    pub kind: String,
    /// Matched value
    pub value: String,
}

impl MatchCondition {
    fn new(field: impl Into<String>, kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: kind.into(),
            value: value.into(),
        }
    }

    fn exact(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, "exact", value)
    }
}

/// A destination of a route, with its position and role
#[derive(Clone, Debug, PartialEq)]
pub struct RouteTarget<'a> {
    /// Index within the route's destination list (mirror comes last)
    pub index: usize,
    /// Destination reference, if declared
    pub destination: Option<&'a Destination>,
    /// Declared weight
    pub weight: Option<i64>,
    /// Whether this is the HTTP mirror destination
    pub mirror: bool,
    /// Mirror percentage, when declared
    pub mirror_percentage: Option<&'a Percent>,
    /// Raw destination object as declared
    pub raw: Value,
}

impl RouteTarget<'_> {
    /// Declared host, if non-blank
    pub fn host(&self) -> Option<&str> {
        self.destination
            .and_then(|d| d.host.as_deref())
            .filter(|h| !h.trim().is_empty())
    }

    /// Declared subset
    pub fn subset(&self) -> Option<&str> {
        self.destination.and_then(|d| d.subset.as_deref())
    }

    /// Declared port
    pub fn port(&self) -> Option<u32> {
        self.destination.and_then(|d| d.port_number())
    }

    /// Weight with the default applied
    pub fn effective_weight(&self) -> i64 {
        self.weight.unwrap_or(DEFAULT_ROUTE_WEIGHT)
    }
}

/// A route block of one protocol
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RouteKind<'a> {
    /// HTTP route
    Http(&'a HttpRoute),
    /// TCP route
    Tcp(&'a TcpRoute),
    /// TLS route
    Tls(&'a TlsRoute),
}

impl<'a> RouteKind<'a> {
    /// Protocol of the route
    pub fn protocol(&self) -> Protocol {
        match self {
            RouteKind::Http(_) => Protocol::Http,
            RouteKind::Tcp(_) => Protocol::Tcp,
            RouteKind::Tls(_) => Protocol::Tls,
        }
    }

    /// Destinations in declared order; for HTTP the mirror is appended last
    pub fn destinations(&self) -> Vec<RouteTarget<'a>> {
        let (route, mirror) = match *self {
            RouteKind::Http(r) => (
                r.route.as_slice(),
                r.mirror.as_ref().map(|m| (m, r.mirror_percentage.as_ref())),
            ),
            RouteKind::Tcp(r) => (r.route.as_slice(), None),
            RouteKind::Tls(r) => (r.route.as_slice(), None),
        };

        let mut targets: Vec<RouteTarget<'a>> = route
            .iter()
            .enumerate()
            .map(|(index, rd)| routed_target(index, rd))
            .collect();

        if let Some((mirror, percentage)) = mirror {
            targets.push(RouteTarget {
                index: targets.len(),
                destination: Some(mirror),
                weight: None,
                mirror: true,
                mirror_percentage: percentage,
                raw: json!({ "destination": mirror }),
            });
        }
        targets
    }

    /// Flattened match conditions of every match block
    pub fn matches(&self) -> Vec<MatchCondition> {
        let mut out = Vec::new();
        match self {
            RouteKind::Http(r) => {
                for m in &r.matches {
                    http_conditions(m, &mut out);
                }
            }
            RouteKind::Tcp(r) => {
                for m in &r.matches {
                    for subnet in &m.destination_subnets {
                        out.push(MatchCondition::exact("destinationSubnets", subnet));
                    }
                    for gateway in &m.gateways {
                        out.push(MatchCondition::exact("gateways", gateway));
                    }
                    if let Some(port) = m.port {
                        out.push(MatchCondition::exact("port", port.to_string()));
                    }
                }
            }
            RouteKind::Tls(r) => {
                for m in &r.matches {
                    for sni in &m.sni_hosts {
                        out.push(MatchCondition::exact("sniHosts", sni));
                    }
                    for subnet in &m.destination_subnets {
                        out.push(MatchCondition::exact("destinationSubnets", subnet));
                    }
                    for gateway in &m.gateways {
                        out.push(MatchCondition::exact("gateways", gateway));
                    }
                    if let Some(port) = m.port {
                        out.push(MatchCondition::exact("port", port.to_string()));
                    }
                }
            }
        }
        out
    }

    /// Gateways named by the route's match blocks, in order, deduplicated
    pub fn match_gateways(&self) -> Vec<&'a str> {
        let per_match: Vec<&'a [String]> = match *self {
            RouteKind::Http(r) => r.matches.iter().map(|m| m.gateways.as_slice()).collect(),
            RouteKind::Tcp(r) => r.matches.iter().map(|m| m.gateways.as_slice()).collect(),
            RouteKind::Tls(r) => r.matches.iter().map(|m| m.gateways.as_slice()).collect(),
        };
        let mut out: Vec<&'a str> = Vec::new();
        for gateway in per_match.into_iter().flatten() {
            if !out.contains(&gateway.as_str()) {
                out.push(gateway.as_str());
            }
        }
        out
    }

    /// The route object as declared
    pub fn raw(&self) -> Value {
        let value = match self {
            RouteKind::Http(r) => serde_json::to_value(r),
            RouteKind::Tcp(r) => serde_json::to_value(r),
            RouteKind::Tls(r) => serde_json::to_value(r),
        };
        value.unwrap_or(Value::Null)
    }
}

fn routed_target(index: usize, rd: &RouteDestination) -> RouteTarget<'_> {
    RouteTarget {
        index,
        destination: rd.destination.as_ref(),
        weight: rd.weight,
        mirror: false,
        mirror_percentage: None,
        raw: serde_json::to_value(rd).unwrap_or(Value::Null),
    }
}

fn http_conditions(m: &HttpMatchRequest, out: &mut Vec<MatchCondition>) {
    let string_matches = [
        ("uri", m.uri.as_ref()),
        ("scheme", m.scheme.as_ref()),
        ("method", m.method.as_ref()),
        ("authority", m.authority.as_ref()),
    ];
    for (field, sm) in string_matches {
        if let Some((kind, value)) = sm.and_then(|s| s.kind_and_value()) {
            out.push(MatchCondition::new(field, kind, value));
        }
    }
    for (name, sm) in &m.headers {
        if let Some((kind, value)) = sm.kind_and_value() {
            out.push(MatchCondition::new(format!("headers.{}", name), kind, value));
        }
    }
    for (name, sm) in &m.query_params {
        if let Some((kind, value)) = sm.kind_and_value() {
            out.push(MatchCondition::new(format!("queryParams.{}", name), kind, value));
        }
    }
    if let Some(port) = m.port {
        out.push(MatchCondition::exact("port", port.to_string()));
    }
    for gateway in &m.gateways {
        out.push(MatchCondition::exact("gateways", gateway));
    }
}

/// Every route of a VirtualService: HTTP, then TCP, then TLS, each in declared
/// order, paired with its index within its protocol block
pub fn routes_of(spec: &VirtualServiceSpec) -> impl Iterator<Item = (usize, RouteKind<'_>)> {
    let http = spec.http.iter().map(RouteKind::Http).enumerate();
    let tcp = spec.tcp.iter().map(RouteKind::Tcp).enumerate();
    let tls = spec.tls.iter().map(RouteKind::Tls).enumerate();
    http.chain(tcp).chain(tls)
}
