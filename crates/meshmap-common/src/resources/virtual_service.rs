//! VirtualService model

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::istio_resource;
use crate::mesh::NETWORKING_API_VERSION;

/// Istio VirtualService
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualService {
    /// API version
    #[serde(default = "VirtualService::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "VirtualService::default_kind")]
    pub kind: String,
    /// Metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Routing rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<VirtualServiceSpec>,
}

istio_resource!(VirtualService, NETWORKING_API_VERSION, "VirtualService");

/// VirtualService spec
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    /// Hosts the rules apply to
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Gateways (and `mesh`) the rules are bound to
    #[serde(default)]
    pub gateways: Vec<String>,
    /// HTTP routes
    #[serde(default)]
    pub http: Vec<HttpRoute>,
    /// Opaque TCP routes
    #[serde(default)]
    pub tcp: Vec<TcpRoute>,
    /// TLS passthrough routes
    #[serde(default)]
    pub tls: Vec<TlsRoute>,
    /// Namespaces this VirtualService is visible to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub export_to: Vec<String>,
}

/// One HTTP route rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// Route name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Match conditions; all must hold within one entry, entries are OR-ed
    #[serde(default, rename = "match", skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<HttpMatchRequest>,
    /// Weighted destinations
    #[serde(default)]
    pub route: Vec<RouteDestination>,
    /// Shadow traffic destination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<Destination>,
    /// Share of traffic mirrored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_percentage: Option<Percent>,
    /// Remaining fields (retries, timeout, rewrite, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// HTTP match conditions
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMatchRequest {
    /// Match name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// URI match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<StringMatch>,
    /// Scheme match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<StringMatch>,
    /// Method match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<StringMatch>,
    /// Authority match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<StringMatch>,
    /// Header matches
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, StringMatch>,
    /// Query parameter matches
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_params: BTreeMap<String, StringMatch>,
    /// Destination port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
    /// Gateways this match is restricted to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,
    /// Source workload labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_labels: BTreeMap<String, String>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Istio `StringMatch` (exactly one of exact/prefix/regex is expected)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringMatch {
    /// Exact match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<String>,
    /// Prefix match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// RE2 regex match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
}

impl StringMatch {
    /// The `(kind, value)` pair of the first populated match type
    pub fn kind_and_value(&self) -> Option<(&'static str, &str)> {
        if let Some(v) = &self.exact {
            return Some(("exact", v));
        }
        if let Some(v) = &self.prefix {
            return Some(("prefix", v));
        }
        self.regex.as_deref().map(|v| ("regex", v))
    }
}

/// Percentage wrapper used by `mirrorPercentage`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Percent {
    /// Percentage in `[0, 100]`
    #[serde(default)]
    pub value: f64,
}

/// A weighted destination of a route
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDestination {
    /// Target service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,
    /// Relative weight; absent means the whole route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    /// Remaining fields (headers, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RouteDestination {
    /// Declared destination host, if any
    pub fn host(&self) -> Option<&str> {
        self.destination.as_ref().and_then(|d| d.host.as_deref())
    }
}

/// Destination service reference
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Target host (short name or FQDN)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// DestinationRule subset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,
    /// Target port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSelector>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Destination {
    /// Port number, if selected
    pub fn port_number(&self) -> Option<u32> {
        self.port.as_ref().and_then(|p| p.number)
    }
}

/// Port selector of a destination
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSelector {
    /// Port number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
}

/// Opaque TCP route
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpRoute {
    /// L4 match conditions
    #[serde(default, rename = "match", skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<L4MatchAttributes>,
    /// Weighted destinations
    #[serde(default)]
    pub route: Vec<RouteDestination>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// L4 match conditions of a TCP route
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L4MatchAttributes {
    /// Destination CIDRs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destination_subnets: Vec<String>,
    /// Destination port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
    /// Source workload labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_labels: BTreeMap<String, String>,
    /// Gateways this match is restricted to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,
    /// Source namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_namespace: Option<String>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// TLS passthrough route
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsRoute {
    /// SNI match conditions
    #[serde(default, rename = "match", skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<TlsMatchAttributes>,
    /// Weighted destinations
    #[serde(default)]
    pub route: Vec<RouteDestination>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// SNI match conditions of a TLS route
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsMatchAttributes {
    /// SNI values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sni_hosts: Vec<String>,
    /// Destination CIDRs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destination_subnets: Vec<String>,
    /// Destination port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
    /// Gateways this match is restricted to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const REVIEWS: &str = r#"
apiVersion: networking.istio.io/v1beta1
kind: VirtualService
metadata:
  name: reviews
  namespace: bookinfo
spec:
  hosts: [reviews]
  http:
  - name: jason
    match:
    - headers:
        end-user:
          exact: jason
      uri:
        prefix: /api
    route:
    - destination: {host: reviews, subset: v2}
    mirror: {host: reviews, subset: v3}
    mirrorPercentage: {value: 25.0}
    retries: {attempts: 3}
  - route:
    - destination: {host: reviews, subset: v1, port: {number: 9080}}
      weight: 80
    - destination: {host: reviews, subset: v3}
      weight: 20
  tcp:
  - match: [{port: 27017}]
    route:
    - destination: {host: mongo}
"#;

    #[test]
    fn test_parse_virtual_service() {
        let vs: VirtualService = serde_yaml::from_str(REVIEWS).expect("parse");
        let spec = vs.spec.expect("spec");
        assert_eq!(spec.hosts, vec!["reviews"]);
        assert_eq!(spec.http.len(), 2);

        let first = &spec.http[0];
        assert_eq!(first.matches.len(), 1);
        let headers = &first.matches[0].headers;
        assert_eq!(
            headers["end-user"].kind_and_value(),
            Some(("exact", "jason"))
        );
        assert_eq!(
            first.mirror.as_ref().and_then(|m| m.subset.as_deref()),
            Some("v3")
        );
        assert_eq!(first.mirror_percentage.as_ref().map(|p| p.value), Some(25.0));
        assert!(first.extra.contains_key("retries"));

        let second = &spec.http[1];
        assert_eq!(second.route[0].weight, Some(80));
        assert_eq!(
            second.route[0].destination.as_ref().and_then(|d| d.port_number()),
            Some(9080)
        );
        assert_eq!(spec.tcp[0].matches[0].port, Some(27017));
        assert_eq!(spec.tcp[0].route[0].host(), Some("mongo"));
    }

    #[test]
    fn test_defaults_applied() {
        let vs: VirtualService =
            serde_yaml::from_str("metadata: {name: bare}").expect("parse");
        assert_eq!(vs.api_version, NETWORKING_API_VERSION);
        assert_eq!(vs.kind, "VirtualService");
        assert!(vs.spec.is_none());
    }

    #[test]
    fn test_extra_fields_survive_serialization() {
        let vs: VirtualService = serde_yaml::from_str(REVIEWS).expect("parse");
        let json = serde_json::to_value(&vs.spec.expect("spec").http[0]).expect("to json");
        assert_eq!(json["retries"]["attempts"], 3);
        assert_eq!(json["match"][0]["uri"]["prefix"], "/api");
    }

    #[test]
    fn test_string_match_precedence() {
        let m = StringMatch {
            exact: None,
            prefix: Some("/a".into()),
            regex: Some(".*".into()),
        };
        assert_eq!(m.kind_and_value(), Some(("prefix", "/a")));
        assert_eq!(StringMatch::default().kind_and_value(), None);
    }
}
