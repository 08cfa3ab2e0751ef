//! DestinationRule model

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{istio_resource, WorkloadSelector};
use crate::mesh::NETWORKING_API_VERSION;

/// Istio DestinationRule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRule {
    /// API version
    #[serde(default = "DestinationRule::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "DestinationRule::default_kind")]
    pub kind: String,
    /// Metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Policy spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<DestinationRuleSpec>,
}

istio_resource!(DestinationRule, NETWORKING_API_VERSION, "DestinationRule");

impl DestinationRule {
    /// Declared host, if any
    pub fn host(&self) -> Option<&str> {
        self.spec.as_ref().and_then(|s| s.host.as_deref())
    }

    /// Look up a subset by name
    pub fn subset(&self, name: &str) -> Option<&Subset> {
        self.spec
            .as_ref()?
            .subsets
            .iter()
            .find(|s| s.name.as_deref() == Some(name))
    }
}

/// DestinationRule spec
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRuleSpec {
    /// Host the rule applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Policy for all traffic to the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_policy: Option<TrafficPolicy>,
    /// Named versions of the host
    #[serde(default)]
    pub subsets: Vec<Subset>,
    /// Namespaces this rule is visible to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub export_to: Vec<String>,
    /// Workloads the rule applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_selector: Option<WorkloadSelector>,
}

/// A named version of a service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subset {
    /// Subset name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Labels selecting the subset's endpoints
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Policy overriding the rule-level policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_policy: Option<TrafficPolicy>,
}

/// Traffic policy
///
/// Only `tls.mode` is interpreted; the rest is kept verbatim for output.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPolicy {
    /// Client TLS settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<ClientTlsSettings>,
    /// Remaining settings (loadBalancer, connectionPool, outlierDetection, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl TrafficPolicy {
    /// Whether the policy declares nothing
    pub fn is_empty(&self) -> bool {
        self.tls.is_none() && self.extra.is_empty()
    }

    /// Declared TLS mode, if any
    pub fn tls_mode(&self) -> Option<&str> {
        self.tls.as_ref().and_then(|t| t.mode.as_deref())
    }
}

/// Client-side TLS settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTlsSettings {
    /// DISABLE, SIMPLE, MUTUAL or ISTIO_MUTUAL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Remaining fields (sni, credentialName, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
