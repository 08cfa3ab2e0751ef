//! ServiceEntry model

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{istio_resource, WorkloadEntrySpec, WorkloadSelector};
use crate::mesh::NETWORKING_API_VERSION;

/// Istio ServiceEntry
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    /// API version
    #[serde(default = "ServiceEntry::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "ServiceEntry::default_kind")]
    pub kind: String,
    /// Metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Registration spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ServiceEntrySpec>,
}

istio_resource!(ServiceEntry, NETWORKING_API_VERSION, "ServiceEntry");

impl ServiceEntry {
    /// Declared hosts (empty without a spec)
    pub fn hosts(&self) -> &[String] {
        self.spec.as_ref().map(|s| s.hosts.as_slice()).unwrap_or(&[])
    }
}

/// ServiceEntry spec
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntrySpec {
    /// Hosts registered by the entry
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Virtual IPs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    /// Exposed ports
    #[serde(default)]
    pub ports: Vec<ServiceEntryPort>,
    /// MESH_EXTERNAL or MESH_INTERNAL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// NONE, STATIC, DNS or DNS_ROUND_ROBIN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Inline endpoints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<WorkloadEntrySpec>,
    /// WorkloadEntries/pods backing the entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_selector: Option<WorkloadSelector>,
    /// Namespaces this entry is visible to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub export_to: Vec<String>,
    /// Remaining fields (subjectAltNames, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Port exposed by a ServiceEntry
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntryPort {
    /// Port number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    /// Protocol (HTTP, HTTPS, TLS, TCP, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Port name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Endpoint port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_entry() {
        let se: ServiceEntry = serde_yaml::from_str(
            r#"
apiVersion: networking.istio.io/v1beta1
kind: ServiceEntry
metadata: {name: payments}
spec:
  hosts: [payments.external.com]
  location: MESH_EXTERNAL
  resolution: DNS
  ports:
  - {number: 443, name: https, protocol: TLS}
  subjectAltNames: [payments.external.com]
"#,
        )
        .expect("parse");
        assert_eq!(se.hosts(), ["payments.external.com".to_string()]);
        let spec = se.spec.as_ref().expect("spec");
        assert_eq!(spec.ports[0].number, Some(443));
        assert_eq!(spec.ports[0].protocol.as_deref(), Some("TLS"));
        assert!(spec.extra.contains_key("subjectAltNames"));
    }

    #[test]
    fn test_no_spec_has_no_hosts() {
        let se = ServiceEntry::default();
        assert!(se.hosts().is_empty());
    }
}
