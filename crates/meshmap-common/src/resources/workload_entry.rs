//! WorkloadEntry model and the shared workload selector

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::istio_resource;
use crate::mesh::NETWORKING_API_VERSION;

/// Istio WorkloadEntry
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadEntry {
    /// API version
    #[serde(default = "WorkloadEntry::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "WorkloadEntry::default_kind")]
    pub kind: String,
    /// Metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Workload description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<WorkloadEntrySpec>,
}

istio_resource!(WorkloadEntry, NETWORKING_API_VERSION, "WorkloadEntry");

impl WorkloadEntry {
    /// Workload labels (empty without a spec)
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.spec
            .as_ref()
            .map(|s| s.labels.clone())
            .unwrap_or_default()
    }
}

/// WorkloadEntry spec, also used for ServiceEntry inline endpoints
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadEntrySpec {
    /// Address of the workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Port name to number mapping
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ports: BTreeMap<String, u32>,
    /// Workload labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Network the workload lives on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Locality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    /// Load balancing weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    /// Service account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Label selector used by DestinationRule, ServiceEntry and EnvoyFilter
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSelector {
    /// Required labels
    #[serde(default, alias = "matchLabels")]
    pub labels: BTreeMap<String, String>,
}
