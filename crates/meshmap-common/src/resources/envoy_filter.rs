//! EnvoyFilter model
//!
//! Config patches are opaque; only the workload selector is interpreted.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{istio_resource, WorkloadSelector};
use crate::kube_utils::selector_matches;
use crate::mesh::NETWORKING_ALPHA_API_VERSION;

/// Istio EnvoyFilter
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyFilter {
    /// API version
    #[serde(default = "EnvoyFilter::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "EnvoyFilter::default_kind")]
    pub kind: String,
    /// Metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Patch spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<EnvoyFilterSpec>,
}

istio_resource!(EnvoyFilter, NETWORKING_ALPHA_API_VERSION, "EnvoyFilter");

impl EnvoyFilter {
    /// Whether the filter applies to workloads selected by `service_selector`.
    ///
    /// A filter without a workload selector applies to every workload in its
    /// namespace. Otherwise every filter label must appear in the service's
    /// selector with the same value.
    pub fn applies_to(&self, service_selector: &BTreeMap<String, String>) -> bool {
        match self
            .spec
            .as_ref()
            .and_then(|s| s.workload_selector.as_ref())
            .filter(|sel| !sel.labels.is_empty())
        {
            None => true,
            Some(sel) => selector_matches(&sel.labels, service_selector),
        }
    }
}

/// EnvoyFilter spec
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyFilterSpec {
    /// Workloads the patches apply to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_selector: Option<WorkloadSelector>,
    /// Opaque Envoy config patches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_patches: Vec<Value>,
    /// Application order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_filter_without_selector_applies_everywhere() {
        let filter = EnvoyFilter::default();
        assert!(filter.applies_to(&labels(&[("app", "reviews")])));
        assert!(filter.applies_to(&BTreeMap::new()));
    }

    #[test]
    fn test_filter_selector_must_match_service_selector() {
        let filter: EnvoyFilter = serde_yaml::from_str(
            r#"
metadata: {name: lua, namespace: demo}
spec:
  workloadSelector:
    labels: {app: reviews}
  configPatches:
  - applyTo: HTTP_FILTER
"#,
        )
        .expect("parse");
        assert_eq!(filter.api_version, NETWORKING_ALPHA_API_VERSION);
        assert!(filter.applies_to(&labels(&[("app", "reviews"), ("tier", "web")])));
        assert!(!filter.applies_to(&labels(&[("app", "ratings")])));
        assert!(!filter.applies_to(&BTreeMap::new()));
    }
}
