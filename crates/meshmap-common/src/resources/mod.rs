//! Typed Istio resource models
//!
//! Hand-written serde models for the Istio networking resources the graph
//! engine reads:
//! - VirtualService: routing rules (HTTP/TCP/TLS)
//! - DestinationRule: subsets and traffic policy
//! - ServiceEntry: hosts registered outside the Kubernetes service registry
//! - Gateway: ingress/egress proxies bound by VirtualServices
//! - WorkloadEntry: non-Kubernetes workloads
//! - EnvoyFilter: proxy patches (surfaced as edge annotations only)
//!
//! Every resource carries `spec: Option<..>` so a resource without a spec
//! can still be reported instead of failing the whole snapshot. Every list is
//! `#[serde(default)]`. Route-level structs keep unrecognised fields in a
//! flattened `extra` map so the raw object attached to graph edges is
//! complete.

mod destination_rule;
mod envoy_filter;
mod gateway;
mod service_entry;
mod virtual_service;
mod workload_entry;

use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use serde::de::DeserializeOwned;

pub use destination_rule::{
    ClientTlsSettings, DestinationRule, DestinationRuleSpec, Subset, TrafficPolicy,
};
pub use envoy_filter::{EnvoyFilter, EnvoyFilterSpec};
pub use gateway::{Gateway, GatewayPort, GatewayServer, GatewaySpec};
pub use service_entry::{ServiceEntry, ServiceEntryPort, ServiceEntrySpec};
pub use virtual_service::{
    Destination, HttpMatchRequest, HttpRoute, L4MatchAttributes, Percent, PortSelector,
    RouteDestination, StringMatch, TcpRoute, TlsMatchAttributes, TlsRoute, VirtualService,
    VirtualServiceSpec,
};
pub use workload_entry::{WorkloadEntry, WorkloadEntrySpec, WorkloadSelector};

use crate::Error;

/// Placeholder used in warnings for resources without `metadata.name`
pub const UNNAMED: &str = "<unnamed>";

/// Uniform access to resource metadata
pub trait ResourceMeta {
    /// Resource kind as it appears in manifests
    const KIND: &'static str;

    /// Borrow the Kubernetes metadata
    fn meta(&self) -> &ObjectMeta;

    /// Resource name, or [`UNNAMED`] when absent
    fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or(UNNAMED)
    }

    /// Resource namespace, falling back to the snapshot namespace it was listed from
    fn namespace_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.meta()
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(fallback)
    }

    /// `<namespace>/<name>` reference used in warnings and provenance
    fn qualified_name(&self, fallback_namespace: &str) -> String {
        format!("{}/{}", self.namespace_or(fallback_namespace), self.name())
    }
}

impl ResourceMeta for Service {
    const KIND: &'static str = "Service";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
}

impl ResourceMeta for Pod {
    const KIND: &'static str = "Pod";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
}

/// Decode a kube `DynamicObject` into a typed resource model.
///
/// Used by each model's `from_dynamic`; the kind is reported on failure so a
/// malformed object in a large listing is easy to find.
pub(crate) fn decode_dynamic<T: DeserializeOwned>(
    obj: &DynamicObject,
    kind: &str,
) -> Result<T, Error> {
    let value = serde_json::to_value(obj)
        .map_err(|e| Error::serialization_for_kind(kind, e.to_string()))?;
    serde_json::from_value(value).map_err(|e| {
        Error::serialization_for_kind(
            kind,
            format!(
                "{}: {}",
                obj.metadata.name.as_deref().unwrap_or(UNNAMED),
                e
            ),
        )
    })
}

/// Implement [`ResourceMeta`] and [`crate::kube_utils::HasApiResource`] for an Istio model.
macro_rules! istio_resource {
    ($ty:ty, $api_version:expr, $kind:expr) => {
        impl $crate::kube_utils::HasApiResource for $ty {
            const API_VERSION: &'static str = $api_version;
            const KIND: &'static str = $kind;
        }

        impl $crate::resources::ResourceMeta for $ty {
            const KIND: &'static str = $kind;

            fn meta(&self) -> &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                &self.metadata
            }
        }

        impl $ty {
            /// Decode from a kube `DynamicObject` listing
            pub fn from_dynamic(obj: &kube::api::DynamicObject) -> $crate::Result<Self> {
                $crate::resources::decode_dynamic(obj, $kind)
            }

            #[allow(dead_code)]
            fn default_api_version() -> String {
                $api_version.to_string()
            }

            #[allow(dead_code)]
            fn default_kind() -> String {
                $kind.to_string()
            }
        }
    };
}

pub(crate) use istio_resource;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ApiResource;

    #[test]
    fn test_from_dynamic_virtual_service() {
        let ar = ApiResource {
            group: "networking.istio.io".to_string(),
            version: "v1beta1".to_string(),
            api_version: "networking.istio.io/v1beta1".to_string(),
            kind: "VirtualService".to_string(),
            plural: "virtualservices".to_string(),
        };
        let mut obj = DynamicObject::new("reviews", &ar).within("bookinfo");
        obj.data = serde_json::json!({
            "spec": {
                "hosts": ["reviews"],
                "http": [{"route": [{"destination": {"host": "reviews", "subset": "v2"}}]}]
            }
        });

        let vs = VirtualService::from_dynamic(&obj).expect("should decode");
        assert_eq!(vs.name(), "reviews");
        assert_eq!(vs.namespace_or("other"), "bookinfo");
        let spec = vs.spec.expect("spec present");
        assert_eq!(spec.hosts, vec!["reviews"]);
        assert_eq!(spec.http.len(), 1);
    }

    #[test]
    fn test_from_dynamic_reports_kind() {
        let ar = ApiResource {
            group: "networking.istio.io".to_string(),
            version: "v1beta1".to_string(),
            api_version: "networking.istio.io/v1beta1".to_string(),
            kind: "ServiceEntry".to_string(),
            plural: "serviceentries".to_string(),
        };
        let mut obj = DynamicObject::new("broken", &ar);
        obj.data = serde_json::json!({ "spec": { "hosts": "not-a-list" } });

        let err = ServiceEntry::from_dynamic(&obj).unwrap_err();
        match err {
            Error::Serialization { kind, message } => {
                assert_eq!(kind.as_deref(), Some("ServiceEntry"));
                assert!(message.contains("broken"));
            }
            other => panic!("Expected Serialization, got {other:?}"),
        }
    }

    #[test]
    fn test_unnamed_resource() {
        let svc = Service::default();
        assert_eq!(svc.name(), UNNAMED);
        assert_eq!(svc.namespace_or("demo"), "demo");
        assert_eq!(svc.qualified_name("demo"), "demo/<unnamed>");
    }
}
