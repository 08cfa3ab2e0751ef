//! Service index: every spelling of a Service's host to its record

use std::collections::{BTreeMap, HashMap};

use k8s_openapi::api::core::v1::Service;
use meshmap_common::host::{canonical_host, service_fqdn, service_host_variants};
use meshmap_common::resources::{ResourceMeta, UNNAMED};
use meshmap_common::NamespaceResources;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Port exposed by a Service
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePortRecord {
    /// Port name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Service port
    pub port: i32,
    /// TCP, UDP or SCTP
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Application protocol hint (e.g. `http`, `grpc`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_protocol: Option<String>,
}

/// Read-only projection of a Kubernetes Service
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceRecord {
    /// Service name
    pub name: String,
    /// Service namespace
    pub namespace: String,
    /// Pod selector (empty for selector-less services)
    pub selector: BTreeMap<String, String>,
    /// Exposed ports
    pub ports: Vec<ServicePortRecord>,
    /// Raw `spec` as listed
    pub spec: Value,
}

impl ServiceRecord {
    /// Project a Service listed from `namespace`
    pub fn from_service(service: &Service, namespace: &str) -> Self {
        let spec = service.spec.as_ref();
        let ports = spec
            .and_then(|s| s.ports.as_ref())
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| ServicePortRecord {
                        name: p.name.clone(),
                        port: p.port,
                        protocol: p.protocol.clone(),
                        app_protocol: p.app_protocol.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: service.name().to_string(),
            namespace: service.namespace_or(namespace).to_string(),
            selector: spec.and_then(|s| s.selector.clone()).unwrap_or_default(),
            ports,
            spec: serde_json::to_value(&service.spec).unwrap_or(Value::Null),
        }
    }

    /// `<name>.<namespace>.svc.cluster.local`
    pub fn fqdn(&self) -> String {
        service_fqdn(&self.name, &self.namespace)
    }

    /// `<namespace>/<name>`
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Canonical host (and literal `name.ns` / `name.ns.svc` spelling) to Service
#[derive(Debug, Default)]
pub struct ServiceIndex {
    records: Vec<ServiceRecord>,
    by_host: HashMap<String, usize>,
}

impl ServiceIndex {
    /// Index the Services of every namespace, in order
    pub fn build<'a>(namespaces: impl IntoIterator<Item = &'a NamespaceResources>) -> Self {
        let mut index = Self::default();
        for resources in namespaces {
            for service in &resources.services {
                if service.name() == UNNAMED {
                    debug!(namespace = %resources.namespace, "Skipping Service without a name");
                    continue;
                }
                index.insert(ServiceRecord::from_service(service, &resources.namespace));
            }
        }
        index
    }

    /// Insert a record under every key it can be addressed by.
    ///
    /// Existing keys are kept: the first Service seen for a key wins.
    pub fn insert(&mut self, record: ServiceRecord) {
        let idx = self.records.len();
        let [_bare, dotted, svc, fqdn] = service_host_variants(&record.name, &record.namespace);

        let mut keys = vec![canonical_host(&fqdn, &record.namespace)];
        // Literal spellings let `name.ns` resolve from any other namespace.
        keys.push(dotted.to_ascii_lowercase());
        keys.push(svc.to_ascii_lowercase());

        for key in keys {
            self.by_host.entry(key).or_insert(idx);
        }
        self.records.push(record);
    }

    /// Look up by canonical host
    pub fn lookup(&self, canonical: &str) -> Option<&ServiceRecord> {
        self.by_host.get(canonical).map(|&idx| &self.records[idx])
    }

    /// Look up by canonical host, then by the literal lower-cased spelling
    pub fn lookup_spelling(&self, canonical: &str, raw: &str) -> Option<&ServiceRecord> {
        self.lookup(canonical)
            .or_else(|| self.lookup(&raw.trim().to_ascii_lowercase()))
    }

    /// Number of indexed Services
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no Services are indexed
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn service(name: &str, namespace: &str, app: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                selector: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
                ports: Some(vec![ServicePort {
                    name: Some("http".to_string()),
                    port: 9080,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn namespace(ns: &str, services: Vec<Service>) -> NamespaceResources {
        NamespaceResources {
            services,
            ..NamespaceResources::new(ns)
        }
    }

    #[test]
    fn test_every_spelling_resolves() {
        let primary = namespace("bookinfo", vec![service("reviews", "bookinfo", "reviews")]);
        let index = ServiceIndex::build([&primary]);

        for raw in [
            "reviews",
            "reviews.bookinfo",
            "reviews.bookinfo.svc",
            "reviews.bookinfo.svc.cluster.local",
        ] {
            let canonical = canonical_host(raw, "bookinfo");
            let record = index
                .lookup_spelling(&canonical, raw)
                .unwrap_or_else(|| panic!("{raw} should resolve"));
            assert_eq!(record.fqdn(), "reviews.bookinfo.svc.cluster.local");
            assert_eq!(record.selector["app"], "reviews");
            assert_eq!(record.ports[0].port, 9080);
        }
    }

    #[test]
    fn test_cross_namespace_dotted_spelling_resolves() {
        let primary = namespace("bookinfo", vec![]);
        let shared = namespace("shared", vec![service("ratings", "shared", "ratings")]);
        let index = ServiceIndex::build([&primary, &shared]);

        let canonical = canonical_host("ratings.shared", "bookinfo");
        assert_eq!(canonical, "ratings.shared");
        let record = index
            .lookup_spelling(&canonical, "ratings.shared")
            .expect("cross-namespace spelling");
        assert_eq!(record.namespace, "shared");
    }

    #[test]
    fn test_bare_name_does_not_cross_namespaces() {
        let primary = namespace("bookinfo", vec![]);
        let shared = namespace("shared", vec![service("ratings", "shared", "ratings")]);
        let index = ServiceIndex::build([&primary, &shared]);

        let canonical = canonical_host("ratings", "bookinfo");
        assert!(index.lookup_spelling(&canonical, "ratings").is_none());
    }

    #[test]
    fn test_first_seen_wins() {
        let primary = namespace("demo", vec![service("backend", "demo", "first")]);
        let dup = namespace("demo", vec![service("backend", "demo", "second")]);
        let index = ServiceIndex::build([&primary, &dup]);

        let record = index
            .lookup("backend.demo.svc.cluster.local")
            .expect("indexed");
        assert_eq!(record.selector["app"], "first");
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_unnamed_services_skipped() {
        let primary = namespace("demo", vec![Service::default()]);
        let index = ServiceIndex::build([&primary]);
        assert!(index.is_empty());
    }
}
