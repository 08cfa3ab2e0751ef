//! Workload resolution
//!
//! Turns a host reference into the identity a graph node stands for. The
//! fallback chain is Service, then ServiceEntry, then an unresolved host, so
//! every reference yields a node; lower-confidence nodes are annotated rather
//! than dropped.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use meshmap_common::kube_utils::selector_matches;
use meshmap_common::resources::{ResourceMeta, WorkloadEntry};
use meshmap_common::{CanonicalHost, NamespaceResources, ResourceSnapshot};
use serde_json::json;

use crate::index::{ExternalServiceRecord, Indexes, ServiceRecord};
use crate::model::{external_node_id, host_node_id, NodeType, Properties, MESH_NODE_ID};

/// What a host reference resolved to
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Resolution<'a> {
    /// A Kubernetes Service
    Service(&'a ServiceRecord),
    /// A ServiceEntry host
    External(&'a ExternalServiceRecord),
    /// The `mesh` sentinel
    Mesh,
    /// Nothing in the snapshot backs the host
    Unresolved,
}

/// A host reference together with its resolution
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedHost<'a> {
    /// Canonical form of the reference
    pub canonical: CanonicalHost,
    /// Backing identity
    pub resolution: Resolution<'a>,
}

/// Node identity derived from a resolved host
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSpec {
    /// Node id
    pub id: String,
    /// Node type
    pub node_type: NodeType,
    /// Initial properties
    pub properties: Properties,
}

impl ResolvedHost<'_> {
    /// Host string the graph reports: the Service FQDN when backed by one
    pub fn host(&self) -> String {
        match self.resolution {
            Resolution::Service(record) => record.fqdn(),
            _ => self.canonical.to_string(),
        }
    }

    /// Whether nothing backs the host
    pub fn is_unresolved(&self) -> bool {
        matches!(self.resolution, Resolution::Unresolved)
    }

    /// Node for the host as a route destination
    pub fn destination_node(&self) -> NodeSpec {
        match self.resolution {
            Resolution::Unresolved => {
                let mut properties = Properties::new();
                properties.insert("host".to_string(), json!(self.canonical));
                properties.insert("resolved".to_string(), json!(false));
                NodeSpec {
                    id: external_node_id(self.canonical.as_str()),
                    node_type: NodeType::ExternalService,
                    properties,
                }
            }
            _ => self.backed_node(),
        }
    }

    /// Node for the host as a VirtualService source
    pub fn source_node(&self) -> NodeSpec {
        match self.resolution {
            Resolution::Unresolved => {
                let mut properties = Properties::new();
                properties.insert("host".to_string(), json!(self.canonical));
                NodeSpec {
                    id: host_node_id(self.canonical.as_str()),
                    node_type: NodeType::Host,
                    properties,
                }
            }
            _ => self.backed_node(),
        }
    }

    fn backed_node(&self) -> NodeSpec {
        match self.resolution {
            Resolution::Service(record) => {
                let mut properties = Properties::new();
                properties.insert("name".to_string(), json!(record.name));
                properties.insert("namespace".to_string(), json!(record.namespace));
                properties.insert("host".to_string(), json!(record.fqdn()));
                properties.insert("selector".to_string(), json!(record.selector));
                properties.insert("ports".to_string(), json!(record.ports));
                NodeSpec {
                    id: host_node_id(&record.fqdn()),
                    node_type: NodeType::Service,
                    properties,
                }
            }
            Resolution::External(record) => {
                let mut properties = record.host_properties();
                properties.insert("host".to_string(), json!(self.canonical));
                NodeSpec {
                    id: external_node_id(self.canonical.as_str()),
                    node_type: NodeType::ExternalService,
                    properties,
                }
            }
            Resolution::Mesh | Resolution::Unresolved => NodeSpec {
                id: MESH_NODE_ID.to_string(),
                node_type: NodeType::Mesh,
                properties: Properties::new(),
            },
        }
    }
}

/// Resolves hosts against the indexes and narrows Services to workloads
#[derive(Debug, Clone, Copy)]
pub struct WorkloadResolver<'a> {
    indexes: &'a Indexes,
    primary: &'a NamespaceResources,
}

impl<'a> WorkloadResolver<'a> {
    /// Resolver over a snapshot's indexes; workloads come from the primary namespace
    pub fn new(indexes: &'a Indexes, snapshot: &'a ResourceSnapshot) -> Self {
        Self {
            indexes,
            primary: &snapshot.primary,
        }
    }

    /// Resolve a raw host declared in `namespace`
    pub fn resolve(&self, raw: &str, namespace: &str) -> ResolvedHost<'a> {
        let canonical = CanonicalHost::new(raw, namespace);
        let resolution = if canonical.is_mesh() {
            Resolution::Mesh
        } else if let Some(record) = self
            .indexes
            .services
            .lookup_spelling(canonical.as_str(), raw)
        {
            Resolution::Service(record)
        } else if let Some(record) = self.indexes.external.lookup(canonical.as_str()) {
            Resolution::External(record)
        } else {
            Resolution::Unresolved
        };
        ResolvedHost {
            canonical,
            resolution,
        }
    }

    /// Primary-namespace pods of `namespace` whose labels satisfy `selector`
    pub fn pods_selected_by(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Vec<&'a Pod> {
        let primary: &'a NamespaceResources = self.primary;
        primary
            .pods
            .iter()
            .filter(|pod| pod.namespace_or(&primary.namespace) == namespace)
            .filter(|pod| {
                pod.metadata
                    .labels
                    .as_ref()
                    .is_some_and(|labels| selector_matches(selector, labels))
            })
            .collect()
    }

    /// Primary-namespace WorkloadEntries of `namespace` whose labels satisfy `selector`
    pub fn workload_entries_selected_by(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Vec<&'a WorkloadEntry> {
        let primary: &'a NamespaceResources = self.primary;
        primary
            .workload_entries
            .iter()
            .filter(|entry| entry.namespace_or(&primary.namespace) == namespace)
            .filter(|entry| selector_matches(selector, &entry.labels()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"
apiVersion: v1
kind: Service
metadata: {name: backend, namespace: demo}
spec:
  selector: {app: backend}
  ports: [{name: http, port: 8080}]
---
apiVersion: networking.istio.io/v1beta1
kind: ServiceEntry
metadata: {name: payments, namespace: demo}
spec:
  hosts: [payments.external.com]
  resolution: DNS
---
apiVersion: v1
kind: Pod
metadata:
  name: backend-v1
  namespace: demo
  labels: {app: backend, version: v1}
---
apiVersion: v1
kind: Pod
metadata:
  name: other
  namespace: demo
  labels: {app: other}
---
apiVersion: networking.istio.io/v1beta1
kind: WorkloadEntry
metadata: {name: vm-1, namespace: demo}
spec:
  address: 10.0.0.9
  labels: {app: backend, version: v2}
"#;

    fn snapshot() -> ResourceSnapshot {
        ResourceSnapshot::from_manifests("demo", SNAPSHOT).expect("fixture")
    }

    #[test]
    fn test_service_backed_host() {
        let snapshot = snapshot();
        let indexes = Indexes::build(&snapshot);
        let resolver = WorkloadResolver::new(&indexes, &snapshot);

        let resolved = resolver.resolve("backend", "demo");
        assert!(matches!(resolved.resolution, Resolution::Service(_)));
        assert_eq!(resolved.host(), "backend.demo.svc.cluster.local");

        let node = resolved.destination_node();
        assert_eq!(node.id, "host:backend.demo.svc.cluster.local");
        assert_eq!(node.node_type, NodeType::Service);
        assert_eq!(node.properties["selector"]["app"], "backend");
        assert_eq!(resolved.source_node(), node);
    }

    #[test]
    fn test_service_entry_backed_host() {
        let snapshot = snapshot();
        let indexes = Indexes::build(&snapshot);
        let resolver = WorkloadResolver::new(&indexes, &snapshot);

        let resolved = resolver.resolve("payments.external.com", "demo");
        let node = resolved.destination_node();
        assert_eq!(node.id, "external:payments.external.com");
        assert_eq!(node.node_type, NodeType::ExternalService);
        assert_eq!(node.properties["serviceEntry"], "demo/payments");
        assert!(!resolved.is_unresolved());
    }

    #[test]
    fn test_unresolved_host_differs_by_role() {
        let snapshot = snapshot();
        let indexes = Indexes::build(&snapshot);
        let resolver = WorkloadResolver::new(&indexes, &snapshot);

        let resolved = resolver.resolve("api.unknown.io", "demo");
        assert!(resolved.is_unresolved());

        let dest = resolved.destination_node();
        assert_eq!(dest.id, "external:api.unknown.io");
        assert_eq!(dest.properties["resolved"], false);

        let source = resolved.source_node();
        assert_eq!(source.id, "host:api.unknown.io");
        assert_eq!(source.node_type, NodeType::Host);
    }

    #[test]
    fn test_mesh_sentinel() {
        let snapshot = snapshot();
        let indexes = Indexes::build(&snapshot);
        let resolver = WorkloadResolver::new(&indexes, &snapshot);

        let node = resolver.resolve("mesh", "demo").source_node();
        assert_eq!(node.id, MESH_NODE_ID);
        assert_eq!(node.node_type, NodeType::Mesh);
    }

    #[test]
    fn test_workloads_selected_by_labels() {
        let snapshot = snapshot();
        let indexes = Indexes::build(&snapshot);
        let resolver = WorkloadResolver::new(&indexes, &snapshot);

        let selector = BTreeMap::from([("app".to_string(), "backend".to_string())]);
        let pods: Vec<_> = resolver
            .pods_selected_by("demo", &selector)
            .iter()
            .filter_map(|p| p.metadata.name.clone())
            .collect();
        assert_eq!(pods, vec!["backend-v1"]);
        assert_eq!(resolver.workload_entries_selected_by("demo", &selector).len(), 1);
        assert!(resolver.pods_selected_by("demo", &BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_workloads_of_other_namespace_are_not_selected() {
        let snapshot = snapshot();
        let indexes = Indexes::build(&snapshot);
        let resolver = WorkloadResolver::new(&indexes, &snapshot);

        let selector = BTreeMap::from([("app".to_string(), "backend".to_string())]);
        assert!(resolver.pods_selected_by("shared", &selector).is_empty());
        assert!(resolver
            .workload_entries_selected_by("shared", &selector)
            .is_empty());
    }
}
