//! Container-level refinement
//!
//! Optional pass layered on the service-level graph: every pod container in
//! the primary namespace becomes a node, app containers are linked to their
//! sidecar, and Service nodes are linked to the containers of the pods they
//! select. Traffic edges are left untouched.
//!
//! Sidecar detection is a best-effort heuristic: the container name contains
//! `istio-proxy`, the image contains `istio/proxy`, or the pod carries the
//! injector status annotation. The annotation marks every container of the
//! pod, and custom proxy images may be misclassified.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, Pod};
use meshmap_common::mesh::{
    SIDECAR_CONTAINER_NAME, SIDECAR_IMAGE_FRAGMENT, SIDECAR_STATUS_ANNOTATION,
};
use meshmap_common::resources::{ResourceMeta, UNNAMED};
use meshmap_common::NamespaceResources;
use serde_json::json;
use tracing::debug;

use crate::accumulator::GraphAccumulator;
use crate::model::{container_node_id, EdgeKind, NodeType, Properties};
use crate::resolver::{NodeSpec, WorkloadResolver};

/// A container node created by the expansion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerRecord {
    /// Node id
    pub node_id: String,
    /// Container name
    pub name: String,
    /// Whether the container was classified as the sidecar proxy
    pub sidecar: bool,
}

/// Whether a container of `pod` is the mesh sidecar
pub fn is_sidecar(pod: &Pod, container: &Container) -> bool {
    if container.name.to_ascii_lowercase().contains(SIDECAR_CONTAINER_NAME) {
        return true;
    }
    if container
        .image
        .as_deref()
        .is_some_and(|image| image.contains(SIDECAR_IMAGE_FRAGMENT))
    {
        return true;
    }

    pod.metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(SIDECAR_STATUS_ANNOTATION))
}

/// Container nodes of one pod, in declaration order
pub fn pod_containers(
    acc: &mut GraphAccumulator,
    pod: &Pod,
    namespace: &str,
) -> Vec<ContainerRecord> {
    let pod_name = pod.name();
    let labels = pod.metadata.labels.clone().unwrap_or_default();
    let phase = pod.status.as_ref().and_then(|s| s.phase.clone());

    let containers = pod
        .spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or(&[]);

    containers
        .iter()
        .map(|container| {
            let sidecar = is_sidecar(pod, container);
            let mut properties = Properties::new();
            properties.insert("pod".to_string(), json!(pod_name));
            properties.insert("namespace".to_string(), json!(namespace));
            properties.insert("container".to_string(), json!(container.name));
            properties.insert(
                "containerType".to_string(),
                json!(if sidecar { "sidecar" } else { "app" }),
            );
            properties.insert(
                "image".to_string(),
                json!(container.image.clone().unwrap_or_default()),
            );
            properties.insert(
                "displayName".to_string(),
                json!(format!("{}@{}", container.name, pod_name)),
            );
            properties.insert("labels".to_string(), json!(labels));
            if let Some(phase) = &phase {
                properties.insert("phase".to_string(), json!(phase));
            }

            let node_id = acc.upsert_node(NodeSpec {
                id: container_node_id(namespace, pod_name, &container.name),
                node_type: if sidecar {
                    NodeType::SidecarContainer
                } else {
                    NodeType::AppContainer
                },
                properties,
            });
            ContainerRecord {
                node_id,
                name: container.name.clone(),
                sidecar,
            }
        })
        .collect()
}

fn pod_link(acc: &mut GraphAccumulator, source: &str, target: &str, pod: &str, namespace: &str) {
    let mut properties = Properties::new();
    properties.insert("pod".to_string(), json!(pod));
    properties.insert("namespace".to_string(), json!(namespace));
    acc.add_edge(
        EdgeKind::PodLink,
        format!("podLink:{}->{}", source, target),
        source,
        target,
        properties,
    );
}

/// Expand the primary namespace's pods into container nodes and links
pub fn expand(
    acc: &mut GraphAccumulator,
    resolver: &WorkloadResolver<'_>,
    primary: &NamespaceResources,
) {
    // Service nodes present after the service-level pass, in graph order.
    let services: Vec<(String, String, BTreeMap<String, String>)> = acc
        .nodes()
        .iter()
        .filter(|n| n.node_type == NodeType::Service)
        .filter_map(|n| {
            let namespace = n.property("namespace")?.as_str()?.to_string();
            let selector = n
                .property("selector")
                .and_then(|s| serde_json::from_value(s.clone()).ok())?;
            Some((n.id.clone(), namespace, selector))
        })
        .collect();

    let mut pods: Vec<(&Pod, Vec<ContainerRecord>)> = Vec::new();
    for pod in &primary.pods {
        if pod.name() == UNNAMED {
            debug!(namespace = %primary.namespace, "Skipping pod without a name");
            continue;
        }
        let namespace = pod.namespace_or(&primary.namespace).to_string();
        let containers = pod_containers(acc, pod, &namespace);

        for app in containers.iter().filter(|c| !c.sidecar) {
            for sidecar in containers.iter().filter(|c| c.sidecar) {
                pod_link(acc, &app.node_id, &sidecar.node_id, pod.name(), &namespace);
            }
        }
        pods.push((pod, containers));
    }

    for (service_id, service_namespace, selector) in services {
        let selected = resolver.pods_selected_by(&service_namespace, &selector);
        for (pod, containers) in &pods {
            if !selected.iter().any(|p| std::ptr::eq(*p, *pod)) {
                continue;
            }
            let namespace = pod.namespace_or(&primary.namespace);
            let has_sidecar = containers.iter().any(|c| c.sidecar);
            for container in containers.iter().filter(|c| c.sidecar == has_sidecar) {
                pod_link(acc, &service_id, &container.node_id, pod.name(), namespace);
            }
            acc.append_node_property(&service_id, "pods", json!(pod.name()), true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(yaml: &str) -> Pod {
        serde_yaml::from_str(yaml).expect("valid pod")
    }

    fn container(name: &str, image: &str) -> Container {
        Container {
            name: name.to_string(),
            image: Some(image.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_sidecar_by_name_or_image() {
        let plain = Pod::default();
        assert!(is_sidecar(&plain, &container("istio-proxy", "envoy:1")));
        assert!(is_sidecar(&plain, &container("proxy", "docker.io/istio/proxyv2:1.20")));
        assert!(!is_sidecar(&plain, &container("app", "nginx")));
    }

    #[test]
    fn test_sidecar_by_injector_annotation() {
        let injected = pod(r#"
apiVersion: v1
kind: Pod
metadata:
  name: p
  annotations:
    sidecar.istio.io/status: '{"containers":["istio-proxy"]}'
spec:
  containers:
  - {name: web, image: nginx}
"#);
        assert!(is_sidecar(&injected, &container("web", "nginx")));

        let mut acc = GraphAccumulator::new();
        let records = pod_containers(&mut acc, &injected, "demo");
        assert_eq!(records.len(), 1);
        assert!(records[0].sidecar);
        let node = acc.node("container:demo/p/web").expect("container node");
        assert_eq!(node.node_type, NodeType::SidecarContainer);
        assert_eq!(node.properties["containerType"], "sidecar");
    }

    #[test]
    fn test_pod_containers_create_typed_nodes() {
        let mut acc = GraphAccumulator::new();
        let p = pod(r#"
apiVersion: v1
kind: Pod
metadata: {name: web-1, labels: {app: web}}
spec:
  containers:
  - {name: web, image: nginx}
  - {name: istio-proxy, image: istio/proxyv2}
"#);
        let records = pod_containers(&mut acc, &p, "demo");
        assert_eq!(records.len(), 2);
        let app = acc.node("container:demo/web-1/web").expect("app node");
        assert_eq!(app.node_type, NodeType::AppContainer);
        assert_eq!(app.properties["displayName"], "web@web-1");
        let sidecar = acc.node("container:demo/web-1/istio-proxy").expect("sidecar node");
        assert_eq!(sidecar.node_type, NodeType::SidecarContainer);
        assert_eq!(
            sidecar.properties["labels"],
            json!(BTreeMap::from([("app", "web")]))
        );
    }
}
