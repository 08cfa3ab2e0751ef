//! Per-namespace resource snapshots
//!
//! A [`ResourceSnapshot`] is everything the graph engine reads: the primary
//! namespace being inspected plus any extra namespaces used only for
//! cross-namespace Service, DestinationRule and ServiceEntry lookups. It is
//! produced by a loader and never mutated by the engine.

use k8s_openapi::api::core::v1::{Pod, Service};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::resources::{
    DestinationRule, EnvoyFilter, Gateway, ServiceEntry, VirtualService, WorkloadEntry,
};
use crate::{Error, Result};

/// Typed resource lists of one namespace
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceResources {
    /// Namespace the resources were listed from
    pub namespace: String,
    /// VirtualServices in declaration order
    #[serde(default)]
    pub virtual_services: Vec<VirtualService>,
    /// DestinationRules
    #[serde(default)]
    pub destination_rules: Vec<DestinationRule>,
    /// Gateways
    #[serde(default)]
    pub gateways: Vec<Gateway>,
    /// ServiceEntries
    #[serde(default)]
    pub service_entries: Vec<ServiceEntry>,
    /// WorkloadEntries
    #[serde(default)]
    pub workload_entries: Vec<WorkloadEntry>,
    /// EnvoyFilters
    #[serde(default)]
    pub envoy_filters: Vec<EnvoyFilter>,
    /// Kubernetes Services
    #[serde(default)]
    pub services: Vec<Service>,
    /// Pods
    #[serde(default)]
    pub pods: Vec<Pod>,
}

impl NamespaceResources {
    /// Empty resource set for a namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Total number of resources held
    pub fn len(&self) -> usize {
        self.virtual_services.len()
            + self.destination_rules.len()
            + self.gateways.len()
            + self.service_entries.len()
            + self.workload_entries.len()
            + self.envoy_filters.len()
            + self.services.len()
            + self.pods.len()
    }

    /// Whether no resources are held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add one manifest document, dispatching on its `kind`.
    ///
    /// Returns `Ok(false)` for kinds the engine does not read.
    pub fn push_manifest(&mut self, doc: serde_yaml::Value) -> Result<bool> {
        let kind = doc
            .get("kind")
            .and_then(|k| k.as_str())
            .unwrap_or_default()
            .to_string();

        match kind.as_str() {
            "VirtualService" => self.virtual_services.push(decode(doc, &kind)?),
            "DestinationRule" => self.destination_rules.push(decode(doc, &kind)?),
            "Gateway" => self.gateways.push(decode(doc, &kind)?),
            "ServiceEntry" => self.service_entries.push(decode(doc, &kind)?),
            "WorkloadEntry" => self.workload_entries.push(decode(doc, &kind)?),
            "EnvoyFilter" => self.envoy_filters.push(decode(doc, &kind)?),
            "Service" => self.services.push(decode(doc, &kind)?),
            "Pod" => self.pods.push(decode(doc, &kind)?),
            _ => {
                debug!(kind = %kind, namespace = %self.namespace, "Ignoring unsupported manifest kind");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn decode<T: DeserializeOwned>(doc: serde_yaml::Value, kind: &str) -> Result<T> {
    serde_yaml::from_value(doc).map_err(|e| Error::serialization_for_kind(kind, e.to_string()))
}

/// Immutable input of one graph build
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    /// Namespace being inspected
    pub primary: NamespaceResources,
    /// Additional namespaces used for cross-namespace lookups
    #[serde(default)]
    pub extras: Vec<NamespaceResources>,
}

impl ResourceSnapshot {
    /// Snapshot of a single namespace
    pub fn new(primary: NamespaceResources) -> Self {
        Self {
            primary,
            extras: Vec::new(),
        }
    }

    /// Add an extra namespace (builder style)
    pub fn with_extra(mut self, extra: NamespaceResources) -> Self {
        self.extras.push(extra);
        self
    }

    /// The primary namespace name
    pub fn namespace(&self) -> &str {
        &self.primary.namespace
    }

    /// Primary namespace first, then extras in the order supplied
    pub fn all_namespaces(&self) -> impl Iterator<Item = &NamespaceResources> {
        std::iter::once(&self.primary).chain(self.extras.iter())
    }

    /// Build a snapshot from multi-document YAML.
    ///
    /// `kind: List` documents are unwrapped. Documents without a namespace
    /// belong to `namespace`; documents in any other namespace are collected
    /// into extras in first-seen order. Unknown kinds are ignored.
    pub fn from_manifests(namespace: &str, yaml: &str) -> Result<Self> {
        let mut snapshot = Self::new(NamespaceResources::new(namespace));
        snapshot.add_manifests(yaml)?;
        Ok(snapshot)
    }

    /// Add the documents of another multi-document YAML stream
    pub fn add_manifests(&mut self, yaml: &str) -> Result<()> {
        for doc in serde_yaml::Deserializer::from_str(yaml) {
            let value = serde_yaml::Value::deserialize(doc)?;
            if value.is_null() {
                continue;
            }
            if value.get("kind").and_then(|k| k.as_str()) == Some("List") {
                let items = value
                    .get("items")
                    .and_then(|i| i.as_sequence())
                    .cloned()
                    .unwrap_or_default();
                for item in items {
                    self.route_document(item)?;
                }
            } else {
                self.route_document(value)?;
            }
        }
        Ok(())
    }

    fn route_document(&mut self, doc: serde_yaml::Value) -> Result<()> {
        let doc_namespace = doc
            .get("metadata")
            .and_then(|m| m.get("namespace"))
            .and_then(|n| n.as_str())
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let target = match doc_namespace {
            Some(ns) if ns != self.primary.namespace => {
                match self.extras.iter().position(|e| e.namespace == ns) {
                    Some(idx) => &mut self.extras[idx],
                    None => {
                        self.extras.push(NamespaceResources::new(ns));
                        let last = self.extras.len() - 1;
                        &mut self.extras[last]
                    }
                }
            }
            _ => &mut self.primary,
        };
        target.push_manifest(doc)?;
        Ok(())
    }
}
