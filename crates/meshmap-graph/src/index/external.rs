//! External service index: ServiceEntry hosts to their entry

use std::collections::HashMap;

use meshmap_common::canonical_host;
use meshmap_common::resources::{ResourceMeta, ServiceEntry, ServiceEntryPort};
use meshmap_common::NamespaceResources;
use serde_json::{json, Value};

use crate::model::{service_entry_node_id, Properties};

/// Read-only projection of a ServiceEntry
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalServiceRecord {
    /// Entry name
    pub name: String,
    /// Entry namespace
    pub namespace: String,
    /// Declared hosts, canonicalized against the entry's namespace
    pub hosts: Vec<String>,
    /// Declared ports
    pub ports: Vec<ServiceEntryPort>,
    /// MESH_EXTERNAL / MESH_INTERNAL
    pub location: Option<String>,
    /// Endpoint resolution mode
    pub resolution: Option<String>,
    /// Virtual IPs
    pub addresses: Vec<String>,
}

impl ExternalServiceRecord {
    /// Project a ServiceEntry listed from `namespace`
    pub fn from_service_entry(entry: &ServiceEntry, namespace: &str) -> Self {
        let namespace = entry.namespace_or(namespace).to_string();
        let spec = entry.spec.clone().unwrap_or_default();
        Self {
            name: entry.name().to_string(),
            hosts: spec
                .hosts
                .iter()
                .filter(|h| !h.trim().is_empty())
                .map(|h| canonical_host(h, &namespace))
                .collect(),
            namespace,
            ports: spec.ports,
            location: spec.location,
            resolution: spec.resolution,
            addresses: spec.addresses,
        }
    }

    /// `<namespace>/<name>`
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Id of the node standing for the ServiceEntry itself
    pub fn node_id(&self) -> String {
        service_entry_node_id(&self.namespace, &self.name)
    }

    /// Metadata copied onto host nodes the entry backs
    pub fn host_properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("serviceEntry".to_string(), json!(self.qualified_name()));
        props.insert("ports".to_string(), json!(self.ports));
        if let Some(resolution) = &self.resolution {
            props.insert("resolution".to_string(), json!(resolution));
        }
        if let Some(location) = &self.location {
            props.insert("location".to_string(), json!(location));
        }
        props
    }

    /// Properties of the ServiceEntry node
    pub fn entry_properties(&self) -> Properties {
        let mut props = self.host_properties();
        props.remove("serviceEntry");
        props.insert("name".to_string(), json!(self.name));
        props.insert("namespace".to_string(), json!(self.namespace));
        props.insert("hosts".to_string(), json!(self.hosts));
        if !self.addresses.is_empty() {
            props.insert("addresses".to_string(), Value::from(self.addresses.clone()));
        }
        props
    }
}

/// Canonical host to the ServiceEntry declaring it
///
/// Wildcard hosts (`*.example.com`) match any host under the suffix when no
/// exact entry exists.
#[derive(Debug, Default)]
pub struct ExternalServiceIndex {
    records: Vec<ExternalServiceRecord>,
    by_host: HashMap<String, usize>,
    wildcards: Vec<(String, usize)>,
}

impl ExternalServiceIndex {
    /// Index the ServiceEntries of every namespace, in order
    pub fn build<'a>(namespaces: impl IntoIterator<Item = &'a NamespaceResources>) -> Self {
        let mut index = Self::default();
        for resources in namespaces {
            for entry in &resources.service_entries {
                if entry.spec.is_none() {
                    continue;
                }
                index.insert(ExternalServiceRecord::from_service_entry(
                    entry,
                    &resources.namespace,
                ));
            }
        }
        index
    }

    /// Insert a record under each of its hosts; the first entry seen for a host wins
    pub fn insert(&mut self, record: ExternalServiceRecord) {
        let idx = self.records.len();
        for host in &record.hosts {
            if let Some(suffix) = host.strip_prefix('*') {
                self.wildcards.push((suffix.to_string(), idx));
            }
            self.by_host.entry(host.clone()).or_insert(idx);
        }
        self.records.push(record);
    }

    /// Look up by canonical host: exact match first, then wildcard suffixes
    pub fn lookup(&self, canonical: &str) -> Option<&ExternalServiceRecord> {
        if let Some(&idx) = self.by_host.get(canonical) {
            return Some(&self.records[idx]);
        }
        self.wildcards
            .iter()
            .find(|(suffix, _)| canonical.len() > suffix.len() && canonical.ends_with(suffix))
            .map(|&(_, idx)| &self.records[idx])
    }

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no entries are indexed
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(namespace: &str, yaml: &[&str]) -> ExternalServiceIndex {
        let resources = NamespaceResources {
            service_entries: yaml
                .iter()
                .map(|y| serde_yaml::from_str(y).expect("valid ServiceEntry"))
                .collect(),
            ..NamespaceResources::new(namespace)
        };
        ExternalServiceIndex::build([&resources])
    }

    #[test]
    fn test_exact_host_lookup() {
        let index = index_of(
            "demo",
            &[r#"
metadata: {name: payments}
spec:
  hosts: [Payments.External.com]
  resolution: DNS
  ports: [{number: 443, protocol: TLS, name: tls}]
"#],
        );
        let record = index.lookup("payments.external.com").expect("indexed");
        assert_eq!(record.qualified_name(), "demo/payments");
        assert_eq!(record.node_id(), "serviceEntry:demo/payments");
        assert_eq!(record.ports[0].number, Some(443));

        let props = record.host_properties();
        assert_eq!(props["serviceEntry"], "demo/payments");
        assert_eq!(props["resolution"], "DNS");
    }

    #[test]
    fn test_short_hosts_are_canonicalized() {
        let index = index_of("demo", &["metadata: {name: legacy}\nspec: {hosts: [legacy]}"]);
        assert!(index.lookup("legacy.demo.svc.cluster.local").is_some());
    }

    #[test]
    fn test_wildcard_host_matches_subdomains() {
        let index = index_of("demo", &["metadata: {name: wild}\nspec: {hosts: ['*.example.com']}"]);
        assert_eq!(
            index.lookup("api.example.com").map(|r| r.name.as_str()),
            Some("wild")
        );
        assert!(index.lookup("example.com").is_none());
        assert!(index.lookup("api.example.org").is_none());
    }

    #[test]
    fn test_entries_without_spec_skipped() {
        let index = index_of("demo", &["metadata: {name: empty}"]);
        assert!(index.is_empty());
    }
}
