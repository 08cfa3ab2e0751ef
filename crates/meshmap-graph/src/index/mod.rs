//! Resource indexes
//!
//! Built once per snapshot from the primary namespace followed by every
//! extra namespace, and read-only afterwards.

mod destination_rule;
mod external;
mod service;

pub use destination_rule::{
    DestinationRuleIndex, DestinationRuleRecord, PolicyLevel, PolicyMatch,
};
pub use external::{ExternalServiceIndex, ExternalServiceRecord};
pub use service::{ServiceIndex, ServicePortRecord, ServiceRecord};

use meshmap_common::ResourceSnapshot;
use tracing::debug;

/// The three lookup tables of one build
#[derive(Debug, Default)]
pub struct Indexes {
    /// Kubernetes Services
    pub services: ServiceIndex,
    /// DestinationRules
    pub destination_rules: DestinationRuleIndex,
    /// ServiceEntries
    pub external: ExternalServiceIndex,
}

impl Indexes {
    /// Index every namespace of a snapshot
    pub fn build(snapshot: &ResourceSnapshot) -> Self {
        let indexes = Self {
            services: ServiceIndex::build(snapshot.all_namespaces()),
            destination_rules: DestinationRuleIndex::build(snapshot.all_namespaces()),
            external: ExternalServiceIndex::build(snapshot.all_namespaces()),
        };
        debug!(
            namespace = %snapshot.namespace(),
            services = indexes.services.len(),
            destination_rules = indexes.destination_rules.len(),
            service_entries = indexes.external.len(),
            "Built resource indexes"
        );
        indexes
    }
}
