//! DestinationRule index and traffic-policy lookup

use std::collections::HashMap;

use meshmap_common::canonical_host;
use meshmap_common::resources::{DestinationRule, ResourceMeta, Subset, TrafficPolicy};
use meshmap_common::NamespaceResources;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

/// A DestinationRule keyed by its canonical host
#[derive(Clone, Debug, PartialEq)]
pub struct DestinationRuleRecord {
    /// Rule name
    pub name: String,
    /// Rule namespace
    pub namespace: String,
    /// `spec.host` canonicalized against the rule's namespace
    pub host: String,
    /// The rule as listed
    pub rule: DestinationRule,
}

impl DestinationRuleRecord {
    /// `<namespace>/<name>`
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Declared subsets
    pub fn subsets(&self) -> &[Subset] {
        self.rule
            .spec
            .as_ref()
            .map(|s| s.subsets.as_slice())
            .unwrap_or(&[])
    }

    fn top_level_policy(&self) -> Option<&TrafficPolicy> {
        self.rule
            .spec
            .as_ref()
            .and_then(|s| s.traffic_policy.as_ref())
            .filter(|p| !p.is_empty())
    }

    fn subset_policy(&self, subset: &str) -> Option<&TrafficPolicy> {
        self.rule
            .subset(subset)
            .and_then(|s| s.traffic_policy.as_ref())
            .filter(|p| !p.is_empty())
    }
}

/// Which part of a DestinationRule a policy came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyLevel {
    /// `spec.subsets[].trafficPolicy`
    Subset,
    /// `spec.trafficPolicy`
    Host,
}

/// Result of [`DestinationRuleIndex::find_traffic_policy`]
#[derive(Clone, Copy, Debug)]
pub struct PolicyMatch<'a> {
    /// The effective policy
    pub policy: &'a TrafficPolicy,
    /// Rule that declared it
    pub rule: &'a DestinationRuleRecord,
    /// Subset name when the policy is subset level
    pub subset: Option<&'a str>,
    /// Where in the rule the policy was found
    pub level: PolicyLevel,
}

impl PolicyMatch<'_> {
    /// Provenance record attached to edges as `trafficPolicySource`
    pub fn source(&self) -> Value {
        let mut source = json!({
            "destinationRule": self.rule.qualified_name(),
            "level": self.level,
        });
        if let Some(subset) = self.subset {
            source["subset"] = json!(subset);
        }
        source
    }
}

/// Canonical host to the DestinationRules targeting it, in insertion order
#[derive(Debug, Default)]
pub struct DestinationRuleIndex {
    by_host: HashMap<String, Vec<DestinationRuleRecord>>,
    count: usize,
}

impl DestinationRuleIndex {
    /// Index the DestinationRules of every namespace, in order
    pub fn build<'a>(namespaces: impl IntoIterator<Item = &'a NamespaceResources>) -> Self {
        let mut index = Self::default();
        for resources in namespaces {
            for rule in &resources.destination_rules {
                let Some(host) = rule.host().filter(|h| !h.trim().is_empty()) else {
                    debug!(
                        rule = %rule.qualified_name(&resources.namespace),
                        "Skipping DestinationRule without spec.host"
                    );
                    continue;
                };
                let namespace = rule.namespace_or(&resources.namespace).to_string();
                let record = DestinationRuleRecord {
                    name: rule.name().to_string(),
                    host: canonical_host(host, &namespace),
                    namespace,
                    rule: rule.clone(),
                };
                index
                    .by_host
                    .entry(record.host.clone())
                    .or_default()
                    .push(record);
                index.count += 1;
            }
        }
        index
    }

    /// Rules targeting a canonical host
    pub fn rules_for(&self, canonical: &str) -> &[DestinationRuleRecord] {
        self.by_host
            .get(canonical)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Effective traffic policy for traffic to `host` (optionally a subset).
    ///
    /// Rules are tried in insertion order. Within a rule the named subset's
    /// policy takes precedence over the rule's top-level policy. The first
    /// non-empty policy wins; `None` means no rule declares one.
    pub fn find_traffic_policy<'s>(
        &'s self,
        host: &str,
        namespace: &str,
        subset: Option<&'s str>,
    ) -> Option<PolicyMatch<'s>> {
        let canonical = canonical_host(host, namespace);
        self.rules_for(&canonical).iter().find_map(|rule| {
            let subset_match = subset.and_then(|name| {
                rule.subset_policy(name).map(|policy| PolicyMatch {
                    policy,
                    rule,
                    subset: Some(name),
                    level: PolicyLevel::Subset,
                })
            });
            subset_match.or_else(|| {
                rule.top_level_policy().map(|policy| PolicyMatch {
                    policy,
                    rule,
                    subset: None,
                    level: PolicyLevel::Host,
                })
            })
        })
    }

    /// Number of indexed rules
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether no rules are indexed
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
