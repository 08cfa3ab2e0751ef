//! Per-namespace graph cache
//!
//! Holds at most one built graph per namespace for a fixed lifetime. Expired
//! entries are evicted on lookup; a disabled cache never stores anything.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use meshmap_graph::GraphResponse;

struct CacheEntry {
    response: Arc<GraphResponse>,
    expires_at: Instant,
}

/// TTL cache of graph responses keyed by namespace
pub struct GraphCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Option<Duration>,
}

impl GraphCache {
    /// Cache with the given lifetime; `None` or zero disables it
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: ttl.filter(|ttl| !ttl.is_zero()),
        }
    }

    /// Cache that never stores anything
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Whether entries are stored at all
    pub fn is_enabled(&self) -> bool {
        self.ttl.is_some()
    }

    /// Unexpired graph for `namespace`, evicting it if it has expired
    pub fn get(&self, namespace: &str) -> Option<Arc<GraphResponse>> {
        self.ttl?;
        let now = Instant::now();
        let hit = self
            .entries
            .get(namespace)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| Arc::clone(&entry.response));

        if hit.is_none()
            && self
                .entries
                .remove_if(namespace, |_, entry| entry.expires_at <= now)
                .is_some()
        {
            debug!(namespace, "Evicted expired graph");
        }
        hit
    }

    /// Store a fresh graph, replacing any previous one for the namespace
    pub fn insert(&self, namespace: &str, response: Arc<GraphResponse>) {
        let Some(ttl) = self.ttl else {
            return;
        };
        self.entries.insert(
            namespace.to_string(),
            CacheEntry {
                response,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Number of stored entries, expired ones included until evicted
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
