//! Host canonicalization
//!
//! Istio resources refer to the same service by many spellings: `reviews`,
//! `reviews.bookinfo`, `reviews.bookinfo.svc` and
//! `reviews.bookinfo.svc.cluster.local` all name one Service. Every index in
//! the graph engine is keyed by the canonical form produced here.
//!
//! Canonicalization is relative to a namespace: the namespace of the resource
//! that declared the reference. A VirtualService's hosts use the
//! VirtualService namespace; a route destination uses the destination's own
//! namespace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mesh::{CLUSTER_DOMAIN, MESH_GATEWAY};

/// Canonicalize a host reference relative to `namespace`.
///
/// Blank input is returned unchanged; callers treat it as invalid. `mesh` is a
/// sentinel and is never namespace qualified. Hosts that are not recognisably
/// cluster-local (e.g. `api.example.com`) are returned lower-cased and
/// otherwise untouched.
pub fn canonical_host(raw: &str, namespace: &str) -> String {
    if raw.trim().is_empty() {
        return raw.to_string();
    }

    let host = raw.trim().to_ascii_lowercase();
    if host == MESH_GATEWAY {
        return host;
    }
    if host.ends_with(".svc.cluster.local") || host.ends_with(".cluster.local") {
        return host;
    }
    if host.ends_with(".svc") {
        return format!("{}.{}", host, CLUSTER_DOMAIN);
    }
    if host.contains(".svc.") {
        return host;
    }

    let namespace = namespace.trim().to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').collect();
    match labels.as_slice() {
        [name] => service_fqdn(name, &namespace),
        [name, ns] if *ns == namespace => service_fqdn(name, ns),
        _ => host,
    }
}

/// Fully qualified in-cluster DNS name of a Service
pub fn service_fqdn(name: &str, namespace: &str) -> String {
    format!("{}.{}.svc.{}", name, namespace, CLUSTER_DOMAIN)
}

/// Every spelling a Service can be addressed by, bare name first.
pub fn service_host_variants(name: &str, namespace: &str) -> [String; 4] {
    [
        name.to_string(),
        format!("{}.{}", name, namespace),
        format!("{}.{}.svc", name, namespace),
        service_fqdn(name, namespace),
    ]
}

/// A host reference in canonical form
///
/// Construct through [`CanonicalHost::new`] so the invariant holds; the
/// wrapped string is what every index is keyed by.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalHost(String);

impl CanonicalHost {
    /// Canonicalize `raw` relative to `namespace`
    pub fn new(raw: &str, namespace: &str) -> Self {
        Self(canonical_host(raw, namespace))
    }

    /// The `mesh` sentinel
    pub fn mesh() -> Self {
        Self(MESH_GATEWAY.to_string())
    }

    /// Borrow the canonical string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the `mesh` sentinel
    pub fn is_mesh(&self) -> bool {
        self.0 == MESH_GATEWAY
    }

}

impl fmt::Display for CanonicalHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalHost {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
