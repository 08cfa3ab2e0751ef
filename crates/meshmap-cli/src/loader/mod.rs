//! Resource loading
//!
//! A [`ResourceLoader`] produces the [`ResourceSnapshot`] a graph build reads.
//! The cluster-backed implementation lists everything through kube; the
//! manifest-backed one reads YAML from disk for offline use and tests.

mod cluster;
mod file;

pub use self::cluster::KubeResourceLoader;
pub use self::file::ManifestResourceLoader;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use meshmap_common::{ResourceSnapshot, Result};

/// Source of resource snapshots
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    /// Load `namespace` plus `extra_namespaces` (used only for cross-namespace
    /// lookups). Failures are `Error::Load` naming the namespace.
    async fn load(&self, namespace: &str, extra_namespaces: &[String])
        -> Result<ResourceSnapshot>;
}
