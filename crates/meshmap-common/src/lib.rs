//! Common types for meshmap: Istio resource models, snapshots, errors and
//! host canonicalization

#![deny(missing_docs)]

pub mod error;
pub mod host;
pub mod kube_utils;
pub mod mesh;
pub mod resources;
pub mod snapshot;
pub mod telemetry;

pub use error::Error;
pub use host::{canonical_host, CanonicalHost};
pub use snapshot::{NamespaceResources, ResourceSnapshot};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace inspected when the caller does not name one
pub const DEFAULT_NAMESPACE: &str = "default";
