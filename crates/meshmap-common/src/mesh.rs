//! Istio mesh constants
//!
//! Single source of truth for the names, labels and heuristics the graph
//! engine relies on when reading Istio configuration.

// =============================================================================
// DNS
// =============================================================================

/// Cluster DNS domain appended to `<name>.<namespace>.svc`
pub const CLUSTER_DOMAIN: &str = "cluster.local";

/// Reserved gateway name meaning "all sidecars in the mesh".
///
/// Also used as the canonical host sentinel for the whole mesh.
pub const MESH_GATEWAY: &str = "mesh";

/// Namespace of the Istio control plane and its default gateways
pub const ISTIO_SYSTEM_NAMESPACE: &str = "istio-system";

// =============================================================================
// Egress gateways
// =============================================================================

/// Host or gateway-name fragments identifying an egress gateway
pub const EGRESS_GATEWAY_FRAGMENTS: [&str; 2] = ["egressgateway", "egress-gateway"];

// =============================================================================
// API groups
// =============================================================================

/// API version used for Istio networking resources
pub const NETWORKING_API_VERSION: &str = "networking.istio.io/v1beta1";

/// API version used for EnvoyFilter (never promoted past alpha3)
pub const NETWORKING_ALPHA_API_VERSION: &str = "networking.istio.io/v1alpha3";

// =============================================================================
// Sidecar detection
// =============================================================================

/// Name of the injected sidecar container
pub const SIDECAR_CONTAINER_NAME: &str = "istio-proxy";

/// Image fragment identifying the Istio proxy image
pub const SIDECAR_IMAGE_FRAGMENT: &str = "istio/proxy";

/// Pod annotation written by the sidecar injector
pub const SIDECAR_STATUS_ANNOTATION: &str = "sidecar.istio.io/status";

// =============================================================================
// Diagnostics heuristics
// =============================================================================

/// Ports that almost always carry HTTP; a TCP route to one of them is suspicious
pub const WELL_KNOWN_HTTP_PORTS: [u32; 3] = [80, 8080, 8000];

/// Route weight assumed when a destination does not declare one
pub const DEFAULT_ROUTE_WEIGHT: i64 = 100;
