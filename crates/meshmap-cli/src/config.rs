//! Explorer configuration
//!
//! Values come from three layers (highest priority first):
//! 1. CLI flags / `MESHMAP_*` environment variables
//! 2. The `--config` file (YAML or JSON)
//! 3. Built-in defaults

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use meshmap_common::DEFAULT_NAMESPACE;
use meshmap_graph::BuildOptions;

use crate::{Error, Result};

/// Default lifetime of a cached graph
pub const DEFAULT_CACHE_TTL_SECONDS: i64 = 15;
/// Default bound on each cluster listing
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;
/// Default HTTP listen address
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Settings shared by the `graph` and `serve` commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Namespace inspected when a request does not name one
    pub namespace: String,
    /// Kubeconfig path; inferred when unset
    pub kubeconfig: Option<PathBuf>,
    /// Namespaces loaded alongside the requested one for cross-namespace lookups
    pub extra_namespaces: Vec<String>,
    /// Cache lifetime; zero or negative disables caching
    pub cache_ttl_seconds: i64,
    /// Timeout applied to each cluster listing
    pub request_timeout_seconds: u64,
    /// Emit container-level nodes
    pub expand_containers: bool,
    /// HTTP listen address for `serve`
    pub listen: SocketAddr,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            kubeconfig: None,
            extra_namespaces: Vec::new(),
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            expand_containers: false,
            listen: default_listen(),
        }
    }
}

impl ExplorerConfig {
    /// Load from a YAML or JSON file (JSON is valid YAML)
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&data)
            .map_err(|e| Error::config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Parse from a YAML or JSON string
    pub fn from_yaml(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no run could use
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_seconds == 0 {
            return Err(Error::config("request_timeout_seconds must be positive"));
        }
        Ok(())
    }

    /// Requested namespace, or the configured default when blank or absent
    pub fn resolve_namespace(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| {
                let configured = self.namespace.trim();
                if configured.is_empty() {
                    DEFAULT_NAMESPACE
                } else {
                    configured
                }
            })
            .to_string()
    }

    /// Extra namespaces for a build of `namespace`: blanks, duplicates and
    /// the namespace itself are dropped, order kept
    pub fn extra_namespaces_for(&self, namespace: &str) -> Vec<String> {
        let mut extras: Vec<String> = Vec::with_capacity(self.extra_namespaces.len());
        for ns in &self.extra_namespaces {
            let ns = ns.trim();
            if ns.is_empty() || ns == namespace || extras.iter().any(|e| e == ns) {
                continue;
            }
            extras.push(ns.to_string());
        }
        extras
    }

    /// Cache lifetime, `None` when caching is disabled
    pub fn cache_ttl(&self) -> Option<Duration> {
        u64::try_from(self.cache_ttl_seconds)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Bound on each cluster listing
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Graph build options derived from the config
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            expand_containers: self.expand_containers,
        }
    }
}

/// Configuration flags shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Config file (YAML or JSON)
    #[arg(long, env = "MESHMAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Namespace to inspect
    #[arg(long, short = 'n', env = "MESHMAP_NAMESPACE")]
    pub namespace: Option<String>,

    /// Path to kubeconfig
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Additional namespace for cross-namespace lookups (repeatable)
    #[arg(
        long = "extra-namespace",
        env = "MESHMAP_EXTRA_NAMESPACES",
        value_delimiter = ','
    )]
    pub extra_namespaces: Vec<String>,

    /// Cache lifetime in seconds (0 or negative disables caching)
    #[arg(long, env = "MESHMAP_CACHE_TTL_SECONDS", allow_negative_numbers = true)]
    pub cache_ttl_seconds: Option<i64>,

    /// Timeout for each cluster listing in seconds
    #[arg(long, env = "MESHMAP_REQUEST_TIMEOUT_SECONDS")]
    pub request_timeout_seconds: Option<u64>,

    /// Emit container-level nodes
    #[arg(long, env = "MESHMAP_EXPAND_CONTAINERS")]
    pub expand_containers: bool,
}

impl ConfigArgs {
    /// Resolve the effective configuration: file (or defaults) overlaid with flags
    pub fn load(&self) -> Result<ExplorerConfig> {
        let base = match &self.config {
            Some(path) => ExplorerConfig::from_file(path)?,
            None => ExplorerConfig::default(),
        };
        self.apply(base)
    }

    fn apply(&self, mut config: ExplorerConfig) -> Result<ExplorerConfig> {
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            config.kubeconfig = Some(kubeconfig.clone());
        }
        if !self.extra_namespaces.is_empty() {
            config.extra_namespaces = self.extra_namespaces.clone();
        }
        if let Some(ttl) = self.cache_ttl_seconds {
            config.cache_ttl_seconds = ttl;
        }
        if let Some(timeout) = self.request_timeout_seconds {
            config.request_timeout_seconds = timeout;
        }
        if self.expand_containers {
            config.expand_containers = true;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ExplorerConfig::default();
        assert_eq!(config.namespace, "default");
        assert_eq!(config.cache_ttl_seconds, 15);
        assert_eq!(config.request_timeout_seconds, 10);
        assert!(!config.expand_containers);
        assert_eq!(config.listen.to_string(), DEFAULT_LISTEN);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ExplorerConfig::from_yaml(
            "namespace: bookinfo\nextra_namespaces: [data]\ncache_ttl_seconds: 0\n",
        )
        .unwrap();
        assert_eq!(config.namespace, "bookinfo");
        assert_eq!(config.extra_namespaces, vec!["data".to_string()]);
        assert_eq!(config.cache_ttl(), None);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_json_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"namespace": "shop", "listen": "127.0.0.1:9090", "expand_containers": true}}"#
        )
        .unwrap();

        let config = ExplorerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.namespace, "shop");
        assert_eq!(config.listen.port(), 9090);
        assert!(config.build_options().expand_containers);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ExplorerConfig::from_file(Path::new("/nonexistent/meshmap.yaml")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = ExplorerConfig::from_yaml("request_timeout_seconds: 0").unwrap_err();
        assert!(err.to_string().contains("request_timeout_seconds"));
    }

    #[test]
    fn test_blank_namespace_falls_back_to_default() {
        let config = ExplorerConfig {
            namespace: "shop".to_string(),
            ..Default::default()
        };
        assert_eq!(config.resolve_namespace(None), "shop");
        assert_eq!(config.resolve_namespace(Some("  ")), "shop");
        assert_eq!(config.resolve_namespace(Some("payments")), "payments");

        let blank = ExplorerConfig {
            namespace: String::new(),
            ..Default::default()
        };
        assert_eq!(blank.resolve_namespace(Some("")), "default");
    }

    #[test]
    fn test_extra_namespaces_filtered() {
        let config = ExplorerConfig {
            extra_namespaces: vec![
                "data".to_string(),
                " ".to_string(),
                "shop".to_string(),
                "data".to_string(),
                "infra".to_string(),
            ],
            ..Default::default()
        };
        assert_eq!(
            config.extra_namespaces_for("shop"),
            vec!["data".to_string(), "infra".to_string()]
        );
    }

    #[test]
    fn test_negative_ttl_disables_cache() {
        let config = ExplorerConfig {
            cache_ttl_seconds: -5,
            ..Default::default()
        };
        assert_eq!(config.cache_ttl(), None);
    }

    #[test]
    fn test_flags_override_file_values() {
        let args = ConfigArgs {
            namespace: Some("payments".to_string()),
            extra_namespaces: vec!["shared".to_string()],
            cache_ttl_seconds: Some(-1),
            expand_containers: true,
            ..Default::default()
        };
        let base = ExplorerConfig::from_yaml("namespace: shop\nrequest_timeout_seconds: 3").unwrap();

        let config = args.apply(base).unwrap();
        assert_eq!(config.namespace, "payments");
        assert_eq!(config.extra_namespaces, vec!["shared".to_string()]);
        assert_eq!(config.cache_ttl(), None);
        assert_eq!(config.request_timeout_seconds, 3);
        assert!(config.expand_containers);
    }
}
