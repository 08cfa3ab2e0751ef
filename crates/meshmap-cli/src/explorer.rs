//! Graph explorer service
//!
//! Glues a [`ResourceLoader`], the [`GraphCache`] and the [`GraphBuilder`]:
//! resolve the namespace, serve a fresh cached graph if there is one,
//! otherwise load, build, cache and return.

use std::sync::Arc;

use tracing::{debug, instrument};

use meshmap_graph::{GraphBuilder, GraphResponse, RoutesResponse};

use crate::cache::GraphCache;
use crate::config::ExplorerConfig;
use crate::loader::ResourceLoader;
use crate::Result;

/// Builds graphs on demand for the CLI and the HTTP server
pub struct Explorer<L: ResourceLoader> {
    loader: L,
    cache: GraphCache,
    builder: GraphBuilder,
    config: ExplorerConfig,
}

impl<L: ResourceLoader> Explorer<L> {
    /// Explorer over `loader`; the cache lifetime and build options come from `config`
    pub fn new(loader: L, config: ExplorerConfig) -> Self {
        Self {
            loader,
            cache: GraphCache::new(config.cache_ttl()),
            builder: GraphBuilder::new(config.build_options()),
            config,
        }
    }

    /// Effective configuration
    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// The per-namespace graph cache
    pub fn cache(&self) -> &GraphCache {
        &self.cache
    }

    /// Graph of `requested` (or the configured default namespace)
    #[instrument(skip(self), fields(namespace = tracing::field::Empty))]
    pub async fn build_graph(&self, requested: Option<&str>) -> Result<Arc<GraphResponse>> {
        let namespace = self.config.resolve_namespace(requested);
        tracing::Span::current().record("namespace", namespace.as_str());

        if let Some(hit) = self.cache.get(&namespace) {
            debug!("Serving cached graph");
            return Ok(hit);
        }

        let extras = self.config.extra_namespaces_for(&namespace);
        let snapshot = self
            .loader
            .load(&namespace, &extras)
            .await
            .map_err(|e| scope_to_namespace(&namespace, e))?;

        let response = Arc::new(self.builder.build(&snapshot)?);
        self.cache.insert(&namespace, Arc::clone(&response));
        Ok(response)
    }

    /// Routes of `requested` grouped by VirtualService, derived from its
    /// (possibly cached) graph
    pub async fn build_routes(&self, requested: Option<&str>) -> Result<RoutesResponse> {
        let graph = self.build_graph(requested).await?;
        Ok(RoutesResponse::from_graph(&graph))
    }
}

/// Loader failures always name the namespace; errors that already carry one
/// pass through untouched
fn scope_to_namespace(namespace: &str, err: meshmap_common::Error) -> meshmap_common::Error {
    if err.namespace().is_some() {
        return err;
    }
    let message = err.to_string();
    if err.is_retryable() {
        meshmap_common::Error::load(namespace, message)
    } else {
        meshmap_common::Error::load_permanent(namespace, message)
    }
}
