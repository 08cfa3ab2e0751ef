//! CLI commands

use std::path::PathBuf;
use std::sync::Arc;

use meshmap_graph::GraphResponse;

use crate::config::ExplorerConfig;
use crate::explorer::Explorer;
use crate::loader::{KubeResourceLoader, ManifestResourceLoader};
use crate::Result;

pub mod graph;
pub mod serve;

/// Build one graph from manifests when given, else from the cluster
async fn build_once(
    config: ExplorerConfig,
    manifests: Vec<PathBuf>,
) -> Result<Arc<GraphResponse>> {
    if manifests.is_empty() {
        let loader = KubeResourceLoader::from_config(&config).await?;
        Explorer::new(loader, config).build_graph(None).await
    } else {
        Explorer::new(ManifestResourceLoader::new(manifests), config)
            .build_graph(None)
            .await
    }
}
