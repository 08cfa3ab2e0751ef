//! Manifest-backed loader

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use meshmap_common::{Error, NamespaceResources, ResourceSnapshot, Result};

use super::ResourceLoader;

const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Builds snapshots from YAML/JSON manifests on disk
///
/// Directories are read one level deep in file-name order. Documents in
/// namespaces other than the requested one land in the snapshot's extras.
#[derive(Clone, Debug)]
pub struct ManifestResourceLoader {
    paths: Vec<PathBuf>,
}

impl ManifestResourceLoader {
    /// Loader reading `paths`, each a manifest file or a directory of them
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    async fn manifest_files(&self, namespace: &str) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in &self.paths {
            let meta = tokio::fs::metadata(path)
                .await
                .map_err(|e| read_error(namespace, path, e))?;
            if !meta.is_dir() {
                files.push(path.clone());
                continue;
            }

            let mut entries = tokio::fs::read_dir(path)
                .await
                .map_err(|e| read_error(namespace, path, e))?;
            let mut found = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| read_error(namespace, path, e))?
            {
                let candidate = entry.path();
                if is_manifest(&candidate) {
                    found.push(candidate);
                }
            }
            found.sort();
            files.extend(found);
        }
        Ok(files)
    }
}

fn is_manifest(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext))
}

fn read_error(namespace: &str, path: &Path, err: std::io::Error) -> Error {
    Error::load_permanent(namespace, format!("failed to read {}: {}", path.display(), err))
}

#[async_trait]
impl ResourceLoader for ManifestResourceLoader {
    async fn load(
        &self,
        namespace: &str,
        extra_namespaces: &[String],
    ) -> Result<ResourceSnapshot> {
        let mut snapshot = ResourceSnapshot::new(NamespaceResources::new(namespace));
        for file in self.manifest_files(namespace).await? {
            let yaml = tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| read_error(namespace, &file, e))?;
            snapshot.add_manifests(&yaml).map_err(|e| {
                Error::load_permanent(namespace, format!("{}: {}", file.display(), e))
            })?;
            debug!(namespace, file = %file.display(), "Read manifest file");
        }

        for extra in extra_namespaces {
            if !snapshot.extras.iter().any(|ns| &ns.namespace == extra) {
                debug!(namespace, extra = %extra, "No manifests for extra namespace");
                snapshot.extras.push(NamespaceResources::new(extra.clone()));
            }
        }

        info!(
            namespace,
            files = self.paths.len(),
            resources = snapshot.primary.len(),
            "Loaded manifests"
        );
        Ok(snapshot)
    }
}
