//! Serve command - run the HTTP graph explorer

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use crate::config::ConfigArgs;
use crate::explorer::Explorer;
use crate::loader::{KubeResourceLoader, ManifestResourceLoader};
use crate::{server, Result};

/// Serve command arguments
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Shared configuration flags
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Address to listen on
    #[arg(long, env = "MESHMAP_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Serve graphs built from these manifests instead of the cluster
    #[arg(long = "manifests", short = 'f')]
    pub manifests: Vec<PathBuf>,
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = args.config.load()?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    let addr = config.listen;

    if args.manifests.is_empty() {
        let loader = KubeResourceLoader::from_config(&config).await?;
        server::serve(Arc::new(Explorer::new(loader, config)), addr).await
    } else {
        let loader = ManifestResourceLoader::new(args.manifests);
        server::serve(Arc::new(Explorer::new(loader, config)), addr).await
    }
}
