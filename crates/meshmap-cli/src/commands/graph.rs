//! Graph command - print the routing graph of one namespace as JSON

use std::path::PathBuf;

use clap::Args;

use meshmap_graph::GraphResponse;

use crate::config::ConfigArgs;
use crate::Result;

/// Graph command arguments
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Shared configuration flags
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Read manifests from these files or directories instead of the cluster
    #[arg(long = "manifests", short = 'f')]
    pub manifests: Vec<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

/// Run the graph command
pub async fn run(args: GraphArgs) -> Result<()> {
    let config = args.config.load()?;
    let graph = super::build_once(config, args.manifests).await?;
    println!("{}", render(&graph, args.pretty)?);
    Ok(())
}

/// Serialize a graph for stdout
pub fn render(graph: &GraphResponse, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(graph)?
    } else {
        serde_json::to_string(graph)?
    };
    Ok(json)
}
