//! meshmap
//!
//! Explore the routing topology Istio resources declare in a namespace.

use clap::Parser;
use meshmap_common::telemetry::init_logging;

use meshmap_cli::{Cli, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_config())?;
    cli.run().await
}
