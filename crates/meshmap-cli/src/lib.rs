//! meshmap CLI library
//!
//! Loaders, the per-namespace graph cache, the explorer service and its HTTP
//! transport, plus the `meshmap` command line.

#![deny(missing_docs)]

pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod explorer;
pub mod loader;
pub mod server;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};
use meshmap_common::telemetry::LogConfig;

/// meshmap - Istio routing topology explorer
#[derive(Parser, Debug)]
#[command(name = "meshmap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// meshmap subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the routing graph of a namespace as JSON
    Graph(commands::graph::GraphArgs),
    /// Serve routing graphs over HTTP
    Serve(commands::serve::ServeArgs),
}

impl Cli {
    /// Log format for the selected command: JSON for the server, compact
    /// stderr lines for one-shot runs
    pub fn log_config(&self) -> LogConfig {
        match self.command {
            Commands::Graph(_) => LogConfig::compact(),
            Commands::Serve(_) => LogConfig::json(),
        }
    }

    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Graph(args) => commands::graph::run(args).await,
            Commands::Serve(args) => commands::serve::run(args).await,
        }
    }
}
