//! meshctx CLI: service-mesh topology extraction and context assembly.
//!
//! Collects workload call graphs from Prometheus request telemetry, stores
//! them as snapshots, and serves per-workload context documents.

mod commands;
mod serve;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
