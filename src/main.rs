//! createjs-build - build orchestration for the CreateJS libraries
//!
//! # Features
//! - Module, CommonJS and global bundles, stable and `-NEXT` channels
//! - Minified variants with license banners, source maps for readable ones
//! - Dev server with WebSocket live reload and a rebuilding watcher
//! - Documentation, test and link tasks driven by the same config

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use createjs_build::Cli;

/// Initialize the logging/tracing system
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("createjs_build=debug,tower_http=debug"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("createjs_build=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    cli.execute().await
}
