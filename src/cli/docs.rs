//! Docs command implementation

use std::time::Instant;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::{print_done, Cli};
use crate::tasks::catalog;

/// Regenerate the API documentation from scratch
#[derive(Args, Debug)]
pub struct DocsCommand {}

impl DocsCommand {
    pub async fn execute(&self, cli: &Cli) -> Result<()> {
        let start = Instant::now();
        let config = cli.load_config()?;

        eprintln!(
            "{} Generating documentation with {}...",
            "→".blue(),
            config.build.docs.command.bold()
        );

        catalog::run_to_completion(catalog::docs_graph(config)).await?;
        print_done("Documentation generated", start.elapsed());
        Ok(())
    }
}
