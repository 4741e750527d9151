//! Clean command implementation

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::Cli;
use crate::naming::Channel;
use crate::tasks::catalog;

/// Remove previous artifacts from the output directory
#[derive(Args, Debug)]
pub struct CleanCommand {
    /// Only remove pre-release (`-NEXT`) artifacts
    #[arg(long)]
    pub next: bool,
}

impl CleanCommand {
    pub async fn execute(&self, cli: &Cli) -> Result<()> {
        let config = cli.load_config()?;
        let output_dir = config.output_dir();

        let graph = catalog::clean_graph(config, Channel::from_next_flag(self.next));
        catalog::run_to_completion(graph).await?;

        eprintln!(
            "{} Cleaned {}",
            "✓".green().bold(),
            output_dir.display().to_string().cyan()
        );
        Ok(())
    }
}
