//! Link command implementation

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use super::Cli;
use crate::naming::to_short_id;
use crate::tasks::catalog;

/// Make sibling libraries importable from this checkout
#[derive(Args, Debug)]
pub struct LinkCommand {
    /// Library to link, by id (`easel`) or display name (`EaselJS`)
    #[arg(long, conflicts_with = "all")]
    pub lib: Option<String>,

    /// Link every configured library
    #[arg(long)]
    pub all: bool,
}

impl LinkCommand {
    pub async fn execute(&self, cli: &Cli) -> Result<()> {
        let config = cli.load_config()?;

        let libraries = match (&self.lib, self.all) {
            (Some(lib), _) => vec![to_short_id(lib)],
            (None, true) => config.build.libraries.clone(),
            (None, false) => bail!("Nothing to link: pass --lib <id> or --all"),
        };

        eprintln!(
            "{} Linking {}...",
            "→".blue(),
            libraries.join(", ").bold()
        );

        catalog::run_to_completion(catalog::link_graph(config, libraries)).await
    }
}
