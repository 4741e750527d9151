//! Development server command implementation

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::Cli;
use crate::naming::{Channel, Format};
use crate::server::DevServerOptions;
use crate::tasks::{catalog, BuildContext};

/// Build, then serve with live reload and rebuild on change
#[derive(Args, Debug)]
pub struct DevCommand {
    /// Build the pre-release channel (`-NEXT` artifacts)
    #[arg(long)]
    pub next: bool,

    /// Port to run the dev server on, overriding `dev.port`
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl DevCommand {
    pub async fn execute(&self, cli: &Cli) -> Result<()> {
        let config = cli.load_config()?;

        let mut options = DevServerOptions::from_config(&config);
        if let Some(port) = self.port {
            options.port = port;
        }
        let live_reload = options.live_reload;
        let addr = format!("{}:{}", options.host, options.port);

        let ctx = Arc::new(BuildContext::new(
            config,
            Channel::from_next_flag(self.next),
            cli.mode,
            cli.combined,
        ));

        eprintln!(
            "{} Starting dev server at {}\n",
            "→".blue(),
            format!("http://{}", addr).cyan().underline()
        );

        if live_reload {
            eprintln!("  {} Live reload {}", "•".dimmed(), "enabled".green());
        }

        eprintln!("  {} Press {} to stop\n", "•".dimmed(), "Ctrl+C".yellow());

        catalog::run_to_completion(catalog::dev_graph(&ctx, &Format::ALL, options)).await
    }
}
