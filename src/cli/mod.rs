//! Command-line interface for createjs-build
//!
//! Each subcommand assembles a task graph and runs it:
//! - `build`: clean, then bundle every format
//! - `dev`: build, then serve and watch
//! - `test`: build, then run the test suite
//! - `docs`, `link`, `clean`: single-purpose graphs

mod build;
mod clean;
mod dev;
mod docs;
mod link;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::bundler::BundleReport;
use crate::config::Config;
use crate::tasks::{catalog, RunMode, TaskGraph};
use crate::utils::{format_duration, format_size};

pub use build::BuildCommand;
pub use clean::CleanCommand;
pub use dev::DevCommand;
pub use docs::DocsCommand;
pub use link::LinkCommand;
pub use test::TestCommand;

/// Build orchestration for the CreateJS libraries
#[derive(Parser, Debug)]
#[command(name = "createjs-build")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the base config file; `<name>.local.json` next to it overrides it
    #[arg(short, long, global = true, default_value = "config.json")]
    pub config: String,

    /// Production builds also write minified variants
    #[arg(long, global = true, value_enum, env = "CREATEJS_MODE", default_value = "development")]
    pub mode: RunMode,

    /// Merge every configured library into one artifact
    #[arg(long, global = true, env = "CREATEJS_COMBINED", value_parser = FalseyValueParser::new())]
    pub combined: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clean and bundle every format
    Build(BuildCommand),

    /// Build, then serve with live reload and rebuild on change
    Dev(DevCommand),

    /// Build, then run the test suite
    Test(TestCommand),

    /// Regenerate the API documentation
    Docs(DocsCommand),

    /// Link sibling libraries into node_modules
    Link(LinkCommand),

    /// Remove previous artifacts
    Clean(CleanCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::Build(cmd) => cmd.execute(self).await,
            Commands::Dev(cmd) => cmd.execute(self).await,
            Commands::Test(cmd) => cmd.execute(self).await,
            Commands::Docs(cmd) => cmd.execute(self).await,
            Commands::Link(cmd) => cmd.execute(self).await,
            Commands::Clean(cmd) => cmd.execute(self).await,
        }
    }

    pub(crate) fn load_config(&self) -> Result<Arc<Config>> {
        info!("Loading configuration from {}", self.config);
        Ok(Arc::new(Config::load(&self.config)?))
    }
}

/// Print the createjs-build banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "⚡".cyan(),
        "createjs-build".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}

/// Run a graph that terminates, with a spinner on stderr meanwhile
async fn run_with_spinner(graph: TaskGraph, message: &str) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));

    let result = catalog::run_to_completion(graph).await;
    spinner.finish_and_clear();
    result
}

/// One line per written artifact
fn print_reports(reports: &[BundleReport]) {
    for report in reports {
        let mut line = format!(
            "  {} {} {}",
            "•".dimmed(),
            report.output_path.display().to_string().cyan(),
            format_size(report.size).dimmed()
        );
        if report.reused > 0 {
            let cached = format!("({}/{} cached)", report.reused, report.modules);
            line.push_str(&format!(" {}", cached.dimmed()));
        }
        eprintln!("{}", line);

        if !report.skipped.is_empty() {
            eprintln!(
                "    {} left out: {}",
                "!".yellow(),
                report.skipped.join(", ").yellow()
            );
        }
    }
}

fn print_done(what: &str, elapsed: Duration) {
    eprintln!(
        "\n{} {} in {}\n",
        "✓".green().bold(),
        what,
        format_duration(elapsed)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::Format;

    #[test]
    fn test_parse_globals_after_subcommand() {
        let cli = Cli::try_parse_from([
            "createjs-build",
            "build",
            "--next",
            "--format",
            "module",
            "--format",
            "global",
            "--mode",
            "production",
            "--config",
            "other.json",
        ])
        .unwrap();

        assert_eq!(cli.mode, RunMode::Production);
        assert_eq!(cli.config, "other.json");
        match cli.command {
            Commands::Build(cmd) => {
                assert!(cmd.next);
                assert_eq!(cmd.format, vec![Format::Esm, Format::Global]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_link_flags_conflict() {
        let both = ["createjs-build", "link", "--lib", "easel", "--all"];
        assert!(Cli::try_parse_from(both).is_err());
        assert!(Cli::try_parse_from(["createjs-build", "link", "--all"]).is_ok());
    }
}
