//! Build command implementation

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::{print_done, print_reports, run_with_spinner, Cli};
use crate::naming::{Channel, Format};
use crate::tasks::{catalog, BuildContext};

/// Clean the output directory and bundle every format
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Build the pre-release channel (`-NEXT` artifacts)
    #[arg(long)]
    pub next: bool,

    /// Formats to build; all of them when omitted
    #[arg(short, long, value_enum)]
    pub format: Vec<Format>,
}

impl BuildCommand {
    pub async fn execute(&self, cli: &Cli) -> Result<()> {
        let start = Instant::now();
        let config = cli.load_config()?;
        let formats = selected_formats(&self.format);

        let ctx = Arc::new(BuildContext::new(
            config,
            Channel::from_next_flag(self.next),
            cli.mode,
            cli.combined,
        ));

        eprintln!(
            "{} Building {} ({:?})...",
            "→".blue(),
            ctx.config.display_name(cli.combined).bold(),
            cli.mode
        );

        let result = run_with_spinner(catalog::build_graph(&ctx, &formats), "Bundling").await;
        let reports = ctx.take_reports();
        print_reports(&reports);
        result?;

        print_done(&format!("Built {} bundle(s)", reports.len()), start.elapsed());
        Ok(())
    }
}

/// An empty `--format` list means every format
pub(super) fn selected_formats(requested: &[Format]) -> Vec<Format> {
    if requested.is_empty() {
        Format::ALL.to_vec()
    } else {
        let mut formats = requested.to_vec();
        formats.dedup();
        formats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selected_formats() {
        assert_eq!(selected_formats(&[]), Format::ALL.to_vec());
        assert_eq!(selected_formats(&[Format::Global, Format::Global]), vec![Format::Global]);
    }
}
