//! Shared state of one CLI invocation

use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::ValueEnum;
use parking_lot::Mutex;
use tracing::error;

use crate::bundler::{BuildScope, BundleCache, BundleReport, Bundler};
use crate::config::Config;
use crate::naming::{BuildTarget, Channel, Format};

/// Development builds skip the minified variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RunMode {
    #[default]
    Development,
    Production,
}

/// Everything the bundle tasks share
pub struct BuildContext {
    pub config: Arc<Config>,
    pub bundler: Bundler,
    pub cache: BundleCache,
    pub channel: Channel,
    pub scope: BuildScope,
    pub mode: RunMode,
    reports: Mutex<Vec<BundleReport>>,
}

impl BuildContext {
    pub fn new(config: Arc<Config>, channel: Channel, mode: RunMode, combined: bool) -> Self {
        let scope = if combined {
            BuildScope::Combined(config.build.libraries.clone())
        } else {
            BuildScope::Single
        };

        Self {
            bundler: Bundler::new(config.clone()),
            config,
            cache: BundleCache::new(),
            channel,
            scope,
            mode,
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Variants built for `format`: always the readable one, plus the
    /// minified one in production when the format allows it
    pub fn targets_for(&self, format: Format) -> Vec<BuildTarget> {
        let mut targets = vec![BuildTarget::new(format, false, self.channel)];
        if self.mode == RunMode::Production && format.allows_minify() {
            targets.push(BuildTarget::new(format, true, self.channel));
        }
        targets
    }

    /// Build every variant of `format`. All variants are attempted; the
    /// task fails if any of them did.
    pub async fn build_format(&self, format: Format) -> Result<()> {
        let mut failures = Vec::new();

        for target in self.targets_for(format) {
            match self.bundler.produce_bundle(target, &self.scope, &self.cache).await {
                Ok(report) => self.reports.lock().push(report),
                Err(err) => {
                    let name = self.config.artifact_name(self.scope.is_combined());
                    let filename = target.filename(name);
                    error!("{}: {:#}", filename, err);
                    failures.push(format!("{}: {:#}", filename, err));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(failures.join("; ")))
        }
    }

    /// Reports collected since the last call
    pub fn take_reports(&self) -> Vec<BundleReport> {
        std::mem::take(&mut *self.reports.lock())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;
    use crate::config::EffectiveConfig;

    fn context(root: &std::path::Path, mode: RunMode) -> BuildContext {
        let values = json!({ "name": "tweenjs", "version": "1.0.0" })
            .as_object()
            .unwrap()
            .clone();
        let config =
            Config::from_effective(EffectiveConfig::from_map(values), root.to_path_buf()).unwrap();
        BuildContext::new(Arc::new(config), Channel::Stable, mode, false)
    }

    #[test]
    fn test_targets_by_mode() {
        let dir = tempfile::tempdir().unwrap();

        let dev = context(dir.path(), RunMode::Development);
        assert_eq!(dev.targets_for(Format::Global).len(), 1);

        let prod = context(dir.path(), RunMode::Production);
        let global: Vec<bool> = prod
            .targets_for(Format::Global)
            .iter()
            .map(|t| t.minified)
            .collect();
        assert_eq!(global, vec![false, true]);
        assert_eq!(prod.targets_for(Format::Esm).len(), 1);
    }

    #[tokio::test]
    async fn test_build_format_collects_reports() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.js"), "export var Tween = 1;\n").unwrap();

        let ctx = context(dir.path(), RunMode::Production);
        ctx.build_format(Format::CommonJs).await.unwrap();

        let names: Vec<String> = ctx
            .take_reports()
            .iter()
            .map(|r| r.output_path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["tweenjs.cjs.js", "tweenjs.cjs.min.js"]);
        assert!(ctx.take_reports().is_empty());
    }

    #[tokio::test]
    async fn test_build_format_fails_without_entry() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), RunMode::Development);

        let err = ctx.build_format(Format::Global).await.unwrap_err();
        assert!(err.to_string().contains("tweenjs.js"));
    }
}
