//! Bundler plugins
//!
//! A Rollup-style hook pipeline. The plugin set is chosen per output format:
//! every format resolves externals and JSON modules, and only the CommonJS
//! and global formats carry the oxc lowering transform.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::naming::Format;
use crate::transform::{downlevel, Printed};

/// Result of a resolve hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveResult {
    /// Continue to next plugin
    Skip,
    /// Mark as external (don't bundle)
    External,
}

/// Result of a transform hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformResult {
    /// Continue to next plugin (no transformation)
    Skip,
    /// Transformed code, line for line with its input
    Transformed(String),
    /// Code printed from an AST, with its own line table
    Reprinted(Printed),
}

/// Plugin trait
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name for logging and debugging
    fn name(&self) -> &str;

    /// Claim a specifier before filesystem resolution
    async fn resolve_id(&self, _specifier: &str, _importer: &Path) -> Result<ResolveResult> {
        Ok(ResolveResult::Skip)
    }

    /// Transform the code of a module
    async fn transform(&self, _code: &str, _id: &Path) -> Result<TransformResult> {
        Ok(TransformResult::Skip)
    }
}

/// Plugin manager
#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugin set for one output format
    pub fn for_format(format: Format, externals: &[String]) -> Self {
        let mut manager = Self::new();
        manager.register(Arc::new(ExternalsPlugin::new(externals)));
        manager.register(Arc::new(JsonPlugin));
        if format.needs_downlevel() {
            manager.register(Arc::new(DownlevelPlugin));
        }
        manager
    }

    /// Register a plugin
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Run resolve_id hooks; `true` when a plugin marked the specifier external
    pub async fn is_external(&self, specifier: &str, importer: &Path) -> Result<bool> {
        for plugin in &self.plugins {
            match plugin.resolve_id(specifier, importer).await? {
                ResolveResult::Skip => continue,
                ResolveResult::External => return Ok(true),
            }
        }
        Ok(false)
    }

    /// Run transform hooks in registration order. The line table of the
    /// result points into `code`.
    pub async fn transform(&self, code: &str, id: &Path) -> Result<Printed> {
        let mut current = Printed::identity(code.to_string());

        for plugin in &self.plugins {
            let result = plugin
                .transform(&current.code, id)
                .await
                .with_context(|| format!("plugin '{}' failed on {}", plugin.name(), id.display()))?;
            match result {
                TransformResult::Skip => {}
                TransformResult::Transformed(code) => current.code = code,
                TransformResult::Reprinted(printed) => current = printed.through(&current.lines),
            }
        }

        Ok(current)
    }
}

/// Keeps configured bare specifiers out of the bundle
pub struct ExternalsPlugin {
    externals: HashSet<String>,
}

impl ExternalsPlugin {
    pub fn new(externals: &[String]) -> Self {
        Self {
            externals: externals.iter().cloned().collect(),
        }
    }
}

#[async_trait]
impl Plugin for ExternalsPlugin {
    fn name(&self) -> &str {
        "externals"
    }

    async fn resolve_id(&self, specifier: &str, _importer: &Path) -> Result<ResolveResult> {
        // `lodash/debounce` is external when `lodash` is
        let package = specifier.split('/').next().unwrap_or(specifier);
        if self.externals.contains(specifier) || self.externals.contains(package) {
            Ok(ResolveResult::External)
        } else {
            Ok(ResolveResult::Skip)
        }
    }
}

/// JSON plugin - turns JSON files into CommonJS modules
pub struct JsonPlugin;

#[async_trait]
impl Plugin for JsonPlugin {
    fn name(&self) -> &str {
        "json"
    }

    async fn transform(&self, code: &str, id: &Path) -> Result<TransformResult> {
        if id.extension().and_then(|e| e.to_str()) != Some("json") {
            return Ok(TransformResult::Skip);
        }

        serde_json::from_str::<serde_json::Value>(code)
            .with_context(|| format!("Invalid JSON in {}", id.display()))?;

        Ok(TransformResult::Transformed(format!(
            "module.exports = {};",
            code.trim_end()
        )))
    }
}

/// Lowers newer syntax for runtimes that only speak ES5
pub struct DownlevelPlugin;

#[async_trait]
impl Plugin for DownlevelPlugin {
    fn name(&self) -> &str {
        "downlevel"
    }

    async fn transform(&self, code: &str, id: &Path) -> Result<TransformResult> {
        if id.extension().and_then(|e| e.to_str()) == Some("json") {
            return Ok(TransformResult::Skip);
        }
        Ok(TransformResult::Reprinted(downlevel(code, id)?))
    }
}
