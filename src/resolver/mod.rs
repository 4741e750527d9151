//! Module resolution
//!
//! Handles resolving import specifiers to actual file paths with
//! `oxc_resolver`. Relative specifiers must resolve; bare specifiers are
//! looked up in `node_modules` and otherwise left to the runtime as
//! externals.

use std::path::{Path, PathBuf};

use anyhow::Result;
use oxc_resolver::{ResolveOptions, Resolver as OxcResolver};
use tracing::debug;

use crate::bundler::ModuleType;
use crate::error::BuildError;
use crate::transform::analyze_module;

/// Extensions tried for extensionless specifiers, in order
const EXTENSIONS: [&str; 4] = [".js", ".mjs", ".cjs", ".json"];

/// Outcome of resolving one specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A file that becomes part of the bundle
    File(PathBuf),
    /// Left as a runtime dependency
    External,
}

/// Module resolver
///
/// Lookups are cached, so a resolver should live no longer than one build.
pub struct Resolver {
    inner: OxcResolver,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        let options = ResolveOptions {
            extensions: EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            main_fields: vec!["module".to_string(), "main".to_string()],
            condition_names: vec!["import".to_string(), "default".to_string()],
            ..ResolveOptions::default()
        };
        Self {
            inner: OxcResolver::new(options),
        }
    }

    /// Import specifiers of a module's transformed code
    pub fn extract_dependencies(
        &self,
        code: &str,
        module_type: &ModuleType,
        path: &Path,
    ) -> Result<Vec<String>> {
        if !module_type.is_js_like() {
            return Ok(Vec::new());
        }
        Ok(analyze_module(code, path)?.specifiers)
    }

    /// Resolve `specifier` as imported from the file `from`
    pub fn resolve(&self, specifier: &str, from: &Path) -> Result<Resolution> {
        let dir = from.parent().unwrap_or_else(|| Path::new("."));

        match self.inner.resolve(dir, specifier) {
            Ok(resolution) => Ok(Resolution::File(resolution.into_path_buf())),
            Err(e) if is_path_like(specifier) => {
                debug!("Failed to resolve '{}': {}", specifier, e);
                Err(BuildError::Unresolved {
                    specifier: specifier.to_string(),
                    importer: from.to_path_buf(),
                }
                .into())
            }
            Err(e) => {
                debug!("Leaving '{}' to the runtime: {}", specifier, e);
                Ok(Resolution::External)
            }
        }
    }
}

fn is_path_like(specifier: &str) -> bool {
    specifier.starts_with('.') || specifier.starts_with('/')
}
