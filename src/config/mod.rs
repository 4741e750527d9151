//! Configuration handling
//!
//! A base `config.json` and an optional `config.local.json` are overlaid
//! into one effective configuration. The overlay is shallow: a key present
//! in the local file replaces the base value wholesale.

mod schema;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::BuildError;
use crate::naming::to_display_name;

pub use schema::*;

/// Merged key-value configuration, immutable once resolved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveConfig {
    values: Map<String, Value>,
}

impl EffectiveConfig {
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Deserialize the typed view, validating the version string
    pub fn typed(&self, source: &Path) -> Result<BuildConfig> {
        let config: BuildConfig = serde_json::from_value(Value::Object(self.values.clone()))
            .map_err(|e| BuildError::MalformedConfig {
                path: source.to_path_buf(),
                message: e.to_string(),
            })?;

        semver::Version::parse(&config.version).map_err(|e| BuildError::MalformedConfig {
            path: source.to_path_buf(),
            message: format!("invalid version '{}': {}", config.version, e),
        })?;

        Ok(config)
    }
}

/// Overlay `local` onto `base`, key by key
pub fn overlay(base: Map<String, Value>, local: Map<String, Value>) -> Map<String, Value> {
    let mut merged = base;
    for (key, value) in local {
        merged.insert(key, value);
    }
    merged
}

/// Read both files and overlay the local one onto the base one.
///
/// A file that cannot be read counts as empty. A file that reads but does
/// not parse as a JSON object is an error.
pub fn resolve_config(base_path: &Path, local_path: &Path) -> Result<EffectiveConfig> {
    let base = read_layer(base_path)?;
    let local = read_layer(local_path)?;
    debug!(
        "Resolved config: {} base key(s), {} local override(s)",
        base.len(),
        local.len()
    );
    Ok(EffectiveConfig::from_map(overlay(base, local)))
}

fn read_layer(path: &Path) -> Result<Map<String, Value>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("No config at {}, using empty layer", path.display());
            return Ok(Map::new());
        }
        Err(e) => {
            warn!("Could not read {}: {}; using empty layer", path.display(), e);
            return Ok(Map::new());
        }
    };

    let value: Value = serde_json::from_str(&content).map_err(|e| BuildError::MalformedConfig {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(BuildError::MalformedConfig {
            path: path.to_path_buf(),
            message: format!("expected a JSON object, found {}", json_kind(&other)),
        }
        .into()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// `config.json` -> `config.local.json`
pub fn local_path_for(base_path: &Path) -> PathBuf {
    let stem = base_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("config");
    let ext = base_path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("json");
    base_path.with_file_name(format!("{}.local.{}", stem, ext))
}

/// Loaded configuration: the raw effective map plus its typed view
#[derive(Debug, Clone)]
pub struct Config {
    pub effective: EffectiveConfig,

    pub build: BuildConfig,

    /// Directory containing the base config file
    pub root: PathBuf,
}

impl Config {
    /// Load `path` and its `.local` sibling
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .context("Failed to determine working directory")?
                .join(path)
        };

        let local_path = local_path_for(&canonical_path);
        let effective = resolve_config(&canonical_path, &local_path)?;
        let build = effective.typed(&canonical_path)?;

        let root = canonical_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            effective,
            build,
            root,
        })
    }

    /// Build a config from an in-memory map, rooted at `root`
    pub fn from_effective(effective: EffectiveConfig, root: PathBuf) -> Result<Self> {
        let build = effective.typed(&root)?;
        Ok(Self {
            effective,
            build,
            root,
        })
    }

    /// Absolute output directory
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.build.output_dir)
    }

    /// Absolute documentation output directory
    pub fn docs_dir(&self) -> PathBuf {
        self.root.join(&self.build.docs.output_dir)
    }

    /// Entry file of this library
    pub fn own_entry(&self) -> PathBuf {
        self.root.join(&self.build.entry)
    }

    /// Root of a sibling library, read from `<id>_path`
    pub fn library_root(&self, library_id: &str) -> Option<PathBuf> {
        self.effective
            .get_str(&format!("{}_path", library_id))
            .map(|p| self.root.join(p))
    }

    /// Entry file of a sibling library
    pub fn library_entry(&self, library_id: &str) -> Option<PathBuf> {
        self.library_root(library_id)
            .map(|root| root.join(&self.build.entry))
    }

    /// Artifact base name for a build
    pub fn artifact_name(&self, combined: bool) -> &str {
        if combined {
            &self.build.combined_name
        } else {
            &self.build.name
        }
    }

    /// Human-readable name used in banners
    pub fn display_name(&self, combined: bool) -> String {
        if combined {
            "CreateJS".to_string()
        } else {
            to_display_name(self.build.name.trim_end_matches("js"))
        }
    }
}
