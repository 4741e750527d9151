//! Bundle cache
//!
//! Keyed by output filename. An entry records every module of the last
//! successful bundle so the next build of the same file can skip reading
//! unchanged modules through the plugin pipeline. Entries are only ever
//! replaced after a bundle succeeds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

/// A module as it was when the cached bundle was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedModule {
    pub hash: String,
    /// Code after plugin transforms
    pub code: String,
    /// Source line behind each line of `code`
    pub lines: Vec<Option<u32>>,
    pub dependencies: Vec<String>,
}

/// Intermediate state of one bundle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub modules: HashMap<PathBuf, CachedModule>,
}

impl CacheEntry {
    /// The cached module for `path` if its content hash still matches
    pub fn reusable(&self, path: &Path, hash: &str) -> Option<&CachedModule> {
        self.modules.get(path).filter(|m| m.hash == hash)
    }
}

/// Shared cache of bundle entries
#[derive(Debug, Default)]
pub struct BundleCache {
    entries: DashMap<String, Arc<CacheEntry>>,
}

impl BundleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, filename: &str) -> Option<Arc<CacheEntry>> {
        self.entries.get(filename).map(|e| Arc::clone(e.value()))
    }

    /// Replace the entry for `filename`
    pub fn insert(&self, filename: impl Into<String>, entry: CacheEntry) {
        self.entries.insert(filename.into(), Arc::new(entry));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
