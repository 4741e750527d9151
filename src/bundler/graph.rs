//! Module graph data structures

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Unique identifier for a module, assigned in discovery order
pub type ModuleId = usize;

/// Types of modules the bundler can handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleType {
    JavaScript,
    Json,
}

impl ModuleType {
    /// Determine module type from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "json" => ModuleType::Json,
            _ => ModuleType::JavaScript,
        }
    }

    /// Detect module type from path
    pub fn detect(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(ModuleType::from_extension)
            .unwrap_or(ModuleType::JavaScript)
    }

    /// Check if this module can carry import/require statements
    pub fn is_js_like(&self) -> bool {
        matches!(self, ModuleType::JavaScript)
    }
}

/// Where an import specifier points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Module(ModuleId),
    External,
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct Module {
    /// Canonical path to the module
    pub path: PathBuf,

    /// Original source code
    pub source: String,

    /// Content hash of `source`
    pub hash: String,

    pub module_type: ModuleType,

    /// Whether this is an entry point
    pub is_entry: bool,

    /// Import specifiers found in this module
    pub dependencies: Vec<String>,

    /// Code after plugin transforms
    pub code: String,

    /// 0-based source line behind each line of `code`
    pub lines: Vec<Option<u32>>,

    /// Resolved target of each specifier in `dependencies`
    pub links: Vec<(String, Link)>,
}

/// The module dependency graph
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,

    path_to_id: HashMap<PathBuf, ModuleId>,

    entries: Vec<ModuleId>,
}

impl ModuleGraph {
    /// Create a new empty module graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module to the graph; a path already present keeps its id
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        if let Some(&id) = self.path_to_id.get(&module.path) {
            if module.is_entry && !self.entries.contains(&id) {
                self.entries.push(id);
            }
            return id;
        }

        let id = self.modules.len();
        self.path_to_id.insert(module.path.clone(), id);
        if module.is_entry {
            self.entries.push(id);
        }
        self.modules.push(module);
        id
    }

    /// Mark an existing module as an entry point
    pub fn mark_entry(&mut self, id: ModuleId) {
        if let Some(module) = self.modules.get_mut(id) {
            module.is_entry = true;
            if !self.entries.contains(&id) {
                self.entries.push(id);
            }
        }
    }

    /// Get module ID from path
    pub fn get_module_id(&self, path: &Path) -> Option<ModuleId> {
        self.path_to_id.get(path).copied()
    }

    /// Get a module by ID
    pub fn get_module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    /// Get a mutable reference to a module
    pub fn get_module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id)
    }

    /// All modules in id order
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().enumerate()
    }

    /// Entry modules, in the order they were added
    pub fn entries(&self) -> &[ModuleId] {
        &self.entries
    }

    /// Bare specifiers left to the runtime, in first-use order
    pub fn externals(&self) -> Vec<&str> {
        let mut found: Vec<&str> = Vec::new();
        for module in &self.modules {
            for (specifier, link) in &module.links {
                if *link == Link::External && !found.contains(&specifier.as_str()) {
                    found.push(specifier);
                }
            }
        }
        found
    }

    /// Total number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(path: &str, is_entry: bool, links: Vec<(String, Link)>) -> Module {
        Module {
            path: PathBuf::from(path),
            source: String::new(),
            hash: String::new(),
            module_type: ModuleType::JavaScript,
            is_entry,
            dependencies: links.iter().map(|(s, _)| s.clone()).collect(),
            code: String::new(),
            lines: Vec::new(),
            links,
        }
    }

    #[test]
    fn test_module_type_detection() {
        assert_eq!(ModuleType::from_extension("js"), ModuleType::JavaScript);
        assert_eq!(ModuleType::from_extension("mjs"), ModuleType::JavaScript);
        assert_eq!(ModuleType::from_extension("JSON"), ModuleType::Json);
        assert_eq!(ModuleType::detect(Path::new("/a/data.json")), ModuleType::Json);
        assert!(!ModuleType::Json.is_js_like());
    }

    #[test]
    fn test_module_graph_basic() {
        let mut graph = ModuleGraph::new();

        let id = graph.add_module(module("/test/main.js", true, vec![]));
        assert_eq!(graph.len(), 1);
        assert!(graph.get_module(id).is_some());
        assert_eq!(graph.get_module_id(Path::new("/test/main.js")), Some(id));

        // Same path keeps its id
        assert_eq!(graph.add_module(module("/test/main.js", false, vec![])), id);
        assert_eq!(graph.entries(), &[id]);
    }

    #[test]
    fn test_ids_follow_discovery_order() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module(module("/a.js", true, vec![]));
        let b = graph.add_module(module("/b.js", false, vec![]));
        graph.mark_entry(b);

        assert_eq!((a, b), (0, 1));
        assert_eq!(graph.entries(), &[0, 1]);
    }

    #[test]
    fn test_externals_deduplicated() {
        let mut graph = ModuleGraph::new();
        graph.add_module(module(
            "/a.js",
            true,
            vec![("lodash".into(), Link::External), ("./b".into(), Link::Module(1))],
        ));
        graph.add_module(module(
            "/b.js",
            false,
            vec![("jquery".into(), Link::External), ("lodash".into(), Link::External)],
        ));

        assert_eq!(graph.externals(), vec!["lodash", "jquery"]);
    }
}
