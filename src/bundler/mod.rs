//! Core bundler implementation
//!
//! Handles the module graph, dependency resolution, and bundle generation
//! for one build target at a time.

mod cache;
mod graph;
mod render;
mod sourcemap;

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::BuildError;
use crate::minify::{beautify, minify};
use crate::naming::{to_display_name, BuildTarget, Format};
use crate::plugins::PluginManager;
use crate::resolver::{Resolution, Resolver};
use crate::transform::{render_banner, substitute_version, Printed};
use crate::utils::{format_duration, hash_content};

pub use cache::{BundleCache, CacheEntry, CachedModule};
pub use graph::{Link, Module, ModuleGraph, ModuleId, ModuleType};
pub use render::{render, ModuleSpan, Rendered};

/// Which entry points a bundle starts from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildScope {
    /// This library's own entry
    Single,
    /// Every listed sibling library, merged into one artifact
    Combined(Vec<String>),
}

impl BuildScope {
    pub fn is_combined(&self) -> bool {
        matches!(self, BuildScope::Combined(_))
    }
}

/// Information about a generated bundle
#[derive(Debug, Clone)]
pub struct BundleReport {
    pub target: BuildTarget,

    /// Output file path
    pub output_path: PathBuf,

    /// Bundle size in bytes
    pub size: usize,

    /// Source map path (if written to its own file)
    pub sourcemap_path: Option<PathBuf>,

    /// Sibling libraries left out because their entry is missing
    pub skipped: Vec<String>,

    /// Modules in the bundle
    pub modules: usize,

    /// Modules taken from the cache without re-running plugins
    pub reused: usize,

    pub duration: Duration,
}

/// The main bundler
pub struct Bundler {
    config: Arc<Config>,
}

impl Bundler {
    /// Create a new bundler instance
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build one artifact.
    ///
    /// The cache entry for the artifact is read before building and replaced
    /// only when the bundle was written successfully.
    pub async fn produce_bundle(
        &self,
        target: BuildTarget,
        scope: &BuildScope,
        cache: &BundleCache,
    ) -> Result<BundleReport> {
        let start = Instant::now();
        let combined = scope.is_combined();
        let filename = target.filename(self.config.artifact_name(combined));
        debug!("Bundling {} ({})", filename, target.format);

        // 1. Entry points
        let (entries, skipped) = self.collect_entries(scope)?;

        // 2. Module graph. A fresh resolver sees files added since the last build.
        let plugins = PluginManager::for_format(target.format, &self.config.build.externals);
        let resolver = Resolver::new();
        let previous = cache.get(&filename);
        let mut builder = GraphBuilder {
            resolver: &resolver,
            plugins: &plugins,
            previous: previous.as_deref(),
            graph: ModuleGraph::new(),
            reused: 0,
        };
        for entry in &entries {
            builder.add_entry(entry).await?;
        }
        builder
            .link_all()
            .await
            .with_context(|| format!("Failed to bundle {}", filename))?;
        let GraphBuilder { graph, reused, .. } = builder;

        // 3. Render, version and banner
        let rendered = render(&graph, target.format, &self.config.build.global_name)
            .with_context(|| format!("Failed to render {}", filename))?;
        let version = &self.config.build.version;
        let body = substitute_version(&rendered.code, version);

        let banner_template = if target.minified {
            &self.config.build.banner.license
        } else {
            &self.config.build.banner.attribution
        };
        let banner = render_banner(banner_template, &self.config.display_name(combined), version);
        let line_offset = if banner.trim().is_empty() {
            0
        } else {
            banner.matches('\n').count() as u32 + 1
        };

        // 4. Post-processing; comment predicates see lines of the final file
        let output_dir = self.config.output_dir();
        let output_path = output_dir.join(&filename);
        let body = if target.applies_minifier() {
            Printed::unmapped(minify(&body, line_offset + 1, &output_path)?)
        } else if target.format == Format::Esm {
            Printed::identity(body)
        } else {
            let indent = &self.config.build.beautify.indent;
            beautify(&body, line_offset + 1, indent, &output_path)?
        };
        let mut code = if line_offset == 0 {
            body.code
        } else {
            format!("{}\n{}", banner, body.code)
        };

        // 5. Output
        fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output directory {}", output_dir.display())
        })?;

        let mut sourcemap_path = None;
        let sourcemap = &self.config.build.sourcemap;
        if !target.minified && sourcemap.enabled {
            let json = sourcemap::generate(
                &filename,
                &output_dir,
                &rendered.spans,
                &body.lines,
                line_offset,
            );
            let map_name = format!("{}.map", filename);

            if !code.ends_with('\n') {
                code.push('\n');
            }
            code.push_str(&sourcemap::reference_comment(&json, &map_name, sourcemap.inline));
            code.push('\n');

            if !sourcemap.inline {
                let map_path = output_dir.join(&map_name);
                fs::write(&map_path, json).with_context(|| {
                    format!("Failed to write source map: {}", map_path.display())
                })?;
                sourcemap_path = Some(map_path);
            }
        }

        fs::write(&output_path, &code)
            .with_context(|| format!("Failed to write bundle: {}", output_path.display()))?;

        // 6. Cache
        cache.insert(filename.clone(), cache_entry(&graph));

        let duration = start.elapsed();
        info!(
            "Bundled {} ({} modules, {} reused) in {}",
            filename,
            graph.len(),
            reused,
            format_duration(duration)
        );

        Ok(BundleReport {
            target,
            output_path,
            size: code.len(),
            sourcemap_path,
            skipped,
            modules: graph.len(),
            reused,
            duration,
        })
    }

    /// Entry files for `scope`, plus the siblings that had to be skipped
    fn collect_entries(&self, scope: &BuildScope) -> Result<(Vec<PathBuf>, Vec<String>)> {
        match scope {
            BuildScope::Single => {
                let entry = self.config.own_entry();
                if !entry.is_file() {
                    return Err(BuildError::tool(
                        "bundler",
                        format!("entry point {} does not exist", entry.display()),
                    )
                    .into());
                }
                Ok((vec![entry], Vec::new()))
            }
            BuildScope::Combined(libraries) => {
                let mut entries = Vec::new();
                let mut skipped = Vec::new();

                for library in libraries {
                    match self.config.library_entry(library) {
                        Some(entry) if entry.is_file() => entries.push(entry),
                        Some(entry) => {
                            warn!(
                                "Skipping {}: {}",
                                to_display_name(library),
                                BuildError::MissingFile { path: entry }
                            );
                            skipped.push(library.clone());
                        }
                        None => {
                            warn!(
                                "Skipping {}: no {}_path configured",
                                to_display_name(library),
                                library
                            );
                            skipped.push(library.clone());
                        }
                    }
                }

                if entries.is_empty() {
                    return Err(BuildError::tool(
                        "bundler",
                        format!("none of the libraries {:?} has an entry point", libraries),
                    )
                    .into());
                }
                Ok((entries, skipped))
            }
        }
    }
}

/// Walks the import graph from the entries, reusing cached modules
struct GraphBuilder<'a> {
    resolver: &'a Resolver,
    plugins: &'a PluginManager,
    previous: Option<&'a CacheEntry>,
    graph: ModuleGraph,
    reused: usize,
}

impl GraphBuilder<'_> {
    async fn add_entry(&mut self, path: &Path) -> Result<()> {
        let (id, _) = self.load(path, true).await?;
        self.graph.mark_entry(id);
        Ok(())
    }

    /// Resolve every module's dependencies, loading new modules as found
    async fn link_all(&mut self) -> Result<()> {
        let mut pending: VecDeque<ModuleId> = (0..self.graph.len()).collect();

        while let Some(id) = pending.pop_front() {
            let Some(module) = self.graph.get_module(id) else {
                continue;
            };
            let importer = module.path.clone();
            let dependencies = module.dependencies.clone();

            let mut links = Vec::with_capacity(dependencies.len());
            for specifier in dependencies {
                let link = if self.plugins.is_external(&specifier, &importer).await? {
                    Link::External
                } else {
                    match self.resolver.resolve(&specifier, &importer)? {
                        Resolution::External => Link::External,
                        Resolution::File(file) => {
                            let (dep, is_new) = self.load(&file, false).await?;
                            if is_new {
                                pending.push_back(dep);
                            }
                            Link::Module(dep)
                        }
                    }
                };
                links.push((specifier, link));
            }

            if let Some(module) = self.graph.get_module_mut(id) {
                module.links = links;
            }
        }

        Ok(())
    }

    /// Load a module into the graph; the flag is `true` for a new module
    async fn load(&mut self, path: &Path, is_entry: bool) -> Result<(ModuleId, bool)> {
        let canonical_path = fs::canonicalize(path)
            .with_context(|| format!("Failed to resolve module path: {}", path.display()))?;

        if let Some(id) = self.graph.get_module_id(&canonical_path) {
            return Ok((id, false));
        }

        let source = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read module: {}", canonical_path.display()))?;
        let hash = hash_content(source.as_bytes());
        let module_type = ModuleType::detect(&canonical_path);

        let cached = self
            .previous
            .and_then(|entry| entry.reusable(&canonical_path, &hash));
        let (printed, dependencies) = match cached {
            Some(cached) => {
                self.reused += 1;
                let printed = Printed {
                    code: cached.code.clone(),
                    lines: cached.lines.clone(),
                };
                (printed, cached.dependencies.clone())
            }
            None => {
                let printed = self.plugins.transform(&source, &canonical_path).await?;
                let dependencies = self.resolver.extract_dependencies(
                    &printed.code,
                    &module_type,
                    &canonical_path,
                )?;
                (printed, dependencies)
            }
        };

        let id = self.graph.add_module(Module {
            path: canonical_path,
            source,
            hash,
            module_type,
            is_entry,
            dependencies,
            code: printed.code,
            lines: printed.lines,
            links: Vec::new(),
        });
        Ok((id, true))
    }
}

fn cache_entry(graph: &ModuleGraph) -> CacheEntry {
    let modules = graph
        .modules()
        .map(|(_, module)| {
            (
                module.path.clone(),
                CachedModule {
                    hash: module.hash.clone(),
                    code: module.code.clone(),
                    lines: module.lines.clone(),
                    dependencies: module.dependencies.clone(),
                },
            )
        })
        .collect();
    CacheEntry { modules }
}
