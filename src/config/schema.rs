//! Configuration schema definitions

use serde::{Deserialize, Serialize};

/// Typed view over the effective configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Artifact base name of this library, e.g. `easeljs`
    #[serde(default = "default_name")]
    pub name: String,

    /// Package version substituted into banners and bundled sources
    #[serde(default = "default_version")]
    pub version: String,

    /// Sibling libraries taking part in a combined build, in bundle order
    #[serde(default = "default_libraries")]
    pub libraries: Vec<String>,

    /// Entry file relative to a library root
    #[serde(default = "default_entry")]
    pub entry: String,

    /// Artifact base name of the combined build
    #[serde(default = "default_combined_name")]
    pub combined_name: String,

    /// Namespace object the global format assigns into
    #[serde(default = "default_global_name")]
    pub global_name: String,

    /// Output directory, relative to the config file
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Bare specifiers left as runtime `require` calls
    #[serde(default)]
    pub externals: Vec<String>,

    #[serde(default)]
    pub banner: BannerConfig,

    #[serde(default)]
    pub beautify: BeautifyConfig,

    #[serde(default)]
    pub sourcemap: SourceMapConfig,

    #[serde(default)]
    pub dev: DevConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub docs: DocsConfig,

    #[serde(default)]
    pub test: TestConfig,

    #[serde(default)]
    pub link: LinkConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            libraries: default_libraries(),
            entry: default_entry(),
            combined_name: default_combined_name(),
            global_name: default_global_name(),
            output_dir: default_output_dir(),
            externals: Vec::new(),
            banner: BannerConfig::default(),
            beautify: BeautifyConfig::default(),
            sourcemap: SourceMapConfig::default(),
            dev: DevConfig::default(),
            watch: WatchConfig::default(),
            docs: DocsConfig::default(),
            test: TestConfig::default(),
            link: LinkConfig::default(),
        }
    }
}

fn default_name() -> String {
    "library".to_string()
}

fn default_version() -> String {
    "0.0.0".to_string()
}

fn default_libraries() -> Vec<String> {
    ["easel", "tween", "sound", "preload"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_entry() -> String {
    "src/main.js".to_string()
}

fn default_combined_name() -> String {
    "createjs".to_string()
}

fn default_global_name() -> String {
    "createjs".to_string()
}

fn default_output_dir() -> String {
    "lib".to_string()
}

fn default_true() -> bool {
    true
}

/// Banner text prepended to artifacts.
///
/// Both templates may reference `<%= name %>` and `<%= version %>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannerConfig {
    /// Full license text, used for minified outputs
    #[serde(default = "default_license_banner")]
    pub license: String,

    /// Short attribution, used for non-minified outputs
    #[serde(default = "default_attribution_banner")]
    pub attribution: String,
}

impl Default for BannerConfig {
    fn default() -> Self {
        Self {
            license: default_license_banner(),
            attribution: default_attribution_banner(),
        }
    }
}

fn default_license_banner() -> String {
    "/*!\n\
     * <%= name %> v<%= version %>\n\
     * Visit https://createjs.com/ for documentation, updates and examples.\n\
     *\n\
     * Copyright (c) gskinner.com, inc.\n\
     *\n\
     * Permission is hereby granted, free of charge, to any person obtaining a copy\n\
     * of this software and associated documentation files (the \"Software\"), to deal\n\
     * in the Software without restriction, subject to the MIT license conditions.\n\
     */"
        .to_string()
}

fn default_attribution_banner() -> String {
    "/**\n * <%= name %> v<%= version %>\n * https://createjs.com/\n */".to_string()
}

/// Pretty-printing of non-minified outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeautifyConfig {
    /// Indent unit for one nesting level
    #[serde(default = "default_indent")]
    pub indent: String,
}

impl Default for BeautifyConfig {
    fn default() -> Self {
        Self {
            indent: default_indent(),
        }
    }
}

fn default_indent() -> String {
    "\t".to_string()
}

/// Source map emission for non-minified outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMapConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Embed the map as a data URL instead of writing `<file>.map`
    #[serde(default)]
    pub inline: bool,
}

impl Default for SourceMapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inline: false,
        }
    }
}

/// Development server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    /// Port to run dev server on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Directory served, relative to the config file
    #[serde(default = "default_serve_dir")]
    pub serve_dir: String,

    /// Push a reload to connected pages after each rebuild
    #[serde(default = "default_true")]
    pub live_reload: bool,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            serve_dir: default_serve_dir(),
            live_reload: true,
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_serve_dir() -> String {
    ".".to_string()
}

/// What happens when a change arrives while a rebuild is still running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Start another rebuild alongside the running one
    #[default]
    Overlap,
    /// Wait for the running rebuild, then start the next
    Queue,
    /// Abort the running rebuild and start over
    Restart,
}

/// Watch-and-rebuild configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce window; 0 reacts to every raw filesystem event
    #[serde(default)]
    pub debounce_ms: u64,

    #[serde(default)]
    pub overlap: OverlapPolicy,

    /// File extensions that trigger a rebuild
    #[serde(default = "default_watch_extensions")]
    pub extensions: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 0,
            overlap: OverlapPolicy::default(),
            extensions: default_watch_extensions(),
        }
    }
}

fn default_watch_extensions() -> Vec<String> {
    vec!["js".to_string(), "mjs".to_string(), "json".to_string()]
}

/// Documentation generator invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsConfig {
    #[serde(default = "default_docs_command")]
    pub command: String,

    #[serde(default = "default_docs_args")]
    pub args: Vec<String>,

    /// Regenerated from scratch on every docs build
    #[serde(default = "default_docs_output_dir")]
    pub output_dir: String,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            command: default_docs_command(),
            args: default_docs_args(),
            output_dir: default_docs_output_dir(),
        }
    }
}

fn default_docs_command() -> String {
    "yuidoc".to_string()
}

fn default_docs_args() -> Vec<String> {
    vec![
        "--outdir".to_string(),
        "docs/output".to_string(),
        "src".to_string(),
    ]
}

fn default_docs_output_dir() -> String {
    "docs/output".to_string()
}

/// Test runner invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    #[serde(default = "default_test_command")]
    pub command: String,

    /// Arguments for a headless run with console reporting
    #[serde(default = "default_headless_args")]
    pub headless_args: Vec<String>,

    /// Arguments for an interactive run in a real browser
    #[serde(default = "default_browser_args")]
    pub browser_args: Vec<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            command: default_test_command(),
            headless_args: default_headless_args(),
            browser_args: default_browser_args(),
        }
    }
}

fn default_test_command() -> String {
    "karma".to_string()
}

fn default_headless_args() -> Vec<String> {
    ["start", "tests/karma.conf.js", "--single-run", "--browsers", "ChromeHeadless"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_browser_args() -> Vec<String> {
    ["start", "tests/karma.conf.js", "--browsers", "Chrome", "--reporters", "kjhtml"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Cross-repository linking for local multi-package development
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Package manager used when a direct symlink is not possible
    #[serde(default = "default_link_command")]
    pub command: String,

    #[serde(default = "default_link_args")]
    pub args: Vec<String>,

    /// Directory the sibling links are created in
    #[serde(default = "default_node_modules")]
    pub node_modules: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            command: default_link_command(),
            args: default_link_args(),
            node_modules: default_node_modules(),
        }
    }
}

fn default_link_command() -> String {
    "npm".to_string()
}

fn default_link_args() -> Vec<String> {
    vec!["link".to_string()]
}

fn default_node_modules() -> String {
    "node_modules".to_string()
}
