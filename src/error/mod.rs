//! Error taxonomy for the build orchestrator
//!
//! Missing files are recovered where they are found and never reach this
//! type as a hard failure; everything else is surfaced through `anyhow`
//! with one of these variants at the root of the chain.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    /// An expected input is absent
    #[error("missing file: {}", path.display())]
    MissingFile { path: PathBuf },

    /// A configuration file exists but cannot be used
    #[error("malformed configuration in {}: {message}", path.display())]
    MalformedConfig { path: PathBuf, message: String },

    /// An external tool or the bundler itself reported an error
    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    /// The filesystem layout does not match what an operation expects
    #[error("environment mismatch: {0}")]
    EnvironmentMismatch(String),

    /// An import specifier could not be resolved to a file
    #[error("cannot resolve '{specifier}' from {}", importer.display())]
    Unresolved { specifier: String, importer: PathBuf },

    /// Source code that does not parse
    #[error("syntax error in {}: {message}", path.display())]
    Syntax { path: PathBuf, message: String },

    /// The task graph is not a valid DAG
    #[error("invalid task graph: {0}")]
    TaskGraph(String),
}

impl BuildError {
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }
}
