//! createjs-build library
//!
//! Build orchestration for the CreateJS libraries: bundling into module,
//! CommonJS and global formats, minification, documentation, a live-reload
//! dev server and test runs, all composed as task graphs.

pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod minify;
pub mod naming;
pub mod plugins;
pub mod resolver;
pub mod server;
pub mod tasks;
pub mod transform;
pub mod utils;
pub mod watch;

pub use bundler::Bundler;
pub use cli::Cli;
pub use config::Config;
pub use error::BuildError;
