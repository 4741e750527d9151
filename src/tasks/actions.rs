//! Task actions that shell out or touch the filesystem directly

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::BuildError;
use crate::naming::{to_display_name, Channel, NEXT_SUFFIX};

/// Artifact patterns removed by `clean` for a channel
fn clean_patterns(channel: Channel) -> Result<GlobSet> {
    let patterns: Vec<String> = match channel {
        Channel::Stable => vec!["*.js".to_string(), "*.js.map".to_string()],
        Channel::Next => vec![format!("*{}*", NEXT_SUFFIX)],
    };

    let mut builder = GlobSetBuilder::new();
    for pattern in &patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Remove previous artifacts from `output_dir`. A missing directory has
/// nothing to clean.
pub fn clean_outputs(output_dir: &Path, channel: Channel) -> Result<Vec<PathBuf>> {
    if !output_dir.is_dir() {
        debug!("Nothing to clean: {} does not exist", output_dir.display());
        return Ok(Vec::new());
    }

    let patterns = clean_patterns(channel)?;
    let mut removed = Vec::new();

    for entry in WalkDir::new(output_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if patterns.is_match(entry.file_name()) {
            fs::remove_file(entry.path())
                .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
            removed.push(entry.path().to_path_buf());
        }
    }

    info!("Removed {} artifact(s) from {}", removed.len(), output_dir.display());
    Ok(removed)
}

/// Run an external command to completion.
///
/// Spawn failures and non-zero exits are both reported as a failed tool.
pub async fn run_tool(program: &str, args: &[String], cwd: &Path) -> Result<()> {
    debug!("Running {} {:?} in {}", program, args, cwd.display());

    let status = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .status()
        .await
        .map_err(|e| BuildError::tool(program, format!("could not start: {}", e)))?;

    if status.success() {
        Ok(())
    } else {
        Err(BuildError::tool(program, format!("exited with {}", status)).into())
    }
}

/// Regenerate the API documentation from scratch
pub async fn generate_docs(config: &Config) -> Result<()> {
    let docs_dir = config.docs_dir();
    match fs::remove_dir_all(&docs_dir) {
        Ok(()) => debug!("Removed {}", docs_dir.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to remove {}", docs_dir.display()));
        }
    }

    let docs = &config.build.docs;
    run_tool(&docs.command, &docs.args, &config.root).await?;

    eprintln!(
        "{} Documentation written to {}",
        "✓".green().bold(),
        docs_dir.display().to_string().cyan()
    );
    Ok(())
}

/// Run the test suite once, headless unless `browser` is set
pub async fn run_tests(config: &Config, browser: bool) -> Result<()> {
    let test = &config.build.test;
    let args = if browser {
        &test.browser_args
    } else {
        &test.headless_args
    };
    run_tool(&test.command, args, &config.root).await
}

/// Package name of a sibling library: `name` from its package.json, or
/// `<id>js`
fn package_name(library_root: &Path, library: &str) -> String {
    fs::read_to_string(library_root.join("package.json"))
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .and_then(|pkg| pkg.get("name").and_then(|n| n.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("{}js", library))
}

/// Make a sibling library importable from this one.
///
/// The sibling checkout is symlinked into `node_modules`. When the sibling
/// is not laid out as a package, the configured link command is used
/// instead.
pub async fn link_library(config: &Config, library: &str) -> Result<()> {
    let link = &config.build.link;
    let root = config.library_root(library);

    let checkout = root.filter(|r| r.join("package.json").is_file());
    let Some(checkout) = checkout else {
        let package = format!("{}js", library);
        let mismatch = BuildError::EnvironmentMismatch(format!(
            "{} has no package checkout, falling back to `{} {}`",
            to_display_name(library),
            link.command,
            link.args.join(" ")
        ));
        warn!("{}", mismatch);

        let mut args = link.args.clone();
        args.push(package);
        return run_tool(&link.command, &args, &config.root).await;
    };

    let package = package_name(&checkout, library);
    let target = config.root.join(&link.node_modules).join(&package);

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    match fs::symlink_metadata(&target) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::remove_file(&target)
                .with_context(|| format!("Failed to replace link {}", target.display()))?;
        }
        Ok(_) => {
            warn!(
                "{}",
                BuildError::EnvironmentMismatch(format!(
                    "{} is already installed at {}, leaving it alone",
                    package,
                    target.display()
                ))
            );
            return Ok(());
        }
        Err(_) => {}
    }

    let checkout = fs::canonicalize(&checkout)
        .with_context(|| format!("Failed to resolve {}", checkout.display()))?;
    symlink_dir(&checkout, &target)
        .with_context(|| format!("Failed to link {} -> {}", target.display(), checkout.display()))?;

    eprintln!(
        "{} Linked {} -> {}",
        "✓".green().bold(),
        package.cyan(),
        checkout.display().to_string().dimmed()
    );
    Ok(())
}

#[cfg(unix)]
fn symlink_dir(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink_dir(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(original, link)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::config::EffectiveConfig;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn config(root: &Path, values: Value) -> Config {
        let map = values.as_object().unwrap().clone();
        Config::from_effective(EffectiveConfig::from_map(map), root.to_path_buf()).unwrap()
    }

    #[test]
    fn test_clean_stable_removes_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["easeljs.js", "easeljs.js.map", "easeljs-NEXT.min.js", "README.md"] {
            touch(&dir.path().join(name));
        }

        let removed = clean_outputs(dir.path(), Channel::Stable).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(dir.path().join("README.md").exists());
    }

    #[test]
    fn test_clean_next_only_touches_next_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["easeljs.js", "easeljs-NEXT.js", "easeljs-NEXT.js.map"] {
            touch(&dir.path().join(name));
        }

        clean_outputs(dir.path(), Channel::Next).unwrap();
        assert!(dir.path().join("easeljs.js").exists());
        assert!(!dir.path().join("easeljs-NEXT.js").exists());
        assert!(!dir.path().join("easeljs-NEXT.js.map").exists());
    }

    #[test]
    fn test_clean_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(clean_outputs(&dir.path().join("lib"), Channel::Stable)
            .unwrap()
            .is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        run_tool("true", &[], dir.path()).await.unwrap();

        let err = run_tool("false", &[], dir.path()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::ToolFailed { tool, .. }) if tool == "false"
        ));

        let err = run_tool("definitely-not-a-real-tool", &[], dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("could not start"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_generate_docs_clears_output() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("docs/output/stale.html"));
        let config = config(dir.path(), json!({ "docs": { "command": "true", "args": [] } }));

        generate_docs(&config).await.unwrap();
        assert!(!dir.path().join("docs/output").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_link_symlinks_sibling_checkout() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("EaselJS")).unwrap();
        fs::write(dir.path().join("EaselJS/package.json"), r#"{"name": "easeljs"}"#).unwrap();
        let config = config(dir.path(), json!({ "easel_path": "EaselJS" }));

        link_library(&config, "easel").await.unwrap();
        // Relinking replaces the existing symlink
        link_library(&config, "easel").await.unwrap();

        let link = dir.path().join("node_modules/easeljs");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert!(link.join("package.json").is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_link_falls_back_to_command() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(
            dir.path(),
            json!({ "tween_path": "missing", "link": { "command": "true", "args": ["link"] } }),
        );

        link_library(&config, "tween").await.unwrap();
        assert!(!dir.path().join("node_modules/tweenjs").exists());
    }
}
