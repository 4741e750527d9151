//! The graphs behind each CLI command

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures_util::future::try_join_all;
use futures_util::FutureExt;
use tokio::sync::broadcast;
use tracing::debug;

use super::{actions, BuildContext, Task, TaskGraph, TaskId};
use crate::bundler::BuildScope;
use crate::config::Config;
use crate::naming::{Channel, Format};
use crate::server::{DevServer, DevServerOptions};
use crate::watch::{Rebuild, WatchLoop};

/// Removes stale artifacts of the context's channel
pub fn clean_task(config: Arc<Config>, channel: Channel) -> Task {
    Task::new("clean", move || async move {
        actions::clean_outputs(&config.output_dir(), channel)?;
        Ok(())
    })
}

/// One bundle task per format, each after `clean`
fn bundle_tasks(ctx: &Arc<BuildContext>, formats: &[Format]) -> Vec<Task> {
    formats
        .iter()
        .map(|&format| {
            let ctx = ctx.clone();
            Task::new(format.task_name(), move || async move { ctx.build_format(format).await })
                .after(["clean"])
        })
        .collect()
}

fn bundle_ids(formats: &[Format]) -> Vec<TaskId> {
    formats.iter().map(|f| TaskId::from(f.task_name())).collect()
}

/// `clean`, then every requested format
pub fn build_graph(ctx: &Arc<BuildContext>, formats: &[Format]) -> TaskGraph {
    let mut graph = TaskGraph::new();
    graph.add(clean_task(ctx.config.clone(), ctx.channel));
    for task in bundle_tasks(ctx, formats) {
        graph.add(task);
    }
    graph
}

/// Directories holding the sources of the current build
pub fn watch_roots(ctx: &BuildContext) -> Vec<PathBuf> {
    let entries: Vec<PathBuf> = match &ctx.scope {
        BuildScope::Single => vec![ctx.config.own_entry()],
        BuildScope::Combined(libraries) => libraries
            .iter()
            .filter_map(|id| ctx.config.library_entry(id))
            .collect(),
    };

    let mut roots: Vec<PathBuf> = entries
        .iter()
        .filter_map(|entry| entry.parent().map(PathBuf::from))
        .collect();
    roots.sort();
    roots.dedup();
    roots
}

/// Rebuild every format of `ctx`, dropping the collected reports
pub fn rebuild_all(ctx: Arc<BuildContext>, formats: Vec<Format>) -> Rebuild {
    Arc::new(move || {
        let ctx = ctx.clone();
        let formats = formats.clone();
        async move {
            let result = try_join_all(formats.iter().map(|&f| ctx.build_format(f))).await;
            let reports = ctx.take_reports();
            debug!("Rebuilt {} artifact(s)", reports.len());
            result.map(|_| ())
        }
        .boxed()
    })
}

/// A build followed by the dev server and the watcher, which share a
/// live-reload channel
pub fn dev_graph(
    ctx: &Arc<BuildContext>,
    formats: &[Format],
    options: DevServerOptions,
) -> TaskGraph {
    let mut graph = build_graph(ctx, formats);
    let (reload_tx, _) = broadcast::channel(16);

    let server = DevServer::new(ctx.config.clone(), options, reload_tx.clone());
    graph.add(
        Task::new("serve", move || async move { server.start().await })
            .after(bundle_ids(formats)),
    );

    let watch = WatchLoop::new(
        watch_roots(ctx),
        ctx.config.build.watch.clone(),
        rebuild_all(ctx.clone(), formats.to_vec()),
    )
    .ignoring(ctx.config.output_dir())
    .with_reload(reload_tx);
    graph.add(Task::new("watch", move || watch.run()).after(bundle_ids(formats)));

    graph
}

/// A build followed by one test run
pub fn test_graph(ctx: &Arc<BuildContext>, formats: &[Format], browser: bool) -> TaskGraph {
    let mut graph = build_graph(ctx, formats);
    let config = ctx.config.clone();
    graph.add(
        Task::new("test", move || async move { actions::run_tests(&config, browser).await })
            .after(bundle_ids(formats)),
    );
    graph
}

pub fn docs_graph(config: Arc<Config>) -> TaskGraph {
    let mut graph = TaskGraph::new();
    graph.add(Task::new("docs", move || async move { actions::generate_docs(&config).await }));
    graph
}

/// Link each of `libraries`; every library is attempted even if one fails
pub fn link_graph(config: Arc<Config>, libraries: Vec<String>) -> TaskGraph {
    let mut graph = TaskGraph::new();
    graph.add(Task::new("link", move || async move {
        let mut failures = Vec::new();
        for library in &libraries {
            if let Err(e) = actions::link_library(&config, library).await {
                failures.push(format!("{}: {:#}", library, e));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(failures.join("; ")))
        }
    }));
    graph
}

pub fn clean_graph(config: Arc<Config>, channel: Channel) -> TaskGraph {
    let mut graph = TaskGraph::new();
    graph.add(clean_task(config, channel));
    graph
}

/// Run a graph to completion, turning a partial failure into an error
pub async fn run_to_completion(graph: TaskGraph) -> Result<()> {
    let report = graph.run().await?;
    if report.is_success() {
        return Ok(());
    }

    let mut problems: Vec<String> = report
        .failed
        .iter()
        .map(|(id, message)| format!("'{}' failed: {}", id, message))
        .collect();
    if !report.skipped.is_empty() {
        let skipped: Vec<&str> = report.skipped.iter().map(TaskId::as_str).collect();
        problems.push(format!("skipped: {}", skipped.join(", ")));
    }
    Err(anyhow!(problems.join("\n")))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::*;
    use crate::config::EffectiveConfig;
    use crate::tasks::RunMode;

    fn context(root: &Path, values: Value, combined: bool) -> Arc<BuildContext> {
        let map = values.as_object().unwrap().clone();
        let config =
            Config::from_effective(EffectiveConfig::from_map(map), root.to_path_buf()).unwrap();
        Arc::new(BuildContext::new(
            Arc::new(config),
            Channel::Stable,
            RunMode::Development,
            combined,
        ))
    }

    fn ids(graph: &TaskGraph) -> Vec<String> {
        let mut ids: Vec<String> = graph.ids().iter().map(|id| id.to_string()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_graph_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), json!({ "name": "easeljs" }), false);

        let build = build_graph(&ctx, &Format::ALL);
        assert_eq!(ids(&build), vec!["bundle:cjs", "bundle:global", "bundle:module", "clean"]);
        let order = build.validate().unwrap();
        assert_eq!(order[0].as_str(), "clean");

        let test = test_graph(&ctx, &[Format::Global], false);
        let order = test.validate().unwrap();
        assert_eq!(
            order.iter().map(TaskId::as_str).collect::<Vec<_>>(),
            vec!["clean", "bundle:global", "test"]
        );

        let options = DevServerOptions::from_config(&ctx.config);
        let dev = dev_graph(&ctx, &Format::ALL, options);
        assert_eq!(
            ids(&dev),
            vec!["bundle:cjs", "bundle:global", "bundle:module", "clean", "serve", "watch"]
        );
        dev.validate().unwrap();
    }

    #[test]
    fn test_watch_roots_follow_scope() {
        let dir = tempfile::tempdir().unwrap();
        let values = json!({
            "name": "easeljs",
            "libraries": ["easel", "tween"],
            "easel_path": "EaselJS",
            "tween_path": "TweenJS"
        });

        let single = context(dir.path(), values.clone(), false);
        assert_eq!(watch_roots(&single), vec![dir.path().join("src")]);

        let combined = context(dir.path(), values, true);
        assert_eq!(
            watch_roots(&combined),
            vec![dir.path().join("EaselJS/src"), dir.path().join("TweenJS/src")]
        );
    }

    #[tokio::test]
    async fn test_build_graph_writes_every_format() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("src/main.js"), "export var Stage = 1;\n").unwrap();
        fs::write(dir.path().join("lib/stale.js"), "old").unwrap();

        let ctx = context(dir.path(), json!({ "name": "easeljs", "version": "1.0.0" }), false);
        run_to_completion(build_graph(&ctx, &Format::ALL)).await.unwrap();

        assert!(!dir.path().join("lib/stale.js").exists());
        for name in ["easeljs.js", "easeljs.cjs.js", "easeljs.module.js"] {
            assert!(dir.path().join("lib").join(name).is_file(), "{} missing", name);
        }
    }

    #[tokio::test]
    async fn test_failed_build_skips_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), json!({ "name": "easeljs" }), false);

        let err = run_to_completion(test_graph(&ctx, &[Format::Global], false))
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("'bundle:global' failed"));
        assert!(err.contains("skipped: test"));
    }

    #[tokio::test]
    async fn test_rebuild_all_drains_reports() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.js"), "export var Ticker = 1;\n").unwrap();

        let ctx = context(dir.path(), json!({ "name": "easeljs" }), false);
        let rebuild = rebuild_all(ctx.clone(), vec![Format::Global, Format::CommonJs]);
        rebuild().await.unwrap();
        rebuild().await.unwrap();

        assert!(ctx.take_reports().is_empty());
        assert!(dir.path().join("lib/easeljs.cjs.js").is_file());
    }
}
