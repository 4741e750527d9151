//! Watch-and-rebuild loop
//!
//! File events arrive from `notify` (raw, or through the mini debouncer when
//! `watch.debounce_ms` is set) and are forwarded into the async runtime. What
//! happens when a change lands while a rebuild is still running is decided
//! by [`OverlapPolicy`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use colored::Colorize;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{OverlapPolicy, WatchConfig};
use crate::server::ReloadMessage;
use crate::utils::format_duration;

/// Rebuild callback, invoked once per relevant change
pub type Rebuild = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Keeps the underlying watcher alive
enum WatchGuard {
    Raw(notify::RecommendedWatcher),
    Debounced(Debouncer<notify::RecommendedWatcher>),
}

/// Watches source roots and rebuilds on change
pub struct WatchLoop {
    roots: Vec<PathBuf>,
    ignored: Vec<PathBuf>,
    settings: WatchConfig,
    rebuild: Rebuild,
    reload_tx: Option<broadcast::Sender<ReloadMessage>>,
}

impl WatchLoop {
    pub fn new(roots: Vec<PathBuf>, settings: WatchConfig, rebuild: Rebuild) -> Self {
        Self {
            roots,
            ignored: Vec::new(),
            settings,
            rebuild,
            reload_tx: None,
        }
    }

    /// Changes below `dir` never trigger a rebuild
    pub fn ignoring(mut self, dir: PathBuf) -> Self {
        self.ignored.push(dir);
        self
    }

    /// Announce rebuild results to live-reload clients
    pub fn with_reload(mut self, reload_tx: broadcast::Sender<ReloadMessage>) -> Self {
        self.reload_tx = Some(reload_tx);
        self
    }

    /// Whether a change to `path` should trigger a rebuild
    pub fn is_relevant(&self, path: &Path) -> bool {
        if self.ignored.iter().any(|dir| path.starts_with(dir)) {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.settings.extensions.iter().any(|x| x == ext))
            .unwrap_or(false)
    }

    /// Watch the roots until the process exits
    pub async fn run(self) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _guard = self.start_watcher(tx)?;

        eprintln!(
            "  {} Watching {} director{} for changes",
            "•".dimmed(),
            self.roots.len(),
            if self.roots.len() == 1 { "y" } else { "ies" }
        );

        self.process(rx).await
    }

    fn start_watcher(&self, tx: mpsc::UnboundedSender<Vec<PathBuf>>) -> Result<WatchGuard> {
        let guard = if self.settings.debounce_ms == 0 {
            let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                match res {
                    Ok(event) => {
                        let _ = tx.send(event.paths);
                    }
                    Err(e) => error!("Watch error: {:?}", e),
                }
            })?;
            WatchGuard::Raw(watcher)
        } else {
            let debouncer = new_debouncer(
                Duration::from_millis(self.settings.debounce_ms),
                move |res: DebounceEventResult| match res {
                    Ok(events) => {
                        let _ = tx.send(events.into_iter().map(|e| e.path).collect());
                    }
                    Err(e) => error!("Watch error: {:?}", e),
                },
            )?;
            WatchGuard::Debounced(debouncer)
        };

        let mut guard = guard;
        for root in &self.roots {
            if !root.is_dir() {
                warn!("Not watching {}: directory does not exist", root.display());
                continue;
            }
            let watcher: &mut dyn Watcher = match &mut guard {
                WatchGuard::Raw(watcher) => watcher,
                WatchGuard::Debounced(debouncer) => debouncer.watcher(),
            };
            watcher
                .watch(root, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}", root.display()))?;
            debug!("Watching {}", root.display());
        }

        Ok(guard)
    }

    /// Consume change batches until the channel closes, then wait for any
    /// rebuild still in flight
    pub async fn process(self, mut rx: mpsc::UnboundedReceiver<Vec<PathBuf>>) -> Result<()> {
        let mut in_flight: JoinSet<()> = JoinSet::new();

        while let Some(paths) = rx.recv().await {
            let changed: Vec<PathBuf> = paths.into_iter().filter(|p| self.is_relevant(p)).collect();
            let Some(first) = changed.first() else {
                continue;
            };

            eprintln!(
                "  {} File changed: {}",
                "↻".yellow(),
                first.display().to_string().dimmed()
            );
            let reason = first.display().to_string();

            // Reap finished rebuilds
            while let Some(Some(_)) = in_flight.join_next().now_or_never() {}

            match self.settings.overlap {
                OverlapPolicy::Overlap => {}
                OverlapPolicy::Queue => {
                    while in_flight.join_next().await.is_some() {}
                }
                OverlapPolicy::Restart => {
                    if !in_flight.is_empty() {
                        info!("Restarting rebuild");
                    }
                    in_flight.abort_all();
                }
            }

            let rebuild = self.rebuild.clone();
            let reload_tx = self.reload_tx.clone();
            in_flight.spawn(async move {
                let start = Instant::now();
                let message = match rebuild().await {
                    Ok(()) => {
                        eprintln!(
                            "  {} Rebuilt in {}",
                            "✓".green(),
                            format_duration(start.elapsed())
                        );
                        ReloadMessage::FullReload { reason }
                    }
                    Err(e) => {
                        error!("Rebuild failed: {:#}", e);
                        ReloadMessage::Error {
                            message: format!("{:#}", e),
                        }
                    }
                };
                if let Some(tx) = reload_tx {
                    // No subscribers is fine
                    let _ = tx.send(message);
                }
            });
        }

        while in_flight.join_next().await.is_some() {}
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;

    use super::*;

    fn settings(overlap: OverlapPolicy) -> WatchConfig {
        WatchConfig {
            overlap,
            ..WatchConfig::default()
        }
    }

    /// Rebuild that takes `millis` and counts completions and peak concurrency
    fn slow_rebuild(millis: u64, done: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Rebuild {
        let active = Arc::new(AtomicUsize::new(0));
        Arc::new(move || {
            let (done, peak, active) = (done.clone(), peak.clone(), active.clone());
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(millis)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
            .boxed()
        })
    }

    fn send_changes(count: usize) -> mpsc::UnboundedReceiver<Vec<PathBuf>> {
        let (tx, rx) = mpsc::unbounded_channel();
        for i in 0..count {
            tx.send(vec![PathBuf::from(format!("/proj/src/file{}.js", i))]).unwrap();
        }
        rx
    }

    #[test]
    fn test_relevance() {
        let noop: Rebuild = Arc::new(|| async { Ok::<(), anyhow::Error>(()) }.boxed());
        let watch = WatchLoop::new(vec![], WatchConfig::default(), noop)
            .ignoring(PathBuf::from("/proj/lib"));

        assert!(watch.is_relevant(Path::new("/proj/src/Stage.js")));
        assert!(watch.is_relevant(Path::new("/proj/src/data.json")));
        assert!(!watch.is_relevant(Path::new("/proj/src/notes.md")));
        assert!(!watch.is_relevant(Path::new("/proj/lib/easeljs.js")));
    }

    #[tokio::test]
    async fn test_queue_serializes_rebuilds() {
        let (done, peak) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
        let rebuild = slow_rebuild(10, done.clone(), peak.clone());
        let watch = WatchLoop::new(vec![], settings(OverlapPolicy::Queue), rebuild);

        watch.process(send_changes(3)).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_overlap_runs_every_rebuild() {
        let (done, peak) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
        let rebuild = slow_rebuild(10, done.clone(), peak.clone());
        let watch = WatchLoop::new(vec![], settings(OverlapPolicy::Overlap), rebuild);

        watch.process(send_changes(3)).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_restart_keeps_only_latest() {
        let (done, peak) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
        let rebuild = slow_rebuild(50, done.clone(), peak.clone());
        let watch = WatchLoop::new(vec![], settings(OverlapPolicy::Restart), rebuild);

        watch.process(send_changes(3)).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_irrelevant_changes_ignored() {
        let (done, peak) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
        let rebuild = slow_rebuild(1, done.clone(), peak);
        let watch = WatchLoop::new(vec![], WatchConfig::default(), rebuild);

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(vec![PathBuf::from("/proj/README.md")]).unwrap();
        drop(tx);

        watch.process(rx).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_results_are_broadcast() {
        let (reload_tx, mut reload_rx) = broadcast::channel(8);
        let failing: Rebuild = Arc::new(|| async { Err::<(), _>(anyhow!("syntax error")) }.boxed());
        let watch =
            WatchLoop::new(vec![], WatchConfig::default(), failing).with_reload(reload_tx.clone());
        watch.process(send_changes(1)).await.unwrap();
        assert_eq!(
            reload_rx.recv().await.unwrap(),
            ReloadMessage::Error {
                message: "syntax error".to_string()
            }
        );

        let working: Rebuild = Arc::new(|| async { Ok::<(), anyhow::Error>(()) }.boxed());
        let watch = WatchLoop::new(vec![], WatchConfig::default(), working).with_reload(reload_tx);
        watch.process(send_changes(1)).await.unwrap();
        assert_eq!(
            reload_rx.recv().await.unwrap(),
            ReloadMessage::FullReload {
                reason: "/proj/src/file0.js".to_string()
            }
        );
    }
}
