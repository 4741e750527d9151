//! Task graph
//!
//! Tasks form a DAG by naming their prerequisites. A task starts as soon as
//! every prerequisite has succeeded, so independent tasks run concurrently.
//! A failing task takes its transitive dependents down with it; unrelated
//! branches keep going. Nothing is retried.

pub mod actions;
pub mod catalog;
mod context;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::BuildError;
use crate::utils::format_duration;

pub use context::{BuildContext, RunMode};

/// Name of a task, unique within a graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

type Action = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// A unit of work with prerequisites
pub struct Task {
    pub id: TaskId,
    pub deps: Vec<TaskId>,
    action: Action,
}

impl Task {
    pub fn new<F, Fut>(id: impl Into<TaskId>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            id: id.into(),
            deps: Vec::new(),
            action: Box::new(move || action().boxed()),
        }
    }

    /// Run only after every task in `deps` succeeded
    pub fn after<I, D>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<TaskId>,
    {
        self.deps.extend(deps.into_iter().map(Into::into));
        self
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// Outcome of running a graph
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GraphReport {
    pub succeeded: Vec<TaskId>,
    pub failed: Vec<(TaskId, String)>,
    /// Never started because a prerequisite failed
    pub skipped: Vec<TaskId>,
}

impl GraphReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// A DAG of tasks
#[derive(Debug, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, task: Task) -> &mut Self {
        self.tasks.push(task);
        self
    }

    pub fn ids(&self) -> Vec<&TaskId> {
        self.tasks.iter().map(|t| &t.id).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Check ids and edges, returning a topological order
    pub fn validate(&self) -> Result<Vec<TaskId>> {
        let mut known = HashSet::new();
        for task in &self.tasks {
            if !known.insert(&task.id) {
                return Err(BuildError::TaskGraph(format!("duplicate task '{}'", task.id)).into());
            }
        }

        let mut in_degree: HashMap<&TaskId, usize> = HashMap::new();
        let mut dependents: HashMap<&TaskId, Vec<&TaskId>> = HashMap::new();
        for task in &self.tasks {
            in_degree.insert(&task.id, task.deps.len());
            for dep in &task.deps {
                if !known.contains(dep) {
                    return Err(BuildError::TaskGraph(format!(
                        "task '{}' depends on unknown task '{}'",
                        task.id, dep
                    ))
                    .into());
                }
                dependents.entry(dep).or_default().push(&task.id);
            }
        }

        let mut queue: VecDeque<&TaskId> = self
            .tasks
            .iter()
            .filter(|t| t.deps.is_empty())
            .map(|t| &t.id)
            .collect();
        let mut order = Vec::with_capacity(self.tasks.len());

        while let Some(id) = queue.pop_front() {
            order.push(id.clone());
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }

        if order.len() != self.tasks.len() {
            let mut stuck: Vec<&str> = in_degree
                .iter()
                .filter(|(_, &degree)| degree > 0)
                .map(|(id, _)| id.as_str())
                .collect();
            stuck.sort_unstable();
            return Err(BuildError::TaskGraph(format!(
                "cycle detected among tasks: {}",
                stuck.join(", ")
            ))
            .into());
        }

        Ok(order)
    }

    /// Validate, then run every task whose prerequisites succeed
    pub async fn run(self) -> Result<GraphReport> {
        self.validate()?;

        let mut status: HashMap<TaskId, Status> = self
            .tasks
            .iter()
            .map(|t| (t.id.clone(), Status::Pending))
            .collect();
        let mut pending: Vec<Task> = self.tasks;
        let mut report = GraphReport::default();
        let mut running: JoinSet<(TaskId, Result<(), String>, Duration)> = JoinSet::new();

        loop {
            // Anything downstream of a failure will never run
            let mut changed = true;
            while changed {
                changed = false;
                for task in &pending {
                    let blocked = task.deps.iter().any(|dep| {
                        matches!(status.get(dep), Some(Status::Failed | Status::Skipped))
                    });
                    if blocked && status.get(&task.id) == Some(&Status::Pending) {
                        warn!("Skipping '{}': a prerequisite failed", task.id);
                        status.insert(task.id.clone(), Status::Skipped);
                        report.skipped.push(task.id.clone());
                        changed = true;
                    }
                }
            }
            pending.retain(|t| status.get(&t.id) == Some(&Status::Pending));

            let (ready, waiting): (Vec<Task>, Vec<Task>) = pending.into_iter().partition(|task| {
                task.deps
                    .iter()
                    .all(|dep| status.get(dep) == Some(&Status::Succeeded))
            });
            pending = waiting;

            for task in ready {
                status.insert(task.id.clone(), Status::Running);
                info!("Starting '{}'", task.id);

                let Task { id, action, .. } = task;
                running.spawn(async move {
                    let start = Instant::now();
                    let outcome = match AssertUnwindSafe(action()).catch_unwind().await {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(err)) => Err(format!("{:#}", err)),
                        Err(panic) => Err(panic_message(panic.as_ref())),
                    };
                    (id, outcome, start.elapsed())
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (id, outcome, elapsed) = joined.map_err(|e| anyhow!("task runner failed: {}", e))?;

            match outcome {
                Ok(()) => {
                    info!("Finished '{}' after {}", id, format_duration(elapsed));
                    status.insert(id.clone(), Status::Succeeded);
                    report.succeeded.push(id);
                }
                Err(message) => {
                    error!("'{}' errored after {}: {}", id, format_duration(elapsed), message);
                    status.insert(id.clone(), Status::Failed);
                    report.failed.push((id, message));
                }
            }
        }

        Ok(report)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
