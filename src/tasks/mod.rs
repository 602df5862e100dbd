//! In-memory task registry
//!
//! Tracks one [`Task`] per submitted release. The registry is a cheap-to-clone
//! handle over an async `RwLock`; each task has a single writer (the pipeline
//! job processing it) and any number of readers.
//!
//! Status changes must follow [`TaskStatus::can_transition_to`]. Progress is
//! phase-local: it never decreases while the status stays the same and is reset
//! whenever a new phase begins.

mod sampler;

pub use sampler::{ProgressSample, ProgressSampler};

use crate::types::{Task, TaskId, TaskStatus, TaskUpdate};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Shared registry of pipeline tasks
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending task and return its id
    pub async fn create(&self, name: impl Into<String>) -> TaskId {
        let name = name.into();
        let mut tasks = self.tasks.write().await;

        let mut id = TaskId::generate();
        while tasks.contains_key(&id) {
            id = TaskId::generate();
        }

        tracing::debug!(task_id = %id, name = %name, "task created");
        tasks.insert(id.clone(), Task::new(id.clone(), name));
        id
    }

    /// Merge `update` into the task
    ///
    /// Unknown ids are ignored. A status change that is not a forward
    /// transition is rejected and nothing is merged.
    pub async fn update(&self, id: &TaskId, update: TaskUpdate) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(id) else {
            tracing::debug!(task_id = %id, "update for unknown task ignored");
            return Ok(());
        };

        let phase_changed = match update.status {
            Some(next) if next != task.status => {
                if !task.status.can_transition_to(next) {
                    return Err(Error::InvalidTransition {
                        id: id.clone(),
                        from: task.status,
                        to: next,
                    });
                }
                tracing::debug!(task_id = %id, from = %task.status, to = %next, "task status changed");
                task.status = next;
                true
            }
            _ => false,
        };

        if phase_changed {
            task.progress = update.progress.map(clamp_percent).unwrap_or(0.0);
        } else if let Some(progress) = update.progress {
            task.progress = task.progress.max(clamp_percent(progress));
        }

        if let Some(speed) = update.speed_bps {
            task.speed_bps = speed;
        }
        if let Some(eta) = update.eta_secs {
            task.eta_secs = eta;
        }
        if let Some(total) = update.total_size {
            task.total_size = total;
        }
        if let Some(peers) = update.peers {
            task.peers = peers;
        }
        if let Some(error) = update.error {
            task.error = Some(error);
        }
        task.updated_at = Utc::now();

        Ok(())
    }

    /// Snapshot of one task
    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Snapshot of every non-terminal task, oldest first
    pub async fn list_active(&self) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut active: Vec<Task> = tasks
            .values()
            .filter(|t| !t.status.is_terminal())
            .cloned()
            .collect();
        active.sort_by_key(|t| t.start_time);
        active
    }

    /// Snapshot of every task, oldest first
    pub async fn list_all(&self) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut all: Vec<Task> = tasks.values().cloned().collect();
        all.sort_by_key(|t| t.start_time);
        all
    }

    /// Remove terminal tasks not updated within `max_age`
    pub async fn prune(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.prune_before(cutoff).await
    }

    /// Remove terminal tasks last updated before `cutoff`
    pub(crate) async fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, t| !(t.status.is_terminal() && t.updated_at < cutoff));
        let removed = before - tasks.len();
        if removed > 0 {
            tracing::debug!(removed, "pruned finished tasks");
        }
        removed
    }

    /// Spawn a background task that prunes finished tasks every `interval`
    ///
    /// Runs until `cancel_token` is cancelled.
    pub fn spawn_pruner(
        &self,
        interval: Duration,
        max_age: Duration,
        cancel_token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        registry.prune(max_age).await;
                    }
                    _ = cancel_token.cancelled() => {
                        tracing::debug!("task pruner stopped");
                        break;
                    }
                }
            }
        })
    }
}

fn clamp_percent(progress: f32) -> f32 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 100.0)
    }
}
