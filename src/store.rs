//! Shared persisted state: one JSON bundle on disk, change notifications
//! over a broadcast channel so every open surface converges on the same
//! snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};

use crate::models::{ActiveSession, CompletedSession, Metrics, Settings, Task};

pub const STATE_FILE: &str = "state.json";
const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read state file: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to write state file: {0}")]
    Write(#[source] std::io::Error),
    #[error("state file is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The full persisted bundle. Every write replaces the file as a whole, so
/// observers never see half of a transition.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StateBundle {
    pub settings: Settings,
    pub tasks: Vec<Task>,
    pub metrics: Metrics,
    pub active_session: Option<ActiveSession>,
    pub last_session: Option<CompletedSession>,
    pub selected_task: Option<String>,
}

/// One changed key with its value before and after the write.
#[derive(Clone, Debug)]
pub enum FieldChange {
    Settings {
        old: Settings,
        new: Settings,
    },
    Tasks {
        old: Vec<Task>,
        new: Vec<Task>,
    },
    Metrics {
        old: Metrics,
        new: Metrics,
    },
    ActiveSession {
        old: Option<ActiveSession>,
        new: Option<ActiveSession>,
    },
    LastSession {
        old: Option<CompletedSession>,
        new: Option<CompletedSession>,
    },
    SelectedTask {
        old: Option<String>,
        new: Option<String>,
    },
}

impl FieldChange {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Settings { .. } => "settings",
            Self::Tasks { .. } => "tasks",
            Self::Metrics { .. } => "metrics",
            Self::ActiveSession { .. } => "activeSession",
            Self::LastSession { .. } => "lastSession",
            Self::SelectedTask { .. } => "selectedTask",
        }
    }
}

/// All keys touched by a single write, delivered as one notification.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    pub changes: Vec<FieldChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Clone)]
pub struct StateStore {
    state: Arc<RwLock<StateBundle>>,
    path: PathBuf,
    change_tx: broadcast::Sender<ChangeSet>,
}

impl StateStore {
    /// Opens the store in `dir`, loading the bundle if one exists. A missing
    /// file yields defaults; a corrupt file is surfaced rather than wiped.
    pub async fn open(dir: &Path) -> Result<Self, StoreError> {
        let path = dir.join(STATE_FILE);
        let bundle = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StateBundle::default(),
            Err(err) => return Err(StoreError::Read(err)),
        };

        let (change_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            state: Arc::new(RwLock::new(bundle)),
            path,
            change_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.change_tx.subscribe()
    }

    pub async fn snapshot(&self) -> StateBundle {
        self.state.read().await.clone()
    }

    /// Applies `mutate` to the bundle, persists, then broadcasts the keys
    /// that actually changed. On a persistence failure the in-memory bundle
    /// is rolled back so observers and disk stay in agreement.
    pub async fn update<F>(&self, mutate: F) -> Result<ChangeSet, StoreError>
    where
        F: FnOnce(&mut StateBundle),
    {
        let mut guard = self.state.write().await;
        let before = guard.clone();
        mutate(&mut guard);

        let change_set = diff(&before, &guard);
        if change_set.is_empty() {
            return Ok(change_set);
        }

        if let Err(err) = persist(&self.path, &guard).await {
            warn!(error = %err, "state write failed, rolling back");
            *guard = before;
            return Err(err);
        }
        drop(guard);

        let keys: Vec<_> = change_set.changes.iter().map(FieldChange::key).collect();
        debug!(?keys, "state updated");
        // Nobody listening is fine; surfaces subscribe when they mount.
        let _ = self.change_tx.send(change_set.clone());
        Ok(change_set)
    }
}

fn diff(before: &StateBundle, after: &StateBundle) -> ChangeSet {
    let mut changes = Vec::new();
    if before.settings != after.settings {
        changes.push(FieldChange::Settings {
            old: before.settings.clone(),
            new: after.settings.clone(),
        });
    }
    if before.tasks != after.tasks {
        changes.push(FieldChange::Tasks {
            old: before.tasks.clone(),
            new: after.tasks.clone(),
        });
    }
    if before.metrics != after.metrics {
        changes.push(FieldChange::Metrics {
            old: before.metrics,
            new: after.metrics,
        });
    }
    if before.active_session != after.active_session {
        changes.push(FieldChange::ActiveSession {
            old: before.active_session.clone(),
            new: after.active_session.clone(),
        });
    }
    if before.last_session != after.last_session {
        changes.push(FieldChange::LastSession {
            old: before.last_session.clone(),
            new: after.last_session.clone(),
        });
    }
    if before.selected_task != after.selected_task {
        changes.push(FieldChange::SelectedTask {
            old: before.selected_task.clone(),
            new: after.selected_task.clone(),
        });
    }
    ChangeSet { changes }
}

async fn persist(path: &Path, bundle: &StateBundle) -> Result<(), StoreError> {
    let text = serde_json::to_string_pretty(bundle)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(StoreError::Write)?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, text)
        .await
        .map_err(StoreError::Write)?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(StoreError::Write)
}
