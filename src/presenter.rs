//! Display state for one open surface. Each presenter keeps its own
//! one-second countdown purely for presentation; the authoritative word on
//! a session finishing is always a store change, never the local clock
//! hitting zero. Concurrent surfaces converge by all re-deriving from the
//! same change notifications.

use tracing::warn;

use crate::models::{
    ActiveSession, CompletedSession, Metrics, SessionType, Settings, Task,
};
use crate::service::{Command, ServiceHandle};
use crate::store::{ChangeSet, FieldChange, StateBundle, StateStore};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DisplayStatus {
    Idle,
    Running,
    /// Local-only: the backend has no session while paused, so another
    /// open surface will show idle instead.
    Paused,
}

pub struct Presenter {
    store: StateStore,
    service: ServiceHandle,
    pub settings: Settings,
    pub tasks: Vec<Task>,
    pub metrics: Metrics,
    pub selected_task: Option<String>,
    pub session_type: SessionType,
    pub status: DisplayStatus,
    /// Transient completion or error message.
    pub banner: Option<String>,
    remaining_base: u64,
    synced_at_ms: i64,
    last_seen_completed_at: i64,
}

impl Presenter {
    pub async fn mount(store: StateStore, service: ServiceHandle, now_ms: i64) -> Self {
        let snapshot = store.snapshot().await;
        let mut presenter = Self {
            store,
            service,
            settings: snapshot.settings.clone(),
            tasks: snapshot.tasks.clone(),
            metrics: snapshot.metrics,
            selected_task: snapshot.selected_task.clone(),
            session_type: SessionType::Focus,
            status: DisplayStatus::Idle,
            banner: None,
            remaining_base: 0,
            synced_at_ms: now_ms,
            // Seed the high-water mark so a completion that predates this
            // surface is never re-announced.
            last_seen_completed_at: snapshot
                .last_session
                .as_ref()
                .map(|done| done.completed_at)
                .unwrap_or(0),
        };
        presenter.remaining_base = presenter.settings.duration_seconds(SessionType::Focus);
        if let Some(active) = &snapshot.active_session {
            presenter.sync_active(active, now_ms);
        }
        presenter
    }

    pub fn remaining_seconds(&self, now_ms: i64) -> u64 {
        match self.status {
            DisplayStatus::Running => {
                let elapsed = (now_ms - self.synced_at_ms).max(0) / 1000;
                self.remaining_base.saturating_sub(elapsed as u64)
            }
            DisplayStatus::Idle | DisplayStatus::Paused => self.remaining_base,
        }
    }

    /// Presentation heartbeat. When the local countdown bottoms out the
    /// display drops to idle, but nothing is recorded: the session stays
    /// live in the store until the wake-up fires.
    pub fn tick(&mut self, now_ms: i64) {
        if self.status == DisplayStatus::Running && self.remaining_seconds(now_ms) == 0 {
            self.status = DisplayStatus::Idle;
            self.remaining_base = 0;
        }
    }

    fn sync_active(&mut self, active: &ActiveSession, now_ms: i64) {
        self.session_type = active.session_type;
        if active.session_type.is_focus() {
            if let Some(task_id) = &active.task_id {
                self.selected_task = Some(task_id.clone());
            }
        }

        let remaining = active.remaining_at(now_ms);
        self.remaining_base = remaining;
        self.synced_at_ms = now_ms;
        self.status = if remaining > 0 {
            DisplayStatus::Running
        } else {
            DisplayStatus::Idle
        };
        self.banner = None;
    }

    pub async fn apply_change(&mut self, change_set: &ChangeSet, now_ms: i64) {
        for change in &change_set.changes {
            match change {
                FieldChange::Settings { new, .. } => {
                    self.settings = new.clone();
                    if self.status == DisplayStatus::Idle {
                        self.remaining_base = self.settings.duration_seconds(self.session_type);
                    }
                }
                FieldChange::Tasks { new, .. } => {
                    self.tasks = new.clone();
                    if let Some(id) = self.selected_task.clone() {
                        if !self.tasks.iter().any(|task| task.id == id) {
                            self.selected_task = None;
                            self.persist(|state| state.selected_task = None).await;
                        }
                    }
                }
                FieldChange::Metrics { new, .. } => self.metrics = *new,
                FieldChange::SelectedTask { new, .. } => self.selected_task = new.clone(),
                FieldChange::ActiveSession {
                    new: Some(active), ..
                } => self.sync_active(active, now_ms),
                FieldChange::ActiveSession { new: None, .. } => {
                    // A locally-held pause survives; a running display does not.
                    if self.status == DisplayStatus::Running {
                        self.status = DisplayStatus::Idle;
                    }
                }
                FieldChange::LastSession {
                    new: Some(done), ..
                } => {
                    if done.completed_at > self.last_seen_completed_at {
                        self.last_seen_completed_at = done.completed_at;
                        let done = done.clone();
                        self.session_completed(&done, now_ms).await;
                    }
                }
                FieldChange::LastSession { new: None, .. } => {}
            }
        }
    }

    async fn session_completed(&mut self, done: &CompletedSession, now_ms: i64) {
        let next = done.session_type.next();
        self.session_type = next;
        self.status = DisplayStatus::Idle;
        self.remaining_base = self.settings.duration_seconds(next);
        self.banner = Some(
            if done.session_type.is_focus() {
                "Focus session complete! Enjoy your break."
            } else {
                "Break finished. Ready for the next focus session?"
            }
            .to_string(),
        );

        if self.settings.auto_start_next {
            self.start_session(next, f64::from(self.settings.duration_min(next)), now_ms)
                .await;
        }
    }

    /// Re-derives everything from a fresh snapshot. Used when change
    /// notifications were missed; snapshots cannot diverge the way replayed
    /// deltas can.
    pub async fn resync(&mut self, now_ms: i64) {
        let snapshot = self.store.snapshot().await;
        self.settings = snapshot.settings;
        self.tasks = snapshot.tasks;
        self.metrics = snapshot.metrics;
        self.selected_task = snapshot.selected_task;

        if let Some(done) = snapshot.last_session {
            if done.completed_at > self.last_seen_completed_at {
                self.last_seen_completed_at = done.completed_at;
                self.session_completed(&done, now_ms).await;
            }
        }
        match &snapshot.active_session {
            Some(active) => self.sync_active(active, now_ms),
            None => {
                if self.status == DisplayStatus::Running {
                    self.status = DisplayStatus::Idle;
                }
            }
        }
    }

    pub async fn start(&mut self, now_ms: i64) {
        if self.status == DisplayStatus::Running {
            return;
        }

        // Resuming from a local pause carries the frozen remainder over as
        // a custom duration; otherwise the configured length applies.
        let minutes = if self.status == DisplayStatus::Paused && self.remaining_base > 0 {
            self.remaining_base as f64 / 60.0
        } else {
            f64::from(self.settings.duration_min(self.session_type))
        };
        self.banner = None;
        self.start_session(self.session_type, minutes, now_ms).await;
    }

    async fn start_session(&mut self, session_type: SessionType, duration_minutes: f64, now_ms: i64) {
        let task_id = if session_type.is_focus() {
            self.selected_task.clone()
        } else {
            None
        };

        match self
            .service
            .send(Command::StartTimer {
                session_type,
                duration_minutes,
                task_id,
            })
            .await
        {
            Ok(()) => {
                self.session_type = session_type;
                self.remaining_base = (duration_minutes * 60.0).round() as u64;
                self.synced_at_ms = now_ms;
                self.status = DisplayStatus::Running;
            }
            Err(err) => {
                warn!(error = %err, "unable to start timer");
                self.banner = Some(format!("Unable to start timer: {err}"));
            }
        }
    }

    pub async fn pause(&mut self, now_ms: i64) {
        if self.status != DisplayStatus::Running {
            return;
        }

        // Freeze the countdown here; the backend forgets the session.
        self.remaining_base = self.remaining_seconds(now_ms);
        self.synced_at_ms = now_ms;
        self.status = DisplayStatus::Paused;
        self.send_or_banner(Command::StopTimer).await;
    }

    pub async fn reset(&mut self) {
        self.status = DisplayStatus::Idle;
        self.remaining_base = self.settings.duration_seconds(self.session_type);
        self.banner = None;
        self.send_or_banner(Command::StopTimer).await;
    }

    pub async fn skip(&mut self) {
        self.send_or_banner(Command::StopTimer).await;
        self.session_type = self.session_type.next();
        self.status = DisplayStatus::Idle;
        self.remaining_base = self.settings.duration_seconds(self.session_type);
    }

    pub async fn finish_early(&mut self, now_ms: i64) {
        if self.status != DisplayStatus::Running {
            return;
        }

        let planned = self.settings.duration_seconds(self.session_type);
        let elapsed = planned
            .saturating_sub(self.remaining_seconds(now_ms))
            .max(1);
        self.send_or_banner(Command::CompleteSession {
            elapsed_seconds: Some(elapsed as f64),
        })
        .await;
        self.status = DisplayStatus::Idle;
        self.remaining_base = 0;
    }

    pub async fn test_notification(&mut self) {
        match self.service.send(Command::TestNotification).await {
            Ok(()) => self.banner = Some("Practice alert triggered.".to_string()),
            Err(err) => self.banner = Some(format!("Test failed: {err}")),
        }
    }

    pub async fn add_task(&mut self, title: &str) {
        let title = title.trim();
        if title.is_empty() {
            self.banner = Some("Task title cannot be empty.".to_string());
            return;
        }

        let task = Task::new(title);
        let id = task.id.clone();
        self.persist(move |state| {
            state.tasks.push(task);
            if state.selected_task.is_none() {
                state.selected_task = Some(id);
            }
        })
        .await;
    }

    pub async fn rename_task(&mut self, task_id: &str, title: &str) {
        let title = title.trim().to_string();
        if title.is_empty() {
            self.banner = Some("Task title cannot be empty.".to_string());
            return;
        }

        let id = task_id.to_string();
        self.persist(move |state| {
            if let Some(task) = state.tasks.iter_mut().find(|task| task.id == id) {
                task.title = title;
            }
        })
        .await;
    }

    pub async fn delete_task(&mut self, task_id: &str) {
        let id = task_id.to_string();
        self.persist(move |state| {
            state.tasks.retain(|task| task.id != id);
            if state.selected_task.as_deref() == Some(id.as_str()) {
                state.selected_task = None;
            }
        })
        .await;
    }

    pub async fn toggle_task_completed(&mut self, task_id: &str) {
        let id = task_id.to_string();
        self.persist(move |state| {
            if let Some(task) = state.tasks.iter_mut().find(|task| task.id == id) {
                task.completed = !task.completed;
            }
        })
        .await;
    }

    pub async fn select_task(&mut self, task_id: Option<String>) {
        self.selected_task = task_id.clone();
        self.persist(move |state| state.selected_task = task_id).await;
    }

    pub async fn save_settings(&mut self, settings: Settings) {
        self.settings = settings.clone();
        if self.status == DisplayStatus::Idle {
            self.remaining_base = self.settings.duration_seconds(self.session_type);
        }
        self.persist(move |state| state.settings = settings).await;
    }

    async fn send_or_banner(&mut self, command: Command) {
        if let Err(err) = self.service.send(command).await {
            warn!(error = %err, "timer command failed");
            self.banner = Some(format!("Command failed: {err}"));
        }
    }

    async fn persist<F>(&mut self, mutate: F)
    where
        F: FnOnce(&mut StateBundle),
    {
        if let Err(err) = self.store.update(mutate).await {
            warn!(error = %err, "state update failed");
            self.banner = Some(format!("Save failed: {err}"));
        }
    }
}
