//! Session lifecycle manager. Runs as a single task draining one queue of
//! commands and wake-up fires, which serializes every state transition. The
//! task keeps no session state of its own between events: each command
//! re-reads the store, so a restart of the process changes nothing.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::alarms::{AlarmScheduler, alarm_name, parse_alarm_name};
use crate::models::{ActiveSession, CompletedSession, SessionType, now_ms};
use crate::notifications::Notify;
use crate::store::{StateBundle, StateStore, StoreError};

const COMMAND_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid session duration: {0} minutes")]
    InvalidDuration(f64),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("timer service is not running")]
    Closed,
}

/// The command protocol spoken by every surface.
#[derive(Debug, Clone)]
pub enum Command {
    StartTimer {
        session_type: SessionType,
        duration_minutes: f64,
        task_id: Option<String>,
    },
    StopTimer,
    CompleteSession {
        elapsed_seconds: Option<f64>,
    },
    TestNotification,
}

struct Envelope {
    command: Command,
    reply: oneshot::Sender<Result<(), ServiceError>>,
}

#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<Envelope>,
}

impl ServiceHandle {
    pub async fn send(&self, command: Command) -> Result<(), ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                command,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ServiceError::Closed)?;
        reply_rx.await.map_err(|_| ServiceError::Closed)?
    }
}

/// Starts the lifecycle task and returns a cloneable handle to it.
pub fn spawn<N: Notify>(store: StateStore, notifier: N) -> ServiceHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    tokio::spawn(run(store, notifier, cmd_rx));
    ServiceHandle { tx: cmd_tx }
}

async fn run<N: Notify>(store: StateStore, notifier: N, mut commands: mpsc::Receiver<Envelope>) {
    let (fire_tx, mut fired) = mpsc::channel(8);
    let mut alarms = AlarmScheduler::new(fire_tx);

    // A wake-up can be lost while the process is down; settle the debt
    // before taking new commands.
    if let Err(err) = finalize_overdue(&store).await {
        warn!(error = %err, "overdue session sweep failed");
    }

    loop {
        tokio::select! {
            envelope = commands.recv() => {
                let Some(Envelope { command, reply }) = envelope else { break };
                let result = handle_command(&store, &notifier, &mut alarms, command).await;
                let _ = reply.send(result);
            }
            Some(name) = fired.recv() => {
                handle_wakeup(&store, &notifier, &mut alarms, &name).await;
            }
        }
    }
}

async fn handle_command<N: Notify>(
    store: &StateStore,
    notifier: &N,
    alarms: &mut AlarmScheduler,
    command: Command,
) -> Result<(), ServiceError> {
    match command {
        Command::StartTimer {
            session_type,
            duration_minutes,
            task_id,
        } => start_timer(store, alarms, session_type, duration_minutes, task_id).await,
        Command::StopTimer => stop_timer(store, alarms).await,
        Command::CompleteSession { elapsed_seconds } => {
            finalize_session(store, alarms, elapsed_seconds).await
        }
        Command::TestNotification => {
            let settings = store.snapshot().await.settings;
            notifier.session_complete(SessionType::Focus, &settings);
            Ok(())
        }
    }
}

async fn start_timer(
    store: &StateStore,
    alarms: &mut AlarmScheduler,
    session_type: SessionType,
    duration_minutes: f64,
    task_id: Option<String>,
) -> Result<(), ServiceError> {
    if !duration_minutes.is_finite() || duration_minutes <= 0.0 {
        warn!(
            minutes = duration_minutes,
            "rejected session start with invalid duration"
        );
        return Err(ServiceError::InvalidDuration(duration_minutes));
    }

    let session = ActiveSession {
        session_type,
        task_id,
        duration_seconds: (duration_minutes * 60.0).round() as u64,
        started_at: now_ms(),
    };
    info!(
        session = session_type.as_str(),
        duration_seconds = session.duration_seconds,
        "session started"
    );
    // Last writer wins: a rapid second start simply replaces the record.
    store
        .update(move |state| state.active_session = Some(session))
        .await?;
    alarms.schedule(&alarm_name(session_type), duration_minutes);
    Ok(())
}

async fn stop_timer(store: &StateStore, alarms: &mut AlarmScheduler) -> Result<(), ServiceError> {
    alarms.cancel_all();
    store.update(|state| state.active_session = None).await?;
    Ok(())
}

async fn finalize_session(
    store: &StateStore,
    alarms: &mut AlarmScheduler,
    elapsed_seconds: Option<f64>,
) -> Result<(), ServiceError> {
    alarms.cancel_all();
    let now = now_ms();
    store
        .update(|state| apply_completion(state, elapsed_seconds, now))
        .await?;
    Ok(())
}

async fn handle_wakeup<N: Notify>(
    store: &StateStore,
    notifier: &N,
    alarms: &mut AlarmScheduler,
    name: &str,
) {
    let Some(session_type) = parse_alarm_name(name) else {
        return;
    };
    info!(name, "wake-up fired");

    let settings = store.snapshot().await.settings;
    notifier.session_complete(session_type, &settings);
    if let Err(err) = finalize_session(store, alarms, None).await {
        warn!(error = %err, "failed to finalize session after wake-up");
    }
}

async fn finalize_overdue(store: &StateStore) -> Result<(), StoreError> {
    let now = now_ms();
    let snapshot = store.snapshot().await;
    let Some(active) = snapshot.active_session else {
        return Ok(());
    };
    if active.ends_at() <= now {
        info!(
            session = active.session_type.as_str(),
            "finalizing session that ended while the timer was not running"
        );
        store
            .update(|state| apply_completion(state, None, now))
            .await?;
    }
    Ok(())
}

/// The finalize transition: converts the active session into aggregate
/// credit plus a completion record, in one mutation. With no active session
/// this does nothing, which is what makes a second finalize harmless.
fn apply_completion(state: &mut StateBundle, elapsed_seconds: Option<f64>, now_ms: i64) {
    let Some(active) = state.active_session.take() else {
        return;
    };

    let elapsed = elapsed_seconds.unwrap_or(active.duration_seconds as f64);
    let duration_seconds = elapsed.round().max(1.0) as u64;

    if active.session_type.is_focus() {
        state.metrics.focus_seconds += duration_seconds;
        state.metrics.total_pomodoros += 1;
        if let Some(task_id) = active.task_id.as_deref() {
            // The task may have been deleted mid-session.
            if let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id) {
                task.total_pomos += 1;
                task.today_pomos += 1;
                task.total_focus_seconds += duration_seconds;
                task.today_focus_seconds += duration_seconds;
            }
        }
    } else {
        state.metrics.break_seconds += duration_seconds;
    }

    state.last_session = Some(CompletedSession {
        session_type: active.session_type,
        task_id: active.task_id,
        duration_seconds,
        completed_at: now_ms,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Settings, Task};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct RecordingNotifier(Arc<Mutex<Vec<SessionType>>>);

    impl Notify for RecordingNotifier {
        fn session_complete(&self, session_type: SessionType, _settings: &Settings) {
            self.0.lock().unwrap().push(session_type);
        }
    }

    fn running_state(session_type: SessionType, task_id: Option<&str>) -> StateBundle {
        let mut state = StateBundle::default();
        if let Some(id) = task_id {
            let mut task = Task::new("Write tests");
            task.id = id.to_string();
            state.tasks.push(task);
        }
        state.active_session = Some(ActiveSession {
            session_type,
            task_id: task_id.map(str::to_string),
            duration_seconds: 1500,
            started_at: 0,
        });
        state
    }

    #[test]
    fn focus_completion_credits_metrics_and_task() {
        let mut state = running_state(SessionType::Focus, Some("t1"));
        apply_completion(&mut state, None, 9_000);

        assert!(state.active_session.is_none());
        assert_eq!(state.metrics.focus_seconds, 1500);
        assert_eq!(state.metrics.total_pomodoros, 1);
        assert_eq!(state.metrics.break_seconds, 0);

        let task = &state.tasks[0];
        assert_eq!(task.total_pomos, 1);
        assert_eq!(task.today_pomos, 1);
        assert_eq!(task.total_focus_seconds, 1500);
        assert_eq!(task.today_focus_seconds, 1500);

        let done = state.last_session.unwrap();
        assert_eq!(done.session_type, SessionType::Focus);
        assert_eq!(done.duration_seconds, 1500);
        assert_eq!(done.completed_at, 9_000);
    }

    #[test]
    fn break_completion_touches_only_break_seconds() {
        let mut state = running_state(SessionType::ShortBreak, None);
        apply_completion(&mut state, None, 9_000);

        assert_eq!(state.metrics.break_seconds, 1500);
        assert_eq!(state.metrics.focus_seconds, 0);
        assert_eq!(state.metrics.total_pomodoros, 0);
    }

    #[test]
    fn deleted_task_still_credits_metrics() {
        let mut state = running_state(SessionType::Focus, Some("t1"));
        state.tasks.clear();
        apply_completion(&mut state, None, 9_000);

        assert_eq!(state.metrics.focus_seconds, 1500);
        assert_eq!(state.metrics.total_pomodoros, 1);
        assert!(state.tasks.is_empty());
    }

    #[test]
    fn completion_when_idle_is_a_noop() {
        let mut state = StateBundle::default();
        apply_completion(&mut state, Some(42.0), 9_000);
        assert_eq!(state, StateBundle::default());
    }

    #[test]
    fn elapsed_override_rounds_and_floors() {
        let mut state = running_state(SessionType::Focus, None);
        apply_completion(&mut state, Some(42.4), 9_000);
        assert_eq!(state.last_session.as_ref().unwrap().duration_seconds, 42);
        assert_eq!(state.metrics.focus_seconds, 42);

        let mut state = running_state(SessionType::Focus, None);
        apply_completion(&mut state, Some(0.2), 9_000);
        assert_eq!(state.last_session.as_ref().unwrap().duration_seconds, 1);
    }

    async fn open_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn start_writes_active_session() {
        let (_dir, store) = open_store().await;
        let handle = spawn(store.clone(), RecordingNotifier::default());

        handle
            .send(Command::StartTimer {
                session_type: SessionType::Focus,
                duration_minutes: 25.0,
                task_id: Some("t1".into()),
            })
            .await
            .unwrap();

        let active = store.snapshot().await.active_session.unwrap();
        assert_eq!(active.session_type, SessionType::Focus);
        assert_eq!(active.duration_seconds, 1500);
        assert_eq!(active.task_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn nonpositive_duration_rejected_without_mutation() {
        let (_dir, store) = open_store().await;
        let handle = spawn(store.clone(), RecordingNotifier::default());

        for minutes in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let result = handle
                .send(Command::StartTimer {
                    session_type: SessionType::Focus,
                    duration_minutes: minutes,
                    task_id: None,
                })
                .await;
            assert!(matches!(result, Err(ServiceError::InvalidDuration(_))));
        }
        assert!(store.snapshot().await.active_session.is_none());
    }

    #[tokio::test]
    async fn complete_twice_credits_once() {
        let (_dir, store) = open_store().await;
        let handle = spawn(store.clone(), RecordingNotifier::default());

        handle
            .send(Command::StartTimer {
                session_type: SessionType::Focus,
                duration_minutes: 25.0,
                task_id: None,
            })
            .await
            .unwrap();
        handle
            .send(Command::CompleteSession {
                elapsed_seconds: None,
            })
            .await
            .unwrap();
        // The second finalize must succeed and change nothing.
        handle
            .send(Command::CompleteSession {
                elapsed_seconds: None,
            })
            .await
            .unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.metrics.total_pomodoros, 1);
        assert_eq!(snapshot.metrics.focus_seconds, 1500);
        assert!(snapshot.active_session.is_none());
    }

    #[tokio::test]
    async fn stop_clears_without_credit() {
        let (_dir, store) = open_store().await;
        let handle = spawn(store.clone(), RecordingNotifier::default());

        handle
            .send(Command::StartTimer {
                session_type: SessionType::ShortBreak,
                duration_minutes: 5.0,
                task_id: None,
            })
            .await
            .unwrap();
        handle.send(Command::StopTimer).await.unwrap();

        let snapshot = store.snapshot().await;
        assert!(snapshot.active_session.is_none());
        assert!(snapshot.last_session.is_none());
        assert_eq!(snapshot.metrics, Default::default());
    }

    #[tokio::test]
    async fn test_notification_leaves_state_untouched() {
        let (_dir, store) = open_store().await;
        let notifier = RecordingNotifier::default();
        let handle = spawn(store.clone(), notifier.clone());

        let before = store.snapshot().await;
        handle.send(Command::TestNotification).await.unwrap();

        assert_eq!(store.snapshot().await, before);
        assert_eq!(&*notifier.0.lock().unwrap(), &[SessionType::Focus]);
    }

    #[tokio::test]
    async fn wakeup_notifies_then_finalizes() {
        let (_dir, store) = open_store().await;
        let notifier = RecordingNotifier::default();
        let handle = spawn(store.clone(), notifier.clone());

        // 0.05 minutes arms the three-second floor.
        handle
            .send(Command::StartTimer {
                session_type: SessionType::Focus,
                duration_minutes: 0.05,
                task_id: None,
            })
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while store.snapshot().await.active_session.is_some() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "wake-up never finalized the session"
            );
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.metrics.total_pomodoros, 1);
        assert_eq!(snapshot.metrics.focus_seconds, 3);
        assert_eq!(
            snapshot.last_session.unwrap().session_type,
            SessionType::Focus
        );
        assert_eq!(&*notifier.0.lock().unwrap(), &[SessionType::Focus]);
    }

    #[tokio::test]
    async fn startup_sweep_finalizes_overdue_session() {
        let (_dir, store) = open_store().await;
        store
            .update(|state| {
                state.active_session = Some(ActiveSession {
                    session_type: SessionType::Focus,
                    task_id: None,
                    duration_seconds: 1500,
                    started_at: now_ms() - 3_600_000,
                });
            })
            .await
            .unwrap();

        let handle = spawn(store.clone(), RecordingNotifier::default());
        // Any command is ordered after the sweep.
        handle.send(Command::TestNotification).await.unwrap();

        let snapshot = store.snapshot().await;
        assert!(snapshot.active_session.is_none());
        assert_eq!(snapshot.metrics.total_pomodoros, 1);
        assert_eq!(snapshot.metrics.focus_seconds, 1500);
    }
}
