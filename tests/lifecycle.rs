//! End-to-end lifecycle checks: commands flow through the service into the
//! store, and every open surface converges on the result through change
//! notifications alone.

use tokio::sync::broadcast;

use pomopilot::models::{SessionType, Settings, Task, now_ms};
use pomopilot::notifications::Notify;
use pomopilot::presenter::{DisplayStatus, Presenter};
use pomopilot::service::{self, Command, ServiceHandle};
use pomopilot::store::{ChangeSet, StateStore};

struct SilentNotifier;

impl Notify for SilentNotifier {
    fn session_complete(&self, _session_type: SessionType, _settings: &Settings) {}
}

async fn setup() -> (tempfile::TempDir, StateStore, ServiceHandle) {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(dir.path()).await.unwrap();
    let handle = service::spawn(store.clone(), SilentNotifier);
    (dir, store, handle)
}

async fn pump(presenter: &mut Presenter, rx: &mut broadcast::Receiver<ChangeSet>, now_ms: i64) {
    while let Ok(change_set) = rx.try_recv() {
        presenter.apply_change(&change_set, now_ms).await;
    }
}

#[tokio::test]
async fn focus_flow_credits_selected_task() {
    let (_dir, store, handle) = setup().await;
    let task = Task::new("Ship the release");
    let task_id = task.id.clone();
    store
        .update(move |state| state.tasks.push(task))
        .await
        .unwrap();

    handle
        .send(Command::StartTimer {
            session_type: SessionType::Focus,
            duration_minutes: 25.0,
            task_id: Some(task_id.clone()),
        })
        .await
        .unwrap();

    let active = store.snapshot().await.active_session.unwrap();
    assert_eq!(active.session_type, SessionType::Focus);
    assert_eq!(active.duration_seconds, 1500);

    handle
        .send(Command::CompleteSession {
            elapsed_seconds: None,
        })
        .await
        .unwrap();

    let snapshot = store.snapshot().await;
    assert!(snapshot.active_session.is_none());
    assert_eq!(snapshot.metrics.focus_seconds, 1500);
    assert_eq!(snapshot.metrics.total_pomodoros, 1);
    assert_eq!(snapshot.metrics.break_seconds, 0);

    let task = &snapshot.tasks[0];
    assert_eq!(task.total_pomos, 1);
    assert_eq!(task.today_pomos, 1);
    assert_eq!(task.total_focus_seconds, 1500);
    assert_eq!(task.today_focus_seconds, 1500);

    let done = snapshot.last_session.unwrap();
    assert_eq!(done.session_type, SessionType::Focus);
    assert_eq!(done.task_id.as_deref(), Some(task_id.as_str()));
    assert_eq!(done.duration_seconds, 1500);
}

#[tokio::test]
async fn early_completion_records_elapsed_not_planned() {
    let (_dir, store, handle) = setup().await;

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
            elapsed_seconds: Some(42.0),
        })
        .await
        .unwrap();

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.metrics.focus_seconds, 42);
    assert_eq!(snapshot.last_session.unwrap().duration_seconds, 42);
}

#[tokio::test]
async fn second_start_replaces_first() {
    let (_dir, store, handle) = setup().await;

    handle
        .send(Command::StartTimer {
            session_type: SessionType::Focus,
            duration_minutes: 25.0,
            task_id: None,
        })
        .await
        .unwrap();
    handle
        .send(Command::StartTimer {
            session_type: SessionType::ShortBreak,
            duration_minutes: 5.0,
            task_id: None,
        })
        .await
        .unwrap();

    let active = store.snapshot().await.active_session.unwrap();
    assert_eq!(active.session_type, SessionType::ShortBreak);
    assert_eq!(active.duration_seconds, 300);
}

#[tokio::test]
async fn surfaces_converge_after_completion() {
    let (_dir, store, handle) = setup().await;
    let now = now_ms();

    let mut rx1 = store.subscribe();
    let mut rx2 = store.subscribe();
    let mut first = Presenter::mount(store.clone(), handle.clone(), now).await;
    let mut second = Presenter::mount(store.clone(), handle.clone(), now).await;

    first.start(now).await;
    pump(&mut first, &mut rx1, now).await;
    pump(&mut second, &mut rx2, now).await;
    assert_eq!(first.status, DisplayStatus::Running);
    assert_eq!(second.status, DisplayStatus::Running);

    first.finish_early(now + 60_000).await;
    let later = now + 61_000;
    pump(&mut first, &mut rx1, later).await;
    pump(&mut second, &mut rx2, later).await;

    // One change-notification round-trip and both surfaces agree.
    for presenter in [&first, &second] {
        assert_eq!(presenter.status, DisplayStatus::Idle);
        assert_eq!(presenter.session_type, SessionType::ShortBreak);
        assert_eq!(presenter.metrics.total_pomodoros, 1);
        assert!(presenter.banner.is_some());
    }
}

#[tokio::test]
async fn pause_does_not_propagate() {
    let (_dir, store, handle) = setup().await;
    let now = now_ms();

    let mut rx1 = store.subscribe();
    let mut rx2 = store.subscribe();
    let mut pausing = Presenter::mount(store.clone(), handle.clone(), now).await;
    let mut watching = Presenter::mount(store.clone(), handle.clone(), now).await;

    pausing.start(now).await;
    pump(&mut pausing, &mut rx1, now).await;
    pump(&mut watching, &mut rx2, now).await;
    assert_eq!(watching.status, DisplayStatus::Running);

    pausing.pause(now + 10_000).await;
    let later = now + 11_000;
    pump(&mut pausing, &mut rx1, later).await;
    pump(&mut watching, &mut rx2, later).await;

    // The pausing surface holds the remainder; everyone else sees idle.
    assert_eq!(pausing.status, DisplayStatus::Paused);
    assert_eq!(pausing.remaining_seconds(later), 1490);
    assert_eq!(watching.status, DisplayStatus::Idle);
    assert!(store.snapshot().await.active_session.is_none());
}

#[tokio::test]
async fn completion_auto_starts_next_when_enabled() {
    let (_dir, store, handle) = setup().await;
    store
        .update(|state| state.settings.auto_start_next = true)
        .await
        .unwrap();

    let now = now_ms();
    let mut rx = store.subscribe();
    let mut presenter = Presenter::mount(store.clone(), handle.clone(), now).await;

    presenter.start(now).await;
    pump(&mut presenter, &mut rx, now).await;

    handle
        .send(Command::CompleteSession {
            elapsed_seconds: None,
        })
        .await
        .unwrap();
    pump(&mut presenter, &mut rx, now + 1_000).await;

    assert_eq!(presenter.status, DisplayStatus::Running);
    assert_eq!(presenter.session_type, SessionType::ShortBreak);

    let active = store.snapshot().await.active_session.unwrap();
    assert_eq!(active.session_type, SessionType::ShortBreak);
    assert_eq!(active.duration_seconds, 300);
}

#[tokio::test]
async fn settings_edits_reach_other_surfaces() {
    let (_dir, store, handle) = setup().await;
    let now = now_ms();

    let mut rx = store.subscribe();
    let mut editor = Presenter::mount(store.clone(), handle.clone(), now).await;
    let mut observer = Presenter::mount(store.clone(), handle.clone(), now).await;
    let mut observer_rx = store.subscribe();

    let mut settings = editor.settings.clone();
    settings.focus_min = 50;
    editor.save_settings(settings).await;

    pump(&mut editor, &mut rx, now).await;
    pump(&mut observer, &mut observer_rx, now).await;

    assert_eq!(observer.settings.focus_min, 50);
    // Idle surfaces re-derive their countdown from the new duration.
    assert_eq!(observer.remaining_seconds(now), 3000);
}
