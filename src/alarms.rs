//! One-shot wake-ups. Arming an already-armed key replaces it; delivery is
//! at-least-once, so the lifecycle manager stays idempotent on its end.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::SessionType;

const ALARM_PREFIX: &str = "pomodoro:";

/// Shortest delay we will arm, in minutes. Mirrors the floor applied by the
/// start command so a near-zero session still gets a wake-up.
pub const MIN_DELAY_MINUTES: f64 = 0.05;

pub fn alarm_name(session_type: SessionType) -> String {
    format!("{ALARM_PREFIX}{}", session_type.as_str())
}

/// Recovers the session type carried in a wake-up name. Foreign names are
/// `None`; an unrecognized suffix decodes as Focus.
pub fn parse_alarm_name(name: &str) -> Option<SessionType> {
    name.strip_prefix(ALARM_PREFIX).map(SessionType::from_name)
}

pub struct AlarmScheduler {
    fire_tx: mpsc::Sender<String>,
    pending: HashMap<String, JoinHandle<()>>,
}

impl AlarmScheduler {
    /// Fired wake-up names are delivered through `fire_tx`.
    pub fn new(fire_tx: mpsc::Sender<String>) -> Self {
        Self {
            fire_tx,
            pending: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, name: &str, delay_minutes: f64) {
        let delay = Duration::from_secs_f64(delay_minutes.max(MIN_DELAY_MINUTES) * 60.0);
        if let Some(previous) = self.pending.remove(name) {
            previous.abort();
        }

        debug!(name, ?delay, "arming wake-up");
        let tx = self.fire_tx.clone();
        let key = name.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(key).await;
        });
        self.pending.insert(name.to_string(), handle);
    }

    pub fn cancel_all(&mut self) {
        for (name, handle) in self.pending.drain() {
            debug!(name, "cancelling wake-up");
            handle.abort();
        }
    }
}

impl Drop for AlarmScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
