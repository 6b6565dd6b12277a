use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum SessionType {
    Focus,
    ShortBreak,
    LongBreak,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Focus => "Focus",
            Self::ShortBreak => "ShortBreak",
            Self::LongBreak => "LongBreak",
        }
    }

    /// Decodes a wake-up suffix; anything unrecognized counts as Focus.
    pub fn from_name(s: &str) -> Self {
        match s {
            "ShortBreak" => Self::ShortBreak,
            "LongBreak" => Self::LongBreak,
            _ => Self::Focus,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Focus => "Focus",
            Self::ShortBreak => "Short Break",
            Self::LongBreak => "Long Break",
        }
    }

    /// Session that naturally follows this one. Both break kinds rotate
    /// back to focus.
    pub fn next(&self) -> Self {
        match self {
            Self::Focus => Self::ShortBreak,
            Self::ShortBreak | Self::LongBreak => Self::Focus,
        }
    }

    pub fn is_focus(&self) -> bool {
        matches!(self, Self::Focus)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub focus_min: u32,
    pub short_break_min: u32,
    pub long_break_min: u32,
    pub auto_start_next: bool,
    pub require_interaction: bool,
    pub sound_enabled: bool,
    pub theme: Theme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            focus_min: 25,
            short_break_min: 5,
            long_break_min: 15,
            auto_start_next: false,
            require_interaction: true,
            sound_enabled: true,
            theme: Theme::System,
        }
    }
}

impl Settings {
    pub fn duration_min(&self, session_type: SessionType) -> u32 {
        match session_type {
            SessionType::Focus => self.focus_min,
            SessionType::ShortBreak => self.short_break_min,
            SessionType::LongBreak => self.long_break_min,
        }
    }

    pub fn duration_seconds(&self, session_type: SessionType) -> u64 {
        u64::from(self.duration_min(session_type)) * 60
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub total_pomos: u32,
    #[serde(default)]
    pub today_pomos: u32,
    #[serde(default)]
    pub total_focus_seconds: u64,
    #[serde(default)]
    pub today_focus_seconds: u64,
}

impl Task {
    pub fn new(title: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.trim().to_string(),
            category_id: None,
            created_at: Utc::now().to_rfc3339(),
            completed: false,
            total_pomos: 0,
            today_pomos: 0,
            total_focus_seconds: 0,
            today_focus_seconds: 0,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Metrics {
    pub focus_seconds: u64,
    pub break_seconds: u64,
    pub total_pomodoros: u64,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub session_type: SessionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub duration_seconds: u64,
    /// Wall-clock start, epoch milliseconds.
    pub started_at: i64,
}

impl ActiveSession {
    /// Planned end of the session, epoch milliseconds.
    pub fn ends_at(&self) -> i64 {
        self.started_at + self.duration_seconds as i64 * 1000
    }

    /// Seconds left at `now_ms`, clamped to zero.
    pub fn remaining_at(&self, now_ms: i64) -> u64 {
        let elapsed = (now_ms - self.started_at).max(0) / 1000;
        self.duration_seconds.saturating_sub(elapsed as u64)
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSession {
    pub session_type: SessionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub duration_seconds: u64,
    /// Wall-clock completion, epoch milliseconds.
    pub completed_at: i64,
}
