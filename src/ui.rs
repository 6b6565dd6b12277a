use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{prelude::*, widgets::*};

use crate::models::{SessionType, Settings};
use crate::presenter::{DisplayStatus, Presenter};

// ============================================================================
// View State
// ============================================================================

#[derive(PartialEq, Clone, Copy)]
pub enum View {
    Timer,
    Tasks,
    Settings,
    Help,
}

#[derive(PartialEq, Clone, Copy)]
pub enum SettingsField {
    FocusMin,
    ShortBreakMin,
    LongBreakMin,
    AutoStartNext,
    RequireInteraction,
    SoundEnabled,
}

impl SettingsField {
    fn next(self) -> Self {
        match self {
            Self::FocusMin => Self::ShortBreakMin,
            Self::ShortBreakMin => Self::LongBreakMin,
            Self::LongBreakMin => Self::AutoStartNext,
            Self::AutoStartNext => Self::RequireInteraction,
            Self::RequireInteraction => Self::SoundEnabled,
            Self::SoundEnabled => Self::FocusMin,
        }
    }

    fn prev(self) -> Self {
        match self {
            Self::FocusMin => Self::SoundEnabled,
            Self::ShortBreakMin => Self::FocusMin,
            Self::LongBreakMin => Self::ShortBreakMin,
            Self::AutoStartNext => Self::LongBreakMin,
            Self::RequireInteraction => Self::AutoStartNext,
            Self::SoundEnabled => Self::RequireInteraction,
        }
    }
}

#[derive(PartialEq, Clone, Copy)]
enum TaskEdit {
    Adding,
    Renaming,
}

pub struct App {
    pub presenter: Presenter,
    pub view: View,
    task_cursor: usize,
    task_edit: Option<TaskEdit>,
    task_input: String,
    confirming_delete: bool,
    settings_field: SettingsField,
    settings_editing: bool,
    settings_input: String,
}

impl App {
    pub fn new(presenter: Presenter) -> Self {
        Self {
            presenter,
            view: View::Timer,
            task_cursor: 0,
            task_edit: None,
            task_input: String::new(),
            confirming_delete: false,
            settings_field: SettingsField::FocusMin,
            settings_editing: false,
            settings_input: String::new(),
        }
    }

    /// Handles one key press. Returns true when the app should quit.
    pub async fn handle_key(&mut self, key: KeyEvent, now_ms: i64) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }

        if self.task_edit.is_some() {
            self.handle_task_input(key).await;
            return false;
        }
        if self.settings_editing {
            self.handle_settings_input(key).await;
            return false;
        }
        if self.confirming_delete {
            self.handle_delete_confirm(key).await;
            return false;
        }

        match self.view {
            View::Timer => self.handle_timer_view(key, now_ms).await,
            View::Tasks => {
                self.handle_tasks_view(key).await;
                false
            }
            View::Settings => {
                self.handle_settings_view(key).await;
                false
            }
            View::Help => {
                self.view = View::Timer;
                false
            }
        }
    }

    async fn handle_timer_view(&mut self, key: KeyEvent, now_ms: i64) -> bool {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char(' ') => {
                if self.presenter.status == DisplayStatus::Running {
                    self.presenter.pause(now_ms).await;
                } else {
                    self.presenter.start(now_ms).await;
                }
            }
            KeyCode::Char('f') => self.presenter.finish_early(now_ms).await,
            KeyCode::Char('r') => self.presenter.reset().await,
            KeyCode::Char('n') => self.presenter.skip().await,
            KeyCode::Char('a') => self.presenter.test_notification().await,
            KeyCode::Char('t') => {
                self.task_cursor = 0;
                self.view = View::Tasks;
            }
            KeyCode::Char('d') => {
                self.settings_field = SettingsField::FocusMin;
                self.view = View::Settings;
            }
            KeyCode::Char('h') | KeyCode::Char('?') => self.view = View::Help,
            _ => {}
        }
        false
    }

    async fn handle_tasks_view(&mut self, key: KeyEvent) {
        let task_count = self.presenter.tasks.len();
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('t') => self.view = View::Timer,
            KeyCode::Down | KeyCode::Char('j') => {
                if task_count > 0 {
                    self.task_cursor = (self.task_cursor + 1).min(task_count - 1);
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.task_cursor = self.task_cursor.saturating_sub(1);
            }
            KeyCode::Char('a') => {
                self.task_edit = Some(TaskEdit::Adding);
                self.task_input.clear();
            }
            KeyCode::Char('e') => {
                if let Some(task) = self.presenter.tasks.get(self.task_cursor) {
                    self.task_input = task.title.clone();
                    self.task_edit = Some(TaskEdit::Renaming);
                }
            }
            KeyCode::Char('d') => {
                if self.task_cursor < task_count {
                    self.confirming_delete = true;
                }
            }
            KeyCode::Char('c') => {
                if let Some(task) = self.presenter.tasks.get(self.task_cursor) {
                    let id = task.id.clone();
                    self.presenter.toggle_task_completed(&id).await;
                }
            }
            KeyCode::Enter => {
                if let Some(task) = self.presenter.tasks.get(self.task_cursor) {
                    let id = task.id.clone();
                    if self.presenter.selected_task.as_deref() == Some(id.as_str()) {
                        self.presenter.select_task(None).await;
                    } else {
                        self.presenter.select_task(Some(id)).await;
                    }
                }
            }
            _ => {}
        }
    }

    async fn handle_task_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(c) => self.task_input.push(c),
            KeyCode::Backspace => {
                self.task_input.pop();
            }
            KeyCode::Enter => {
                let title = self.task_input.trim().to_string();
                if !title.is_empty() {
                    match self.task_edit {
                        Some(TaskEdit::Adding) => self.presenter.add_task(&title).await,
                        Some(TaskEdit::Renaming) => {
                            if let Some(task) = self.presenter.tasks.get(self.task_cursor) {
                                let id = task.id.clone();
                                self.presenter.rename_task(&id, &title).await;
                            }
                        }
                        None => {}
                    }
                }
                self.task_edit = None;
                self.task_input.clear();
            }
            KeyCode::Esc => {
                self.task_edit = None;
                self.task_input.clear();
            }
            _ => {}
        }
    }

    async fn handle_delete_confirm(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Some(task) = self.presenter.tasks.get(self.task_cursor) {
                    let id = task.id.clone();
                    self.presenter.delete_task(&id).await;
                    self.task_cursor = self.task_cursor.saturating_sub(1);
                }
                self.confirming_delete = false;
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.confirming_delete = false;
            }
            _ => {}
        }
    }

    async fn handle_settings_view(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('d') => self.view = View::Timer,
            KeyCode::Down | KeyCode::Char('j') => self.settings_field = self.settings_field.next(),
            KeyCode::Up | KeyCode::Char('k') => self.settings_field = self.settings_field.prev(),
            KeyCode::Enter | KeyCode::Char('e') => self.start_editing_setting(),
            KeyCode::Char(' ') => {
                let mut settings = self.presenter.settings.clone();
                match self.settings_field {
                    SettingsField::AutoStartNext => {
                        settings.auto_start_next = !settings.auto_start_next
                    }
                    SettingsField::RequireInteraction => {
                        settings.require_interaction = !settings.require_interaction
                    }
                    SettingsField::SoundEnabled => settings.sound_enabled = !settings.sound_enabled,
                    _ => return,
                }
                self.presenter.save_settings(settings).await;
            }
            _ => {}
        }
    }

    fn start_editing_setting(&mut self) {
        let current = match self.settings_field {
            SettingsField::FocusMin => self.presenter.settings.focus_min,
            SettingsField::ShortBreakMin => self.presenter.settings.short_break_min,
            SettingsField::LongBreakMin => self.presenter.settings.long_break_min,
            _ => return,
        };
        self.settings_input = current.to_string();
        self.settings_editing = true;
    }

    async fn handle_settings_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(c) => self.settings_input.push(c),
            KeyCode::Backspace => {
                self.settings_input.pop();
            }
            KeyCode::Enter => {
                self.apply_setting().await;
                self.settings_editing = false;
                self.settings_input.clear();
            }
            KeyCode::Esc => {
                self.settings_editing = false;
                self.settings_input.clear();
            }
            _ => {}
        }
    }

    async fn apply_setting(&mut self) {
        let Ok(minutes) = self.settings_input.parse::<u32>() else {
            return;
        };

        let mut settings = self.presenter.settings.clone();
        let accepted = match self.settings_field {
            SettingsField::FocusMin if (1..=240).contains(&minutes) => {
                settings.focus_min = minutes;
                true
            }
            SettingsField::ShortBreakMin if (1..=60).contains(&minutes) => {
                settings.short_break_min = minutes;
                true
            }
            SettingsField::LongBreakMin if (1..=120).contains(&minutes) => {
                settings.long_break_min = minutes;
                true
            }
            _ => false,
        };
        if accepted {
            self.presenter.save_settings(settings).await;
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

const ACCENT: Color = Color::Rgb(255, 100, 0);
const BORDER: Color = Color::Rgb(0, 200, 255);

fn session_color(session_type: SessionType) -> Color {
    match session_type {
        SessionType::Focus => Color::Rgb(100, 181, 246),
        SessionType::ShortBreak => Color::Rgb(255, 0, 100),
        SessionType::LongBreak => Color::Rgb(0, 255, 150),
    }
}

pub fn format_time(total_seconds: u64) -> String {
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

pub fn render_ui(f: &mut Frame, app: &App, now_ms: i64) {
    match app.view {
        View::Timer => render_timer(f, app, now_ms),
        View::Tasks => render_tasks(f, app),
        View::Settings => render_settings(f, app),
        View::Help => render_help(f, app),
    }
}

fn render_timer(f: &mut Frame, app: &App, now_ms: i64) {
    let presenter = &app.presenter;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(f.size());

    let header = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER))
        .title(Span::styled(
            " POMOPILOT ",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ));
    f.render_widget(header, chunks[0]);

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(10),
            Constraint::Length(2),
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(2),
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(2),
            Constraint::Length(1),
            Constraint::Length(2),
            Constraint::Min(1),
        ])
        .split(chunks[1]);

    let color = session_color(presenter.session_type);
    f.render_widget(
        Paragraph::new(presenter.session_type.label())
            .style(Style::default().fg(color).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        sections[1],
    );

    let remaining = presenter.remaining_seconds(now_ms);
    f.render_widget(
        Paragraph::new(format_time(remaining))
            .style(Style::default().fg(color).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        sections[3],
    );

    let status = match presenter.status {
        DisplayStatus::Idle => ("IDLE", Color::Gray),
        DisplayStatus::Running => ("RUNNING", Color::Green),
        DisplayStatus::Paused => ("PAUSED", Color::Yellow),
    };
    f.render_widget(
        Paragraph::new(status.0)
            .style(Style::default().fg(status.1).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        sections[5],
    );

    let planned = presenter.settings.duration_seconds(presenter.session_type);
    let ratio = if planned == 0 {
        0.0
    } else {
        (1.0 - remaining as f64 / planned as f64).clamp(0.0, 1.0)
    };
    f.render_widget(
        Gauge::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded),
            )
            .gauge_style(Style::default().fg(color).bg(Color::Black))
            .percent((ratio * 100.0) as u16),
        sections[7],
    );

    let task_line = match presenter
        .selected_task
        .as_deref()
        .and_then(|id| presenter.tasks.iter().find(|task| task.id == id))
    {
        Some(task) => format!(
            "Task: {}  ({} pomodoros · {} focus min)",
            task.title,
            task.total_pomos,
            task.total_focus_seconds / 60
        ),
        None => "No task selected".to_string(),
    };
    f.render_widget(
        Paragraph::new(task_line)
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center),
        sections[9],
    );

    let stats_line = format!(
        "{} pomodoros  •  {} focus min  •  {} break min",
        presenter.metrics.total_pomodoros,
        presenter.metrics.focus_seconds / 60,
        presenter.metrics.break_seconds / 60
    );
    f.render_widget(
        Paragraph::new(stats_line)
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center),
        sections[11],
    );

    if let Some(banner) = &presenter.banner {
        f.render_widget(
            Paragraph::new(banner.as_str())
                .style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD))
                .alignment(Alignment::Center),
            sections[12],
        );
    }

    let controls = vec![
        Line::from(vec![
            key_span("Space"),
            Span::raw(" Start/Pause  •  "),
            key_span("F"),
            Span::raw(" Finish  •  "),
            key_span("R"),
            Span::raw(" Reset  •  "),
            key_span("N"),
            Span::raw(" Next"),
        ]),
        Line::from(vec![
            key_span("T"),
            Span::raw(" Tasks  •  "),
            key_span("D"),
            Span::raw(" Settings  •  "),
            key_span("A"),
            Span::raw(" Test alert  •  "),
            key_span("H"),
            Span::raw(" Help  •  "),
            key_span("Q"),
            Span::raw(" Quit"),
        ]),
    ];
    f.render_widget(
        Paragraph::new(controls)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray)),
        chunks[2],
    );
}

fn key_span(text: &str) -> Span<'_> {
    Span::styled(
        text,
        Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
    )
}

fn render_tasks(f: &mut Frame, app: &App) {
    let area = centered_rect(80, 85, f.size());
    let presenter = &app.presenter;

    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "TASKS",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    let hint = if app.confirming_delete {
        "  Y: Delete  •  N/Esc: Keep"
    } else if app.task_edit.is_some() {
        "  Type the title and press Enter  •  Esc to cancel"
    } else {
        "  a: Add  •  e: Rename  •  d: Delete  •  c: Done/undone  •  Enter: Track  •  Esc: Back"
    };
    lines.push(Line::from(Span::styled(
        hint,
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    )));
    lines.push(Line::from(""));

    if app.task_edit.is_some() {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(
                &app.task_input,
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
            Span::styled("█", Style::default().fg(Color::Green)),
        ]));
        lines.push(Line::from(""));
    }

    if presenter.tasks.is_empty() {
        lines.push(Line::from(Span::styled(
            "  No tasks yet. Press 'a' to add one.",
            Style::default().fg(Color::Gray),
        )));
    }

    for (idx, task) in presenter.tasks.iter().enumerate() {
        let cursor = idx == app.task_cursor;
        let tracked = presenter.selected_task.as_deref() == Some(task.id.as_str());
        let style = if cursor {
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };

        let mut spans = vec![Span::styled(
            if cursor { "► " } else { "  " },
            Style::default().fg(ACCENT),
        )];
        spans.push(Span::styled(if tracked { "● " } else { "  " }, Style::default().fg(ACCENT)));
        spans.push(Span::styled(
            if task.completed { "✓ " } else { "  " },
            Style::default().fg(Color::Green),
        ));
        spans.push(Span::styled(task.title.clone(), style));
        spans.push(Span::styled(
            format!(
                "   {} pomos · {} min today",
                task.total_pomos,
                task.today_focus_seconds / 60
            ),
            Style::default().fg(Color::DarkGray),
        ));
        lines.push(Line::from(spans));
    }

    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title(" Tasks ")
                .title_alignment(Alignment::Center)
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(BORDER)),
        ),
        area,
    );
}

fn render_settings(f: &mut Frame, app: &App) {
    let area = centered_rect(70, 85, f.size());
    let settings: &Settings = &app.presenter.settings;

    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "SETTINGS",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "  ↑↓/jk: Navigate  •  Enter: Edit  •  Space: Toggle  •  Esc: Back",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )),
    ];

    let rows = [
        (
            SettingsField::FocusMin,
            "Focus Duration",
            format!("{} min", settings.focus_min),
        ),
        (
            SettingsField::ShortBreakMin,
            "Short Break",
            format!("{} min", settings.short_break_min),
        ),
        (
            SettingsField::LongBreakMin,
            "Long Break",
            format!("{} min", settings.long_break_min),
        ),
        (
            SettingsField::AutoStartNext,
            "Auto-Start Next Session",
            if settings.auto_start_next { "ON" } else { "OFF" }.into(),
        ),
        (
            SettingsField::RequireInteraction,
            "Notifications Require Dismissal",
            if settings.require_interaction { "ON" } else { "OFF" }.into(),
        ),
        (
            SettingsField::SoundEnabled,
            "Alert Sound",
            if settings.sound_enabled { "ON" } else { "OFF" }.into(),
        ),
    ];

    for (field, label, value) in rows {
        let selected = app.settings_field == field;
        let editing = selected && app.settings_editing;
        lines.push(Line::from(""));

        if editing {
            lines.push(Line::from(vec![
                Span::styled("  > ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
                Span::styled(label, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            ]));
            lines.push(Line::from(vec![
                Span::raw("    "),
                Span::styled(
                    &app.settings_input,
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                ),
                Span::styled("█", Style::default().fg(Color::Green)),
            ]));
        } else {
            let (prefix, label_style, value_style) = if selected {
                (
                    "  > ",
                    Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                )
            } else {
                (
                    "    ",
                    Style::default().fg(Color::Gray),
                    Style::default().fg(Color::DarkGray),
                )
            };
            lines.push(Line::from(vec![
                Span::styled(prefix, label_style),
                Span::styled(label, label_style),
            ]));
            lines.push(Line::from(vec![Span::raw("    "), Span::styled(value, value_style)]));
        }
    }

    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title(" Settings ")
                .title_alignment(Alignment::Center)
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(BORDER)),
        ),
        area,
    );
}

fn render_help(f: &mut Frame, _app: &App) {
    let area = centered_rect(70, 85, f.size());

    let help_text = vec![
        Line::from(""),
        Line::from(Span::styled(
            "KEYBOARD SHORTCUTS",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("  Timer:"),
        help_line("Space", "Start, or pause a running session"),
        help_line("F", "Finish the session early (records elapsed time)"),
        help_line("R", "Reset the current session"),
        help_line("N", "Skip to the next session type"),
        help_line("A", "Trigger a test alert"),
        Line::from(""),
        Line::from("  Navigation:"),
        help_line("T", "Task manager"),
        help_line("D", "Settings"),
        help_line("H / ?", "This help"),
        help_line("Q / Esc", "Quit / go back"),
        Line::from(""),
        Line::from("  Tasks:"),
        help_line("Enter", "Track the highlighted task"),
        help_line("A / E / D", "Add, rename, delete"),
        help_line("C", "Toggle done"),
        Line::from(""),
        Line::from(Span::styled(
            "  Pausing is local to this window; the shared timer is cleared.",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )),
    ];

    f.render_widget(
        Paragraph::new(help_text).block(
            Block::default()
                .title(" Help ")
                .title_alignment(Alignment::Center)
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(BORDER)),
        ),
        area,
    );
}

fn help_line<'a>(key: &'a str, desc: &'a str) -> Line<'a> {
    Line::from(vec![
        Span::raw("    "),
        Span::styled(key, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(format!("  {}", desc)),
    ])
}

fn centered_rect(w: u16, h: u16, r: Rect) -> Rect {
    let v = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h) / 2),
            Constraint::Percentage(h),
            Constraint::Percentage((100 - h) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w) / 2),
            Constraint::Percentage(w),
            Constraint::Percentage((100 - w) / 2),
        ])
        .split(v[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_formatting() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(59), "00:59");
        assert_eq!(format_time(1500), "25:00");
        assert_eq!(format_time(3661), "61:01");
    }

    #[test]
    fn settings_field_cycle_is_closed() {
        let mut field = SettingsField::FocusMin;
        for _ in 0..6 {
            field = field.next();
        }
        assert!(field == SettingsField::FocusMin);
        assert!(SettingsField::FocusMin.prev() == SettingsField::SoundEnabled);
    }
}
