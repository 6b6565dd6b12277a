use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use tokio::runtime::Runtime;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use pomopilot::models::now_ms;
use pomopilot::notifications::DesktopNotifier;
use pomopilot::presenter::Presenter;
use pomopilot::service;
use pomopilot::store::{ChangeSet, StateStore, StoreError};
use pomopilot::ui::{self, App};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
const TICK_RATE: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(author, version, about = "Pomodoro session timer with task tracking")]
struct Args {
    /// Focus duration, e.g. "25m" or "1h30m"
    #[arg(short, long, value_parser = parse_duration)]
    focus: Option<f64>,
    /// Short break duration
    #[arg(short, long, value_parser = parse_duration)]
    short_break: Option<f64>,
    /// Long break duration
    #[arg(short, long, value_parser = parse_duration)]
    long_break: Option<f64>,
    #[arg(long)]
    no_sound: bool,
    /// Directory holding the shared state file
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn parse_duration(s: &str) -> std::result::Result<f64, String> {
    let s = s.trim().to_lowercase();
    let mut total = 0.0;
    let mut num = String::new();

    for c in s.chars() {
        match c {
            '0'..='9' | '.' => num.push(c),
            'h' => {
                total += num.parse::<f64>().map_err(|_| "Invalid hours")? * 60.0;
                num.clear();
            }
            'm' => {
                total += num.parse::<f64>().map_err(|_| "Invalid minutes")?;
                num.clear();
            }
            's' => {
                total += num.parse::<f64>().map_err(|_| "Invalid seconds")? / 60.0;
                num.clear();
            }
            _ => return Err("Invalid format".into()),
        }
    }

    if total > 0.0 {
        Ok(total)
    } else {
        Err("Duration must be > 0".into())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("pomopilot"))
        .unwrap_or_else(|| PathBuf::from("pomopilot"))
}

fn init_logging(data_dir: &Path) -> Result<()> {
    // The terminal is busy drawing; logs go to a file beside the state.
    let file = std::fs::File::create(data_dir.join("pomopilot.log"))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn clamp_minutes(minutes: f64) -> u32 {
    minutes.round().max(1.0) as u32
}

async fn apply_overrides(store: &StateStore, args: &Args) -> std::result::Result<(), StoreError> {
    if args.focus.is_none()
        && args.short_break.is_none()
        && args.long_break.is_none()
        && !args.no_sound
    {
        return Ok(());
    }

    store
        .update(|state| {
            if let Some(minutes) = args.focus {
                state.settings.focus_min = clamp_minutes(minutes);
            }
            if let Some(minutes) = args.short_break {
                state.settings.short_break_min = clamp_minutes(minutes);
            }
            if let Some(minutes) = args.long_break {
                state.settings.long_break_min = clamp_minutes(minutes);
            }
            if args.no_sound {
                state.settings.sound_enabled = false;
            }
        })
        .await?;
    Ok(())
}

async fn bootstrap(args: &Args, data_dir: &Path) -> Result<(broadcast::Receiver<ChangeSet>, App)> {
    let store = StateStore::open(data_dir).await?;
    apply_overrides(&store, args).await?;

    let handle = service::spawn(store.clone(), DesktopNotifier);
    let changes = store.subscribe();
    let presenter = Presenter::mount(store, handle, now_ms()).await;
    Ok((changes, App::new(presenter)))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)?;
    init_logging(&data_dir)?;

    let rt = Runtime::new()?;
    let (mut changes, mut app) = rt.block_on(bootstrap(&args, &data_dir))?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run(&mut terminal, &mut app, &rt, &mut changes);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    res
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    rt: &Runtime,
    changes: &mut broadcast::Receiver<ChangeSet>,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        // Converge on whatever the background service or another surface
        // wrote since the last frame.
        loop {
            let now = now_ms();
            match changes.try_recv() {
                Ok(change_set) => rt.block_on(app.presenter.apply_change(&change_set, now)),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    rt.block_on(app.presenter.resync(now));
                }
                Err(_) => break,
            }
        }

        let now = now_ms();
        terminal.draw(|f| ui::render_ui(f, app, now))?;

        let timeout = TICK_RATE.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if rt.block_on(app.handle_key(key, now_ms())) {
                    return Ok(());
                }
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            app.presenter.tick(now_ms());
            last_tick = Instant::now();
        }
    }
}
