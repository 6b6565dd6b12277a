//! Session-complete alerts: a desktop notification plus, when enabled, a
//! best-effort chime through whichever system player is installed. Neither
//! failing ever fails the session transition.

use notify_rust::{Notification, Timeout, Urgency};
use tracing::warn;

use crate::models::{SessionType, Settings};

pub trait Notify: Send + Sync + 'static {
    fn session_complete(&self, session_type: SessionType, settings: &Settings);
}

pub struct DesktopNotifier;

impl Notify for DesktopNotifier {
    fn session_complete(&self, session_type: SessionType, settings: &Settings) {
        let (urgency, timeout) = if settings.require_interaction {
            (Urgency::Critical, Timeout::Never)
        } else {
            (Urgency::Normal, Timeout::Default)
        };

        let result = Notification::new()
            .summary("Pomodoro complete")
            .body(&format!(
                "{} session finished. Time for the next step!",
                session_type.label()
            ))
            .appname("pomopilot")
            .icon("alarm-clock")
            .urgency(urgency)
            .timeout(timeout)
            .show();
        if let Err(err) = result {
            warn!(error = %err, "desktop notification failed");
        }

        if settings.sound_enabled {
            play_chime();
        }
    }
}

fn play_chime() {
    std::thread::spawn(|| {
        for (cmd, file) in [
            ("paplay", "/usr/share/sounds/freedesktop/stereo/complete.oga"),
            ("aplay", "/usr/share/sounds/sound-icons/guitar-11.wav"),
            ("aplay", "/usr/share/sounds/generic.wav"),
        ] {
            if std::path::Path::new(file).exists() {
                let spawned = std::process::Command::new(cmd)
                    .arg(file)
                    .stdout(std::process::Stdio::null())
                    .stderr(std::process::Stdio::null())
                    .spawn();
                if let Err(err) = spawned {
                    warn!(error = %err, player = cmd, "chime playback failed");
                }
                return;
            }
        }
        warn!("no system alert sound available");
    });
}
