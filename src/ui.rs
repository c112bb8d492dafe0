use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use mood_tracker::session::SessionSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Progress output on stderr; stdout stays reserved for reports.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    fn pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    fn spinner(message: String) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_draw_target(ProgressDrawTarget::stderr());
        spinner.enable_steady_tick(Duration::from_millis(120));
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message);
        spinner
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty() {
            StageGuard::new(name.to_string(), Some(Self::spinner(format!("{name}…"))))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Live status line for a running capture session. Silent in plain mode.
    pub fn session_monitor(&self) -> SessionMonitor {
        let spinner = self
            .pretty()
            .then(|| Self::spinner("starting session…".to_string()));
        SessionMonitor { spinner }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

pub struct SessionMonitor {
    spinner: Option<ProgressBar>,
}

impl SessionMonitor {
    pub fn update(&self, snapshot: &SessionSnapshot) {
        let Some(spinner) = &self.spinner else {
            return;
        };
        let latest = snapshot
            .latest
            .as_ref()
            .map(|r| match r.confidence {
                Some(c) => format!("{} ({:.0}%)", r.label(), c * 100.0),
                None => r.label().to_string(),
            })
            .unwrap_or_else(|| "-".to_string());
        spinner.set_message(format!(
            "{} {} | latest {} | logged {} | no face {}",
            snapshot.status,
            format_duration(Duration::from_secs_f64(snapshot.elapsed_secs)),
            latest,
            snapshot.counters.detections_logged,
            snapshot.counters.no_face_frames
        ));
    }

    pub fn finish(&self, snapshot: &SessionSnapshot) {
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(format!(
                "✔ session {} ({} logged)",
                snapshot.status, snapshot.counters.detections_logged
            ));
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 60 {
        format!("{}m{:02}s", duration.as_secs() / 60, duration.as_secs() % 60)
    } else if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
