//! moodd - mood capture daemon
//!
//! Runs one capture session:
//! 1. Loads configuration (file named by MOOD_CONFIG, env, CLI overrides)
//! 2. Selects the emotion backend (primary, else fallback)
//! 3. Samples the camera until Ctrl-C or the auto-stop timer
//! 4. Summarizes today and renders the daily chart

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mood_tracker::{
    config::TrackerConfig, select_configured_backend, summary, ChartRenderer, DetectionLog,
    DeviceOpener, SessionController, SessionParams, SystemClock,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "moodd", about = "Sample a camera and log detected emotions")]
struct Args {
    /// TOML config file
    #[arg(long, env = "MOOD_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Camera device index
    #[arg(long)]
    device_index: Option<u32>,

    /// Stop after this many minutes (0 = run until Ctrl-C)
    #[arg(long, value_name = "MINUTES")]
    auto_stop_minutes: Option<f64>,

    /// Frames sampled per second (1-10)
    #[arg(long)]
    fps: Option<u32>,

    /// Skip the daily summary and chart after the session
    #[arg(long)]
    no_report: bool,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value = "auto", value_name = "MODE")]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = TrackerConfig::load_with(args.config.as_deref())?;
    if let Some(index) = args.device_index {
        cfg.camera.device_index = index;
    }
    if let Some(minutes) = args.auto_stop_minutes {
        cfg.session.auto_stop_minutes = minutes;
    }
    if let Some(fps) = args.fps {
        cfg.session.sample_rate_fps = fps;
    }
    cfg.validate()?;

    let ui = ui::Ui::new(
        args.ui,
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal(),
    );

    let backend = {
        let _stage = ui.stage("Select emotion backend");
        select_configured_backend(&cfg.backend).context("no emotion backend available")?
    };
    let log = DetectionLog::open(&cfg.log_path)
        .with_context(|| format!("open detection log {}", cfg.log_path.display()))?;

    let controller = SessionController::new(
        Arc::new(DeviceOpener::new(cfg.camera.clone())),
        backend,
        log,
        Arc::new(SystemClock),
    );

    let stopper = controller.clone();
    ctrlc::set_handler(move || {
        stopper.stop();
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let session = controller
        .start(SessionParams::from_config(&cfg))
        .with_context(|| format!("start session on camera {}", cfg.camera.device_index))?;
    log::info!(
        "moodd running. writing to {} (Ctrl-C to stop)",
        cfg.log_path.display()
    );

    let monitor = ui.session_monitor();
    let worker = std::thread::spawn(move || session.run());
    while !worker.is_finished() {
        monitor.update(&controller.snapshot());
        std::thread::sleep(Duration::from_millis(250));
    }
    let outcome = worker
        .join()
        .map_err(|_| anyhow!("session thread panicked"))?;
    let snapshot = controller.snapshot();
    monitor.finish(&snapshot);

    match outcome {
        Ok(report) => log::info!(
            "session ended ({:?}): {} frames, {} detections, {} without a face, {} skipped",
            report.reason,
            report.counters.frames_captured,
            report.counters.detections_logged,
            report.counters.no_face_frames,
            report.counters.inference_failures
        ),
        Err(err) => {
            log::error!("session failed [{}]: {}", err.category(), err);
            if !args.no_report {
                report_today(&cfg, &ui)?;
            }
            return Err(err.into());
        }
    }

    if !args.no_report {
        report_today(&cfg, &ui)?;
    }
    Ok(())
}

fn report_today(cfg: &TrackerConfig, ui: &ui::Ui) -> Result<()> {
    let today = summary::today_utc();
    let aggregate = {
        let _stage = ui.stage("Summarize today");
        summary::summarize_log(&cfg.log_path, today)?
    };
    {
        let _stage = ui.stage("Render chart");
        ChartRenderer::default().render(&aggregate, &cfg.chart_path)?;
    }

    println!("date: {}", aggregate.date);
    println!("scans: {}", aggregate.scan_count);
    println!(
        "dominant emotion: {}",
        aggregate
            .dominant_emotion
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".into())
    );
    println!(
        "mean confidence: {}",
        aggregate
            .mean_confidence
            .map(|c| format!("{:.2}", c))
            .unwrap_or_else(|| "-".into())
    );
    println!("chart: {}", cfg.chart_path.display());
    Ok(())
}
