//! mood_report - daily mood summary from the detection log
//!
//! Reads the log, prints the day's aggregate and the most recent detections,
//! and re-renders the daily chart. The log is only ever read.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;

use mood_tracker::{
    config::TrackerConfig, summary, ChartRenderer, DailyAggregate, DetectionRecord, Emotion,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "mood_report", about = "Summarize a day of logged emotions")]
struct Args {
    /// TOML config file
    #[arg(long, env = "MOOD_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Day to summarize, YYYY-MM-DD (UTC). Defaults to today.
    #[arg(long, value_name = "DATE")]
    date: Option<String>,

    /// Number of recent detections to list (defaults to dashboard.recent_limit)
    #[arg(long, value_name = "N")]
    recent: Option<usize>,

    /// Skip chart rendering
    #[arg(long)]
    no_chart: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value = "auto", value_name = "MODE")]
    ui: ui::UiMode,
}

#[derive(Serialize)]
struct Report<'a> {
    aggregate: &'a DailyAggregate,
    distribution: Vec<(Emotion, f32)>,
    recent: &'a [DetectionRecord],
    chart: Option<&'a PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = TrackerConfig::load_with(args.config.as_deref())?;
    let day = match args.date.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|_| anyhow!("--date must be YYYY-MM-DD (got '{}')", raw))?,
        None => summary::today_utc(),
    };
    let limit = args.recent.unwrap_or(cfg.recent_limit);

    let ui = ui::Ui::new(
        args.ui,
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal(),
    );

    let aggregate = {
        let _stage = ui.stage("Summarize log");
        summary::summarize_log(&cfg.log_path, day)
            .with_context(|| format!("read {}", cfg.log_path.display()))?
    };
    let recent = {
        let _stage = ui.stage("Load recent detections");
        mood_tracker::log::recent(&cfg.log_path, limit)?
    };
    if !args.no_chart {
        let _stage = ui.stage("Render chart");
        ChartRenderer::default().render(&aggregate, &cfg.chart_path)?;
    }

    if args.json {
        let report = Report {
            aggregate: &aggregate,
            distribution: aggregate.distribution(),
            recent: &recent,
            chart: (!args.no_chart).then_some(&cfg.chart_path),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("mood_report: {} ({})", aggregate.date, cfg.log_path.display());
    println!();
    println!("=== Daily Summary ===");
    if aggregate.is_empty() {
        println!("no detections recorded");
    } else {
        println!("scans:            {}", aggregate.scan_count);
        println!(
            "dominant emotion: {}",
            aggregate
                .dominant_emotion
                .map(|e| e.to_string())
                .unwrap_or_else(|| "-".into())
        );
        println!(
            "mean confidence:  {}",
            aggregate
                .mean_confidence
                .map(|c| format!("{:.2}", c))
                .unwrap_or_else(|| "-".into())
        );
        for (emotion, share) in aggregate.distribution() {
            println!(
                "  {:<10} {:>4} {:>5.1}%",
                emotion.as_str(),
                aggregate.count_of(emotion),
                share * 100.0
            );
        }
    }

    println!();
    println!("=== Last {} Detections ===", limit);
    if recent.is_empty() {
        println!("none");
    }
    for record in &recent {
        println!(
            "{}  {:<10} {:>6}  {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.label(),
            record
                .confidence
                .map(|c| format!("{:.2}", c))
                .unwrap_or_else(|| "-".into()),
            record.source
        );
    }
    if !args.no_chart {
        println!();
        println!("chart: {}", cfg.chart_path.display());
    }
    Ok(())
}
