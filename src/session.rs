//! Capture session controller.
//!
//! A session opens one camera, samples it at a fixed rate, classifies each
//! frame with the selected backend and appends face detections to the log.
//! The controller admits one running session at a time; `stop` may be called
//! from any thread and takes effect at the next tick boundary.
//!
//! Exit paths (manual stop, auto-stop, capture failure, log failure and
//! dropping the session) all release the camera through the `DeviceGuard`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{TrackerConfig, MAX_SAMPLE_RATE_FPS, MIN_SAMPLE_RATE_FPS};
use crate::detect::{BackendTag, SelectedBackend};
use crate::error::{MoodError, Result};
use crate::ingest::{CameraOpener, DeviceGuard};
use crate::log::{DetectionLog, DetectionRecord};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Time source for the session loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Stopped => "stopped",
        })
    }
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Manual,
    AutoStop,
    CaptureFailed,
    LogFailed,
    /// The `ActiveSession` was dropped without running to completion.
    Abandoned,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionParams {
    pub device_index: u32,
    pub sample_rate_fps: u32,
    /// `None` runs until stopped.
    pub auto_stop_after: Option<Duration>,
}

impl SessionParams {
    pub fn from_config(cfg: &TrackerConfig) -> Self {
        Self {
            device_index: cfg.camera.device_index,
            sample_rate_fps: cfg.session.sample_rate_fps,
            auto_stop_after: cfg.session.auto_stop_after(),
        }
    }

    /// Spacing between ticks.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(1) / self.sample_rate_fps.max(1)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    pub frames_captured: u64,
    pub detections_logged: u64,
    pub no_face_frames: u64,
    pub inference_failures: u64,
}

/// Live readout of the controller.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub backend: BackendTag,
    pub backend_name: &'static str,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_secs: f64,
    pub latest: Option<DetectionRecord>,
    pub counters: SessionCounters,
}

/// Summary returned when a session ends normally.
#[derive(Clone, Debug, Serialize)]
pub struct SessionReport {
    pub reason: StopReason,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub counters: SessionCounters,
}

/// What a single tick did with its frame.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    Logged(DetectionRecord),
    NoFace,
    /// The frame hit a per-frame inference fault and was dropped.
    Skipped,
}

#[derive(Debug)]
struct SessionState {
    status: SessionStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    latest: Option<DetectionRecord>,
    counters: SessionCounters,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SessionState>,
    stop_requested: AtomicBool,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        // State stays meaningful after a panic elsewhere; keep serving it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Owns session status and hands out at most one `ActiveSession` at a time.
///
/// Cloning yields another handle onto the same controller.
#[derive(Clone)]
pub struct SessionController {
    opener: Arc<dyn CameraOpener>,
    backend: SelectedBackend,
    log: Arc<Mutex<DetectionLog>>,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(
        opener: Arc<dyn CameraOpener>,
        backend: SelectedBackend,
        log: DetectionLog,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            opener,
            backend,
            log: Arc::new(Mutex::new(log)),
            clock,
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState {
                    status: SessionStatus::Idle,
                    started_at: None,
                    ended_at: None,
                    latest: None,
                    counters: SessionCounters::default(),
                }),
                stop_requested: AtomicBool::new(false),
            }),
        }
    }

    pub fn backend(&self) -> &SelectedBackend {
        &self.backend
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.state().status
    }

    /// Open the camera and mark the controller running.
    ///
    /// Rejected with `SessionAlreadyActive` while a session runs. A camera that
    /// fails to open leaves the status untouched.
    pub fn start(&self, params: SessionParams) -> Result<ActiveSession> {
        let mut state = self.shared.state();
        if state.status == SessionStatus::Running {
            return Err(MoodError::SessionAlreadyActive);
        }

        let mut params = params;
        let fps = params
            .sample_rate_fps
            .clamp(MIN_SAMPLE_RATE_FPS, MAX_SAMPLE_RATE_FPS);
        if fps != params.sample_rate_fps {
            log::warn!(
                "sample rate {} fps out of range, using {}",
                params.sample_rate_fps,
                fps
            );
            params.sample_rate_fps = fps;
        }

        let guard = DeviceGuard::new(self.opener.open(params.device_index)?);
        let started_at = self.clock.now();

        self.shared.stop_requested.store(false, Ordering::SeqCst);
        state.status = SessionStatus::Running;
        state.started_at = Some(started_at);
        state.ended_at = None;
        state.latest = None;
        state.counters = SessionCounters::default();
        drop(state);

        log::info!(
            "session started on {} at {} fps (auto-stop: {}, backend: {} [{}])",
            guard.describe(),
            params.sample_rate_fps,
            params
                .auto_stop_after
                .map(|d| format!("{}s", d.as_secs()))
                .unwrap_or_else(|| "off".into()),
            self.backend.name(),
            self.backend.tag()
        );

        Ok(ActiveSession {
            guard,
            params,
            started_at,
            last_timestamp: None,
            finished: false,
            backend: self.backend.clone(),
            log: self.log.clone(),
            clock: self.clock.clone(),
            shared: self.shared.clone(),
        })
    }

    /// Ask the running session to stop at its next tick boundary.
    ///
    /// Returns false when no session is running.
    pub fn stop(&self) -> bool {
        let running = self.status() == SessionStatus::Running;
        if running {
            self.shared.stop_requested.store(true, Ordering::SeqCst);
            log::info!("session stop requested");
        }
        running
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.shared.state();
        let elapsed_secs = match (state.started_at, state.ended_at, state.status) {
            (Some(start), _, SessionStatus::Running) => seconds_between(start, self.clock.now()),
            (Some(start), Some(end), _) => seconds_between(start, end),
            _ => 0.0,
        };
        SessionSnapshot {
            status: state.status,
            backend: self.backend.tag(),
            backend_name: self.backend.name(),
            started_at: state.started_at,
            elapsed_secs,
            latest: state.latest.clone(),
            counters: state.counters,
        }
    }
}

/// A running session. Owns the camera until it ends.
pub struct ActiveSession {
    guard: DeviceGuard,
    params: SessionParams,
    started_at: DateTime<Utc>,
    last_timestamp: Option<DateTime<Utc>>,
    finished: bool,
    backend: SelectedBackend,
    log: Arc<Mutex<DetectionLog>>,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
}

impl ActiveSession {
    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reason to end the session before the next tick, if any.
    pub fn pending_stop(&self) -> Option<StopReason> {
        if self.shared.stop_requested.load(Ordering::SeqCst) {
            return Some(StopReason::Manual);
        }
        let limit = self.params.auto_stop_after?;
        let elapsed = (self.clock.now() - self.started_at)
            .to_std()
            .unwrap_or_default();
        (elapsed >= limit).then_some(StopReason::AutoStop)
    }

    /// Capture, classify and log one frame.
    ///
    /// Capture and log failures end the session (device released) and are
    /// returned. Inference faults only skip the frame.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if self.finished {
            return Err(MoodError::Capture("session already ended".into()));
        }

        let frame = match self.guard.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("capture from {} failed: {}", self.guard.describe(), err);
                self.finish(StopReason::CaptureFailed);
                return Err(err);
            }
        };
        self.update(|counters| counters.frames_captured += 1);

        let classification = match self.backend.classify(&frame) {
            Ok(classification) => classification,
            Err(err) => {
                log::warn!("skipping frame: {}", err);
                self.update(|counters| counters.inference_failures += 1);
                return Ok(TickOutcome::Skipped);
            }
        };
        drop(frame);

        if !classification.is_face() {
            self.update(|counters| counters.no_face_frames += 1);
            return Ok(TickOutcome::NoFace);
        }

        let timestamp = self.next_timestamp();
        let record = match DetectionRecord::from_classification(
            timestamp,
            &classification,
            self.backend.tag().as_str(),
        ) {
            Ok(record) => record,
            Err(err) if err.is_frame_local() => {
                log::warn!("skipping frame: {}", err);
                self.update(|counters| counters.inference_failures += 1);
                return Ok(TickOutcome::Skipped);
            }
            Err(err) => {
                self.finish(StopReason::LogFailed);
                return Err(err);
            }
        };

        if let Err(err) = self.append(&record) {
            log::error!("detection log append failed: {}", err);
            self.finish(StopReason::LogFailed);
            return Err(err);
        }

        let mut state = self.shared.state();
        state.counters.detections_logged += 1;
        state.latest = Some(record.clone());
        drop(state);
        Ok(TickOutcome::Logged(record))
    }

    /// Tick at the configured rate until stopped, auto-stopped or failed.
    pub fn run(mut self) -> Result<SessionReport> {
        let interval = self.params.interval();
        let mut last_health_log = self.clock.now();

        loop {
            if let Some(reason) = self.pending_stop() {
                return Ok(self.finish(reason));
            }

            let tick_started = self.clock.now();
            self.tick()?;

            let now = self.clock.now();
            if (now - last_health_log).to_std().unwrap_or_default() >= HEALTH_LOG_INTERVAL {
                let counters = self.shared.state().counters;
                log::info!(
                    "session health camera={} frames={} logged={} no_face={} skipped={}",
                    self.guard.describe(),
                    counters.frames_captured,
                    counters.detections_logged,
                    counters.no_face_frames,
                    counters.inference_failures
                );
                last_health_log = now;
            }

            let spent = (now - tick_started).to_std().unwrap_or_default();
            if let Some(rest) = interval.checked_sub(spent).filter(|d| !d.is_zero()) {
                self.clock.sleep(rest);
            }
        }
    }

    /// Stop, release the device and build the report. Idempotent.
    pub fn finish(&mut self, reason: StopReason) -> SessionReport {
        let ended_at = self.clock.now().max(self.started_at);
        self.guard.release();

        let mut state = self.shared.state();
        if !self.finished {
            state.status = SessionStatus::Stopped;
            state.ended_at = Some(ended_at);
            self.finished = true;
            log::info!(
                "session stopped ({:?}) after {:.1}s: {} frames, {} logged",
                reason,
                seconds_between(self.started_at, ended_at),
                state.counters.frames_captured,
                state.counters.detections_logged
            );
        }
        self.shared.stop_requested.store(false, Ordering::SeqCst);

        SessionReport {
            reason,
            started_at: self.started_at,
            ended_at: state.ended_at.unwrap_or(ended_at),
            duration_secs: seconds_between(self.started_at, state.ended_at.unwrap_or(ended_at)),
            counters: state.counters,
        }
    }

    fn append(&self, record: &DetectionRecord) -> Result<()> {
        let mut log = self
            .log
            .lock()
            .map_err(|_| MoodError::Log("detection log lock poisoned".into()))?;
        log.append(record)
    }

    /// Wall time for the next record, never earlier than the previous one.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = self.clock.now();
        let timestamp = match self.last_timestamp {
            Some(last) if now < last => last,
            _ => now,
        };
        self.last_timestamp = Some(timestamp);
        timestamp
    }

    fn update(&self, f: impl FnOnce(&mut SessionCounters)) {
        f(&mut self.shared.state().counters);
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(StopReason::Abandoned);
        }
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).to_std().unwrap_or_default().as_secs_f64()
}
