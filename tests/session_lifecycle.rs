use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::{tempdir, TempDir};

use mood_tracker::log::read_records;
use mood_tracker::{
    select_backend, BackendTag, CameraOpener, Classification, Clock, DetectionLog, Emotion,
    EmotionBackend, Frame, FrameSource, MoodError, Result, SelectedBackend, SessionController,
    SessionParams, SessionStatus, StopReason, TickOutcome,
};

struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 9, 14, 8, 0, 0).unwrap()),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        *self.now.lock().unwrap() += chrono::Duration::from_std(duration).unwrap();
    }
}

#[derive(Default)]
struct DeviceStats {
    opens: AtomicUsize,
    closes: AtomicUsize,
}

/// Camera that delivers `frames_before_failure` frames, then reports a disconnect.
struct FakeCamera {
    remaining: Option<usize>,
    stats: Arc<DeviceStats>,
}

impl FrameSource for FakeCamera {
    fn next_frame(&mut self) -> Result<Frame> {
        match self.remaining.as_mut() {
            Some(0) => Err(MoodError::Capture("device unplugged".into())),
            Some(n) => {
                *n -= 1;
                Ok(Frame::solid(8, 8, [90, 90, 90]))
            }
            None => Ok(Frame::solid(8, 8, [90, 90, 90])),
        }
    }

    fn close(&mut self) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        "fake:0".to_string()
    }
}

struct FakeOpener {
    frames_before_failure: Option<usize>,
    stats: Arc<DeviceStats>,
}

impl CameraOpener for FakeOpener {
    fn open(&self, device_index: u32) -> Result<Box<dyn FrameSource>> {
        if device_index != 0 {
            return Err(MoodError::DeviceUnavailable {
                index: device_index,
                reason: "no such fake device".into(),
            });
        }
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCamera {
            remaining: self.frames_before_failure,
            stats: self.stats.clone(),
        }))
    }
}

/// Backend that replays a script, repeating the last entry once exhausted.
struct ScriptedBackend {
    script: VecDeque<Result<Classification>>,
    last: fn() -> Result<Classification>,
}

impl ScriptedBackend {
    fn repeating(last: fn() -> Result<Classification>) -> Self {
        Self {
            script: VecDeque::new(),
            last,
        }
    }

    fn with_script(script: Vec<Result<Classification>>, last: fn() -> Result<Classification>) -> Self {
        Self {
            script: script.into(),
            last,
        }
    }
}

impl EmotionBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn classify(&mut self, _frame: &Frame) -> Result<Classification> {
        self.script.pop_front().unwrap_or_else(self.last)
    }
}

fn happy() -> Result<Classification> {
    Ok(Classification::face(Emotion::Happy, 0.75))
}

fn nobody() -> Result<Classification> {
    Ok(Classification::no_face())
}

fn primary(backend: ScriptedBackend) -> SelectedBackend {
    SelectedBackend::new(BackendTag::Primary, Box::new(backend))
}

struct Harness {
    dir: TempDir,
    stats: Arc<DeviceStats>,
    controller: SessionController,
}

impl Harness {
    fn new(frames_before_failure: Option<usize>, backend: SelectedBackend) -> Self {
        let dir = tempdir().unwrap();
        let stats = Arc::new(DeviceStats::default());
        let opener = FakeOpener {
            frames_before_failure,
            stats: stats.clone(),
        };
        let log = DetectionLog::open(dir.path().join("mood_log.csv")).unwrap();
        let controller =
            SessionController::new(Arc::new(opener), backend, log, Arc::new(ManualClock::new()));
        Self {
            dir,
            stats,
            controller,
        }
    }

    fn records(&self) -> Vec<mood_tracker::DetectionRecord> {
        read_records(&self.dir.path().join("mood_log.csv")).unwrap()
    }

    fn closes(&self) -> usize {
        self.stats.closes.load(Ordering::SeqCst)
    }
}

fn params(auto_stop_after: Option<Duration>) -> SessionParams {
    SessionParams {
        device_index: 0,
        sample_rate_fps: 1,
        auto_stop_after,
    }
}

#[test]
fn second_start_is_rejected_and_first_session_keeps_running() {
    let harness = Harness::new(None, primary(ScriptedBackend::repeating(happy)));
    let mut session = harness.controller.start(params(None)).unwrap();
    assert_eq!(session.tick().unwrap(), TickOutcome::Logged(harness.records()[0].clone()));

    let err = harness.controller.start(params(None)).err().unwrap();
    assert!(matches!(err, MoodError::SessionAlreadyActive));
    assert_eq!(err.category(), "session");
    assert_eq!(harness.stats.opens.load(Ordering::SeqCst), 1);

    assert!(matches!(session.tick(), Ok(TickOutcome::Logged(_))));
    assert_eq!(harness.controller.status(), SessionStatus::Running);
    assert_eq!(harness.records().len(), 2);
}

#[test]
fn auto_stop_releases_device_without_manual_stop() {
    let harness = Harness::new(None, primary(ScriptedBackend::repeating(happy)));
    let report = harness
        .controller
        .start(params(Some(Duration::from_secs(120))))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(report.reason, StopReason::AutoStop);
    assert_eq!(report.duration_secs, 120.0);
    assert_eq!(report.counters.frames_captured, 120);
    assert_eq!(harness.closes(), 1);
    assert_eq!(harness.controller.status(), SessionStatus::Stopped);

    let records = harness.records();
    assert_eq!(records.len(), 120);
    assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn fallback_session_tags_every_record() {
    let backend = select_backend(
        || Err(MoodError::BackendInit("model file missing".into())),
        || Ok(Box::new(ScriptedBackend::repeating(happy)) as Box<dyn EmotionBackend>),
    )
    .unwrap();
    assert_eq!(backend.tag(), BackendTag::Fallback);

    let harness = Harness::new(None, backend);
    harness
        .controller
        .start(params(Some(Duration::from_secs(5))))
        .unwrap()
        .run()
        .unwrap();

    let records = harness.records();
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r.source == "fallback"));
    assert_eq!(harness.controller.snapshot().backend, BackendTag::Fallback);
}

#[test]
fn capture_error_stops_session_and_allows_restart() {
    let harness = Harness::new(Some(3), primary(ScriptedBackend::repeating(happy)));
    let err = harness
        .controller
        .start(params(None))
        .unwrap()
        .run()
        .unwrap_err();

    assert!(matches!(err, MoodError::Capture(_)));
    assert_eq!(err.category(), "capture");
    assert_eq!(harness.closes(), 1);
    assert_eq!(harness.controller.status(), SessionStatus::Stopped);
    assert_eq!(harness.records().len(), 3);

    let mut restarted = harness.controller.start(params(None)).unwrap();
    assert_eq!(harness.controller.status(), SessionStatus::Running);
    assert!(restarted.tick().is_ok());
    drop(restarted);
    assert_eq!(harness.closes(), 2);
}

#[test]
fn inference_faults_skip_frames_without_records() {
    let script = vec![
        Err(MoodError::Inference("corrupt frame".into())),
        Ok(Classification::face(Emotion::Sad, 1.5)),
        Ok(Classification::face(Emotion::Sad, 0.6)),
    ];
    let harness = Harness::new(None, primary(ScriptedBackend::with_script(script, nobody)));
    let mut session = harness.controller.start(params(None)).unwrap();

    assert_eq!(session.tick().unwrap(), TickOutcome::Skipped);
    assert_eq!(session.tick().unwrap(), TickOutcome::Skipped);
    assert!(matches!(session.tick().unwrap(), TickOutcome::Logged(_)));
    assert_eq!(session.tick().unwrap(), TickOutcome::NoFace);

    let snapshot = harness.controller.snapshot();
    assert_eq!(snapshot.counters.frames_captured, 4);
    assert_eq!(snapshot.counters.inference_failures, 2);
    assert_eq!(snapshot.counters.no_face_frames, 1);
    assert_eq!(snapshot.counters.detections_logged, 1);

    let records = harness.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].emotion, Some(Emotion::Sad));
    assert_eq!(snapshot.latest, Some(records[0].clone()));
}

#[test]
fn no_face_stream_continues_without_logging() {
    let harness = Harness::new(None, primary(ScriptedBackend::repeating(nobody)));
    let report = harness
        .controller
        .start(params(Some(Duration::from_secs(30))))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(report.reason, StopReason::AutoStop);
    assert_eq!(report.counters.no_face_frames, 30);
    assert!(harness.records().is_empty());
}

#[test]
fn stop_from_another_thread_ends_the_run() {
    let harness = Harness::new(None, primary(ScriptedBackend::repeating(nobody)));
    let session = harness.controller.start(params(None)).unwrap();
    let worker = std::thread::spawn(move || session.run());

    while harness.controller.snapshot().counters.frames_captured < 5 {
        std::thread::yield_now();
    }
    assert!(harness.controller.clone().stop());

    let report = worker.join().unwrap().unwrap();
    assert_eq!(report.reason, StopReason::Manual);
    assert_eq!(harness.closes(), 1);
    assert_eq!(harness.controller.status(), SessionStatus::Stopped);
}

#[cfg(target_os = "linux")]
#[test]
fn failed_append_stops_session_and_releases_device() {
    let full = std::path::Path::new("/dev/full");
    if !full.exists() {
        return;
    }
    let stats = Arc::new(DeviceStats::default());
    let opener = FakeOpener {
        frames_before_failure: None,
        stats: stats.clone(),
    };
    let log = DetectionLog::open(full).unwrap();
    let controller = SessionController::new(
        Arc::new(opener),
        primary(ScriptedBackend::repeating(happy)),
        log,
        Arc::new(ManualClock::new()),
    );

    let mut session = controller.start(params(None)).unwrap();
    let err = session.tick().unwrap_err();
    assert!(matches!(err, MoodError::Log(_)));
    assert_eq!(err.category(), "log");
    assert!(session.is_finished());
    assert_eq!(controller.status(), SessionStatus::Stopped);
    assert_eq!(stats.closes.load(Ordering::SeqCst), 1);

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.counters.frames_captured, 1);
    assert_eq!(snapshot.counters.detections_logged, 0);
    assert_eq!(snapshot.latest, None);

    drop(session);
    assert_eq!(stats.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn unavailable_device_is_surfaced() {
    let harness = Harness::new(None, primary(ScriptedBackend::repeating(happy)));
    let mut p = params(None);
    p.device_index = 4;
    let err = harness.controller.start(p).err().unwrap();
    assert_eq!(err.category(), "device");
    assert_eq!(harness.controller.status(), SessionStatus::Idle);
}
