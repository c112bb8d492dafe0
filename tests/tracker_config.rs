use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use mood_tracker::config::{CameraDriver, TrackerConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "MOOD_CONFIG",
        "MOOD_LOG_PATH",
        "MOOD_CHART_PATH",
        "MOOD_MODEL_PATH",
        "MOOD_CAMERA_DRIVER",
        "MOOD_DEVICE_INDEX",
        "MOOD_SAMPLE_RATE_FPS",
        "MOOD_AUTO_STOP_MINUTES",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
        log_path = "/var/lib/mood/log.csv"
        chart_path = "/var/lib/mood/today.png"

        [camera]
        device_index = 1
        driver = "synthetic"
        width = 320
        height = 240

        [session]
        sample_rate_fps = 4
        auto_stop_minutes = 30.0

        [backend]
        model_path = "/opt/models/ferplus.onnx"
        face_threshold = 8.5

        [dashboard]
        recent_limit = 25
        "#,
    );

    std::env::set_var("MOOD_CONFIG", file.path());
    std::env::set_var("MOOD_DEVICE_INDEX", "0");
    std::env::set_var("MOOD_AUTO_STOP_MINUTES", "2");

    let cfg = TrackerConfig::load().expect("load config");

    assert_eq!(cfg.log_path, PathBuf::from("/var/lib/mood/log.csv"));
    assert_eq!(cfg.chart_path, PathBuf::from("/var/lib/mood/today.png"));
    assert_eq!(cfg.camera.device_index, 0);
    assert_eq!(cfg.camera.driver, CameraDriver::Synthetic);
    assert_eq!((cfg.camera.width, cfg.camera.height), (320, 240));
    assert_eq!(cfg.session.sample_rate_fps, 4);
    assert_eq!(cfg.session.auto_stop_after().unwrap().as_secs(), 120);
    assert_eq!(cfg.backend.model_path, PathBuf::from("/opt/models/ferplus.onnx"));
    assert_eq!(cfg.backend.face_threshold, 8.5);
    assert_eq!(cfg.recent_limit, 25);

    clear_env();
}

#[test]
fn defaults_apply_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = TrackerConfig::load().expect("load defaults");
    assert_eq!(cfg.log_path, PathBuf::from("data/mood_log.csv"));
    assert_eq!(cfg.chart_path, PathBuf::from("visuals/daily_mood_chart.png"));
    assert_eq!(cfg.session.sample_rate_fps, 2);
    assert_eq!(cfg.session.auto_stop_after(), None);
    assert_eq!(cfg.camera.driver, CameraDriver::Auto);
}

#[test]
fn rejects_out_of_range_sample_rate_from_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("MOOD_SAMPLE_RATE_FPS", "30");
    let err = TrackerConfig::load().unwrap_err();
    assert!(err.to_string().contains("sample_rate_fps"));

    clear_env();
}

#[test]
fn rejects_unknown_keys_and_bad_driver() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config("[camera]\nresolution = \"4k\"\n");
    assert!(TrackerConfig::load_with(Some(file.path())).is_err());

    std::env::set_var("MOOD_CAMERA_DRIVER", "gopro");
    assert!(TrackerConfig::load_with(None).is_err());

    clear_env();
}

#[test]
fn rejects_auto_stop_too_large_for_a_duration() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("MOOD_AUTO_STOP_MINUTES", "1e300");
    let err = TrackerConfig::load().unwrap_err();
    assert!(err.to_string().contains("auto_stop_minutes"));

    clear_env();
}
