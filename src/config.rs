use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_LOG_PATH: &str = "data/mood_log.csv";
const DEFAULT_CHART_PATH: &str = "visuals/daily_mood_chart.png";
const DEFAULT_MODEL_PATH: &str = "models/emotion-ferplus-8.onnx";
const DEFAULT_DEVICE_INDEX: u32 = 0;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_SAMPLE_RATE_FPS: u32 = 2;
const DEFAULT_AUTO_STOP_MINUTES: f64 = 0.0;
const DEFAULT_RECENT_LIMIT: usize = 10;
pub const DEFAULT_FACE_THRESHOLD: f32 = 12.0;
pub const MIN_SAMPLE_RATE_FPS: u32 = 1;
pub const MAX_SAMPLE_RATE_FPS: u32 = 10;
/// One day.
pub const MAX_AUTO_STOP_MINUTES: f64 = 24.0 * 60.0;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrackerConfigFile {
    log_path: Option<PathBuf>,
    chart_path: Option<PathBuf>,
    camera: Option<CameraConfigFile>,
    session: Option<SessionConfigFile>,
    backend: Option<BackendConfigFile>,
    dashboard: Option<DashboardConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device_index: Option<u32>,
    driver: Option<CameraDriver>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SessionConfigFile {
    sample_rate_fps: Option<u32>,
    auto_stop_minutes: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BackendConfigFile {
    model_path: Option<PathBuf>,
    face_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DashboardConfigFile {
    recent_limit: Option<usize>,
}

/// Camera driver preference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraDriver {
    /// V4L2 when compiled in, otherwise synthetic.
    #[default]
    Auto,
    Synthetic,
    V4l2,
}

impl FromStr for CameraDriver {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(CameraDriver::Auto),
            "synthetic" | "stub" => Ok(CameraDriver::Synthetic),
            "v4l2" => Ok(CameraDriver::V4l2),
            other => Err(anyhow!(
                "unknown camera driver '{}' (expected auto, synthetic or v4l2)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub log_path: PathBuf,
    pub chart_path: PathBuf,
    pub camera: CameraSettings,
    pub session: SessionSettings,
    pub backend: BackendSettings,
    pub recent_limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub device_index: u32,
    pub driver: CameraDriver,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device_index: DEFAULT_DEVICE_INDEX,
            driver: CameraDriver::Auto,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub sample_rate_fps: u32,
    /// Minutes until the session stops on its own; 0 means unlimited.
    pub auto_stop_minutes: f64,
}

impl SessionSettings {
    /// `None` for zero, and for values `validate` rejects.
    pub fn auto_stop_after(&self) -> Option<Duration> {
        if self.auto_stop_minutes > 0.0 {
            Duration::try_from_secs_f64(self.auto_stop_minutes * 60.0).ok()
        } else {
            None
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sample_rate_fps: DEFAULT_SAMPLE_RATE_FPS,
            auto_stop_minutes: DEFAULT_AUTO_STOP_MINUTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendSettings {
    pub model_path: PathBuf,
    /// Minimum luma standard deviation of the center crop for a face to count as present.
    pub face_threshold: f32,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            face_threshold: DEFAULT_FACE_THRESHOLD,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            chart_path: PathBuf::from(DEFAULT_CHART_PATH),
            camera: CameraSettings::default(),
            session: SessionSettings::default(),
            backend: BackendSettings::default(),
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }
}

impl TrackerConfig {
    /// Load from the file named by `MOOD_CONFIG` (if any), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("MOOD_CONFIG").ok().map(PathBuf::from);
        Self::load_with(config_path.as_deref())
    }

    /// Load from an explicit config file (if any), then apply env overrides.
    pub fn load_with(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TrackerConfigFile) -> Self {
        let defaults = Self::default();
        let camera = file.camera.unwrap_or_default();
        let session = file.session.unwrap_or_default();
        let backend = file.backend.unwrap_or_default();
        let dashboard = file.dashboard.unwrap_or_default();
        Self {
            log_path: file.log_path.unwrap_or(defaults.log_path),
            chart_path: file.chart_path.unwrap_or(defaults.chart_path),
            camera: CameraSettings {
                device_index: camera.device_index.unwrap_or(defaults.camera.device_index),
                driver: camera.driver.unwrap_or(defaults.camera.driver),
                width: camera.width.unwrap_or(defaults.camera.width),
                height: camera.height.unwrap_or(defaults.camera.height),
            },
            session: SessionSettings {
                sample_rate_fps: session
                    .sample_rate_fps
                    .unwrap_or(defaults.session.sample_rate_fps),
                auto_stop_minutes: session
                    .auto_stop_minutes
                    .unwrap_or(defaults.session.auto_stop_minutes),
            },
            backend: BackendSettings {
                model_path: backend.model_path.unwrap_or(defaults.backend.model_path),
                face_threshold: backend
                    .face_threshold
                    .unwrap_or(defaults.backend.face_threshold),
            },
            recent_limit: dashboard.recent_limit.unwrap_or(defaults.recent_limit),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = non_empty_env("MOOD_LOG_PATH") {
            self.log_path = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env("MOOD_CHART_PATH") {
            self.chart_path = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env("MOOD_MODEL_PATH") {
            self.backend.model_path = PathBuf::from(path);
        }
        if let Some(driver) = non_empty_env("MOOD_CAMERA_DRIVER") {
            self.camera.driver = driver.parse()?;
        }
        if let Some(index) = non_empty_env("MOOD_DEVICE_INDEX") {
            self.camera.device_index = index
                .trim()
                .parse()
                .map_err(|_| anyhow!("MOOD_DEVICE_INDEX must be a non-negative integer"))?;
        }
        if let Some(fps) = non_empty_env("MOOD_SAMPLE_RATE_FPS") {
            self.session.sample_rate_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("MOOD_SAMPLE_RATE_FPS must be an integer"))?;
        }
        if let Some(minutes) = non_empty_env("MOOD_AUTO_STOP_MINUTES") {
            self.session.auto_stop_minutes = minutes
                .trim()
                .parse()
                .map_err(|_| anyhow!("MOOD_AUTO_STOP_MINUTES must be a number of minutes"))?;
        }
        Ok(())
    }

    /// Check ranges. Public so CLI overrides can be re-validated.
    pub fn validate(&self) -> Result<()> {
        let fps = self.session.sample_rate_fps;
        if !(MIN_SAMPLE_RATE_FPS..=MAX_SAMPLE_RATE_FPS).contains(&fps) {
            return Err(anyhow!(
                "sample_rate_fps must be between {} and {} (got {})",
                MIN_SAMPLE_RATE_FPS,
                MAX_SAMPLE_RATE_FPS,
                fps
            ));
        }
        let minutes = self.session.auto_stop_minutes;
        if !minutes.is_finite() || minutes < 0.0 {
            return Err(anyhow!(
                "auto_stop_minutes must be zero (unlimited) or a positive number"
            ));
        }
        if minutes > MAX_AUTO_STOP_MINUTES {
            return Err(anyhow!(
                "auto_stop_minutes must be at most {} (got {})",
                MAX_AUTO_STOP_MINUTES,
                minutes
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if !self.backend.face_threshold.is_finite() || self.backend.face_threshold < 0.0 {
            return Err(anyhow!("face_threshold must be a non-negative number"));
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(anyhow!("log_path must not be empty"));
        }
        if self.chart_path.as_os_str().is_empty() {
            return Err(anyhow!("chart_path must not be empty"));
        }
        if self.recent_limit == 0 {
            return Err(anyhow!("recent_limit must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<TrackerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
