use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub camera: CameraConfig,
    #[serde(default)]
    pub zone: ZoneConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    pub orders: OrdersConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// MJPEG endpoint (`multipart/x-mixed-replace`).
    pub url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    /// Side of the centered detection square, in pixels.
    #[serde(default = "default_side")]
    pub side: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_min_area")]
    pub min_area: u32,
    #[serde(default = "default_hue_lower")]
    pub hue_lower: u8,
    #[serde(default = "default_hue_upper")]
    pub hue_upper: u8,
    #[serde(default = "default_kernel_size")]
    pub kernel_size: u8,
    #[serde(default = "default_canny_low")]
    pub canny_low: f32,
    #[serde(default = "default_canny_high")]
    pub canny_high: f32,
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_pause_success")]
    pub pause_success_secs: u64,
    #[serde(default = "default_pause_failure")]
    pub pause_failure_secs: u64,
    #[serde(default = "default_frame_yield")]
    pub frame_yield_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ru,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    #[serde(default)]
    pub language: Language,
    /// TrueType font for the instruction text. Without it the text is skipped.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    /// Directory receiving `<view>.jpg` snapshots of every displayed view.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    /// Open native windows (requires the scanner's `window` feature).
    #[serde(default)]
    pub window: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersConfig {
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    #[default]
    Log,
    Webhook,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub kind: NotifyKind,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Shows intermediate detector views and lowers the default level to `debug`.
    #[serde(default)]
    pub debug: bool,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            side: default_side(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_area: default_min_area(),
            hue_lower: default_hue_lower(),
            hue_upper: default_hue_upper(),
            kernel_size: default_kernel_size(),
            canny_low: default_canny_low(),
            canny_high: default_canny_high(),
            blur_sigma: default_blur_sigma(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            pause_success_secs: default_pause_success(),
            pause_failure_secs: default_pause_failure(),
            frame_yield_ms: default_frame_yield(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            language: Language::default(),
            font_path: None,
            snapshot_dir: None,
            window: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            debug: false,
        }
    }
}

impl LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub fn effective_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.level
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("zone.side", self.zone.side as u64, 50, 9000)?;
        check_range("detector.min_area", self.detector.min_area as u64, 50, 9000)?;
        check_range("detector.kernel_size", self.detector.kernel_size as u64, 1, 31)?;
        check_range("scan.pause_success_secs", self.scan.pause_success_secs, 0, 9000)?;
        check_range("scan.pause_failure_secs", self.scan.pause_failure_secs, 0, 9000)?;

        if self.detector.hue_lower > self.detector.hue_upper {
            return Err(ConfigError::Invalid(format!(
                "detector.hue_lower ({}) is above detector.hue_upper ({})",
                self.detector.hue_lower, self.detector.hue_upper
            )));
        }
        if self.detector.blur_sigma <= 0.0 {
            return Err(ConfigError::Invalid("detector.blur_sigma must be positive".into()));
        }
        if self.notify.kind == NotifyKind::Webhook && self.notify.webhook_url.is_none() {
            return Err(ConfigError::Invalid(
                "notify.webhook_url is required for the webhook notifier".into(),
            ));
        }
        Ok(())
    }
}

fn check_range(key: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            key,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("{key} must be between {min} and {max}, got {value}")]
    OutOfRange {
        key: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_connect_timeout() -> u64 {
    10
}
fn default_side() -> u32 {
    240
}
fn default_min_area() -> u32 {
    300
}
fn default_hue_lower() -> u8 {
    196
}
fn default_hue_upper() -> u8 {
    255
}
fn default_kernel_size() -> u8 {
    2
}
fn default_canny_low() -> f32 {
    175.0
}
fn default_canny_high() -> f32 {
    250.0
}
fn default_blur_sigma() -> f32 {
    0.8
}
fn default_pause_success() -> u64 {
    5
}
fn default_pause_failure() -> u64 {
    1
}
fn default_frame_yield() -> u64 {
    100
}
fn default_log_level() -> String {
    "info".into()
}
