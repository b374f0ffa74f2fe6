//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::{bail, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_http_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    5000
}

impl Default for HttpSection {
    fn default() -> Self {
        Self { bind_address: default_http_bind_address(), port: default_http_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorSection {
    /// BCM pin number of the entry-side line
    #[serde(default = "default_entry_pin")]
    pub entry_pin: u8,
    /// BCM pin number of the exit-side line
    #[serde(default = "default_exit_pin")]
    pub exit_pin: u8,
    /// Invert the raw level: the lines are pulled to their idle level and
    /// read active when driven the other way
    #[serde(default = "default_active_low")]
    pub active_low: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_entry_pin() -> u8 {
    17
}

fn default_exit_pin() -> u8 {
    27
}

fn default_active_low() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    20
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            entry_pin: default_entry_pin(),
            exit_pin: default_exit_pin(),
            active_low: default_active_low(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionSection {
    /// Max gap between the two signals of one crossing (ms)
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Quiet period after a confirmed event (ms); must exceed window_ms
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

fn default_window_ms() -> u64 {
    600
}

fn default_cooldown_ms() -> u64 {
    1200
}

impl Default for DetectionSection {
    fn default() -> Self {
        Self { window_ms: default_window_ms(), cooldown_ms: default_cooldown_ms() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackSection {
    #[serde(default = "default_callback_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_callback_timeout_ms() -> u64 {
    5000
}

impl Default for CallbackSection {
    fn default() -> Self {
        Self { timeout_ms: default_callback_timeout_ms() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraSection {
    /// Still-capture command; "{path}" in args is replaced by the target file
    #[serde(default = "default_camera_command")]
    pub command: String,
    #[serde(default = "default_camera_args")]
    pub args: Vec<String>,
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
    /// Delay between frames while the recorder is running
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

fn default_camera_command() -> String {
    "libcamera-still".to_string()
}

fn default_camera_args() -> Vec<String> {
    vec!["-n".to_string(), "--immediate".to_string(), "-o".to_string(), "{path}".to_string()]
}

fn default_capture_timeout_ms() -> u64 {
    4000
}

fn default_frame_interval_ms() -> u64 {
    300
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            command: default_camera_command(),
            args: default_camera_args(),
            capture_timeout_ms: default_capture_timeout_ms(),
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotosSection {
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
    /// Default age threshold for /cleanup, in minutes
    #[serde(default = "default_cleanup_older_than_min")]
    pub cleanup_older_than_min: u64,
}

fn default_image_dir() -> String {
    "images".to_string()
}

fn default_cleanup_older_than_min() -> u64 {
    2
}

impl Default for PhotosSection {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
            cleanup_older_than_min: default_cleanup_older_than_min(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub sensor: SensorSection,
    #[serde(default)]
    pub detection: DetectionSection,
    #[serde(default)]
    pub callback: CallbackSection,
    #[serde(default)]
    pub camera: CameraSection,
    #[serde(default)]
    pub photos: PhotosSection,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    http_bind_address: String,
    http_port: u16,
    entry_pin: u8,
    exit_pin: u8,
    sensor_active_low: bool,
    poll_interval_ms: u64,
    window_ms: u64,
    cooldown_ms: u64,
    callback_timeout_ms: u64,
    camera_command: String,
    camera_args: Vec<String>,
    capture_timeout_ms: u64,
    frame_interval_ms: u64,
    image_dir: String,
    cleanup_older_than_min: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            http_bind_address: toml_config.http.bind_address,
            http_port: toml_config.http.port,
            entry_pin: toml_config.sensor.entry_pin,
            exit_pin: toml_config.sensor.exit_pin,
            sensor_active_low: toml_config.sensor.active_low,
            poll_interval_ms: toml_config.sensor.poll_interval_ms,
            window_ms: toml_config.detection.window_ms,
            cooldown_ms: toml_config.detection.cooldown_ms,
            callback_timeout_ms: toml_config.callback.timeout_ms,
            camera_command: toml_config.camera.command,
            camera_args: toml_config.camera.args,
            capture_timeout_ms: toml_config.camera.capture_timeout_ms,
            frame_interval_ms: toml_config.camera.frame_interval_ms,
            image_dir: toml_config.photos.image_dir,
            cleanup_older_than_min: toml_config.photos.cleanup_older_than_min,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from the argument or environment
    pub fn resolve_config_path(arg: Option<&str>) -> String {
        if let Some(path) = arg {
            return path.to_string();
        }
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, &path.display().to_string());
        config.validate()?;
        Ok(config)
    }

    /// The correlation window must close before the cooldown reopens, so a
    /// confirmed event can never seed a new pending trigger.
    fn validate(&self) -> anyhow::Result<()> {
        if self.cooldown_ms <= self.window_ms {
            bail!(
                "detection.cooldown_ms ({}) must be greater than detection.window_ms ({})",
                self.cooldown_ms,
                self.window_ms
            );
        }
        if self.poll_interval_ms == 0 {
            bail!("sensor.poll_interval_ms must be non-zero");
        }
        if self.entry_pin == self.exit_pin {
            bail!("sensor.entry_pin and sensor.exit_pin must differ");
        }
        Ok(())
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn http_bind_address(&self) -> &str {
        &self.http_bind_address
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn entry_pin(&self) -> u8 {
        self.entry_pin
    }

    pub fn exit_pin(&self) -> u8 {
        self.exit_pin
    }

    pub fn sensor_active_low(&self) -> bool {
        self.sensor_active_low
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    pub fn callback_timeout_ms(&self) -> u64 {
        self.callback_timeout_ms
    }

    pub fn camera_command(&self) -> &str {
        &self.camera_command
    }

    pub fn camera_args(&self) -> &[String] {
        &self.camera_args
    }

    pub fn capture_timeout_ms(&self) -> u64 {
        self.capture_timeout_ms
    }

    pub fn frame_interval_ms(&self) -> u64 {
        self.frame_interval_ms
    }

    pub fn image_dir(&self) -> &str {
        &self.image_dir
    }

    pub fn cleanup_older_than_min(&self) -> u64 {
        self.cleanup_older_than_min
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
