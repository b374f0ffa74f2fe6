//! Integration tests for configuration loading

use doorguard::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[http]
bind_address = "127.0.0.1"
port = 8080

[sensor]
entry_pin = 5
exit_pin = 6
active_low = false
poll_interval_ms = 10

[detection]
window_ms = 400
cooldown_ms = 900

[callback]
timeout_ms = 2500

[camera]
command = "fswebcam"
args = ["--no-banner", "{path}"]
capture_timeout_ms = 3000
frame_interval_ms = 500

[photos]
image_dir = "/tmp/doorguard-images"
cleanup_older_than_min = 10
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.http_bind_address(), "127.0.0.1");
    assert_eq!(config.http_port(), 8080);
    assert_eq!(config.entry_pin(), 5);
    assert_eq!(config.exit_pin(), 6);
    assert!(!config.sensor_active_low());
    assert_eq!(config.poll_interval_ms(), 10);
    assert_eq!(config.window_ms(), 400);
    assert_eq!(config.cooldown_ms(), 900);
    assert_eq!(config.callback_timeout_ms(), 2500);
    assert_eq!(config.camera_command(), "fswebcam");
    assert_eq!(config.camera_args(), ["--no-banner", "{path}"]);
    assert_eq!(config.image_dir(), "/tmp/doorguard-images");
    assert_eq!(config.cleanup_older_than_min(), 10);
}

#[test]
fn test_partial_file_fills_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();

    temp_file
        .write_all(
            br#"
[detection]
window_ms = 500
cooldown_ms = 1500
"#,
        )
        .unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.window_ms(), 500);
    assert_eq!(config.cooldown_ms(), 1500);
    // Untouched sections keep their defaults
    assert_eq!(config.entry_pin(), 17);
    assert_eq!(config.exit_pin(), 27);
    assert_eq!(config.http_port(), 5000);
}

#[test]
fn test_invalid_detection_windows_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();

    temp_file
        .write_all(
            br#"
[detection]
window_ms = 1200
cooldown_ms = 600
"#,
        )
        .unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.http_port(), 5000);
    assert_eq!(config.entry_pin(), 17);
    assert_eq!(config.window_ms(), 600);
}
