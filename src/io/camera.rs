//! Camera frame capture
//!
//! Stills are produced by an external capture command (libcamera-still by
//! default) rather than an in-process camera stack; the command, its
//! arguments and the timeout are configurable. `{path}` in the argument
//! list is replaced with the target file before the command runs.

use crate::infra::config::Config;
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Placeholder substituted with the destination file in capture args
pub const PATH_PLACEHOLDER: &str = "{path}";

/// A source of single camera frames written to disk
#[async_trait]
pub trait FrameCapture: Send + Sync {
    /// Capture one frame into `dest`
    async fn capture(&self, dest: &Path) -> anyhow::Result<()>;
}

/// Captures frames by running an external still-capture command
pub struct CommandCapture {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandCapture {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self { program: program.into(), args, timeout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.camera_command(),
            config.camera_args().to_vec(),
            Duration::from_millis(config.capture_timeout_ms()),
        )
    }
}

#[async_trait]
impl FrameCapture for CommandCapture {
    async fn capture(&self, dest: &Path) -> anyhow::Result<()> {
        let dest_str = dest.to_string_lossy();
        let args: Vec<String> =
            self.args.iter().map(|a| a.replace(PATH_PLACEHOLDER, &dest_str)).collect();

        debug!(program = %self.program, dest = %dest_str, "camera_capture");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to run capture command {}", self.program))?;

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status.context("capture command wait failed")?,
            Err(_) => {
                let _ = child.kill().await;
                bail!(
                    "capture command {} timed out after {}ms",
                    self.program,
                    self.timeout.as_millis()
                );
            }
        };

        if !status.success() {
            bail!("capture command {} exited with {}", self.program, status);
        }
        Ok(())
    }
}
