//! Continuous frame recording
//!
//! A background task captures a frame every `frame_interval` while
//! recording is on, in the same lifecycle shape as the sensor monitor:
//! running flag, watch-channel shutdown, idempotent start/stop. Capture
//! failures are logged and the loop keeps going.

use crate::io::camera::FrameCapture;
use crate::io::photos::PhotoStore;
use chrono::Local;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

struct RecorderTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the recording task lifecycle
pub struct RecorderController {
    camera: Arc<dyn FrameCapture>,
    photos: Arc<PhotoStore>,
    frame_interval: Duration,
    recording: Arc<AtomicBool>,
    task: Mutex<Option<RecorderTask>>,
}

impl RecorderController {
    pub fn new(
        camera: Arc<dyn FrameCapture>,
        photos: Arc<PhotoStore>,
        frame_interval: Duration,
    ) -> Self {
        Self {
            camera,
            photos,
            frame_interval,
            recording: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Start recording; returns false if already running
    pub fn start(&self) -> bool {
        let mut slot = self.task.lock();
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                return false;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.recording.store(true, Ordering::Release);

        let camera = Arc::clone(&self.camera);
        let photos = Arc::clone(&self.photos);
        let recording = Arc::clone(&self.recording);
        let frame_interval = self.frame_interval;
        let handle = tokio::spawn(async move {
            run_recorder_loop(camera, photos, frame_interval, recording, shutdown_rx).await;
        });

        *slot = Some(RecorderTask { shutdown: shutdown_tx, handle });
        info!(frame_interval_ms = %self.frame_interval.as_millis(), "recorder_started");
        true
    }

    /// Stop recording and join the task. No-op when not running.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        let Some(task) = task else {
            debug!("recorder_stop_not_running");
            return;
        };

        let _ = task.shutdown.send(true);
        if let Err(e) = task.handle.await {
            warn!(error = %e, "recorder_task_join_failed");
        }
        info!("recorder_stopped");
    }
}

async fn run_recorder_loop(
    camera: Arc<dyn FrameCapture>,
    photos: Arc<PhotoStore>,
    frame_interval: Duration,
    recording: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut frame_timer = interval(frame_interval);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = frame_timer.tick() => {}
        }

        let filename = PhotoStore::frame_filename(Local::now());
        let path = photos.dir().join(&filename);
        match camera.capture(&path).await {
            Ok(()) => {
                photos.set_latest(filename);
            }
            Err(e) => {
                warn!(error = %e, "frame_capture_failed");
            }
        }
    }

    recording.store(false, Ordering::Release);
    info!("recorder_loop_stopped");
}
