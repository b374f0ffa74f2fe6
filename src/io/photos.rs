//! Photo storage and housekeeping
//!
//! Owns the image directory: filename stamping for recorder frames and
//! tagged snapshots, latest-photo tracking, age-based cleanup, and copying
//! photos from a time interval into per-event subdirectories.

use anyhow::Context;
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

pub struct PhotoStore {
    dir: PathBuf,
    latest: RwLock<Option<String>>,
}

impl PhotoStore {
    /// Open the store, creating the image directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create image directory {}", dir.display()))?;
        Ok(Self { dir, latest: RwLock::new(None) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Name of the most recently stored photo, if any
    pub fn latest(&self) -> Option<String> {
        self.latest.read().clone()
    }

    pub fn set_latest(&self, file: impl Into<String>) {
        *self.latest.write() = Some(file.into());
    }

    /// Filename for a continuous-recording frame
    pub fn frame_filename(now: DateTime<Local>) -> String {
        format!("photo_{}.jpg", now.format("%Y%m%d_%H%M%S_%6f"))
    }

    /// Filename for an on-demand snapshot tagged with an event name
    pub fn snapshot_filename(event: &str, now: DateTime<Local>) -> String {
        format!("{}_{}.jpg", sanitize_label(event), now.format("%Y%m%d_%H%M%S"))
    }

    /// Resolve a request filename to a path inside the store
    ///
    /// Plain names and one label subdirectory level are accepted; anything
    /// that would escape the image directory is rejected.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let rel = Path::new(name);
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return None;
        }
        let path = self.dir.join(rel);
        path.is_file().then_some(path)
    }

    /// Modification time of a stored photo
    pub fn modified(&self, name: &str) -> Option<SystemTime> {
        self.resolve(name)?.metadata().ok()?.modified().ok()
    }

    /// Delete photos older than `max_age`; label subdirectories are kept
    pub fn cleanup_older_than(&self, max_age: Duration) -> anyhow::Result<usize> {
        let cutoff = SystemTime::now().checked_sub(max_age).unwrap_or(UNIX_EPOCH);
        let mut deleted = 0;

        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read image directory {}", self.dir.display()))?
        {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else { continue };
            if modified < cutoff {
                match fs::remove_file(&path) {
                    Ok(()) => deleted += 1,
                    Err(e) => warn!(file = %path.display(), error = %e, "photo_remove_failed"),
                }
            }
        }

        info!(deleted = %deleted, "photo_cleanup");
        Ok(deleted)
    }

    /// Copy photos whose mtime falls in `[start, end]` into `dir/label/`
    ///
    /// Returns the copied filenames in name order. Only top-level .jpg
    /// files are considered; earlier event subdirectories are skipped.
    pub fn copy_event_range(
        &self,
        label: &str,
        start: SystemTime,
        end: SystemTime,
    ) -> anyhow::Result<Vec<String>> {
        let label = sanitize_label(label);
        let target = self.dir.join(&label);
        fs::create_dir_all(&target)
            .with_context(|| format!("failed to create event directory {}", target.display()))?;

        let mut names: Vec<String> = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read image directory {}", self.dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.to_ascii_lowercase().ends_with(".jpg"))
            .collect();
        names.sort();

        let mut saved = Vec::new();
        for name in names {
            let path = self.dir.join(&name);
            let Ok(modified) = path.metadata().and_then(|m| m.modified()) else { continue };
            if modified < start || modified > end {
                continue;
            }
            match fs::copy(&path, target.join(&name)) {
                Ok(_) => saved.push(name),
                Err(e) => warn!(file = %name, error = %e, "photo_copy_failed"),
            }
        }

        info!(label = %label, count = %saved.len(), "event_photos_saved");
        Ok(saved)
    }
}

/// Strip anything that could not appear in a safe filename component
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "event".to_string()
    } else {
        cleaned
    }
}
