//! Persistent job state
//!
//! Setup and teardown run as separate processes. The only thing carried
//! between them is this record: written field by field during setup,
//! read once during teardown.

use crate::error::{StickyDiskError, StickyResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Setup → teardown handoff record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobState {
    /// Path the disk is exposed at
    pub sticky_disk_path: Option<PathBuf>,

    /// Cache identity the disk was requested for
    pub sticky_disk_key: Option<String>,

    /// Control plane session handle
    pub expose_id: Option<String>,

    /// Block device the disk was attached as
    pub device: Option<String>,

    /// Hidden mount of the raw filesystem
    pub internal_mount: Option<PathBuf>,

    /// Set when setup failed; teardown must not commit
    pub error: Option<bool>,

    /// When setup started writing this record
    pub recorded_at: Option<DateTime<Utc>>,
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &'static str) -> StickyResult<()> {
    if slot.is_some() {
        return Err(StickyDiskError::StateFieldAlreadySet(field));
    }
    *slot = Some(value);
    Ok(())
}

impl JobState {
    /// Start a record for a mount attempt
    pub fn begin(path: &Path, key: &str) -> Self {
        Self {
            sticky_disk_path: Some(path.to_path_buf()),
            sticky_disk_key: Some(key.to_string()),
            recorded_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn set_expose_id(&mut self, expose_id: &str) -> StickyResult<()> {
        set_once(&mut self.expose_id, expose_id.to_string(), "expose_id")
    }

    pub fn set_device(&mut self, device: &str) -> StickyResult<()> {
        set_once(&mut self.device, device.to_string(), "device")
    }

    pub fn set_internal_mount(&mut self, mount: &Path) -> StickyResult<()> {
        set_once(&mut self.internal_mount, mount.to_path_buf(), "internal_mount")
    }

    pub fn mark_error(&mut self) -> StickyResult<()> {
        set_once(&mut self.error, true, "error")
    }

    /// Whether setup recorded a failure
    pub fn has_error(&self) -> bool {
        self.error.unwrap_or(false)
    }

    /// Whether setup got far enough to attempt a mount
    pub fn mount_attempted(&self) -> bool {
        self.sticky_disk_path.is_some()
    }

    /// A session with an expose id and no recorded error may be committed
    pub fn eligible_for_commit(&self) -> bool {
        !self.has_error() && self.expose_id.is_some()
    }
}

/// File-backed store for one sticky disk's `JobState`
#[derive(Debug, Clone)]
pub struct JobStateStore {
    path: PathBuf,
}

impl JobStateStore {
    /// Store at an explicit file path
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store for the disk exposed at `disk_path`
    ///
    /// Both phases know the exposed path, so it names the record.
    pub fn for_disk_path(state_dir: &Path, disk_path: &Path) -> Self {
        let digest = Sha256::digest(disk_path.as_os_str().as_encoded_bytes());
        let name = format!("job-{}.json", &hex::encode(digest)[..16]);
        Self::new(state_dir.join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record; a missing file is an empty record
    pub async fn load(&self) -> StickyResult<JobState> {
        if !self.path.exists() {
            return Ok(JobState::default());
        }

        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            StickyDiskError::io(format!("reading job state {}", self.path.display()), e)
        })?;

        Ok(serde_json::from_str(&content)?)
    }

    /// Save the record, replacing any previous version atomically
    pub async fn save(&self, state: &JobState) -> StickyResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StickyDiskError::io("creating state directory", e))?;
        }

        let content = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| StickyDiskError::io(format!("writing job state {}", tmp.display()), e))?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            StickyDiskError::io(format!("replacing job state {}", self.path.display()), e)
        })?;

        Ok(())
    }
}
