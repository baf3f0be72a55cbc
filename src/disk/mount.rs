//! Sticky disk mount orchestration
//!
//! Drives one acquisition through
//! `Idle → Acquiring → Formatting → Mounting → MigrationCheck → BindExposing → Ready`,
//! with `Failed` reachable from every step.
//!
//! The raw filesystem is mounted at a hidden per-session path and only its
//! work subdirectory is bind-mounted where the job expects it, so the job
//! never sees the filesystem root or its recovery directory.

use crate::config::Config;
use crate::device::{DeviceOps, Ownership};
use crate::disk::layout::prepare_work_area;
use crate::disk::prepare::prepare_filesystem;
use crate::error::{StickyDiskError, StickyResult};
use crate::provision::{acquire_within, AcquireRequest, AcquiredDisk, DiskProvisioner};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Mode of the work area handed to the job
const WORK_DIR_MODE: u32 = 0o755;

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountPhase {
    Idle,
    Acquiring,
    Formatting,
    Mounting,
    MigrationCheck,
    BindExposing,
    Ready,
    Failed,
}

impl fmt::Display for MountPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::Formatting => "formatting",
            Self::Mounting => "mounting",
            Self::MigrationCheck => "migration-check",
            Self::BindExposing => "bind-exposing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// A sticky disk mounted and exposed to the job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StickyDiskSession {
    pub sticky_disk_key: String,
    pub expose_id: String,
    pub device: String,
    pub internal_mount_path: PathBuf,
    pub exposed_path: PathBuf,
}

/// Knobs for a mount
#[derive(Debug, Clone)]
pub struct MountSettings {
    pub acquire_timeout: Duration,
    pub internal_root: PathBuf,
    pub work_dir: String,
    pub filesystem: String,
    pub owner: Ownership,
}

impl MountSettings {
    /// Settings for the invoking user
    pub fn from_config(config: &Config) -> Self {
        Self {
            acquire_timeout: config.control_plane.acquire_timeout(),
            internal_root: config.mount.internal_root.clone(),
            work_dir: config.mount.work_dir.clone(),
            filesystem: config.mount.filesystem.clone(),
            owner: Ownership::current(),
        }
    }
}

/// Acquires, prepares and exposes one sticky disk
pub struct MountOrchestrator<'a> {
    provisioner: &'a dyn DiskProvisioner,
    device: &'a dyn DeviceOps,
    settings: MountSettings,
    phase: MountPhase,
    acquired: Option<AcquiredDisk>,
    internal_mount: Option<PathBuf>,
}

impl<'a> MountOrchestrator<'a> {
    pub fn new(
        provisioner: &'a dyn DiskProvisioner,
        device: &'a dyn DeviceOps,
        settings: MountSettings,
    ) -> Self {
        Self {
            provisioner,
            device,
            settings,
            phase: MountPhase::Idle,
            acquired: None,
            internal_mount: None,
        }
    }

    pub fn phase(&self) -> MountPhase {
        self.phase
    }

    /// The disk handed out by the control plane, even if a later step failed
    pub fn acquired(&self) -> Option<&AcquiredDisk> {
        self.acquired.as_ref()
    }

    /// The hidden mount point, once the raw filesystem is mounted
    pub fn internal_mount(&self) -> Option<&Path> {
        self.internal_mount.as_deref()
    }

    fn enter(&mut self, phase: MountPhase) {
        debug!("Sticky disk mount: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Run the whole sequence, exposing the disk at `path`
    pub async fn mount(
        &mut self,
        request: &AcquireRequest,
        path: &Path,
    ) -> StickyResult<StickyDiskSession> {
        if self.phase != MountPhase::Idle {
            return Err(StickyDiskError::Internal(format!(
                "mount orchestrator already used (phase {})",
                self.phase
            )));
        }

        match self.run(request, path).await {
            Ok(session) => {
                self.enter(MountPhase::Ready);
                Ok(session)
            }
            Err(e) => {
                self.enter(MountPhase::Failed);
                Err(e)
            }
        }
    }

    async fn run(
        &mut self,
        request: &AcquireRequest,
        path: &Path,
    ) -> StickyResult<StickyDiskSession> {
        self.enter(MountPhase::Acquiring);
        let disk = acquire_within(self.provisioner, request, self.settings.acquire_timeout).await?;
        self.acquired = Some(disk.clone());

        self.enter(MountPhase::Formatting);
        prepare_filesystem(
            self.device,
            &disk.device,
            &self.settings.filesystem,
            self.settings.owner,
        )
        .await?;

        self.enter(MountPhase::Mounting);
        let internal = self.settings.internal_root.join(&disk.expose_id);
        self.device.create_dir(&internal).await?;
        self.device.mount(&disk.device, &internal).await?;
        self.internal_mount = Some(internal.clone());
        debug!("Mounted {} to internal location {}", disk.device, internal.display());

        self.enter(MountPhase::MigrationCheck);
        let work = prepare_work_area(self.device, &internal, &self.settings.work_dir).await?;

        self.enter(MountPhase::BindExposing);
        let owner = self.settings.owner;
        self.device.set_mode(&work, WORK_DIR_MODE).await?;
        self.device.set_owner(&work, owner).await?;
        self.device.create_dir(path).await?;
        self.device.set_owner(path, owner).await?;
        self.device.bind_mount(&work, path).await?;

        debug!(
            "{} has been mounted to {} (via bind mount from {}) with expose ID {}",
            disk.device,
            path.display(),
            work.display(),
            disk.expose_id
        );

        Ok(StickyDiskSession {
            sticky_disk_key: request.sticky_disk_key.clone(),
            expose_id: disk.expose_id,
            device: disk.device,
            internal_mount_path: internal,
            exposed_path: path.to_path_buf(),
        })
    }
}
