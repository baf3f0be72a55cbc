//! Teardown of a mounted sticky disk
//!
//! Order matters here: usage is measured while the filesystem is still
//! mounted, caches are dropped before unmounting to avoid `EBUSY`, and the
//! block device buffers are flushed only once the filesystem is detached.

use crate::config::schema::DurabilityConfig;
use crate::device::{DeviceLookup, DeviceOps};
use crate::error::StickyResult;
use crate::state::JobState;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry and durability policy
#[derive(Debug, Clone)]
pub struct UnmountSettings {
    pub attempts: u32,
    pub backoff: Duration,
    pub flush_buffers: bool,
}

impl UnmountSettings {
    pub fn from_config(config: &DurabilityConfig) -> Self {
        Self {
            attempts: config.unmount_attempts.max(1),
            backoff: config.unmount_backoff(),
            flush_buffers: config.flush_buffers,
        }
    }
}

impl Default for UnmountSettings {
    fn default() -> Self {
        Self::from_config(&DurabilityConfig::default())
    }
}

/// What teardown found and did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnmountReport {
    /// The exposed path was still mounted
    pub was_mounted: bool,
    /// Block device backing the mount, if it could be determined
    pub device: Option<String>,
    /// Bytes in use just before unmount; `None` when unknown
    pub fs_usage_bytes: Option<u64>,
    /// Every mount that needed releasing was released
    pub clean: bool,
}

/// Quiesces, measures and unmounts a sticky disk
pub struct UnmountManager<'a> {
    device: &'a dyn DeviceOps,
    settings: UnmountSettings,
}

impl<'a> UnmountManager<'a> {
    pub fn new(device: &'a dyn DeviceOps, settings: UnmountSettings) -> Self {
        Self { device, settings }
    }

    /// Release the mounts recorded in `state`
    ///
    /// Never fails: each problem is logged and reflected in the report.
    pub async fn run(&self, state: &JobState) -> UnmountReport {
        let mut report = UnmountReport {
            clean: true,
            ..UnmountReport::default()
        };
        let mut released = false;

        let Some(path) = state.sticky_disk_path.as_deref() else {
            debug!("No sticky disk path recorded, nothing to unmount");
            return report;
        };

        report.was_mounted = self.is_mounted(path).await;
        if report.was_mounted {
            report.device = match self.resolve_device(path).await {
                Some(device) => Some(device),
                None => state.device.clone(),
            };

            self.sync().await;
            report.fs_usage_bytes = self.measure_usage(path).await;
            self.drop_caches().await;

            match self.unmount_with_retry(path).await {
                Ok(_) => released = true,
                Err(e) => {
                    warn!("Failed to unmount {}: {}", path.display(), e);
                    report.clean = false;
                }
            }
        } else {
            debug!("{} is not mounted, skipping unmount", path.display());
        }

        if report.clean {
            if let Some(internal) = state.internal_mount.as_deref() {
                if self.is_mounted(internal).await {
                    if !report.was_mounted {
                        self.sync().await;
                        self.drop_caches().await;
                    }
                    match self.unmount_with_retry(internal).await {
                        Ok(_) => {
                            released = true;
                            if report.device.is_none() {
                                report.device = state.device.clone();
                            }
                        }
                        Err(e) => {
                            warn!("Failed to unmount {}: {}", internal.display(), e);
                            report.clean = false;
                        }
                    }
                }
            }
        }

        if released && report.clean {
            self.flush(report.device.as_deref()).await;
        }

        report
    }

    /// Unmount `path`, retrying while it is busy
    ///
    /// Returns the number of attempts used.
    pub async fn unmount_with_retry(&self, path: &Path) -> StickyResult<u32> {
        let attempts = self.settings.attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.device.unmount(path).await {
                Ok(()) => {
                    info!("Successfully unmounted {}", path.display());
                    return Ok(attempt);
                }
                Err(e) if attempt < attempts => {
                    debug!("umount {} failed: {}", path.display(), e);
                    warn!("Unmount failed, retrying ({}/{})...", attempt, attempts);
                    tokio::time::sleep(self.settings.backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn is_mounted(&self, path: &Path) -> bool {
        self.device.is_mounted(path).await.unwrap_or_else(|e| {
            debug!("Could not check mount state of {}: {}", path.display(), e);
            false
        })
    }

    async fn resolve_device(&self, path: &Path) -> Option<String> {
        for lookup in [DeviceLookup::Findmnt, DeviceLookup::Df] {
            match self.device.resolve_device(path, lookup).await {
                Ok(Some(device)) => {
                    debug!("Resolved {} to {} via {:?}", path.display(), device, lookup);
                    return Some(device);
                }
                Ok(None) => debug!("{:?} found no device for {}", lookup, path.display()),
                Err(e) => debug!("{:?} lookup for {} failed: {}", lookup, path.display(), e),
            }
        }
        None
    }

    async fn sync(&self) {
        if let Err(e) = self.device.sync().await {
            warn!("Failed to flush filesystem buffers: {}", e);
        }
    }

    async fn measure_usage(&self, path: &Path) -> Option<u64> {
        match self.device.used_bytes(path).await {
            Ok(bytes) if bytes > 0 => {
                debug!("Filesystem usage for {}: {} bytes", path.display(), bytes);
                Some(bytes)
            }
            Ok(bytes) => {
                debug!("Discarding usage reading of {} bytes", bytes);
                None
            }
            Err(e) => {
                warn!("Could not measure filesystem usage: {}", e);
                None
            }
        }
    }

    async fn drop_caches(&self) {
        if let Err(e) = self.device.drop_caches().await {
            warn!("Failed to drop caches: {}", e);
        }
    }

    async fn flush(&self, device: Option<&str>) {
        if !self.settings.flush_buffers {
            debug!("Block device flush disabled");
            return;
        }
        let Some(device) = device else {
            debug!("No device resolved, skipping block device flush");
            return;
        };

        match self.device.flush_buffers(device).await {
            Ok(()) => debug!("Flushed block device buffers for {}", device),
            Err(e) => warn!("Failed to flush block device buffers for {}: {}", device, e),
        }
    }
}
