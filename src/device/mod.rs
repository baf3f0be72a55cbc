//! Block device operations
//!
//! Everything the lifecycle needs from the operating system goes through
//! the `DeviceOps` trait, so the mount and teardown state machines can be
//! driven against an in-memory fake in tests.

mod system;

pub use system::{parse_df_used, parse_findmnt_source, SystemDeviceOps};

use crate::error::StickyResult;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// Numeric owner applied to directories handed to the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

impl Ownership {
    /// The user running this process
    pub fn current() -> Self {
        // SAFETY: getuid/getgid have no preconditions and cannot fail
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self { uid, gid }
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// Strategy for mapping a mount point back to its block device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLookup {
    /// `findmnt -n -o SOURCE`
    Findmnt,
    /// `df --output=source`
    Df,
}

/// Operating system primitives used by the sticky disk lifecycle
#[async_trait]
pub trait DeviceOps: Send + Sync {
    /// Filesystem type on the device, `None` when unformatted
    async fn probe_fs_type(&self, device: &str) -> StickyResult<Option<String>>;

    /// Create a fresh filesystem owned by `owner`
    async fn format(&self, device: &str, fs_type: &str, owner: Ownership) -> StickyResult<()>;

    /// Grow the filesystem to the size of the device
    async fn resize(&self, device: &str) -> StickyResult<()>;

    /// `mkdir -p`
    async fn create_dir(&self, path: &Path) -> StickyResult<()>;

    async fn set_owner(&self, path: &Path, owner: Ownership) -> StickyResult<()>;

    async fn set_mode(&self, path: &Path, mode: u32) -> StickyResult<()>;

    async fn is_dir(&self, path: &Path) -> StickyResult<bool>;

    /// Names of the direct children of `path`
    async fn list_dir(&self, path: &Path) -> StickyResult<Vec<String>>;

    async fn mount(&self, device: &str, target: &Path) -> StickyResult<()>;

    async fn bind_mount(&self, source: &Path, target: &Path) -> StickyResult<()>;

    async fn is_mounted(&self, path: &Path) -> StickyResult<bool>;

    /// Block device backing the mount at `path`
    async fn resolve_device(&self, path: &Path, lookup: DeviceLookup)
        -> StickyResult<Option<String>>;

    /// Flush dirty pages system-wide
    async fn sync(&self) -> StickyResult<()>;

    /// Bytes used on the filesystem mounted at `path`
    async fn used_bytes(&self, path: &Path) -> StickyResult<u64>;

    /// Drop page cache, dentries and inodes
    async fn drop_caches(&self) -> StickyResult<()>;

    async fn unmount(&self, path: &Path) -> StickyResult<()>;

    /// Flush the block device's buffers
    async fn flush_buffers(&self, device: &str) -> StickyResult<()>;
}
