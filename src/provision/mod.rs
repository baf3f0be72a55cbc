//! Sticky disk control plane client
//!
//! The VM agent hands out block devices for a cache key (`acquire`) and
//! later persists or releases them (`commit`). Both calls are bounded by
//! their own deadline; dropping the in-flight future on expiry cancels
//! the request.

mod grpc;
pub mod proto;

pub use grpc::GrpcProvisioner;

use crate::config::schema::JobConfig;
use crate::error::{StickyDiskError, StickyResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Disk type requested from the control plane
pub const STICKY_DISK_TYPE: &str = "stickydisk";

/// Request for a block device backing a cache key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireRequest {
    pub sticky_disk_key: String,
    pub region: String,
    pub installation_model_id: String,
    pub vm_id: String,
    pub token: Option<String>,
    pub repo_name: String,
}

impl AcquireRequest {
    /// Build an acquisition request for this job
    pub fn for_job(key: &str, job: &JobConfig) -> Self {
        Self {
            sticky_disk_key: key.to_string(),
            region: job.region.clone(),
            installation_model_id: job.installation_model_id.clone(),
            vm_id: job.vm_id.clone(),
            token: job.sticky_disk_token.clone(),
            repo_name: job.repo_name.clone(),
        }
    }
}

/// A block device attached to this VM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredDisk {
    /// Session handle for this acquisition
    pub expose_id: String,
    /// Block device path, e.g. `/dev/vdb`
    pub device: String,
}

/// Persist (`should_commit`) or release a previously acquired disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub expose_id: String,
    pub sticky_disk_key: String,
    pub vm_id: String,
    pub repo_name: String,
    pub token: Option<String>,
    pub should_commit: bool,
    /// Bytes in use; `None` lets the server size the snapshot itself
    pub fs_usage_bytes: Option<u64>,
}

/// Remote allocation/commit service
#[async_trait]
pub trait DiskProvisioner: Send + Sync {
    /// Expose a disk for the key and attach it to this VM
    async fn acquire(&self, request: &AcquireRequest) -> StickyResult<AcquiredDisk>;

    /// Commit or discard an acquired disk
    async fn commit(&self, request: &CommitRequest) -> StickyResult<()>;
}

/// `acquire` bounded by `deadline`
pub async fn acquire_within(
    provisioner: &dyn DiskProvisioner,
    request: &AcquireRequest,
    deadline: Duration,
) -> StickyResult<AcquiredDisk> {
    debug!("Getting sticky disk for {}", request.sticky_disk_key);
    tokio::time::timeout(deadline, provisioner.acquire(request))
        .await
        .map_err(|_| StickyDiskError::Timeout {
            operation: "acquiring sticky disk",
            after: deadline,
        })?
}

/// `commit` bounded by `timeout`
pub async fn commit_within(
    provisioner: &dyn DiskProvisioner,
    request: &CommitRequest,
    timeout: Duration,
) -> StickyResult<()> {
    tokio::time::timeout(timeout, provisioner.commit(request))
        .await
        .map_err(|_| StickyDiskError::Timeout {
            operation: "committing sticky disk",
            after: timeout,
        })?
}
