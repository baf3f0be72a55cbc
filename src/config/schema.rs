//! Configuration schema for stickydisk
//!
//! Configuration is optional TOML plus the runner environment. Every
//! section has defaults matching the hosted runner layout, so an empty
//! file (or no file at all) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Sticky disk control plane endpoint
    pub control_plane: ControlPlaneConfig,

    /// Identity of the job requesting the disk
    pub job: JobConfig,

    /// Mount layout
    pub mount: MountConfig,

    /// Teardown durability settings
    pub durability: DurabilityConfig,

    /// Remote cache deletion API
    pub cache_api: CacheApiConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Control plane (VM agent) connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Host the VM agent listens on
    pub host: String,

    /// gRPC port of the VM agent
    pub port: u16,

    /// Deadline for acquiring (exposing and attaching) a disk
    pub acquire_timeout_secs: u64,

    /// Timeout for the commit/discard call
    pub commit_timeout_secs: u64,
}

impl ControlPlaneConfig {
    /// Base URL of the gRPC endpoint
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_secs(self.commit_timeout_secs)
    }
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            host: "192.168.127.1".to_string(),
            port: 5557,
            acquire_timeout_secs: 45,
            commit_timeout_secs: 30,
        }
    }
}

/// Identity of the CI job, forwarded to the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Routing hint for the storage backend
    pub region: String,

    /// Installation the job belongs to
    pub installation_model_id: String,

    /// VM the job runs on; correlates acquire and commit
    pub vm_id: String,

    /// Repository name (owner/repo)
    pub repo_name: String,

    /// Auth token for sticky disk RPCs
    #[serde(skip_serializing)]
    pub sticky_disk_token: Option<String>,

    /// Runner installation root, for the step log scan (auto-detected when unset)
    pub runner_root: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            region: "eu-central".to_string(),
            installation_model_id: String::new(),
            vm_id: String::new(),
            repo_name: String::new(),
            sticky_disk_token: None,
            runner_root: None,
        }
    }
}

/// Where and how the disk is mounted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Parent of the hidden per-session mount points
    pub internal_root: PathBuf,

    /// Subdirectory of the filesystem exposed to the job
    pub work_dir: String,

    /// Filesystem type the disk is formatted with
    pub filesystem: String,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            internal_root: PathBuf::from("/mnt/stickydisk"),
            work_dir: "work".to_string(),
            filesystem: "ext4".to_string(),
        }
    }
}

/// Teardown durability settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurabilityConfig {
    /// Flush block device buffers after unmount
    pub flush_buffers: bool,

    /// Unmount attempts before giving up
    pub unmount_attempts: u32,

    /// Fixed delay between unmount attempts
    pub unmount_backoff_ms: u64,
}

impl DurabilityConfig {
    pub fn unmount_backoff(&self) -> Duration {
        Duration::from_millis(self.unmount_backoff_ms)
    }
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        Self {
            flush_buffers: true,
            unmount_attempts: 10,
            unmount_backoff_ms: 300,
        }
    }
}

/// Remote cache deletion API settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheApiConfig {
    /// Base URL; derived from the environment when unset
    pub base_url: Option<String>,

    /// Bearer token for the cache API
    #[serde(skip_serializing)]
    pub token: Option<String>,
}
