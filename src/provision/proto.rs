//! Wire messages of `stickydisk.v1.StickyDiskService`

use prost::Message;

/// Fully-qualified service name
pub const SERVICE: &str = "stickydisk.v1.StickyDiskService";

pub const GET_STICKY_DISK_PATH: &str = "/stickydisk.v1.StickyDiskService/GetStickyDisk";

pub const COMMIT_STICKY_DISK_PATH: &str = "/stickydisk.v1.StickyDiskService/CommitStickyDisk";

#[derive(Clone, PartialEq, Message)]
pub struct GetStickyDiskRequest {
    #[prost(string, tag = "1")]
    pub sticky_disk_key: String,
    #[prost(string, tag = "2")]
    pub region: String,
    #[prost(string, tag = "3")]
    pub installation_model_id: String,
    #[prost(string, tag = "4")]
    pub vm_id: String,
    #[prost(string, tag = "5")]
    pub sticky_disk_type: String,
    #[prost(string, tag = "6")]
    pub sticky_disk_token: String,
    #[prost(string, tag = "7")]
    pub repo_name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetStickyDiskResponse {
    #[prost(string, tag = "1")]
    pub expose_id: String,
    #[prost(string, tag = "2")]
    pub disk_identifier: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct CommitStickyDiskRequest {
    #[prost(string, tag = "1")]
    pub expose_id: String,
    #[prost(string, tag = "2")]
    pub sticky_disk_key: String,
    #[prost(string, tag = "3")]
    pub vm_id: String,
    #[prost(bool, tag = "4")]
    pub should_commit: bool,
    #[prost(string, tag = "5")]
    pub repo_name: String,
    #[prost(string, tag = "6")]
    pub sticky_disk_token: String,
    /// Explicit presence: absent asks the server to size the snapshot
    #[prost(uint64, optional, tag = "7")]
    pub fs_usage_bytes: Option<u64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CommitStickyDiskResponse {}
