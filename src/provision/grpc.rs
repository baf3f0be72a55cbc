//! gRPC transport to the VM agent's sticky disk service

use crate::config::schema::ControlPlaneConfig;
use crate::error::{StickyDiskError, StickyResult};
use crate::provision::proto::{
    self, CommitStickyDiskRequest, CommitStickyDiskResponse, GetStickyDiskRequest,
    GetStickyDiskResponse,
};
use crate::provision::{
    AcquireRequest, AcquiredDisk, CommitRequest, DiskProvisioner, STICKY_DISK_TYPE,
};
use async_trait::async_trait;
use prost::Message;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

/// `DiskProvisioner` talking gRPC (HTTP/2, plaintext) to the VM agent
pub struct GrpcProvisioner {
    endpoint: String,
}

impl GrpcProvisioner {
    /// Create a provisioner for the given base URL
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// Create a provisioner from configuration
    pub fn from_config(config: &ControlPlaneConfig) -> Self {
        Self::new(config.endpoint())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Connect a fresh channel; each job makes at most two calls
    async fn connect(&self) -> StickyResult<Grpc<Channel>> {
        let endpoint = Endpoint::from_shared(self.endpoint.clone()).map_err(|e| {
            StickyDiskError::Transport(format!("invalid endpoint {}: {e}", self.endpoint))
        })?;
        let channel = endpoint.connect().await.map_err(|e| {
            StickyDiskError::Transport(format!("connecting to {}: {e}", self.endpoint))
        })?;
        Ok(Grpc::new(channel))
    }

    async fn unary<Req, Resp>(&self, path: &'static str, request: Req) -> StickyResult<Resp>
    where
        Req: Message + Send + Sync + 'static,
        Resp: Message + Default + Send + Sync + 'static,
    {
        debug!("Calling {} on {}", path, self.endpoint);
        let mut grpc = self.connect().await?;
        grpc.ready().await.map_err(|e| {
            StickyDiskError::Transport(format!("{} not ready: {e}", proto::SERVICE))
        })?;

        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let response = grpc
            .unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(path),
                codec,
            )
            .await
            .map_err(|status| {
                StickyDiskError::Transport(format!(
                    "{path} returned {:?}: {}",
                    status.code(),
                    status.message()
                ))
            })?;

        Ok(response.into_inner())
    }
}

/// Build the wire request for an acquisition
pub(crate) fn get_request(request: &AcquireRequest) -> GetStickyDiskRequest {
    GetStickyDiskRequest {
        sticky_disk_key: request.sticky_disk_key.clone(),
        region: request.region.clone(),
        installation_model_id: request.installation_model_id.clone(),
        vm_id: request.vm_id.clone(),
        sticky_disk_type: STICKY_DISK_TYPE.to_string(),
        sticky_disk_token: request.token.clone().unwrap_or_default(),
        repo_name: request.repo_name.clone(),
    }
}

/// Build the wire request for a commit or discard
pub(crate) fn commit_request(request: &CommitRequest) -> CommitStickyDiskRequest {
    CommitStickyDiskRequest {
        expose_id: request.expose_id.clone(),
        sticky_disk_key: request.sticky_disk_key.clone(),
        vm_id: request.vm_id.clone(),
        should_commit: request.should_commit,
        repo_name: request.repo_name.clone(),
        sticky_disk_token: request.token.clone().unwrap_or_default(),
        fs_usage_bytes: request.fs_usage_bytes.filter(|&bytes| bytes > 0),
    }
}

#[async_trait]
impl DiskProvisioner for GrpcProvisioner {
    async fn acquire(&self, request: &AcquireRequest) -> StickyResult<AcquiredDisk> {
        let response: GetStickyDiskResponse = self
            .unary(proto::GET_STICKY_DISK_PATH, get_request(request))
            .await?;

        if response.expose_id.is_empty() || response.disk_identifier.is_empty() {
            return Err(StickyDiskError::Transport(
                "control plane returned an empty expose id or device".to_string(),
            ));
        }

        Ok(AcquiredDisk {
            expose_id: response.expose_id,
            device: response.disk_identifier,
        })
    }

    async fn commit(&self, request: &CommitRequest) -> StickyResult<()> {
        let _: CommitStickyDiskResponse = self
            .unary(proto::COMMIT_STICKY_DISK_PATH, commit_request(request))
            .await?;
        Ok(())
    }
}
