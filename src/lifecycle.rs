//! Setup and teardown entry points
//!
//! Both phases run in separate processes of the same job and only share
//! the `JobState` record. Neither phase returns an error: failures are
//! logged, recorded and turned into a degraded outcome.

use crate::config::schema::JobConfig;
use crate::config::Config;
use crate::device::DeviceOps;
use crate::disk::{MountOrchestrator, MountSettings, StickyDiskSession, UnmountManager};
use crate::disk::{UnmountReport, UnmountSettings};
use crate::error::{StickyDiskError, StickyResult};
use crate::provision::{AcquireRequest, DiskProvisioner};
use crate::reconcile::{decide, Outcome, OutcomeReconciler, ReconcileStatus, SessionRef};
use crate::state::{JobState, JobStateStore};
use crate::steps::{check_previous_step_failures, StepFailureReport};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of the setup phase
#[derive(Debug)]
pub struct SetupReport {
    pub session: Option<StickyDiskSession>,
    pub error: Option<StickyDiskError>,
}

impl SetupReport {
    pub fn is_ready(&self) -> bool {
        self.session.is_some()
    }
}

/// Result of the teardown phase
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Setup left a record to act on
    pub attempted: bool,
    pub unmount: Option<UnmountReport>,
    pub outcome: Option<Outcome>,
    pub status: Option<ReconcileStatus>,
}

/// Drives one sticky disk through setup and teardown
pub struct Lifecycle<'a> {
    provisioner: &'a dyn DiskProvisioner,
    device: &'a dyn DeviceOps,
    store: JobStateStore,
    job: JobConfig,
    mount: MountSettings,
    unmount: UnmountSettings,
    commit_timeout: Duration,
}

impl<'a> Lifecycle<'a> {
    pub fn new(
        provisioner: &'a dyn DiskProvisioner,
        device: &'a dyn DeviceOps,
        store: JobStateStore,
        config: &Config,
    ) -> Self {
        Self {
            provisioner,
            device,
            store,
            job: config.job.clone(),
            mount: MountSettings::from_config(config),
            unmount: UnmountSettings::from_config(&config.durability),
            commit_timeout: config.control_plane.commit_timeout(),
        }
    }

    pub fn with_mount_settings(mut self, settings: MountSettings) -> Self {
        self.mount = settings;
        self
    }

    pub fn with_runner_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.job.runner_root = Some(root.into());
        self
    }

    pub fn store(&self) -> &JobStateStore {
        &self.store
    }

    /// Acquire and expose the disk for `key` at `path`
    pub async fn setup(&self, key: &str, path: &Path) -> SetupReport {
        info!("Mounting sticky disk at {} with key {}", path.display(), key);

        let mut state = JobState::begin(path, key);
        let request = AcquireRequest::for_job(key, &self.job);
        let mut orchestrator =
            MountOrchestrator::new(self.provisioner, self.device, self.mount.clone());

        let result = orchestrator.mount(&request, path).await;

        if let Some(disk) = orchestrator.acquired() {
            record(state.set_expose_id(&disk.expose_id));
            record(state.set_device(&disk.device));
        }
        if let Some(internal) = orchestrator.internal_mount() {
            record(state.set_internal_mount(internal));
        }

        let report = match result {
            Ok(session) => {
                debug!(
                    "Sticky disk mounted to {}, internal mount: {}, expose ID: {}",
                    session.device,
                    session.internal_mount_path.display(),
                    session.expose_id
                );
                SetupReport {
                    session: Some(session),
                    error: None,
                }
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!("Request to get sticky disk timed out");
                }
                warn!("Error getting sticky disk: {}", e);
                if let Some(hint) = e.hint() {
                    warn!("{}", hint);
                }
                record(state.mark_error());
                SetupReport {
                    session: None,
                    error: Some(e),
                }
            }
        };

        if let Err(e) = self.store.save(&state).await {
            warn!("Failed to save sticky disk job state: {}", e);
        }

        report
    }

    /// Unmount, then commit or discard the disk recorded by setup
    pub async fn teardown(&self) -> TeardownReport {
        let state = match self.store.load().await {
            Ok(state) => state,
            Err(e) => {
                warn!("Failed to read sticky disk job state: {}", e);
                return TeardownReport::default();
            }
        };

        if !state.mount_attempted() {
            debug!("No sticky disk path in state, skipping unmount");
            return TeardownReport::default();
        }

        let unmount = UnmountManager::new(self.device, self.unmount.clone())
            .run(&state)
            .await;

        let error_flag = state.has_error() || !unmount.clean;
        let steps = if error_flag {
            StepFailureReport::default()
        } else {
            check_previous_step_failures(self.job.runner_root.as_deref()).await
        };
        if let Some(err) = steps.ambiguity() {
            warn!("{}", err);
        }
        let outcome = decide(error_flag, &steps);

        let session = SessionRef {
            expose_id: state.expose_id.as_deref(),
            sticky_disk_key: state.sticky_disk_key.as_deref(),
        };
        let status = OutcomeReconciler::new(self.provisioner, &self.job, self.commit_timeout)
            .reconcile(session, &outcome, unmount.fs_usage_bytes)
            .await;

        TeardownReport {
            attempted: true,
            unmount: Some(unmount),
            outcome: Some(outcome),
            status: Some(status),
        }
    }
}

fn record(result: StickyResult<()>) {
    if let Err(e) = result {
        warn!("Failed to record sticky disk state: {}", e);
    }
}
