//! Commit-or-discard decision at teardown
//!
//! Committing makes the disk's contents the starting point for every
//! later job with the same key, so anything short of a clearly healthy
//! job discards instead.

use crate::config::schema::JobConfig;
use crate::error::StickyResult;
use crate::provision::{commit_within, CommitRequest, DiskProvisioner};
use crate::steps::{FailedStep, StepFailureReport};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Why a disk is not being committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// Setup or unmount recorded an error
    SetupFailed,
    /// The step log could not be read
    AmbiguousStepCheck(String),
    /// Earlier job steps failed or were cancelled
    UpstreamFailures {
        count: usize,
        steps: Vec<FailedStep>,
    },
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetupFailed => write!(f, "sticky disk setup failed"),
            Self::AmbiguousStepCheck(reason) => {
                write!(f, "could not determine step outcomes ({})", reason)
            }
            Self::UpstreamFailures { count, .. } => {
                write!(f, "{} failed or cancelled step(s) detected", count)
            }
        }
    }
}

/// What to do with the disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Commit,
    Discard(DiscardReason),
}

impl Outcome {
    pub fn should_commit(&self) -> bool {
        matches!(self, Self::Commit)
    }
}

/// Decide the outcome from the error flag and upstream step health
pub fn decide(error_flag: bool, steps: &StepFailureReport) -> Outcome {
    if error_flag {
        return Outcome::Discard(DiscardReason::SetupFailed);
    }
    if let Some(reason) = &steps.error {
        return Outcome::Discard(DiscardReason::AmbiguousStepCheck(reason.clone()));
    }
    if steps.has_failures {
        return Outcome::Discard(DiscardReason::UpstreamFailures {
            count: steps.failed_count,
            steps: steps.failed_steps.clone(),
        });
    }
    Outcome::Commit
}

/// Result of reporting the outcome to the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStatus {
    Committed,
    Discarded,
    /// No session to report
    Skipped,
    /// The control plane call failed; logged only
    Failed,
}

/// Session identity recovered from job state
#[derive(Debug, Clone, Copy)]
pub struct SessionRef<'a> {
    pub expose_id: Option<&'a str>,
    pub sticky_disk_key: Option<&'a str>,
}

/// Reports commit or discard to the control plane
pub struct OutcomeReconciler<'a> {
    provisioner: &'a dyn DiskProvisioner,
    job: &'a JobConfig,
    timeout: Duration,
}

impl<'a> OutcomeReconciler<'a> {
    pub fn new(
        provisioner: &'a dyn DiskProvisioner,
        job: &'a JobConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            provisioner,
            job,
            timeout,
        }
    }

    /// Commit or discard the session; failures are logged, never returned
    pub async fn reconcile(
        &self,
        session: SessionRef<'_>,
        outcome: &Outcome,
        fs_usage_bytes: Option<u64>,
    ) -> ReconcileStatus {
        let key = session.sticky_disk_key.unwrap_or_default();
        let expose_id = session.expose_id.unwrap_or_default();

        match outcome {
            Outcome::Commit => {
                info!("Committing sticky disk {} with expose ID {}", key, expose_id)
            }
            Outcome::Discard(reason) => {
                if let DiscardReason::UpstreamFailures { steps, .. } = reason {
                    for step in steps {
                        warn!(
                            "Step {} ({}) {}",
                            step.name.as_deref().unwrap_or("<unnamed>"),
                            step.action.as_deref().unwrap_or("unknown action"),
                            step.result
                        );
                    }
                }
                info!(
                    "Cleaning up sticky disk {} with expose ID {}: {}",
                    key, expose_id, reason
                );
            }
        }

        if key.is_empty() || expose_id.is_empty() {
            warn!("No expose ID or sticky disk key found, cannot report sticky disk to Blacksmith");
            return ReconcileStatus::Skipped;
        }

        let request = CommitRequest {
            expose_id: expose_id.to_string(),
            sticky_disk_key: key.to_string(),
            vm_id: self.job.vm_id.clone(),
            repo_name: self.job.repo_name.clone(),
            token: self.job.sticky_disk_token.clone(),
            should_commit: outcome.should_commit(),
            fs_usage_bytes: if outcome.should_commit() {
                fs_usage_bytes
            } else {
                None
            },
        };

        match self.send(&request).await {
            Ok(()) if request.should_commit => {
                info!(
                    "Successfully committed sticky disk {} with expose ID {}",
                    key, expose_id
                );
                ReconcileStatus::Committed
            }
            Ok(()) => ReconcileStatus::Discarded,
            Err(e) if request.should_commit => {
                warn!("Error committing sticky disk: {}", e);
                ReconcileStatus::Failed
            }
            Err(e) => {
                warn!("Error reporting build failed: {}", e);
                ReconcileStatus::Failed
            }
        }
    }

    async fn send(&self, request: &CommitRequest) -> StickyResult<()> {
        commit_within(self.provisioner, request, self.timeout).await
    }
}
