//! Teardown command - unmount, then commit or discard

use crate::cli::args::TeardownArgs;
use crate::config::Config;
use crate::device::SystemDeviceOps;
use crate::error::StickyResult;
use crate::lifecycle::Lifecycle;
use crate::provision::GrpcProvisioner;
use crate::reconcile::{Outcome, ReconcileStatus};
use crate::ui::{self, UiContext};
use std::path::Path;

/// Execute the teardown command
///
/// Always succeeds; problems are logged.
pub async fn execute(
    args: TeardownArgs,
    config: &Config,
    state_file: Option<&Path>,
) -> StickyResult<()> {
    let ctx = UiContext::detect();
    let provisioner = GrpcProvisioner::from_config(&config.control_plane);
    let device = SystemDeviceOps::new();
    let store = super::job_store(state_file, &args.path);

    let report = Lifecycle::new(&provisioner, &device, store, config)
        .teardown()
        .await;

    if !report.attempted {
        ui::step_ok(&ctx, "No sticky disk to tear down");
        return Ok(());
    }

    if let Some(unmount) = &report.unmount {
        if !unmount.clean {
            ui::step_warn(
                &ctx,
                &format!("Could not fully unmount {}", args.path.display()),
            );
        }
    }

    match (&report.outcome, report.status) {
        (_, Some(ReconcileStatus::Committed)) => ui::step_ok(&ctx, "Sticky disk committed"),
        (Some(Outcome::Discard(reason)), Some(ReconcileStatus::Discarded)) => {
            ui::step_warn_hint(&ctx, "Sticky disk discarded", &reason.to_string())
        }
        (_, Some(ReconcileStatus::Skipped)) => {
            ui::step_warn(&ctx, "Sticky disk session not reported")
        }
        _ => ui::step_warn(&ctx, "Could not report sticky disk outcome"),
    }

    Ok(())
}
