//! Setup command - acquire and mount the sticky disk

use crate::cli::args::SetupArgs;
use crate::config::Config;
use crate::device::SystemDeviceOps;
use crate::error::StickyResult;
use crate::lifecycle::Lifecycle;
use crate::provision::GrpcProvisioner;
use crate::ui::{self, UiContext};
use std::path::Path;
use tracing::debug;

/// Execute the setup command
///
/// A failed mount is reported but never fails the command; the job runs
/// on without its cache.
pub async fn execute(
    args: SetupArgs,
    config: &Config,
    state_file: Option<&Path>,
) -> StickyResult<()> {
    let ctx = UiContext::detect();
    let provisioner = GrpcProvisioner::from_config(&config.control_plane);
    let device = SystemDeviceOps::new();
    let store = super::job_store(state_file, &args.path);
    debug!("Job state file: {}", store.path().display());

    let lifecycle = Lifecycle::new(&provisioner, &device, store, config);
    let report = lifecycle.setup(&args.key, &args.path).await;

    match (&report.session, &report.error) {
        (Some(session), _) => ui::step_ok_detail(
            &ctx,
            &format!(
                "Sticky disk {} mounted at {}",
                session.sticky_disk_key,
                session.exposed_path.display()
            ),
            &session.device,
        ),
        (None, Some(e)) => ui::step_warn_hint(
            &ctx,
            &format!("Continuing without sticky disk: {}", e),
            e.hint().unwrap_or("the job will run without a cache"),
        ),
        (None, None) => ui::step_warn(&ctx, "Continuing without sticky disk"),
    }

    Ok(())
}
