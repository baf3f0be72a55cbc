//! On-disk layout detection
//!
//! Current disks keep all job data in a work subdirectory, which is the
//! only part bind-mounted into the job. Older disks stored data at the
//! filesystem root. The two cannot be blended safely, so a legacy disk
//! fails the acquisition instead of being migrated.

use crate::device::DeviceOps;
use crate::error::{StickyDiskError, StickyResult};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory mkfs reserves for fsck recovery
pub const RECOVERY_DIR: &str = "lost+found";

/// Layout of a mounted sticky disk filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskLayout {
    /// Work area present
    Current,
    /// Nothing but the recovery directory
    Empty,
    /// Data at the filesystem root
    Legacy { entries: Vec<String> },
}

/// Classify the filesystem mounted at `root` without modifying it
pub async fn inspect_layout(
    ops: &dyn DeviceOps,
    root: &Path,
    work_dir: &str,
) -> StickyResult<DiskLayout> {
    if ops.is_dir(&root.join(work_dir)).await? {
        debug!("{}/ directory already exists, disk is in current format", work_dir);
        return Ok(DiskLayout::Current);
    }

    let entries: Vec<String> = ops
        .list_dir(root)
        .await?
        .into_iter()
        .filter(|name| name != RECOVERY_DIR)
        .collect();

    if entries.is_empty() {
        Ok(DiskLayout::Empty)
    } else {
        Ok(DiskLayout::Legacy { entries })
    }
}

/// Ensure the work area exists under `root` and return its path
///
/// Fails with `IncompatibleFormat` on a legacy disk, leaving it untouched.
pub async fn prepare_work_area(
    ops: &dyn DeviceOps,
    root: &Path,
    work_dir: &str,
) -> StickyResult<PathBuf> {
    let work = root.join(work_dir);

    match inspect_layout(ops, root, work_dir).await? {
        DiskLayout::Current => {}
        DiskLayout::Empty => {
            debug!("No existing data found, creating fresh {}/ directory", work_dir);
            ops.create_dir(&work).await?;
        }
        DiskLayout::Legacy { entries } => {
            warn!(
                "Detected old sticky disk format (data at filesystem root, found {}). \
                 This disk is incompatible with the bind-mount layout.",
                entries.join(", ")
            );
            return Err(StickyDiskError::IncompatibleFormat {
                mount: root.to_path_buf(),
            });
        }
    }

    Ok(work)
}
