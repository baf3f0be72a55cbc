//! Filesystem preparation for a freshly attached device
//!
//! Sticky disks are reused across many jobs. A device that already
//! carries the expected filesystem is grown in place (the backing volume
//! may have been enlarged since the last run); anything else is formatted.

use crate::device::{DeviceOps, Ownership};
use crate::error::{StickyDiskError, StickyResult};
use tracing::{debug, warn};

/// What was done to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preparation {
    /// Existing filesystem grown to the device size
    Resized,
    /// Existing filesystem kept at its previous size
    ResizeFailed,
    /// New filesystem created
    Formatted,
}

/// Make `device` carry a usable `fs_type` filesystem
///
/// Resize failures only cost capacity and are logged; format failures
/// leave the device unusable and are returned as `Format` errors.
pub async fn prepare_filesystem(
    ops: &dyn DeviceOps,
    device: &str,
    fs_type: &str,
    owner: Ownership,
) -> StickyResult<Preparation> {
    match ops.probe_fs_type(device).await {
        Ok(Some(found)) if found == fs_type => {
            debug!("Device {} is already formatted with {}", device, fs_type);
            return match ops.resize(device).await {
                Ok(()) => {
                    debug!("Resized {} filesystem on {}", fs_type, device);
                    Ok(Preparation::Resized)
                }
                Err(e) => {
                    warn!("Error resizing {} filesystem on {}: {}", fs_type, device, e);
                    Ok(Preparation::ResizeFailed)
                }
            };
        }
        Ok(Some(found)) => {
            warn!(
                "Device {} carries a {} filesystem, reformatting as {}",
                device, found, fs_type
            );
        }
        Ok(None) => debug!("No filesystem found on {}, will format it", device),
        Err(e) => debug!("Probing {} failed ({}), will format it", device, e),
    }

    debug!("Formatting device {} with {}", device, fs_type);
    ops.format(device, fs_type, owner)
        .await
        .map_err(|e| match e {
            StickyDiskError::Format { .. } => e,
            other => StickyDiskError::Format {
                device: device.to_string(),
                reason: other.to_string(),
            },
        })?;
    debug!("Successfully formatted {} with {}", device, fs_type);

    Ok(Preparation::Formatted)
}
