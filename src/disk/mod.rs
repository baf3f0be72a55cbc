//! Sticky disk filesystem lifecycle
//!
//! - `prepare`: format or grow the raw device
//! - `layout`: work area detection on a mounted filesystem
//! - `mount`: the setup state machine
//! - `unmount`: quiesce, measure and release at teardown

pub mod layout;
pub mod mount;
pub mod prepare;
pub mod unmount;

pub use layout::{inspect_layout, prepare_work_area, DiskLayout};
pub use mount::{MountOrchestrator, MountPhase, MountSettings, StickyDiskSession};
pub use prepare::{prepare_filesystem, Preparation};
pub use unmount::{UnmountManager, UnmountReport, UnmountSettings};
