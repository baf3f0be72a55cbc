//! CLI command implementations

pub mod config;
pub mod delete_cache;
pub mod setup;
pub mod teardown;

pub use config::execute as config;
pub use delete_cache::execute as delete_cache;
pub use setup::execute as setup;
pub use teardown::execute as teardown;

use crate::config::ConfigManager;
use crate::state::JobStateStore;
use std::path::Path;

/// Job state store for the disk exposed at `disk_path`
fn job_store(state_file: Option<&Path>, disk_path: &Path) -> JobStateStore {
    match state_file {
        Some(file) => JobStateStore::new(file.to_path_buf()),
        None => {
            let dir = ConfigManager::state_dir(|name| std::env::var(name).ok());
            JobStateStore::for_disk_path(&dir, disk_path)
        }
    }
}
