//! Stickydisk - persistent block device caches for CI jobs
//!
//! Acquires a sticky disk from the VM agent, prepares and bind-mounts it
//! for the job, and on teardown unmounts it and commits or discards it
//! depending on how the job went.

pub mod cache_api;
pub mod cli;
pub mod config;
pub mod device;
pub mod disk;
pub mod error;
pub mod lifecycle;
pub mod provision;
pub mod reconcile;
pub mod state;
pub mod steps;
pub mod ui;

#[cfg(test)]
mod testing;

pub use error::{StickyDiskError, StickyResult};
