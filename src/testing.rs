//! In-memory fakes for the device and control plane seams

use crate::device::{DeviceLookup, DeviceOps, Ownership};
use crate::error::{StickyDiskError, StickyResult};
use crate::provision::{AcquireRequest, AcquiredDisk, CommitRequest, DiskProvisioner};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Control plane that hands out `/dev/vdb` and records commits
pub(crate) struct FakeProvisioner {
    disk: AcquiredDisk,
    acquire_error: Option<String>,
    acquire_delay: Duration,
    commit_delay: Duration,
    commit_error: Option<String>,
    acquires: AtomicUsize,
    commits: Mutex<Vec<CommitRequest>>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self {
            disk: AcquiredDisk {
                expose_id: "exp-1".to_string(),
                device: "/dev/vdb".to_string(),
            },
            acquire_error: None,
            acquire_delay: Duration::ZERO,
            commit_delay: Duration::ZERO,
            commit_error: None,
            acquires: AtomicUsize::new(0),
            commits: Mutex::new(Vec::new()),
        }
    }

    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = delay;
        self
    }

    pub fn failing_acquire(mut self, reason: &str) -> Self {
        self.acquire_error = Some(reason.to_string());
        self
    }

    pub fn failing_commit(mut self, reason: &str) -> Self {
        self.commit_error = Some(reason.to_string());
        self
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> Vec<CommitRequest> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiskProvisioner for FakeProvisioner {
    async fn acquire(&self, _request: &AcquireRequest) -> StickyResult<AcquiredDisk> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        if !self.acquire_delay.is_zero() {
            tokio::time::sleep(self.acquire_delay).await;
        }
        match &self.acquire_error {
            Some(reason) => Err(StickyDiskError::Transport(reason.clone())),
            None => Ok(self.disk.clone()),
        }
    }

    async fn commit(&self, request: &CommitRequest) -> StickyResult<()> {
        if !self.commit_delay.is_zero() {
            tokio::time::sleep(self.commit_delay).await;
        }
        self.commits.lock().unwrap().push(request.clone());
        match &self.commit_error {
            Some(reason) => Err(StickyDiskError::Transport(reason.clone())),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct FakeDeviceState {
    calls: Vec<String>,
    fs_type: Option<String>,
    format_fails: bool,
    resize_fails: bool,
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, Vec<String>>,
    mounted: BTreeSet<PathBuf>,
    busy_unmounts: u32,
    usage: Option<u64>,
    findmnt_device: Option<String>,
    df_device: Option<String>,
    flush_fails: bool,
}

/// Filesystem and mount table kept in memory, recording every call
pub(crate) struct FakeDevice {
    state: Mutex<FakeDeviceState>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeDeviceState::default()),
        }
    }

    fn update(self, f: impl FnOnce(&mut FakeDeviceState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn formatted(self, fs_type: &str) -> Self {
        self.update(|s| s.fs_type = Some(fs_type.to_string()))
    }

    pub fn failing_format(self) -> Self {
        self.update(|s| s.format_fails = true)
    }

    pub fn failing_resize(self) -> Self {
        self.update(|s| s.resize_fails = true)
    }

    pub fn with_dir(self, path: &str) -> Self {
        self.update(|s| {
            s.dirs.insert(PathBuf::from(path));
        })
    }

    /// Plain (non-directory) entries under `dir`
    pub fn with_files(self, dir: &str, names: &[&str]) -> Self {
        self.update(|s| {
            s.files.insert(
                PathBuf::from(dir),
                names.iter().map(|n| n.to_string()).collect(),
            );
        })
    }

    pub fn with_mounted(self, path: &str) -> Self {
        self.update(|s| {
            s.mounted.insert(PathBuf::from(path));
        })
    }

    pub fn with_busy_unmounts(self, failures: u32) -> Self {
        self.update(|s| s.busy_unmounts = failures)
    }

    pub fn with_usage(self, bytes: u64) -> Self {
        self.update(|s| s.usage = Some(bytes))
    }

    pub fn with_devices(self, findmnt: Option<&str>, df: Option<&str>) -> Self {
        self.update(|s| {
            s.findmnt_device = findmnt.map(str::to_string);
            s.df_device = df.map(str::to_string);
        })
    }

    pub fn failing_flush(self) -> Self {
        self.update(|s| s.flush_fails = true)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls whose name matches `op` (the first word)
    pub fn count(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(op))
            .count()
    }

    /// Position of the first call starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }

    pub fn is_mounted_now(&self, path: &str) -> bool {
        self.state.lock().unwrap().mounted.contains(Path::new(path))
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(Path::new(path))
    }

    fn record(&self, call: String) -> std::sync::MutexGuard<'_, FakeDeviceState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl DeviceOps for FakeDevice {
    async fn probe_fs_type(&self, device: &str) -> StickyResult<Option<String>> {
        let state = self.record(format!("probe {device}"));
        Ok(state.fs_type.clone())
    }

    async fn format(&self, device: &str, fs_type: &str, owner: Ownership) -> StickyResult<()> {
        let mut state = self.record(format!("format {device} {fs_type} {owner}"));
        if state.format_fails {
            return Err(StickyDiskError::Format {
                device: device.to_string(),
                reason: "mkfs failed".to_string(),
            });
        }
        state.fs_type = Some(fs_type.to_string());
        Ok(())
    }

    async fn resize(&self, device: &str) -> StickyResult<()> {
        let state = self.record(format!("resize {device}"));
        if state.resize_fails {
            return Err(StickyDiskError::command_exec("resize2fs", "bad superblock"));
        }
        Ok(())
    }

    async fn create_dir(&self, path: &Path) -> StickyResult<()> {
        let mut state = self.record(format!("mkdir {}", path.display()));
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }

    async fn set_owner(&self, path: &Path, owner: Ownership) -> StickyResult<()> {
        self.record(format!("chown {owner} {}", path.display()));
        Ok(())
    }

    async fn set_mode(&self, path: &Path, mode: u32) -> StickyResult<()> {
        self.record(format!("chmod {mode:04o} {}", path.display()));
        Ok(())
    }

    async fn is_dir(&self, path: &Path) -> StickyResult<bool> {
        let state = self.record(format!("test-dir {}", path.display()));
        Ok(state.dirs.contains(path))
    }

    async fn list_dir(&self, path: &Path) -> StickyResult<Vec<String>> {
        let state = self.record(format!("list {}", path.display()));
        let mut entries: Vec<String> = state.files.get(path).cloned().unwrap_or_default();
        entries.extend(
            state
                .dirs
                .iter()
                .filter(|d| d.parent() == Some(path))
                .filter_map(|d| d.file_name())
                .map(|n| n.to_string_lossy().into_owned()),
        );
        Ok(entries)
    }

    async fn mount(&self, device: &str, target: &Path) -> StickyResult<()> {
        let mut state = self.record(format!("mount {device} {}", target.display()));
        state.mounted.insert(target.to_path_buf());
        Ok(())
    }

    async fn bind_mount(&self, source: &Path, target: &Path) -> StickyResult<()> {
        let mut state = self.record(format!(
            "bind {} {}",
            source.display(),
            target.display()
        ));
        state.mounted.insert(target.to_path_buf());
        Ok(())
    }

    async fn is_mounted(&self, path: &Path) -> StickyResult<bool> {
        let state = self.record(format!("is-mounted {}", path.display()));
        Ok(state.mounted.contains(path))
    }

    async fn resolve_device(
        &self,
        path: &Path,
        lookup: DeviceLookup,
    ) -> StickyResult<Option<String>> {
        let state = self.record(format!("resolve {lookup:?} {}", path.display()));
        match lookup {
            DeviceLookup::Findmnt => match &state.findmnt_device {
                Some(device) => Ok(Some(device.clone())),
                None => Err(StickyDiskError::command_exec("findmnt", "not found")),
            },
            DeviceLookup::Df => Ok(state.df_device.clone()),
        }
    }

    async fn sync(&self) -> StickyResult<()> {
        self.record("sync".to_string());
        Ok(())
    }

    async fn used_bytes(&self, path: &Path) -> StickyResult<u64> {
        let state = self.record(format!("df {}", path.display()));
        state.usage.ok_or_else(|| {
            StickyDiskError::MeasurementUnavailable("unparseable reading '-'".to_string())
        })
    }

    async fn drop_caches(&self) -> StickyResult<()> {
        self.record("drop-caches".to_string());
        Ok(())
    }

    async fn unmount(&self, path: &Path) -> StickyResult<()> {
        let mut state = self.record(format!("umount {}", path.display()));
        if state.busy_unmounts > 0 {
            state.busy_unmounts -= 1;
            return Err(StickyDiskError::mount(path, "target is busy"));
        }
        state.mounted.remove(path);
        Ok(())
    }

    async fn flush_buffers(&self, device: &str) -> StickyResult<()> {
        let state = self.record(format!("flushbufs {device}"));
        if state.flush_fails {
            return Err(StickyDiskError::command_exec("blockdev", "ioctl failed"));
        }
        Ok(())
    }
}
