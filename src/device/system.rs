//! Device operations backed by the standard Linux utilities
//!
//! Privileged commands go through `sudo` unless the process already runs
//! as root.

use crate::device::{DeviceLookup, DeviceOps, Ownership};
use crate::error::{StickyDiskError, StickyResult};
use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

/// `DeviceOps` implemented with blkid, mkfs, mount, df and friends
pub struct SystemDeviceOps {
    use_sudo: bool,
}

impl SystemDeviceOps {
    /// Create device operations, elevating with sudo when not root
    pub fn new() -> Self {
        Self {
            use_sudo: Ownership::current().uid != 0,
        }
    }

    /// Execute a command and return its output
    async fn exec<I, S>(&self, privileged: bool, program: &str, args: I) -> StickyResult<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let command = describe(program, &args);
        debug!("Executing: {}", command);

        let mut cmd = if privileged && self.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg(program);
            cmd
        } else {
            Command::new(program)
        };

        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| StickyDiskError::command_failed(command, e))
    }

    /// Execute a command that must succeed
    async fn exec_ok<I, S>(&self, privileged: bool, program: &str, args: I) -> StickyResult<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let output = self.exec(privileged, program, &args).await?;

        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(StickyDiskError::command_exec(
                describe(program, &args),
                stderr.trim(),
            ))
        }
    }
}

impl Default for SystemDeviceOps {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(program: &str, args: &[OsString]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

fn mount_error(target: &Path, err: StickyDiskError) -> StickyDiskError {
    match err {
        StickyDiskError::CommandExecution { stderr, .. } => StickyDiskError::mount(target, stderr),
        other => StickyDiskError::mount(target, other.to_string()),
    }
}

/// Parse `df --output=used -B1` output into a byte count
///
/// Zero, negative and non-numeric readings are rejected rather than
/// reported as an empty filesystem.
pub fn parse_df_used(output: &str) -> StickyResult<u64> {
    let value = output
        .lines()
        .skip(1)
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| StickyDiskError::MeasurementUnavailable("empty df output".to_string()))?;

    match value.parse::<i64>() {
        Ok(bytes) if bytes > 0 => Ok(bytes as u64),
        Ok(bytes) => Err(StickyDiskError::MeasurementUnavailable(format!(
            "non-positive reading {bytes}"
        ))),
        Err(_) => Err(StickyDiskError::MeasurementUnavailable(format!(
            "unparseable reading '{value}'"
        ))),
    }
}

/// Parse `findmnt -o SOURCE` output, dropping a bind-mount `[/subdir]` suffix
pub fn parse_findmnt_source(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let source = match line.find('[') {
        Some(idx) => &line[..idx],
        None => line,
    };
    (!source.is_empty()).then(|| source.to_string())
}

fn parse_df_source(output: &str) -> Option<String> {
    output
        .lines()
        .skip(1)
        .map(str::trim)
        .find(|l| !l.is_empty())
        .filter(|source| source.starts_with("/dev/"))
        .map(str::to_string)
}

#[async_trait]
impl DeviceOps for SystemDeviceOps {
    async fn probe_fs_type(&self, device: &str) -> StickyResult<Option<String>> {
        // blkid exits non-zero when it finds no filesystem
        let output = self
            .exec(true, "blkid", ["-o", "value", "-s", "TYPE", device])
            .await?;
        if !output.status.success() {
            return Ok(None);
        }

        let fs_type = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!fs_type.is_empty()).then_some(fs_type))
    }

    async fn format(&self, device: &str, fs_type: &str, owner: Ownership) -> StickyResult<()> {
        let mkfs = format!("mkfs.{fs_type}");
        let root_owner = format!("root_owner={owner}");
        self.exec_ok(
            true,
            &mkfs,
            [
                "-m0",
                "-E",
                root_owner.as_str(),
                "-E",
                "nodiscard,lazy_itable_init=1,lazy_journal_init=1",
                "-F",
                device,
            ],
        )
        .await
        .map_err(|e| StickyDiskError::Format {
            device: device.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn resize(&self, device: &str) -> StickyResult<()> {
        self.exec_ok(true, "resize2fs", ["-f", device]).await?;
        Ok(())
    }

    async fn create_dir(&self, path: &Path) -> StickyResult<()> {
        self.exec_ok(true, "mkdir", [OsStr::new("-p"), path.as_os_str()])
            .await?;
        Ok(())
    }

    async fn set_owner(&self, path: &Path, owner: Ownership) -> StickyResult<()> {
        let owner = owner.to_string();
        self.exec_ok(true, "chown", [OsStr::new(&owner), path.as_os_str()])
            .await?;
        Ok(())
    }

    async fn set_mode(&self, path: &Path, mode: u32) -> StickyResult<()> {
        let mode = format!("{mode:04o}");
        self.exec_ok(true, "chmod", [OsStr::new(&mode), path.as_os_str()])
            .await?;
        Ok(())
    }

    async fn is_dir(&self, path: &Path) -> StickyResult<bool> {
        let output = self
            .exec(true, "test", [OsStr::new("-d"), path.as_os_str()])
            .await?;
        Ok(output.status.success())
    }

    async fn list_dir(&self, path: &Path) -> StickyResult<Vec<String>> {
        let output = self
            .exec_ok(
                true,
                "find",
                [
                    path.as_os_str(),
                    OsStr::new("-mindepth"),
                    OsStr::new("1"),
                    OsStr::new("-maxdepth"),
                    OsStr::new("1"),
                    OsStr::new("-printf"),
                    OsStr::new("%f\\n"),
                ],
            )
            .await?;

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn mount(&self, device: &str, target: &Path) -> StickyResult<()> {
        self.exec_ok(true, "mount", [OsStr::new(device), target.as_os_str()])
            .await
            .map_err(|e| mount_error(target, e))?;
        Ok(())
    }

    async fn bind_mount(&self, source: &Path, target: &Path) -> StickyResult<()> {
        self.exec_ok(
            true,
            "mount",
            [OsStr::new("--bind"), source.as_os_str(), target.as_os_str()],
        )
        .await
        .map_err(|e| mount_error(target, e))?;
        Ok(())
    }

    async fn is_mounted(&self, path: &Path) -> StickyResult<bool> {
        let output = self
            .exec(
                false,
                "findmnt",
                [OsStr::new("-n"), OsStr::new("--mountpoint"), path.as_os_str()],
            )
            .await?;
        Ok(output.status.success() && !output.stdout.is_empty())
    }

    async fn resolve_device(
        &self,
        path: &Path,
        lookup: DeviceLookup,
    ) -> StickyResult<Option<String>> {
        match lookup {
            DeviceLookup::Findmnt => {
                let output = self
                    .exec_ok(
                        false,
                        "findmnt",
                        [
                            OsStr::new("-n"),
                            OsStr::new("-o"),
                            OsStr::new("SOURCE"),
                            OsStr::new("--mountpoint"),
                            path.as_os_str(),
                        ],
                    )
                    .await?;
                Ok(parse_findmnt_source(&String::from_utf8_lossy(&output.stdout)))
            }
            DeviceLookup::Df => {
                let output = self
                    .exec_ok(
                        false,
                        "df",
                        [OsStr::new("--output=source"), path.as_os_str()],
                    )
                    .await?;
                Ok(parse_df_source(&String::from_utf8_lossy(&output.stdout)))
            }
        }
    }

    async fn sync(&self) -> StickyResult<()> {
        self.exec_ok(false, "sync", std::iter::empty::<&str>())
            .await?;
        Ok(())
    }

    async fn used_bytes(&self, path: &Path) -> StickyResult<u64> {
        let output = self
            .exec_ok(
                false,
                "df",
                [OsStr::new("--output=used"), OsStr::new("-B1"), path.as_os_str()],
            )
            .await
            .map_err(|e| StickyDiskError::MeasurementUnavailable(e.to_string()))?;
        parse_df_used(&String::from_utf8_lossy(&output.stdout))
    }

    async fn drop_caches(&self) -> StickyResult<()> {
        self.exec_ok(true, "sh", ["-c", "echo 3 > /proc/sys/vm/drop_caches"])
            .await?;
        Ok(())
    }

    async fn unmount(&self, path: &Path) -> StickyResult<()> {
        self.exec_ok(true, "umount", [path.as_os_str()])
            .await
            .map_err(|e| mount_error(path, e))?;
        Ok(())
    }

    async fn flush_buffers(&self, device: &str) -> StickyResult<()> {
        self.exec_ok(true, "blockdev", ["--flushbufs", device])
            .await?;
        Ok(())
    }
}
