//! Upstream step outcome detection
//!
//! The runner writes a worker log under `<runner root>/_diag`. Teardown
//! scans the newest one for failed or cancelled steps before deciding
//! whether the disk is safe to commit.

use crate::error::StickyDiskError;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

/// Default runner installation on hosted images
const DEFAULT_RUNNER_ROOT: &str = "/home/runner";

static FAILURE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#""result":\s*"failed""#,
        r#""result":\s*"cancelled""#,
        r"Step result:\s*Failed",
        r"Step result:\s*Cancelled",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("failure pattern is valid"))
    .collect()
});

static STEP_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{[^{}]*"result":\s*"(?:failed|cancelled)"[^{}]*\}"#)
        .expect("step object pattern is valid")
});

/// A step the runner reported as failed or cancelled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedStep {
    pub name: Option<String>,
    pub action: Option<String>,
    pub result: String,
}

/// Outcome of scanning the runner log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepFailureReport {
    pub has_failures: bool,
    pub failed_count: usize,
    pub failed_steps: Vec<FailedStep>,
    /// Set when the scan itself could not be completed
    pub error: Option<String>,
}

impl StepFailureReport {
    fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// The scan failed, so step health is unknown
    pub fn is_ambiguous(&self) -> bool {
        self.error.is_some()
    }

    /// The scan error as a typed error, if any
    pub fn ambiguity(&self) -> Option<StickyDiskError> {
        self.error.clone().map(StickyDiskError::AmbiguousOutcome)
    }
}

/// Locate the runner installation from the working directory
///
/// Workspaces live at `<root>/_work/<repo>/<repo>`. Outside a workspace the
/// default install location, then `$RUNNER_ROOT`, is used when it exists,
/// else `cwd` itself.
pub fn detect_runner_root(cwd: &Path) -> PathBuf {
    let env_root = std::env::var_os("RUNNER_ROOT").map(PathBuf::from);
    let mut candidates = vec![PathBuf::from(DEFAULT_RUNNER_ROOT)];
    candidates.extend(env_root);
    runner_root_among(cwd, &candidates)
}

fn runner_root_among(cwd: &Path, candidates: &[PathBuf]) -> PathBuf {
    let cwd_str = cwd.to_string_lossy();
    if let Some(index) = cwd_str.find("/_work/") {
        return PathBuf::from(&cwd_str[..index]);
    }

    candidates
        .iter()
        .find(|candidate| !candidate.as_os_str().is_empty() && candidate.exists())
        .cloned()
        .unwrap_or_else(|| cwd.to_path_buf())
}

/// Check the newest worker log for failed or cancelled steps
///
/// `runner_root` is an explicit override that skips detection. Never fails: problems reading the
/// log are reported through `StepFailureReport::error`.
pub async fn check_previous_step_failures(runner_root: Option<&Path>) -> StepFailureReport {
    let root = match runner_root {
        Some(root) => root.to_path_buf(),
        None => match std::env::current_dir() {
            Ok(cwd) => detect_runner_root(&cwd),
            Err(e) => return StepFailureReport::unavailable(format!("Error reading logs: {e}")),
        },
    };

    let diag = root.join("_diag");
    debug!("Detected runner base path: {}", root.display());
    debug!("Looking for _diag at: {}", diag.display());

    if !diag.is_dir() {
        return StepFailureReport::unavailable(format!(
            "_diag directory not found at {}",
            diag.display()
        ));
    }

    let log = match newest_worker_log(&diag).await {
        Ok(Some(log)) => log,
        Ok(None) => return StepFailureReport::unavailable("No Worker log files found"),
        Err(e) => return StepFailureReport::unavailable(format!("Error reading logs: {e}")),
    };

    debug!("Scanning worker log {}", log.display());
    match tokio::fs::read_to_string(&log).await {
        Ok(content) => scan_worker_log(&content),
        Err(e) => StepFailureReport::unavailable(format!("Error reading logs: {e}")),
    }
}

/// Worker logs are named `Worker_YYYYMMDD-HHMMSS-utc.log`, so the
/// lexicographically last one is the newest
async fn newest_worker_log(diag: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(diag).await?;
    let mut newest: Option<String> = None;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_worker_log = name.starts_with("Worker_") && name.ends_with(".log");
        if is_worker_log && newest.as_ref().map_or(true, |current| name > *current) {
            newest = Some(name);
        }
    }

    Ok(newest.map(|name| diag.join(name)))
}

/// Count and describe failed steps in worker log text
pub fn scan_worker_log(content: &str) -> StepFailureReport {
    let failed_count: usize = FAILURE_PATTERNS
        .iter()
        .map(|pattern| pattern.find_iter(content).count())
        .sum();

    let failed_steps = STEP_OBJECT
        .find_iter(content)
        .filter_map(|m| parse_step(m.as_str()))
        .collect();

    StepFailureReport {
        has_failures: failed_count > 0,
        failed_count,
        failed_steps,
        error: None,
    }
}

fn parse_step(fragment: &str) -> Option<FailedStep> {
    let value: serde_json::Value = match serde_json::from_str(fragment) {
        Ok(value) => value,
        Err(_) => {
            debug!("Skipping malformed JSON in log parsing");
            return None;
        }
    };

    let field = |key: &str| value.get(key).and_then(|v| v.as_str()).map(str::to_string);
    let result = field("result")?;
    if result != "failed" && result != "cancelled" {
        return None;
    }

    Some(FailedStep {
        name: field("stepName").or_else(|| field("displayName")),
        action: field("action"),
        result,
    })
}
