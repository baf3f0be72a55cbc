//! Error types for stickydisk
//!
//! All modules use `StickyResult<T>` as their return type.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for stickydisk operations
pub type StickyResult<T> = Result<T, StickyDiskError>;

/// All errors that can occur while managing a sticky disk
#[derive(Error, Debug)]
pub enum StickyDiskError {
    // Control plane errors
    #[error("Sticky disk control plane request failed: {0}")]
    Transport(String),

    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    // Device errors
    #[error("Failed to format device {device}: {reason}")]
    Format { device: String, reason: String },

    #[error("Incompatible sticky disk format detected at {}: data lives at the filesystem root instead of the work area", mount.display())]
    IncompatibleFormat { mount: PathBuf },

    #[error("Mount operation on {} failed: {reason}", target.display())]
    Mount { target: PathBuf, reason: String },

    #[error("Filesystem usage unavailable: {0}")]
    MeasurementUnavailable(String),

    #[error("Could not determine whether previous steps failed: {0}")]
    AmbiguousOutcome(String),

    // State errors
    #[error("Job state field {0} is already set")]
    StateFieldAlreadySet(&'static str),

    // Configuration errors
    #[error("Invalid configuration at {}: {reason}", path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid value for environment variable {name}: {reason}")]
    EnvInvalid { name: String, reason: String },

    // Cache API errors
    #[error("{0}")]
    InvalidCacheRequest(String),

    #[error("Failed to delete cache: {status} {reason}")]
    CacheApi { status: u16, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StickyDiskError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a mount error
    pub fn mount(target: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Mount {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error came from the control plane deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::IncompatibleFormat { .. } => Some(
                "Please clear the sticky disk cache for this key and try again; \
                 the next run starts from a fresh disk.",
            ),
            Self::Timeout { .. } => Some("The job continues without its sticky disk cache."),
            _ => None,
        }
    }
}
