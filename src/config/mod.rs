//! Configuration management for stickydisk
//!
//! Settings come from an optional TOML file overlaid with the runner
//! environment. The environment is read through an injected lookup so
//! components only ever see the resolved `Config`.

pub mod schema;

pub use schema::Config;

use crate::error::{StickyDiskError, StickyResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Production cache API
const CACHE_API_URL: &str = "https://api.blacksmith.sh/cache";

/// Staging cache API, selected by a `staging` petname
const STAGING_CACHE_API_URL: &str = "https://stagingapi.blacksmith.sh/cache";

/// Configuration manager
pub struct ConfigManager {
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create a config manager that reads no file
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: Some(path),
        }
    }

    /// Get the state directory path
    ///
    /// Prefers the per-job `RUNNER_TEMP` so state never leaks between jobs.
    pub fn state_dir(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
        match lookup("RUNNER_TEMP").filter(|v| !v.is_empty()) {
            Some(temp) => PathBuf::from(temp).join("stickydisk"),
            None => dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .unwrap_or_else(std::env::temp_dir)
                .join("stickydisk"),
        }
    }

    /// Load configuration from the file (if any) and the process environment
    pub async fn load(&self) -> StickyResult<Config> {
        self.load_with(|name| std::env::var(name).ok()).await
    }

    /// Load configuration with an explicit environment lookup
    pub async fn load_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> StickyResult<Config> {
        let mut config = match &self.config_path {
            Some(path) if path.exists() => self.load_from_file(path).await?,
            Some(path) => {
                debug!("Config file {} not found, using defaults", path.display());
                Config::default()
            }
            None => Config::default(),
        };

        config.apply_env(lookup)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> StickyResult<Config> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            StickyDiskError::io(format!("reading config from {}", path.display()), e)
        })?;

        toml::from_str(&content).map_err(|e| StickyDiskError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path, if one was given
    pub fn path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Overlay runner environment variables onto this configuration
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> StickyResult<()> {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(host) = get("BLACKSMITH_STICKY_DISK_GRPC_HOST") {
            self.control_plane.host = host;
        }
        if let Some(port) = get("BLACKSMITH_STICKY_DISK_GRPC_PORT") {
            self.control_plane.port =
                port.parse().map_err(|_| StickyDiskError::EnvInvalid {
                    name: "BLACKSMITH_STICKY_DISK_GRPC_PORT".to_string(),
                    reason: format!("'{port}' is not a port number"),
                })?;
        }

        if let Some(region) = get("BLACKSMITH_REGION") {
            self.job.region = region;
        }
        if let Some(id) = get("BLACKSMITH_INSTALLATION_MODEL_ID") {
            self.job.installation_model_id = id;
        }
        // The post step historically read VM_ID
        if let Some(vm_id) = get("BLACKSMITH_VM_ID").or_else(|| get("VM_ID")) {
            self.job.vm_id = vm_id;
        }
        if let Some(repo) = get("GITHUB_REPO_NAME") {
            self.job.repo_name = repo;
        }
        if let Some(token) = get("BLACKSMITH_STICKYDISK_TOKEN") {
            self.job.sticky_disk_token = Some(token);
        }
        if let Some(flush) = get("BLACKSMITH_STICKYDISK_FLUSH") {
            match parse_bool("BLACKSMITH_STICKYDISK_FLUSH", &flush) {
                Ok(enabled) => self.durability.flush_buffers = enabled,
                Err(e) => warn!(
                    "{}, keeping flush_buffers = {}",
                    e, self.durability.flush_buffers
                ),
            }
        }

        if let Some(url) = get("BLACKSMITH_CACHE_URL") {
            self.cache_api.base_url = Some(url);
        } else if self.cache_api.base_url.is_none() {
            let staging = get("PETNAME").is_some_and(|p| p.contains("staging"));
            let url = if staging {
                STAGING_CACHE_API_URL
            } else {
                CACHE_API_URL
            };
            self.cache_api.base_url = Some(url.to_string());
        }
        if let Some(token) = get("BLACKSMITH_CACHE_TOKEN") {
            self.cache_api.token = Some(token);
        }

        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> StickyResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(StickyDiskError::EnvInvalid {
            name: name.to_string(),
            reason: format!("'{value}' is not a boolean"),
        }),
    }
}
