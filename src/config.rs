//! Runtime configuration
//!
//! Settings come from an optional JSON file and are overridden by CLI flags.
//!
//! ```json
//! {
//!   "interface": "eth0",
//!   "poll_interval_secs": 5,
//!   "idle_timeout_secs": 300,
//!   "services": { "8080": { "name": "llama-api" } }
//! }
//! ```

use crate::{PortwatchError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
    /// Overrides the global idle timeout for this service
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

impl ServiceConfig {
    pub fn idle_timeout(&self, default: Duration) -> Duration {
        self.idle_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}

/// Contents of the JSON config file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub interface: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub skb_mode: bool,
    pub metrics_file: Option<PathBuf>,
    pub services: BTreeMap<u16, ServiceConfig>,
}

impl FileConfig {
    pub fn parse(contents: &str) -> Result<Self> {
        serde_json::from_str(contents)
            .map_err(|e| PortwatchError::ConfigError(format!("invalid config: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PortwatchError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&contents)
    }
}

/// Config file that is re-read whenever its modification time changes
#[derive(Debug)]
pub struct WatchedConfig {
    path: PathBuf,
    modified: Option<SystemTime>,
}

impl WatchedConfig {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file unconditionally and remember its modification time
    pub fn load(&mut self) -> Result<FileConfig> {
        let modified = self.modified_time()?;
        let file = FileConfig::load(&self.path)?;
        self.modified = Some(modified);
        Ok(file)
    }

    /// New contents if the file changed since the last successful load
    pub fn reload_if_changed(&mut self) -> Result<Option<FileConfig>> {
        if Some(self.modified_time()?) == self.modified {
            return Ok(None);
        }
        self.load().map(Some)
    }

    fn modified_time(&self) -> Result<SystemTime> {
        std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map_err(|e| {
                PortwatchError::ConfigError(format!("cannot stat {}: {}", self.path.display(), e))
            })
    }
}

/// Values given on the command line; `Some`/non-empty wins over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub interface: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub skb_mode: bool,
    pub metrics_file: Option<PathBuf>,
    pub ports: Vec<u16>,
}

/// Fully resolved configuration for `portwatch watch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub interface: String,
    pub poll_interval: Duration,
    pub idle_timeout: Duration,
    pub skb_mode: bool,
    pub metrics_file: Option<PathBuf>,
    /// Services whose idle/active state is tracked, by host-order port
    pub services: BTreeMap<u16, ServiceConfig>,
}

impl Config {
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self> {
        let interface = overrides
            .interface
            .or(file.interface)
            .filter(|iface| !iface.is_empty())
            .ok_or_else(|| {
                PortwatchError::ConfigError(
                    "no interface given (use --interface or \"interface\" in the config file)"
                        .to_string(),
                )
            })?;

        let poll_interval_secs = overrides
            .poll_interval_secs
            .or(file.poll_interval_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if poll_interval_secs == 0 {
            return Err(PortwatchError::ConfigError(
                "poll interval must be at least 1 second".to_string(),
            ));
        }

        let idle_timeout_secs = overrides
            .idle_timeout_secs
            .or(file.idle_timeout_secs)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS);
        if idle_timeout_secs < poll_interval_secs {
            return Err(PortwatchError::ConfigError(format!(
                "idle timeout ({}s) must not be shorter than the poll interval ({}s)",
                idle_timeout_secs, poll_interval_secs
            )));
        }

        let mut services = file.services;
        for port in overrides.ports {
            services.entry(port).or_insert_with(|| ServiceConfig {
                name: format!("port-{}", port),
                idle_timeout_secs: None,
            });
        }
        if services.contains_key(&0) {
            return Err(PortwatchError::ConfigError(
                "port 0 cannot be monitored".to_string(),
            ));
        }
        for (port, service) in &services {
            if let Some(secs) = service.idle_timeout_secs {
                if secs < poll_interval_secs {
                    return Err(PortwatchError::ConfigError(format!(
                        "idle timeout of {} (port {}) is {}s, shorter than the poll interval ({}s)",
                        service.name, port, secs, poll_interval_secs
                    )));
                }
            }
        }

        Ok(Self {
            interface,
            poll_interval: Duration::from_secs(poll_interval_secs),
            idle_timeout: Duration::from_secs(idle_timeout_secs),
            skb_mode: overrides.skb_mode || file.skb_mode,
            metrics_file: overrides.metrics_file.or(file.metrics_file),
            services,
        })
    }
}
