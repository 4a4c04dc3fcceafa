//! Configuration – reads/writes `~/.imulink/config.toml`.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use imulink_device::{LinkConfig, MAX_DEVICES, TELEMETRY_CHARACTERISTIC, normalize_addr};
use imulink_types::LinkError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted operator configuration stored in `~/.imulink/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host the relay hub listens on.
    #[serde(default = "default_hub_host")]
    pub hub_host: String,

    /// Port of the relay hub's producer endpoint.
    #[serde(default = "default_hub_port")]
    pub hub_port: u16,

    /// Device addresses eligible for automatic connection.
    #[serde(default)]
    pub allowed_addresses: Vec<String>,

    /// Advertised-name prefix a device must carry to count in a scan.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Streaming tick cadence in seconds.
    #[serde(default = "default_poll_interval_s")]
    pub poll_interval_s: f64,

    /// Discovery scan bound in seconds.
    #[serde(default = "default_scan_timeout_s")]
    pub scan_timeout_s: f64,

    /// Requested session cap (clamped to 2).
    #[serde(default = "default_max_devices")]
    pub max_devices: usize,

    /// Telemetry notification characteristic.
    #[serde(default = "default_characteristic")]
    pub characteristic: Uuid,
}

fn default_hub_host() -> String {
    "localhost".to_string()
}
fn default_hub_port() -> u16 {
    8001
}
fn default_name_prefix() -> String {
    "NU7".to_string()
}
fn default_poll_interval_s() -> f64 {
    1.0
}
fn default_scan_timeout_s() -> f64 {
    5.0
}
fn default_max_devices() -> usize {
    MAX_DEVICES
}
fn default_characteristic() -> Uuid {
    TELEMETRY_CHARACTERISTIC
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub_host: default_hub_host(),
            hub_port: default_hub_port(),
            allowed_addresses: Vec::new(),
            name_prefix: default_name_prefix(),
            poll_interval_s: default_poll_interval_s(),
            scan_timeout_s: default_scan_timeout_s(),
            max_devices: default_max_devices(),
            characteristic: default_characteristic(),
        }
    }
}

impl Config {
    /// Convert into the session manager's settings.
    ///
    /// Addresses are normalized, the device cap is clamped to the hard
    /// maximum, and the durations are floored at 100 ms so a zero or
    /// malformed value cannot produce a busy loop.
    pub fn to_link_config(&self) -> LinkConfig {
        LinkConfig {
            allowed_addresses: self
                .allowed_addresses
                .iter()
                .map(|a| normalize_addr(a))
                .collect(),
            name_prefix: self.name_prefix.clone(),
            poll_interval: Duration::from_secs_f64(self.poll_interval_s.max(0.1)),
            scan_timeout: Duration::from_secs_f64(self.scan_timeout_s.max(0.1)),
            max_devices: self.max_devices.min(MAX_DEVICES),
            characteristic: self.characteristic,
        }
    }
}

/// Return the path to `~/.imulink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".imulink").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, LinkError> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, LinkError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| LinkError::Config(format!("read {}: {e}", path.display())))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| LinkError::Config(format!("parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `IMULINK_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `IMULINK_HUB_HOST` | `hub_host` |
/// | `IMULINK_HUB_PORT` | `hub_port` |
/// | `IMULINK_NAME_PREFIX` | `name_prefix` |
/// | `IMULINK_POLL_INTERVAL_S` | `poll_interval_s` |
/// | `IMULINK_SCAN_TIMEOUT_S` | `scan_timeout_s` |
///
/// Values that fail to parse leave the config field untouched.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("IMULINK_HUB_HOST") {
        cfg.hub_host = v;
    }
    if let Ok(v) = std::env::var("IMULINK_HUB_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.hub_port = port;
    }
    if let Ok(v) = std::env::var("IMULINK_NAME_PREFIX") {
        cfg.name_prefix = v;
    }
    if let Ok(v) = std::env::var("IMULINK_POLL_INTERVAL_S")
        && let Ok(secs) = v.parse::<f64>()
    {
        cfg.poll_interval_s = secs;
    }
    if let Ok(v) = std::env::var("IMULINK_SCAN_TIMEOUT_S")
        && let Ok(secs) = v.parse::<f64>()
    {
        cfg.scan_timeout_s = secs;
    }
}

/// Save the config to disk, creating `~/.imulink/` if necessary.
pub fn save(cfg: &Config) -> Result<(), LinkError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), LinkError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| LinkError::Config(format!("create {}: {e}", parent.display())))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| LinkError::Config(format!("serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| LinkError::Config(format!("write {}: {e}", path.display())))?;
    Ok(())
}
