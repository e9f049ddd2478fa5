//! Bridge configuration – reads/writes `~/.poolbridge/config.toml`.
//!
//! Every key is optional; a missing file means all defaults.  A handful of
//! `POOLBRIDGE_*` environment variables override the file.

use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Persisted bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP server listens on.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// HTTP port.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Seconds to wait before reconnecting to the controller.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// How often streaming subscribers check for a new snapshot.
    #[serde(default = "default_stream_interval_ms")]
    pub stream_interval_ms: u64,

    /// Largest accepted request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Frame interval of the simulated controller.
    #[serde(default = "default_sim_tick_ms")]
    pub sim_tick_ms: u64,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_http_port() -> u16 {
    4200
}
fn default_reconnect_delay_secs() -> u64 {
    5
}
fn default_stream_interval_ms() -> u64 {
    500
}
fn default_max_body_bytes() -> usize {
    64 * 1024
}
fn default_sim_tick_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            http_port: default_http_port(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            stream_interval_ms: default_stream_interval_ms(),
            max_body_bytes: default_max_body_bytes(),
            sim_tick_ms: default_sim_tick_ms(),
        }
    }
}

impl Config {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn stream_interval(&self) -> Duration {
        Duration::from_millis(self.stream_interval_ms)
    }

    pub fn sim_tick(&self) -> Duration {
        Duration::from_millis(self.sim_tick_ms)
    }

    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.reconnect_delay_secs == 0 {
            return Err("reconnect_delay_secs must be greater than zero".to_string());
        }
        if self.stream_interval_ms == 0 {
            return Err("stream_interval_ms must be greater than zero".to_string());
        }
        if self.sim_tick_ms == 0 {
            return Err("sim_tick_ms must be greater than zero".to_string());
        }
        if self.max_body_bytes == 0 {
            return Err("max_body_bytes must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Return the path to `~/.poolbridge/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".poolbridge").join("config.toml")
}

/// The effective configuration: the file at `path` (or defaults when it is
/// absent) with environment overrides applied, validated.
pub fn resolve(path: &Path) -> Result<Config, String> {
    let mut cfg = read_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// Parse the file at `path` without environment overrides.  Returns `None`
/// if the file does not exist.
pub(crate) fn read_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {e}", path.display()))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config at {}: {e}", path.display()))?;
    Ok(Some(cfg))
}

/// Apply `POOLBRIDGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `POOLBRIDGE_BIND_ADDRESS` | `bind_address` |
/// | `POOLBRIDGE_HTTP_PORT` | `http_port` |
/// | `POOLBRIDGE_RECONNECT_DELAY_SECS` | `reconnect_delay_secs` |
/// | `POOLBRIDGE_STREAM_INTERVAL_MS` | `stream_interval_ms` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    override_from_env("POOLBRIDGE_BIND_ADDRESS", &mut cfg.bind_address);
    override_from_env("POOLBRIDGE_HTTP_PORT", &mut cfg.http_port);
    override_from_env("POOLBRIDGE_RECONNECT_DELAY_SECS", &mut cfg.reconnect_delay_secs);
    override_from_env("POOLBRIDGE_STREAM_INTERVAL_MS", &mut cfg.stream_interval_ms);
}

fn override_from_env<T: std::str::FromStr>(var: &str, field: &mut T) {
    if let Ok(raw) = std::env::var(var)
        && let Ok(value) = raw.trim().parse()
    {
        *field = value;
    }
}

/// Save `cfg` to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {e}"))?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {e}"))?;
        }
    }
    let raw = to_toml(cfg)?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {e}", path.display()))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {e}", path.display()))?;
    Ok(())
}

/// Render `cfg` as TOML.
pub fn to_toml(cfg: &Config) -> Result<String, String> {
    toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {e}"))
}
