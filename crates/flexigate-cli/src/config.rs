//! Gateway configuration – reads/writes `~/.flexigate/config.toml`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flexigate_kernel::{PolicyError, ZonePolicy, ZoneSettings};
use flexigate_runtime::GatewayConfig;
use flexigate_types::ConnectionConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config at {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Invalid zone settings: {0}")]
    Zone(#[from] PolicyError),
}

/// Persisted gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address of the safety controller's gateway module.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_control_period_ms")]
    pub control_period_ms: u64,

    #[serde(default = "default_telemetry_timeout_ms")]
    pub telemetry_timeout_ms: u64,

    #[serde(default = "default_input_timeout_ms")]
    pub input_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub zone: ZoneSettings,
}

fn default_host() -> String {
    "192.168.1.10".to_string()
}
fn default_port() -> u16 {
    9100
}
fn default_control_period_ms() -> u64 {
    25
}
fn default_telemetry_timeout_ms() -> u64 {
    250
}
fn default_input_timeout_ms() -> u64 {
    500
}
fn default_connect_timeout_ms() -> u64 {
    3000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            control_period_ms: default_control_period_ms(),
            telemetry_timeout_ms: default_telemetry_timeout_ms(),
            input_timeout_ms: default_input_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            zone: ZoneSettings::default(),
        }
    }
}

impl Config {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Check the values and split them into the session's configuration
    /// and the connection target.
    pub fn validate(&self) -> Result<(GatewayConfig, ConnectionConfig), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".to_string()));
        }
        for (name, value) in [
            ("control_period_ms", self.control_period_ms),
            ("telemetry_timeout_ms", self.telemetry_timeout_ms),
            ("input_timeout_ms", self.input_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        ZonePolicy::new(self.zone)?;

        let gateway = GatewayConfig {
            control_period: Duration::from_millis(self.control_period_ms),
            telemetry_timeout: Duration::from_millis(self.telemetry_timeout_ms),
            input_timeout: Duration::from_millis(self.input_timeout_ms),
            zone: self.zone,
        };
        Ok((gateway, ConnectionConfig::new(self.host.trim(), self.port)))
    }
}

/// Pick the config file: an explicit path argument wins, then
/// `$FLEXIGATE_CONFIG`, then `~/.flexigate/config.toml`.
pub fn resolve_path(arg: Option<String>) -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    resolve_path_with(arg, std::env::var("FLEXIGATE_CONFIG").ok(), &home)
}

pub(crate) fn resolve_path_with(arg: Option<String>, env: Option<String>, home: &str) -> PathBuf {
    arg.or(env)
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| config_path_for_home(home))
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".flexigate").join("config.toml")
}

/// Load the config at `path` and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load(path: &Path) -> Result<Option<Config>, ConfigError> {
    let mut cfg = load_from(path)?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Parse the config at `path` as written, without overrides.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(toml::from_str(&raw)?))
}

/// Apply `FLEXIGATE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `FLEXIGATE_HOST` | `host` |
/// | `FLEXIGATE_PORT` | `port` |
/// | `FLEXIGATE_PERIOD_MS` | `control_period_ms` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("FLEXIGATE_HOST") {
        cfg.host = v;
    }
    if let Ok(v) = std::env::var("FLEXIGATE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("FLEXIGATE_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.control_period_ms = ms;
    }
}

/// Write `cfg` to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(write_err)?;
        }
    }
    let raw = toml::to_string_pretty(cfg)?;
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
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}
