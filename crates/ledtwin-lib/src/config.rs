//! Application configuration — TOML-based, platform-aware paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reconnect::ReconnectConfig;
use crate::render::RenderTimings;

/// Header comment prepended to written config files.
const CONFIG_HEADER: &str = "# LedTwin configuration (written by `ledtwin config --init`)\n\n";

/// Environment variable that overrides `connection_string`.
pub const CONNECTION_STRING_ENV: &str = "IOTHUB_DEVICE_CONNECTION_STRING";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Device connection string (`HostName=..;DeviceId=..;SharedAccessKey=..`).
    /// Empty = taken from the environment.
    #[serde(default)]
    pub connection_string: String,

    /// Global strip brightness, 0.0–1.0. Default: 0.1.
    #[serde(default = "default_brightness")]
    pub brightness: f32,

    /// How long listeners wait on the hub before re-checking for shutdown.
    #[serde(default = "default_listen_poll_ms")]
    pub listen_poll_ms: u64,

    /// Failed hub connects before giving up. 0 = retry until interrupted.
    #[serde(default = "default_max_connect_attempts")]
    pub max_connect_attempts: u32,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// `[render]` table — render loop intervals in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_steady_tick_ms")]
    pub steady_tick_ms: u64,
    #[serde(default = "default_scroll_step_ms")]
    pub scroll_step_ms: u64,
    #[serde(default = "default_scroll_idle_ms")]
    pub scroll_idle_ms: u64,
}

/// `[telemetry]` table — test batch sent from the console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
}

fn default_brightness() -> f32 {
    0.1
}
fn default_listen_poll_ms() -> u64 {
    250
}
fn default_max_connect_attempts() -> u32 {
    5
}
fn default_steady_tick_ms() -> u64 {
    500
}
fn default_scroll_step_ms() -> u64 {
    50
}
fn default_scroll_idle_ms() -> u64 {
    500
}
fn default_batch_size() -> usize {
    8
}
fn default_batch_interval_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Config {
            connection_string: String::new(),
            brightness: default_brightness(),
            listen_poll_ms: default_listen_poll_ms(),
            max_connect_attempts: default_max_connect_attempts(),
            render: RenderConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            steady_tick_ms: default_steady_tick_ms(),
            scroll_step_ms: default_scroll_step_ms(),
            scroll_idle_ms: default_scroll_idle_ms(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            batch_size: default_batch_size(),
            batch_interval_ms: default_batch_interval_ms(),
        }
    }
}

/// Parsed device connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub host_name: String,
    pub device_id: String,
    pub shared_access_key: Option<String>,
}

impl ConnectionString {
    /// Parse `Key=Value` pairs separated by `;`.
    ///
    /// Values may themselves contain `=` (base64 keys). Unknown keys are
    /// ignored. `HostName` and `DeviceId` are required.
    pub fn parse(s: &str) -> crate::error::Result<Self> {
        let mut host_name = None;
        let mut device_id = None;
        let mut shared_access_key = None;
        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = part.split_once('=') else {
                return Err(crate::LedtwinError::Config(format!(
                    "malformed connection string segment \"{part}\""
                )));
            };
            match key.trim() {
                "HostName" => host_name = Some(value.to_string()),
                "DeviceId" => device_id = Some(value.to_string()),
                "SharedAccessKey" => shared_access_key = Some(value.to_string()),
                _ => {}
            }
        }
        let require = |v: Option<String>, name: &str| {
            v.filter(|v| !v.is_empty()).ok_or_else(|| {
                crate::LedtwinError::Config(format!("connection string is missing {name}"))
            })
        };
        Ok(ConnectionString {
            host_name: require(host_name, "HostName")?,
            device_id: require(device_id, "DeviceId")?,
            shared_access_key,
        })
    }
}

impl fmt::Display for ConnectionString {
    /// Redacts the access key.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostName={};DeviceId={}", self.host_name, self.device_id)?;
        if self.shared_access_key.is_some() {
            write!(f, ";SharedAccessKey=<redacted>")?;
        }
        Ok(())
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `brightness` is outside 0.0–1.0 (or NaN).
    InvalidBrightness(f32),
    /// An interval field is zero.
    ZeroInterval(&'static str),
    /// `telemetry.batch_size` is zero.
    EmptyBatch,
    /// The configured connection string could not be parsed.
    InvalidConnectionString(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidBrightness(b) => {
                write!(f, "Invalid brightness {b}: must be between 0.0 and 1.0")
            }
            ValidationError::ZeroInterval(field) => write!(f, "{field} must be greater than 0"),
            ValidationError::EmptyBatch => write!(f, "telemetry.batch_size must be at least 1"),
            ValidationError::InvalidConnectionString(e) => {
                write!(f, "Invalid connection string: {e}")
            }
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ledtwin"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    ///
    /// A header comment is prepended to warn that manual edits may be overwritten.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// The connection string to use: the environment variable when set and
    /// non-empty, otherwise the configured value. `None` if neither is set.
    pub fn effective_connection_string(&self) -> Option<String> {
        pick_connection_string(
            std::env::var(CONNECTION_STRING_ENV).ok(),
            &self.connection_string,
        )
    }

    pub fn render_timings(&self) -> RenderTimings {
        RenderTimings {
            steady_tick: Duration::from_millis(self.render.steady_tick_ms),
            scroll_step: Duration::from_millis(self.render.scroll_step_ms),
            scroll_idle: Duration::from_millis(self.render.scroll_idle_ms),
        }
    }

    /// Backoff for hub connects, limited by `max_connect_attempts`.
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: (self.max_connect_attempts > 0).then_some(self.max_connect_attempts),
            ..ReconnectConfig::default()
        }
    }

    pub fn listen_poll(&self) -> Duration {
        Duration::from_millis(self.listen_poll_ms)
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry.batch_interval_ms)
    }

    /// Validate the entire config, collecting all errors.
    ///
    /// An empty `connection_string` is valid (the environment may supply it).
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !(0.0..=1.0).contains(&self.brightness) {
            errors.push(ValidationError::InvalidBrightness(self.brightness));
        }

        for (field, value) in [
            ("listen_poll_ms", self.listen_poll_ms),
            ("render.steady_tick_ms", self.render.steady_tick_ms),
            ("render.scroll_step_ms", self.render.scroll_step_ms),
            ("render.scroll_idle_ms", self.render.scroll_idle_ms),
        ] {
            if value == 0 {
                errors.push(ValidationError::ZeroInterval(field));
            }
        }

        if self.telemetry.batch_size == 0 {
            errors.push(ValidationError::EmptyBatch);
        }

        if !self.connection_string.trim().is_empty()
            && let Err(e) = ConnectionString::parse(&self.connection_string)
        {
            errors.push(ValidationError::InvalidConnectionString(e.to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn pick_connection_string(env: Option<String>, configured: &str) -> Option<String> {
    env.filter(|v| !v.trim().is_empty()).or_else(|| {
        let configured = configured.trim();
        (!configured.is_empty()).then(|| configured.to_string())
    })
}
