use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;

use crate::error::ConfigError;

/// An `on`/`off` directive that may also be left out entirely.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(from = "bool")]
pub enum Toggle {
    #[default]
    Unset,
    On,
    Off,
}

impl From<bool> for Toggle {
    fn from(value: bool) -> Self {
        if value {
            Toggle::On
        } else {
            Toggle::Off
        }
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Toggle::Unset => "unset",
            Toggle::On => "on",
            Toggle::Off => "off",
        })
    }
}

/// What the serving layer does with a request whose connection could not be
/// switched to brutal.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    /// Answer `500 Internal Server Error`.
    #[default]
    Reject,
    /// Log the failure and keep serving.
    Ignore,
}

/// The two tcp_brutal settings as declared at a single scope level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScopeConfig {
    pub enabled: Toggle,
    /// Target send rate in bytes per second.
    pub rate: Option<u64>,
}

impl ScopeConfig {
    pub const UNSET: ScopeConfig = ScopeConfig { enabled: Toggle::Unset, rate: None };

    pub fn new(enabled: Toggle, rate: Option<u64>) -> Self {
        Self { enabled, rate }
    }

    pub fn with_rate(rate: u64) -> Self {
        Self { enabled: Toggle::Unset, rate: Some(rate) }
    }

    /// Nearest-ancestor merge of the rate. `enabled` is never inherited here;
    /// the resolver looks at Global and Host separately.
    pub fn inherit_rate(self, parent: &ScopeConfig) -> Self {
        Self {
            enabled: self.enabled,
            rate: self.rate.or(parent.rate),
        }
    }
}

/// Process-wide configuration, read from a TOML file.
#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub threads: usize,
    pub on_failure: EnforcementMode,
    #[serde(rename = "tcp_brutal")]
    pub enabled: Toggle,
    #[serde(rename = "tcp_brutal_rate")]
    pub rate: Option<u64>,
    #[serde(rename = "server")]
    pub hosts: Vec<HostConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            threads: 2,
            on_failure: EnforcementMode::Reject,
            enabled: Toggle::Unset,
            rate: None,
            hosts: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(raw)?;
        if config.threads == 0 {
            return Err(ConfigError::Invalid("`threads` must be at least 1".into()));
        }
        Ok(config)
    }

    pub fn scope(&self) -> ScopeConfig {
        ScopeConfig::new(self.enabled, self.rate)
    }
}

/// A virtual host block (`[[server]]`).
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub server_name: Vec<String>,
    pub default_server: bool,
    #[serde(rename = "tcp_brutal")]
    pub enabled: Toggle,
    #[serde(rename = "tcp_brutal_rate")]
    pub rate: Option<u64>,
    #[serde(rename = "location")]
    pub locations: Vec<LocationConfig>,
}

impl HostConfig {
    pub fn scope(&self) -> ScopeConfig {
        ScopeConfig::new(self.enabled, self.rate)
    }
}

/// A path prefix block (`[[server.location]]`). Only the rate can be set here.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LocationConfig {
    pub path: String,
    #[serde(rename = "tcp_brutal_rate", default)]
    pub rate: Option<u64>,
}

impl LocationConfig {
    pub fn scope(&self) -> ScopeConfig {
        ScopeConfig::new(Toggle::Unset, self.rate)
    }
}
