//! Configuration system for the locator.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $LOCATOR_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/locator/config.toml
//!   3. ~/.config/locator/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::{
    ANNOUNCE_INTERVAL_MS, DEFAULT_ANNOUNCE_PORT, DEFAULT_LOCATOR_PORT, DEFAULT_MULTICAST_GROUP,
    HEARTBEAT_TIMEOUT_MS,
};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub network: NetworkConfig,
    pub discovery: DiscoveryConfig,
    pub api: ApiConfig,
    /// Services attached at startup.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<BootstrapService>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Node identity. Empty = random v4 uuid, regenerated on every start.
    pub uuid: String,
    /// Name peers use to reach this node. Empty = system hostname.
    pub hostname: String,
    /// Address services and the locator bind to.
    pub endpoint: String,
    /// TCP port for the locator RPC channel. 0 = OS-assigned.
    pub locator_port: u16,
    /// Port range `[min, max)` handed out to attached services.
    /// Absent = services bind to OS-assigned ports.
    pub ports: Option<PortRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Announce this node and listen for peers.
    pub enabled: bool,
    /// IPv4 multicast group.
    pub group: String,
    /// UDP port announcements are sent to and received on.
    pub announce_port: u16,
    pub announce_interval_ms: u64,
    /// Peers silent for this long are evicted.
    pub heartbeat_timeout_ms: u64,
    /// Per-candidate TCP connect timeout when dialing a discovered peer.
    pub connect_timeout_ms: u64,
    pub multicast_ttl: u32,
    /// Keep remote service tables. Without a gateway the node only announces
    /// itself and never connects to peers.
    pub gateway: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Diagnostics HTTP port on 127.0.0.1. 0 = disabled.
    pub port: u16,
}

/// A service published by the daemon itself at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapService {
    pub name: String,
    #[serde(default = "default_service_version")]
    pub version: u32,
    /// Method names; the method id is the position in this list.
    #[serde(default)]
    pub methods: Vec<String>,
}

fn default_service_version() -> u32 {
    1
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            uuid: String::new(),
            hostname: String::new(),
            endpoint: "0.0.0.0".to_string(),
            locator_port: DEFAULT_LOCATOR_PORT,
            ports: None,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            group: DEFAULT_MULTICAST_GROUP.to_string(),
            announce_port: DEFAULT_ANNOUNCE_PORT,
            announce_interval_ms: ANNOUNCE_INTERVAL_MS,
            heartbeat_timeout_ms: HEARTBEAT_TIMEOUT_MS,
            connect_timeout_ms: 5_000,
            multicast_ttl: 1,
            gateway: true,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 10055 }
    }
}

impl ApiConfig {
    pub fn enabled(&self) -> bool {
        self.port != 0
    }
}

impl DiscoveryConfig {
    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("locator")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid port range {min}..{max}")]
    InvalidPortRange { min: u16, max: u16 },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl LocatorConfig {
    /// Load config: env vars → file → defaults. Fills in identity.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            LocatorConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        config.resolve_identity();
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("LOCATOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&LocatorConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(range) = self.network.ports {
            if range.min >= range.max {
                return Err(ConfigError::InvalidPortRange {
                    min: range.min,
                    max: range.max,
                });
            }
        }
        Ok(())
    }

    /// Generate a uuid and look up the hostname where they were left empty.
    pub fn resolve_identity(&mut self) {
        if self.network.uuid.is_empty() {
            self.network.uuid = uuid::Uuid::new_v4().to_string();
        }
        if self.network.hostname.is_empty() {
            self.network.hostname = hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "localhost".to_string());
        }
    }

    /// Apply LOCATOR_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LOCATOR_NETWORK__UUID") {
            self.network.uuid = v;
        }
        if let Ok(v) = std::env::var("LOCATOR_NETWORK__HOSTNAME") {
            self.network.hostname = v;
        }
        if let Ok(v) = std::env::var("LOCATOR_NETWORK__LOCATOR_PORT") {
            if let Ok(p) = v.parse() {
                self.network.locator_port = p;
            }
        }
        if let Ok(v) = std::env::var("LOCATOR_DISCOVERY__ENABLED") {
            self.discovery.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("LOCATOR_DISCOVERY__GROUP") {
            self.discovery.group = v;
        }
        if let Ok(v) = std::env::var("LOCATOR_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
    }
}
