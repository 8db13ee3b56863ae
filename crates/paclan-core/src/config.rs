//! Configuration system for paclan.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PACLAN_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/paclan/config.toml
//!   3. ~/.config/paclan/config.toml

use crate::protocol;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaclanConfig {
    pub network: NetworkConfig,
    pub cache: CacheConfig,
    pub mirrorlist: MirrorlistConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port the HTTP cache surface listens on. Announced to peers.
    pub http_port: u16,
    /// IPv4 multicast group used for discovery.
    pub multicast_group: Ipv4Addr,
    /// UDP port the discovery group uses.
    pub discovery_port: u16,
    /// Seconds between periodic re-announcements.
    pub announce_interval_secs: u64,
    /// Seconds to wait at startup for a first peer before serving anyway.
    pub settle_window_secs: u64,
    /// Per-peer connect and read timeout in seconds when forwarding requests.
    pub peer_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Package directory served to peers. Read-only; pacman writes it.
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorlistConfig {
    /// Mirrorlist rewritten by the `mirrorlist` subcommand.
    pub path: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for PaclanConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            cache: CacheConfig::default(),
            mirrorlist: MirrorlistConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            http_port: protocol::DEFAULT_HTTP_PORT,
            multicast_group: protocol::MULTICAST_GROUP,
            discovery_port: protocol::DISCOVERY_PORT,
            announce_interval_secs: protocol::ANNOUNCE_INTERVAL_SECS,
            settle_window_secs: protocol::SETTLE_WINDOW_SECS,
            peer_timeout_secs: 5,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/cache/pacman/pkg"),
        }
    }
}

impl Default for MirrorlistConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/etc/pacman.d/mirrorlist"),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("paclan")
}

fn home_dir() -> PathBuf {
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
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PaclanConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            PaclanConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PACLAN_CONFIG")
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
            let text = toml::to_string_pretty(&PaclanConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply PACLAN_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PACLAN_NETWORK__HTTP_PORT") {
            if let Ok(p) = v.parse() {
                self.network.http_port = p;
            }
        }
        if let Ok(v) = std::env::var("PACLAN_NETWORK__DISCOVERY_PORT") {
            if let Ok(p) = v.parse() {
                self.network.discovery_port = p;
            }
        }
        if let Ok(v) = std::env::var("PACLAN_NETWORK__PEER_TIMEOUT_SECS") {
            if let Ok(t) = v.parse() {
                self.network.peer_timeout_secs = t;
            }
        }
        if let Ok(v) = std::env::var("PACLAN_CACHE__ROOT") {
            self.cache.root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PACLAN_MIRRORLIST__PATH") {
            self.mirrorlist.path = PathBuf::from(v);
        }
    }
}
