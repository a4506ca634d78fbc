//! Configuration system for Outpost.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $OUTPOST_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/outpost/config.toml
//!   3. ~/.config/outpost/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::message::DISPATCH_PORT;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutpostConfig {
    pub device: DeviceConfig,
    pub network: NetworkConfig,
    pub cloud: CloudConfig,
    pub storage: StorageConfig,
    pub sender: SenderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Stable identifier reported in metadata responses.
    pub device_id: String,
    /// Installation site, stamped into every detect event.
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the local dispatcher binds. Loopback unless the producer
    /// runs on another host.
    pub bind_host: String,
    /// Dispatcher TCP port.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Broker hostname.
    pub endpoint: String,
    /// Broker port.
    pub port: u16,
    /// MQTT client identity.
    pub client_id: String,
    /// Credential material. Paths are opaque to the core; the bridge only
    /// checks they exist before connecting.
    pub ca_path: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where round-tripped prediction artifacts are persisted, one file per
    /// event uid.
    pub artifact_dir: PathBuf,
    /// Directory upload requests resolve filenames against.
    pub upload_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Send attempts per queued item before it is dropped.
    pub max_send_attempts: u32,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for OutpostConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            network: NetworkConfig::default(),
            cloud: CloudConfig::default(),
            storage: StorageConfig::default(),
            sender: SenderConfig::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: "outpost-000".to_string(),
            location: "Boston".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            port: DISPATCH_PORT,
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        let certs = config_dir().join("certs");
        Self {
            endpoint: "localhost".to_string(),
            port: 8883,
            client_id: "outpost-edge".to_string(),
            ca_path: certs.join("root-ca.pem"),
            cert_path: certs.join("certificate.pem.crt"),
            key_path: certs.join("private.pem.key"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_dir: data_dir().join("clips"),
            upload_dir: data_dir().join("uploads"),
        }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            max_send_attempts: 5,
        }
    }
}

impl NetworkConfig {
    /// The dispatcher bind address as `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("outpost")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("outpost")
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
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl OutpostConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::file_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path, falling back to defaults when the file
    /// does not exist. No env overrides applied.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
        } else {
            Ok(OutpostConfig::default())
        }
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("OUTPOST_CONFIG")
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
            let text = toml::to_string_pretty(&OutpostConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply OUTPOST_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("OUTPOST_DEVICE__DEVICE_ID") {
            self.device.device_id = v;
        }
        if let Ok(v) = std::env::var("OUTPOST_DEVICE__LOCATION") {
            self.device.location = v;
        }
        if let Ok(v) = std::env::var("OUTPOST_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
        if let Ok(v) = std::env::var("OUTPOST_CLOUD__ENDPOINT") {
            self.cloud.endpoint = v;
        }
        if let Ok(v) = std::env::var("OUTPOST_CLOUD__CLIENT_ID") {
            self.cloud.client_id = v;
        }
        if let Ok(v) = std::env::var("OUTPOST_STORAGE__UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(v);
        }
    }
}
