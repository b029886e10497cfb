//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TINDAHAN_API_URL=https://pos.example.com/api                       │
//! │     TINDAHAN_SYNC_MODE=manual                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pos/sync.toml (Linux)                                    │
//! │     ~/Library/Application Support/com.tindahan.pos/sync.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     SyncMode::Auto, auto-generated device_id, 60 s drain interval      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Counter 1"
//!
//! [store]
//! id = "665f1c2e9a0b"
//! name = "Sari-sari Main"
//!
//! [api]
//! base_url = "http://localhost:5000/api"
//! timeout_secs = 30
//!
//! [sync]
//! mode = "auto"            # auto | manual | disabled
//! poll_interval_secs = 60
//! probe_interval_secs = 15
//! probe_path = "/test"
//!
//! [storage]
//! db_path = "/var/lib/tindahan/queue.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use tindahan_core::DEFAULT_SYNC_INTERVAL_SECS;

// =============================================================================
// Sync Mode
// =============================================================================

/// How drains are triggered on this device.
///
/// ## Mode Selection
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  AUTO (Default)                                                        │
/// │  • Drains on every offline → online transition                         │
/// │  • Drains on the periodic timer while online                           │
/// │                                                                         │
/// │  MANUAL                                                                │
/// │  • Drains only when asked (`sync_now`, `tindahan-syncd sync`)          │
/// │                                                                         │
/// │  DISABLED                                                              │
/// │  • The agent does not start                                            │
/// │  • Offline mutations are still queued                                  │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Auto,
    Manual,
    Disabled,
}

impl SyncMode {
    /// Returns true if reconnect and timer triggers are active.
    pub fn triggers_automatically(&self) -> bool {
        matches!(self, SyncMode::Auto)
    }

    /// Returns true if sync is enabled at all.
    pub fn is_sync_enabled(&self) -> bool {
        !matches!(self, SyncMode::Disabled)
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Auto => write!(f, "auto"),
            SyncMode::Manual => write!(f, "manual"),
            SyncMode::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "automatic" => Ok(SyncMode::Auto),
            "manual" | "on_demand" | "on-demand" => Ok(SyncMode::Manual),
            "disabled" | "off" | "offline" => Ok(SyncMode::Disabled),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown sync mode: '{}'. Valid options: auto, manual, disabled",
                other
            ))),
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4), generated on first run.
    pub id: String,

    /// Human-readable device name (e.g., "Counter 1").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "POS Terminal".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Store Configuration
// =============================================================================

/// The store this device sells for. Its id scopes cached lists and
/// notifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: String,
}

// =============================================================================
// API Settings
// =============================================================================

/// REST API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL every route is joined onto.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Drain and connectivity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub mode: SyncMode,

    /// Interval between periodic drains while online (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Interval between connectivity probes (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Route probed for reachability, relative to the API base URL.
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
}

fn default_poll_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

fn default_probe_interval() -> u64 {
    15
}

fn default_probe_path() -> String {
    "/test".to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: SyncMode::default(),
            poll_interval_secs: default_poll_interval(),
            probe_interval_secs: default_probe_interval(),
            probe_path: default_probe_path(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Location of the durable queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Queue database path. Defaults to the platform data directory.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::MissingDeviceId);
        }

        let url = Url::parse(&self.api.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "API URL must use http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.sync.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }

        if self.sync.probe_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "probe_interval_secs must be greater than 0".into(),
            ));
        }

        if self.api.timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from a key lookup (the process environment in
    /// production, a map in tests).
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("TINDAHAN_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(name) = lookup("TINDAHAN_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Some(id) = lookup("TINDAHAN_STORE_ID") {
            self.store.id = Some(id);
        }

        if let Some(url) = lookup("TINDAHAN_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Some(token) = lookup("TINDAHAN_API_TOKEN") {
            self.api.token = Some(token);
        }

        if let Some(mode) = lookup("TINDAHAN_SYNC_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding sync mode from environment");
                    self.sync.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown sync mode in environment"),
            }
        }

        if let Some(secs) = lookup("TINDAHAN_POLL_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.poll_interval_secs = s,
                Err(_) => warn!(value = %secs, "Invalid poll interval in environment"),
            }
        }

        if let Some(path) = lookup("TINDAHAN_DB_PATH") {
            self.storage.db_path = Some(PathBuf::from(path));
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "tindahan", "pos")
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn store_id(&self) -> Option<&str> {
        self.store.id.as_deref()
    }

    pub fn mode(&self) -> SyncMode {
        self.sync.mode
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.sync.mode.is_sync_enabled()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sync.poll_interval_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.sync.probe_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Returns the queue database path: configured, else the platform data
    /// directory, else the working directory.
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .db_path
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().join("queue.db")))
            .unwrap_or_else(|| PathBuf::from("tindahan-queue.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_sync_mode_parsing() {
        assert_eq!("auto".parse::<SyncMode>().unwrap(), SyncMode::Auto);
        assert_eq!("Manual".parse::<SyncMode>().unwrap(), SyncMode::Manual);
        assert_eq!("on-demand".parse::<SyncMode>().unwrap(), SyncMode::Manual);
        assert_eq!("off".parse::<SyncMode>().unwrap(), SyncMode::Disabled);
        assert!("primary".parse::<SyncMode>().is_err());
    }

    #[test]
    fn test_mode_flags() {
        assert!(SyncMode::Auto.triggers_automatically());
        assert!(!SyncMode::Manual.triggers_automatically());
        assert!(SyncMode::Manual.is_sync_enabled());
        assert!(!SyncMode::Disabled.is_sync_enabled());
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(!config.device.id.is_empty());
        assert_eq!(config.sync.mode, SyncMode::Auto);
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.probe_interval(), Duration::from_secs(15));
        assert_eq!(config.sync.probe_path, "/test");
        assert_eq!(config.api.base_url, "http://localhost:5000/api");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.device.id = String::new();
        assert!(matches!(config.validate(), Err(SyncError::MissingDeviceId)));

        config.device.id = "test".to_string();
        config.api.base_url = "ws://localhost:5000".to_string();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.api.base_url = "not a url".to_string();
        assert!(config.validate().unwrap_err().is_config_error());

        config.api.base_url = "https://pos.example.com/api".to_string();
        assert!(config.validate().is_ok());

        config.sync.poll_interval_secs = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("TINDAHAN_DEVICE_ID", "dev-1"),
            ("TINDAHAN_STORE_ID", "s1"),
            ("TINDAHAN_API_URL", "https://api.example.com/api"),
            ("TINDAHAN_SYNC_MODE", "manual"),
            ("TINDAHAN_POLL_INTERVAL_SECS", "not-a-number"),
            ("TINDAHAN_DB_PATH", "/tmp/q.db"),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.device_id(), "dev-1");
        assert_eq!(config.store_id(), Some("s1"));
        assert_eq!(config.api.base_url, "https://api.example.com/api");
        assert_eq!(config.mode(), SyncMode::Manual);
        assert_eq!(config.sync.poll_interval_secs, 60);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/q.db"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("sync.toml");

        let mut config = SyncConfig::default();
        config.store.id = Some("s1".into());
        config.sync.mode = SyncMode::Manual;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[device]"));
        assert!(contents.contains("[sync]"));

        let loaded: SyncConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.device.id, config.device.id);
        assert_eq!(loaded.sync.mode, SyncMode::Manual);
        assert_eq!(loaded.store_id(), Some("s1"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: SyncConfig = toml::from_str("[device]\nid = \"abc\"\n").unwrap();
        assert_eq!(config.device.name, "POS Terminal");
        assert_eq!(config.sync.poll_interval_secs, 60);
        assert!(config.api.token.is_none());
    }
}
