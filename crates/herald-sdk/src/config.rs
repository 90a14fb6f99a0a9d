//! # SDK Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Arguments to PushEngine::initialize (app id, secret, log level)    │
//! │                                                                         │
//! │  2. Environment Variables                                              │
//! │     HERALD_APP_ID, HERALD_APP_SECRET, HERALD_MANAGER_URL,              │
//! │     HERALD_METRICS_INTERVAL, HERALD_LOG_LEVEL                          │
//! │                                                                         │
//! │  3. TOML Config File                                                   │
//! │     ~/.config/herald/herald.toml (Linux)                               │
//! │                                                                         │
//! │  4. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [app]
//! id = "my-app"
//! secret = "s3cr3t"
//!
//! [manager]
//! base_url = "https://manager.pushtech.com/api/v1/"
//! request_timeout_secs = 30
//!
//! [metrics]
//! send_interval_secs = 300
//! location = "manual"   # never | always | manual
//!
//! [notifications]
//! types = ["badge", "alert", "sound"]
//!
//! [log]
//! level = "debug"
//!
//! [storage]
//! database_path = "/var/lib/myapp/herald.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use herald_core::LogLevel;

use crate::error::{SdkError, SdkResult};

/// Default manager endpoint.
pub const DEFAULT_MANAGER_URL: &str = "https://manager.pushtech.com/api/v1/";

// =============================================================================
// Location Mode
// =============================================================================

/// When location metrics are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationMode {
    /// Location metrics are dropped.
    Never,
    /// The host reports location whenever it changes.
    Always,
    /// The host reports location when it decides to.
    #[default]
    Manual,
}

impl LocationMode {
    pub fn allows_location(self) -> bool {
        !matches!(self, LocationMode::Never)
    }
}

impl std::fmt::Display for LocationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationMode::Never => write!(f, "never"),
            LocationMode::Always => write!(f, "always"),
            LocationMode::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for LocationMode {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "never" => Ok(LocationMode::Never),
            "always" => Ok(LocationMode::Always),
            "manual" => Ok(LocationMode::Manual),
            other => Err(SdkError::InvalidConfig(format!(
                "Unknown location mode: '{other}'. Valid options: never, always, manual"
            ))),
        }
    }
}

// =============================================================================
// Notification Types
// =============================================================================

/// One kind of user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Badge,
    Alert,
    Sound,
}

/// Bit set of notification types sent with the push token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotificationTypes(u8);

impl NotificationTypes {
    pub const NONE: NotificationTypes = NotificationTypes(0);
    pub const BADGE: NotificationTypes = NotificationTypes(1);
    pub const ALERT: NotificationTypes = NotificationTypes(2);
    pub const SOUND: NotificationTypes = NotificationTypes(4);
    pub const ALL: NotificationTypes = NotificationTypes(7);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: NotificationTypes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn from_types(types: &[NotificationType]) -> Self {
        types.iter().fold(NotificationTypes::NONE, |acc, t| {
            acc | match t {
                NotificationType::Badge => NotificationTypes::BADGE,
                NotificationType::Alert => NotificationTypes::ALERT,
                NotificationType::Sound => NotificationTypes::SOUND,
            }
        })
    }
}

impl std::ops::BitOr for NotificationTypes {
    type Output = NotificationTypes;

    fn bitor(self, rhs: Self) -> Self::Output {
        NotificationTypes(self.0 | rhs.0)
    }
}

// =============================================================================
// Sections
// =============================================================================

/// App credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub secret: Option<String>,
}

/// Manager endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSettings {
    #[serde(default = "default_manager_url")]
    pub base_url: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_manager_url() -> String {
    DEFAULT_MANAGER_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ManagerSettings {
    fn default() -> Self {
        ManagerSettings {
            base_url: default_manager_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Metrics batching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Period of the background flush (seconds).
    #[serde(default = "default_send_interval")]
    pub send_interval_secs: u64,

    #[serde(default)]
    pub location: LocationMode,
}

fn default_send_interval() -> u64 {
    300
}

impl Default for MetricsSettings {
    fn default() -> Self {
        MetricsSettings {
            send_interval_secs: default_send_interval(),
            location: LocationMode::default(),
        }
    }
}

/// Notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_notification_types")]
    pub types: Vec<NotificationType>,
}

fn default_notification_types() -> Vec<NotificationType> {
    vec![
        NotificationType::Badge,
        NotificationType::Alert,
        NotificationType::Sound,
    ]
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            types: default_notification_types(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Main SDK Configuration
// =============================================================================

/// Complete SDK configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SdkConfig {
    #[serde(default)]
    pub app: AppSettings,

    #[serde(default)]
    pub manager: ManagerSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub notifications: NotificationSettings,

    #[serde(default)]
    pub log: LogSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl SdkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (herald.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SdkResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading SDK config from file");
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
            warn!("Failed to load SDK config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SdkResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SdkError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SdkError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SdkError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "SDK config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SdkResult<()> {
        let url = url::Url::parse(&self.manager.base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SdkError::InvalidUrl(format!(
                "Manager URL must start with http:// or https://, got: {}",
                self.manager.base_url
            )));
        }

        if self.metrics.send_interval_secs == 0 {
            return Err(SdkError::InvalidConfig(
                "send_interval_secs must be greater than 0".into(),
            ));
        }

        if self.manager.request_timeout_secs == 0 {
            return Err(SdkError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("HERALD_APP_ID") {
            debug!(app_id = %id, "Overriding app id from environment");
            self.app.id = Some(id);
        }

        if let Some(secret) = lookup("HERALD_APP_SECRET") {
            self.app.secret = Some(secret);
        }

        if let Some(url) = lookup("HERALD_MANAGER_URL") {
            debug!(url = %url, "Overriding manager URL from environment");
            self.manager.base_url = url;
        }

        if let Some(interval) = lookup("HERALD_METRICS_INTERVAL") {
            match interval.parse::<u64>() {
                Ok(secs) => self.metrics.send_interval_secs = secs,
                Err(_) => warn!(value = %interval, "Ignoring invalid HERALD_METRICS_INTERVAL"),
            }
        }

        if let Some(level) = lookup("HERALD_LOG_LEVEL") {
            match level.parse::<LogLevel>() {
                Ok(parsed) => self.log.level = parsed,
                Err(_) => warn!(value = %level, "Ignoring invalid HERALD_LOG_LEVEL"),
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "herald", "herald")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("herald.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Database file: the configured path, else `herald.db` in the data dir.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.storage
            .database_path
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().join("herald.db")))
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_secs(self.metrics.send_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.manager.request_timeout_secs)
    }

    pub fn notification_types(&self) -> NotificationTypes {
        NotificationTypes::from_types(&self.notifications.types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SdkConfig::default();
        assert_eq!(config.manager.base_url, DEFAULT_MANAGER_URL);
        assert_eq!(config.metrics.send_interval_secs, 300);
        assert_eq!(config.metrics.location, LocationMode::Manual);
        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.notification_types(), NotificationTypes::ALL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SdkConfig::default();

        config.manager.base_url = "ws://manager.example".into();
        assert!(matches!(config.validate(), Err(SdkError::InvalidUrl(_))));

        config.manager.base_url = "not a url".into();
        assert!(config.validate().is_err());

        config.manager.base_url = "http://localhost:8080/api/".into();
        config.metrics.send_interval_secs = 0;
        assert!(matches!(config.validate(), Err(SdkError::InvalidConfig(_))));

        config.metrics.send_interval_secs = 60;
        config.manager.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SdkConfig = toml::from_str(
            r#"
            [app]
            id = "app-1"

            [metrics]
            location = "never"
            "#,
        )
        .unwrap();
        assert_eq!(config.app.id.as_deref(), Some("app-1"));
        assert_eq!(config.metrics.location, LocationMode::Never);
        assert_eq!(config.metrics.send_interval_secs, 300);
        assert_eq!(config.manager.request_timeout_secs, 30);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("HERALD_APP_ID", "env-app"),
            ("HERALD_MANAGER_URL", "https://staging.example/api/"),
            ("HERALD_METRICS_INTERVAL", "60"),
            ("HERALD_LOG_LEVEL", "warning"),
        ]
        .into_iter()
        .collect();

        let mut config = SdkConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.app.id.as_deref(), Some("env-app"));
        assert_eq!(config.manager.base_url, "https://staging.example/api/");
        assert_eq!(config.metrics.send_interval_secs, 60);
        assert_eq!(config.log.level, LogLevel::Warning);
    }

    #[test]
    fn test_invalid_override_is_ignored() {
        let mut config = SdkConfig::default();
        config.apply_overrides(|k| (k == "HERALD_METRICS_INTERVAL").then(|| "soon".to_string()));
        assert_eq!(config.metrics.send_interval_secs, 300);
    }

    #[test]
    fn test_notification_types_bits() {
        let types = NotificationTypes::from_types(&[NotificationType::Badge, NotificationType::Sound]);
        assert_eq!(types.bits(), 5);
        assert!(types.contains(NotificationTypes::SOUND));
        assert!(!types.contains(NotificationTypes::ALERT));
    }

    #[test]
    fn test_location_mode_parsing() {
        assert_eq!("NEVER".parse::<LocationMode>().unwrap(), LocationMode::Never);
        assert!(!LocationMode::Never.allows_location());
        assert!(LocationMode::Always.allows_location());
        assert!("sometimes".parse::<LocationMode>().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!("herald-test-{}.toml", uuid::Uuid::new_v4()));
        let mut config = SdkConfig::default();
        config.app.id = Some("saved-app".into());
        config.metrics.send_interval_secs = 120;
        config.save(Some(path.clone())).unwrap();

        let loaded = SdkConfig::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.metrics.send_interval_secs, 120);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&SdkConfig::default()).unwrap();
        assert!(toml_str.contains("[manager]"));
        assert!(toml_str.contains("[metrics]"));
    }
}
