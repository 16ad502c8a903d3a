//! Configuration management module.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::fms::command::{CaptureOptions, WsqBitrate};
use crate::fms::transport::{
    DEVICE_NAME_FILTERS, NOTIFY_CHARACTERISTIC_UUID, SERVICE_UUID, WRITE_CHARACTERISTIC_UUID,
};
use crate::fms::types::{DEFAULT_MAX_IMAGE_SIZE, DEFAULT_MAX_TEMPLATE_SIZE};
use crate::image::ImageSize;

/// Configuration load result.
#[derive(Debug)]
pub enum ConfigLoadResult {
    /// Config loaded successfully.
    Loaded(AppConfig),
    /// Config file missing (first run).
    Missing,
    /// Config file exists but invalid.
    Invalid(ConfigError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub protocol: ProtocolConfig,
    pub capture: CaptureConfig,
    pub device: DeviceConfig,
    pub logging: LoggingConfig,
}

/// Limits and validation policy of the protocol engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Upper bound for a declared image size in bytes.
    pub max_image_size: u32,
    /// Upper bound for a declared template size in bytes.
    pub max_template_size: u32,
    /// Reject response headers whose checksum does not match.
    pub strict_checksum: bool,
}

/// Capture defaults used when a command gives no options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub size: ImageSize,
    pub wsq: bool,
    pub wsq_bitrate: WsqBitrate,
}

/// Reader GATT layout used by the BLE adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub service_uuid: String,
    pub notify_uuid: String,
    pub write_uuid: String,
    /// Advertised name fragments accepted when scanning.
    pub name_filters: Vec<String>,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files. Console only when unset.
    pub directory: Option<PathBuf>,
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
}

impl AppConfig {
    /// Get config file path (platform config directory).
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("com", "SecuGen", "secugen-ble")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Attempt to load config with detailed result.
    pub fn try_load(path: &Path) -> ConfigLoadResult {
        if !path.exists() {
            return ConfigLoadResult::Missing;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<AppConfig>(&content) {
                Ok(config) => match config.validate() {
                    Ok(()) => ConfigLoadResult::Loaded(config),
                    Err(e) => ConfigLoadResult::Invalid(e),
                },
                Err(e) => ConfigLoadResult::Invalid(ConfigError::Parse(e)),
            },
            Err(e) => ConfigLoadResult::Invalid(ConfigError::Read(e)),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol.max_image_size == 0 {
            return Err(ConfigError::Validation(
                "Max image size must be greater than 0".to_string(),
            ));
        }
        if self.protocol.max_template_size == 0 {
            return Err(ConfigError::Validation(
                "Max template size must be greater than 0".to_string(),
            ));
        }
        if self.device.service_uuid.trim().is_empty()
            || self.device.notify_uuid.trim().is_empty()
            || self.device.write_uuid.trim().is_empty()
        {
            return Err(ConfigError::Validation("GATT UUIDs cannot be empty".to_string()));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation("Log level cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl DeviceConfig {
    /// Whether an advertised name belongs to a supported reader.
    pub fn accepts(&self, name: &str) -> bool {
        self.name_filters.iter().any(|filter| name.contains(filter.as_str()))
    }
}

impl CaptureConfig {
    pub fn options(&self) -> CaptureOptions {
        CaptureOptions {
            size: self.size,
            wsq: self.wsq.then_some(self.wsq_bitrate),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
            max_template_size: DEFAULT_MAX_TEMPLATE_SIZE,
            strict_checksum: false,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            service_uuid: SERVICE_UUID.to_string(),
            notify_uuid: NOTIFY_CHARACTERISTIC_UUID.to_string(),
            write_uuid: WRITE_CHARACTERISTIC_UUID.to_string(),
            name_filters: DEVICE_NAME_FILTERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_image_size_rejected() {
        let mut config = AppConfig::default();
        config.protocol.max_image_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [protocol]
            strict_checksum = true

            [capture]
            size = "small"
            wsq = true
            wsq_bitrate = "fifteen_to_one"
            "#,
        )
        .unwrap();
        assert!(config.protocol.strict_checksum);
        assert_eq!(config.protocol.max_image_size, DEFAULT_MAX_IMAGE_SIZE);
        assert_eq!(
            config.capture.options(),
            CaptureOptions {
                size: ImageSize::Small,
                wsq: Some(WsqBitrate::FifteenToOne),
            }
        );
        assert_eq!(config.device.service_uuid, SERVICE_UUID);
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = AppConfig::default();
        config.device.name_filters.push("Unity 20".to_string());
        config.logging.directory = Some(PathBuf::from("/var/log/secugen"));

        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_name_filters() {
        let device = DeviceConfig::default();
        assert!(device.accepts("Unity 20 BLE"));
        assert!(device.accepts("SecuGen-4F2A"));
        assert!(!device.accepts("Mi Band"));
    }

    #[test]
    fn test_missing_file() {
        let path = std::env::temp_dir().join("secugen-ble-does-not-exist.toml");
        assert!(matches!(AppConfig::try_load(&path), ConfigLoadResult::Missing));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("secugen-ble-{}.toml", std::process::id()));
        AppConfig::default().save(&path).unwrap();
        let loaded = AppConfig::try_load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(loaded, ConfigLoadResult::Loaded(c) if c == AppConfig::default()));
    }
}
