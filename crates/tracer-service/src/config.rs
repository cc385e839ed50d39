//! Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tracer_core::{CoordinatorConfig, DEFAULT_MAX_BUFFERED};

/// Service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// User identity settings.
    pub identity: IdentityConfig,
    /// Remote endpoints.
    pub endpoints: EndpointsConfig,
    /// Observation buffer and event channel settings.
    pub buffer: BufferConfig,
    /// Answers of the simulated radio.
    pub radio: RadioConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// # Example
    ///
    /// ```
    /// use tracer_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.identity.validate());
        errors.extend(self.endpoints.validate());
        errors.extend(self.buffer.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Runtime options for the coordinator.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_buffered_observations: self.buffer.max_observations,
            event_capacity: self.buffer.event_capacity,
            user_id: self.identity.user_id.clone(),
        }
    }
}

/// User identity settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Anonymized user id handed to the radio.
    pub user_id: Option<String>,
    /// Whether the user completed onboarding. Only onboarded users get the
    /// persisted service state resumed at startup.
    pub onboarded: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            onboarded: true,
        }
    }
}

impl IdentityConfig {
    /// Validate identity configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(user_id) = &self.user_id
            && user_id.trim().is_empty()
        {
            errors.push(ValidationError {
                field: "identity.user_id".to_string(),
                message: "user id cannot be empty (omit it instead)".to_string(),
            });
        }

        errors
    }
}

/// Minimum request timeout in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 1;
/// Maximum request timeout in seconds (5 minutes).
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Remote endpoint settings.
///
/// Without a URL the service runs offline: lookups resolve nothing and
/// uploads are only logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Base URL of the identity lookup endpoint.
    pub lookup_url: Option<String>,
    /// Base URL of the upload endpoint.
    pub upload_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            lookup_url: None,
            upload_url: None,
            timeout_secs: 10,
        }
    }
}

impl EndpointsConfig {
    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate endpoint configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, url) in [
            ("endpoints.lookup_url", &self.lookup_url),
            ("endpoints.upload_url", &self.upload_url),
        ] {
            if let Some(url) = url
                && !url.starts_with("http://")
                && !url.starts_with("https://")
            {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!("URL must start with http:// or https://, got: {}", url),
                });
            }
        }

        if self.timeout_secs < MIN_TIMEOUT_SECS {
            errors.push(ValidationError {
                field: "endpoints.timeout_secs".to_string(),
                message: format!(
                    "timeout {} is too short (minimum {} second)",
                    self.timeout_secs, MIN_TIMEOUT_SECS
                ),
            });
        } else if self.timeout_secs > MAX_TIMEOUT_SECS {
            errors.push(ValidationError {
                field: "endpoints.timeout_secs".to_string(),
                message: format!(
                    "timeout {} is too long (maximum {} seconds)",
                    self.timeout_secs, MAX_TIMEOUT_SECS
                ),
            });
        }

        errors
    }
}

/// Observation buffer and event channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Buffered observations that force a flush.
    pub max_observations: usize,
    /// Capacity of each discovery event channel.
    pub event_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_observations: DEFAULT_MAX_BUFFERED,
            event_capacity: 1024,
        }
    }
}

impl BufferConfig {
    /// Validate buffer configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.max_observations == 0 {
            errors.push(ValidationError {
                field: "buffer.max_observations".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.event_capacity == 0 {
            errors.push(ValidationError {
                field: "buffer.event_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        errors
    }
}

/// Answers of the simulated radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Radio hardware present.
    pub available: bool,
    /// Location permission granted when asked.
    pub location_permission: bool,
    /// Radio can be switched on.
    pub can_enable: bool,
    /// Multiple advertisement supported.
    pub multiple_advertisement: bool,
    /// Persisted service flag at startup.
    pub service_enabled: bool,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            available: true,
            location_permission: true,
            can_enable: true,
            multiple_advertisement: true,
            service_enabled: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `endpoints.lookup_url`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tracer")
        .join("service.toml")
}
