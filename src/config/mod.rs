//! Configuration management for jira-access.
//!
//! This module handles loading and saving the TOML configuration file with
//! connection profiles and default settings, and reading credentials from
//! the environment or credential files.

pub mod credentials;
mod profile;
mod settings;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use credentials::{ensure_xray_credentials_file, JiraEnv};
pub use profile::{AuthMethod, Profile};
pub use settings::Settings;

/// Name of the application directory inside the platform config directory.
const APP_DIR: &str = "jira-access";

/// Name of the configuration file.
const CONFIG_FILE: &str = "config.toml";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform configuration directory could not be determined.
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// The configuration directory could not be created.
    #[error("Failed to create configuration directory: {0}")]
    CreateDirError(#[source] std::io::Error),

    /// A configuration or credentials file could not be read.
    #[error("Failed to read configuration: {0}")]
    ReadError(#[source] std::io::Error),

    /// A configuration or credentials file could not be written.
    #[error("Failed to write configuration: {0}")]
    WriteError(#[source] std::io::Error),

    /// The configuration file is not valid TOML.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// The configuration is invalid.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// No profile with the requested name exists.
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// A credentials template was written and must be filled in.
    #[error("{} not found. Template generated. Please fill in id and secret", .0.display())]
    TemplateGenerated(PathBuf),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// The configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Default settings.
    #[serde(default)]
    pub settings: Settings,
    /// Connection profiles.
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

impl Config {
    /// Path of the configuration file in the platform config directory.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(base.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load the configuration from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load and validate the configuration at `path`.
    ///
    /// A missing file yields the default configuration.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        debug!(
            path = %path.display(),
            profiles = config.profiles.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Validate and write the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::CreateDirError)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(ConfigError::WriteError)
    }

    /// Validate all profiles and the default profile reference.
    pub fn validate(&self) -> Result<()> {
        for (index, profile) in self.profiles.iter().enumerate() {
            profile.validate()?;
            if self.profiles[..index].iter().any(|p| p.name == profile.name) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate profile name '{}'",
                    profile.name
                )));
            }
        }

        if let Some(default) = &self.settings.default_profile {
            if !self.profiles.iter().any(|p| &p.name == default) {
                return Err(ConfigError::ValidationError(format!(
                    "default profile '{}' is not defined",
                    default
                )));
            }
        }

        Ok(())
    }

    /// Select a profile by name, falling back to the default profile, then
    /// to the only profile if there is exactly one.
    pub fn profile(&self, name: Option<&str>) -> Result<&Profile> {
        let wanted = name.or(self.settings.default_profile.as_deref());
        match wanted {
            Some(wanted) => self
                .profiles
                .iter()
                .find(|p| p.name == wanted)
                .ok_or_else(|| ConfigError::ProfileNotFound(wanted.to_string())),
            None => match self.profiles.as_slice() {
                [only] => Ok(only),
                [] => Err(ConfigError::ProfileNotFound(
                    "no profiles configured".to_string(),
                )),
                _ => Err(ConfigError::ValidationError(
                    "several profiles configured; pick one with --profile or set default_profile"
                        .to_string(),
                )),
            },
        }
    }
}
