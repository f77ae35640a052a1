//! JIRA connection profiles.

use serde::{Deserialize, Serialize};

use super::{ConfigError, Result};

/// How a profile authenticates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Email plus API token (JIRA Cloud).
    #[default]
    Basic,
    /// Personal access token (JIRA Server / Data Center).
    Bearer,
}

/// A JIRA profile configuration.
///
/// Profiles store connection details for a JIRA instance.
/// API tokens are stored separately in the OS keychain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// The name of this profile.
    ///
    /// Must be non-empty and unique across all profiles.
    pub name: String,

    /// The JIRA server URL, without the REST API path.
    pub url: String,

    /// The user's email address, required for Basic Auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// The authentication scheme.
    #[serde(default)]
    pub auth: AuthMethod,
}

impl Profile {
    /// Create a new profile. Basic Auth is used when an email is given.
    pub fn new(name: String, url: String, email: Option<String>) -> Self {
        let auth = if email.is_some() {
            AuthMethod::Basic
        } else {
            AuthMethod::Bearer
        };
        Self {
            name,
            url,
            email,
            auth,
        }
    }

    /// Validate this profile.
    ///
    /// Checks that:
    /// - The name is non-empty and has no whitespace
    /// - The URL is an http(s) URL
    /// - Basic Auth profiles have a plausible email
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError::ValidationError` with details if validation fails.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "profile name cannot be empty".to_string(),
            ));
        }

        if self.name.contains(char::is_whitespace) {
            return Err(ConfigError::ValidationError(format!(
                "profile name '{}' cannot contain whitespace",
                self.name
            )));
        }

        if self.url.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "profile '{}': URL cannot be empty",
                self.name
            )));
        }

        if !self.url.starts_with("https://") && !self.url.starts_with("http://") {
            return Err(ConfigError::ValidationError(format!(
                "profile '{}': URL must start with http:// or https://",
                self.name
            )));
        }

        match (self.auth, self.email.as_deref()) {
            (AuthMethod::Basic, None) | (AuthMethod::Basic, Some("")) => {
                Err(ConfigError::ValidationError(format!(
                    "profile '{}': basic auth requires an email",
                    self.name
                )))
            }
            (AuthMethod::Basic, Some(email)) if !email.contains('@') => {
                Err(ConfigError::ValidationError(format!(
                    "profile '{}': '{}' does not appear to be a valid email address",
                    self.name, email
                )))
            }
            _ => Ok(()),
        }
    }
}
