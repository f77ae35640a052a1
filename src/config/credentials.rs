//! Credentials from the environment and credential files.

use std::path::{Path, PathBuf};

use tracing::warn;

use super::{ConfigError, Result};
use crate::api::{self, Auth};

/// JIRA server URL variable.
pub const JIRA_BASE_URL_VAR: &str = "JIRA_BASE_URL";
/// JIRA account email variable. Without it the token is sent as a bearer token.
pub const JIRA_EMAIL_VAR: &str = "JIRA_EMAIL";
/// JIRA API token variable.
pub const JIRA_API_TOKEN_VAR: &str = "JIRA_API_TOKEN";

/// Written when an Xray credentials file is missing.
pub const XRAY_AUTH_TEMPLATE: &str = r#"{
  "client_id": "<id-string>",
  "client_secret": "<secret-string>"
}
"#;

/// JIRA connection details read from environment variables.
#[derive(Clone, PartialEq, Eq)]
pub struct JiraEnv {
    /// The JIRA server URL from `JIRA_BASE_URL`.
    pub base_url: String,
    /// The account email from `JIRA_EMAIL`, if set.
    pub email: Option<String>,
    api_token: String,
}

impl std::fmt::Debug for JiraEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraEnv")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl JiraEnv {
    /// Read `JIRA_BASE_URL`, `JIRA_API_TOKEN` and the optional `JIRA_EMAIL`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first missing variable.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: required_var(JIRA_BASE_URL_VAR)?,
            email: optional_var(JIRA_EMAIL_VAR),
            api_token: required_var(JIRA_API_TOKEN_VAR)?,
        })
    }

    /// Basic Auth when an email is set, Bearer otherwise.
    pub fn auth(&self) -> api::Result<Auth> {
        match &self.email {
            Some(email) => Auth::basic(email, &self.api_token),
            None => Ok(Auth::bearer(&self.api_token)),
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name).ok_or_else(|| {
        ConfigError::ValidationError(format!("\"{}\" not set as an environment variable", name))
    })
}

/// Make sure an Xray credentials file exists at `path`.
///
/// When it is missing, a template is written in its place and
/// `ConfigError::TemplateGenerated` is returned so the user can fill it in.
pub fn ensure_xray_credentials_file(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(ConfigError::CreateDirError)?;
    }
    std::fs::write(path, XRAY_AUTH_TEMPLATE).map_err(ConfigError::WriteError)?;
    warn!(
        path = %path.display(),
        "Xray credentials file not found, template generated. To generate an API key visit the Xray tab in your Jira settings"
    );
    Err(ConfigError::TemplateGenerated(path.to_path_buf()))
}
