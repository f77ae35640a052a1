//! Top-level error type for the `jira-access` command.
//!
//! Aggregates API and configuration errors and maps them to short messages
//! and suggested actions for the terminal.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;

/// The main application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration-related errors.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// API-related errors.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// IO errors (file system, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid command-line input.
    #[error("{0}")]
    Usage(String),
}

impl AppError {
    /// Create a usage error.
    pub fn usage(msg: impl Into<String>) -> Self {
        AppError::Usage(msg.into())
    }

    /// Get a user-friendly message for display.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Config(e) => match e {
                ConfigError::NoConfigDir => {
                    "Could not find configuration directory. Please check your system settings."
                        .to_string()
                }
                ConfigError::CreateDirError(_) | ConfigError::WriteError(_) => {
                    "Could not write configuration. Please check file permissions.".to_string()
                }
                ConfigError::ReadError(_) => {
                    "Could not read configuration file. Please check the file exists and is readable.".to_string()
                }
                ConfigError::ParseError(_) => {
                    "Configuration file is invalid. Please check the file format.".to_string()
                }
                ConfigError::SerializeError(_) => {
                    "Could not save configuration. Internal error.".to_string()
                }
                ConfigError::ValidationError(msg) => format!("Configuration error: {}", msg),
                ConfigError::ProfileNotFound(name) => format!("Profile '{}' not found.", name),
                ConfigError::TemplateGenerated(_) => e.to_string(),
            },
            AppError::Api(e) => match e {
                ApiError::AuthEncoding(_) => {
                    "Credentials contain characters that cannot be sent. Use ASCII only."
                        .to_string()
                }
                ApiError::Http { status, .. } if status.as_u16() == 401 => {
                    "Authentication failed. Please check your email and API token.".to_string()
                }
                ApiError::Http { status, .. } if status.as_u16() == 403 => {
                    "Access denied. You don't have permission to access this resource.".to_string()
                }
                ApiError::Http { status, url } => format!("Request to {} failed with HTTP {}.", url, status),
                ApiError::Query { body, .. } => format!("The query was rejected: {}", body),
                ApiError::MalformedResponse(_) | ApiError::Protocol(_) => {
                    "Unexpected response from the server. Please try again.".to_string()
                }
                ApiError::CountMismatch { retrieved, total } => format!(
                    "Search returned {} of {} issues. The data may have changed during the search; please retry.",
                    retrieved, total
                ),
                ApiError::Validation(msg) => msg.clone(),
                ApiError::InvalidJsonFile { path, .. } => {
                    format!("'{}' is not a valid JSON file.", path.display())
                }
                ApiError::Network(_) => {
                    "Connection failed. Please check your internet connection.".to_string()
                }
                ApiError::Io(_) => {
                    "A file operation failed. Please check file permissions.".to_string()
                }
                ApiError::Keyring(_) => {
                    "Could not access secure storage. Store the token again with 'jira-access token set'.".to_string()
                }
            },
            AppError::Io(_) => "A file operation failed. Please check file permissions.".to_string(),
            AppError::Usage(msg) => msg.clone(),
        }
    }

    /// Get a suggested action for the user.
    pub fn suggested_action(&self) -> Option<&'static str> {
        match self {
            AppError::Config(ConfigError::ProfileNotFound(_)) => {
                Some("Add a [[profiles]] entry to the configuration file or set JIRA_BASE_URL and JIRA_API_TOKEN.")
            }
            AppError::Config(ConfigError::TemplateGenerated(_)) => {
                Some("To generate an API key visit the Xray tab in your Jira settings.")
            }
            AppError::Api(ApiError::Http { status, .. }) if status.as_u16() == 401 => {
                Some("Check your API token at https://id.atlassian.com/manage-profile/security/api-tokens")
            }
            AppError::Api(ApiError::Query { .. }) => Some("Check the JQL syntax of your query."),
            AppError::Api(ApiError::Network(_)) => {
                Some("Check your internet connection and JIRA URL.")
            }
            _ => None,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Usage(_) | AppError::Config(_) => 2,
            _ => 1,
        }
    }
}

/// Result type for application operations.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    fn http(status: StatusCode) -> AppError {
        AppError::Api(ApiError::Http {
            status,
            url: "https://jira.example.com/rest/api/latest/search".to_string(),
        })
    }

    #[test]
    fn test_app_error_from_config_error() {
        let app_err: AppError = ConfigError::NoConfigDir.into();
        assert!(matches!(app_err, AppError::Config(ConfigError::NoConfigDir)));
        assert_eq!(app_err.exit_code(), 2);
    }

    #[test]
    fn test_app_error_from_api_error() {
        let app_err: AppError = ApiError::Validation("bad".to_string()).into();
        assert!(matches!(app_err, AppError::Api(ApiError::Validation(_))));
        assert_eq!(app_err.user_message(), "bad");
        assert_eq!(app_err.exit_code(), 1);
    }

    #[test]
    fn test_user_message_unauthorized() {
        let msg = http(StatusCode::UNAUTHORIZED).user_message();
        assert!(msg.contains("Authentication failed"));
        assert!(http(StatusCode::UNAUTHORIZED)
            .suggested_action()
            .unwrap()
            .contains("api-tokens"));
    }

    #[test]
    fn test_user_message_server_error() {
        let msg = http(StatusCode::BAD_GATEWAY).user_message();
        assert!(msg.contains("502"));
        assert!(http(StatusCode::BAD_GATEWAY).suggested_action().is_none());
    }

    #[test]
    fn test_user_message_count_mismatch() {
        let err = AppError::Api(ApiError::CountMismatch {
            retrieved: 3,
            total: 5,
        });
        assert!(err.user_message().contains("3 of 5"));
    }

    #[test]
    fn test_user_message_query_error() {
        let err = AppError::Api(ApiError::Query {
            body: "Field 'foo' does not exist".to_string(),
            url: "u".to_string(),
            params: vec![],
        });
        assert!(err.user_message().contains("Field 'foo'"));
        assert!(err.suggested_action().unwrap().contains("JQL"));
    }

    #[test]
    fn test_user_message_config_validation() {
        let err = AppError::Config(ConfigError::ValidationError(
            "duplicate profile".to_string(),
        ));
        assert!(err.user_message().contains("duplicate profile"));
    }

    #[test]
    fn test_usage_error() {
        let err = AppError::usage("missing --dest");
        assert_eq!(err.user_message(), "missing --dest");
        assert_eq!(err.exit_code(), 2);
    }
}
