//! API error types for the JIRA and Xray clients.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Query parameters as sent on the wire.
pub type Params = Vec<(String, String)>;

/// Errors that can occur when interacting with the JIRA or Xray API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The credential cannot be encoded for the chosen auth scheme.
    #[error("Cannot encode credentials: {0}")]
    AuthEncoding(String),

    /// Non-success HTTP status other than 400.
    #[error("HTTP {status} from {url}")]
    Http {
        /// The response status.
        status: StatusCode,
        /// The request URL, including the query string.
        url: String,
    },

    /// The server rejected the request with 400, usually a malformed JQL.
    #[error("Error executing query {params:?}.\nError message: {body}\nURL: {url}")]
    Query {
        /// The error body returned by the server.
        body: String,
        /// The request URL, including the query string.
        url: String,
        /// The parameters the request was sent with.
        params: Params,
    },

    /// The response body is not valid JSON.
    #[error("Invalid API response: {0}")]
    MalformedResponse(String),

    /// A response does not have the shape the protocol expects.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Paginated search ended with a different count than the server declared.
    #[error("Number of results mismatch: retrieved {retrieved} of {total}")]
    CountMismatch {
        /// Number of issues accumulated.
        retrieved: usize,
        /// The last total reported by the server.
        total: u64,
    },

    /// Caller-supplied arguments are invalid.
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// A JSON file could not be read as a request body or credentials file.
    #[error("Invalid JSON file {}: {source}", .path.display())]
    InvalidJsonFile {
        /// The file that failed to parse.
        path: PathBuf,
        /// The parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Network or HTTP transport error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Local file system error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Keyring error when storing/retrieving tokens.
    #[error("Keyring error: {0}")]
    Keyring(String),
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Create an error from a non-success HTTP response.
    ///
    /// A 400 keeps the body and parameters so a bad query can be diagnosed;
    /// every other status only records the status and URL.
    pub fn from_response_parts(status: StatusCode, url: &str, body: String, params: &[(String, String)]) -> Self {
        if status == StatusCode::BAD_REQUEST {
            ApiError::Query {
                body,
                url: url.to_string(),
                params: params.to_vec(),
            }
        } else {
            ApiError::Http {
                status,
                url: url.to_string(),
            }
        }
    }

    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Query { .. } => Some(StatusCode::BAD_REQUEST),
            ApiError::Network(e) => e.status(),
            _ => None,
        }
    }
}
