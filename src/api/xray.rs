//! Xray Cloud API client.
//!
//! Xray authenticates with a client id/secret pair exchanged for a bearer
//! token on first use. The exchange happens at most once per client: the
//! authentication state sits behind an async mutex that is held for the
//! duration of the handshake, so concurrent first calls wait for a single
//! `/authenticate` round-trip instead of racing.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::auth::Auth;
use super::client::{read_json_file, RestClient};
use super::error::{ApiError, Result};

/// Base URL of the Xray Cloud service.
pub const XRAY_API_BASE_URL: &str = "https://xray.cloud.getxray.app";

/// Xray API version selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XrayApiVersion {
    /// The legacy v1 API.
    V1,
    /// The current v2 API.
    #[default]
    V2,
}

impl XrayApiVersion {
    /// The version tag used in the URL path.
    pub fn as_str(&self) -> &'static str {
        match self {
            XrayApiVersion::V1 => "v1",
            XrayApiVersion::V2 => "v2",
        }
    }
}

impl fmt::Display for XrayApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The client id/secret pair issued by Xray.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
    /// The API key's client id.
    pub client_id: String,
    /// The API key's secret.
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Authentication state of an `XrayClient`.
#[derive(Debug)]
enum AuthState {
    /// No token yet.
    Unauthenticated,
    /// A bearer token is available; holds the transport carrying it.
    Authenticated(RestClient),
}

/// Client for the Xray Cloud API.
#[derive(Debug)]
pub struct XrayClient {
    /// Unauthenticated transport, used for the handshake.
    client: RestClient,
    /// Credentials exchanged for a token; `None` for token-only clients.
    credentials: Option<ClientCredentials>,
    state: Mutex<AuthState>,
}

impl XrayClient {
    /// Create a client that authenticates with an existing bearer token.
    pub fn from_token(token: &str, api_version: XrayApiVersion) -> Result<Self> {
        let client = RestClient::new(&api_url(XRAY_API_BASE_URL, api_version), None)?;
        let authed = client.with_auth(Auth::bearer(token));
        Ok(Self {
            client,
            credentials: None,
            state: Mutex::new(AuthState::Authenticated(authed)),
        })
    }

    /// Create a client that exchanges `client_id`/`client_secret` for a token
    /// on first use.
    pub fn from_id_and_secret(
        client_id: &str,
        client_secret: &str,
        api_version: XrayApiVersion,
    ) -> Result<Self> {
        Self::with_base_url(
            XRAY_API_BASE_URL,
            api_version,
            ClientCredentials {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
            },
        )
    }

    /// Create a client from a JSON file holding `client_id` and `client_secret`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or lacks either key.
    pub async fn from_id_and_secret_file(
        path: impl AsRef<Path>,
        api_version: XrayApiVersion,
    ) -> Result<Self> {
        let path = path.as_ref();
        let content = read_json_file(path).await?;
        let credentials: ClientCredentials =
            serde_json::from_value(content).map_err(|source| ApiError::InvalidJsonFile {
                path: path.to_path_buf(),
                source,
            })?;
        Self::with_base_url(XRAY_API_BASE_URL, api_version, credentials)
    }

    /// Create a client against another Xray host, e.g. a test server.
    pub fn with_base_url(
        base_url: &str,
        api_version: XrayApiVersion,
        credentials: ClientCredentials,
    ) -> Result<Self> {
        let client = RestClient::new(&api_url(base_url, api_version), None)?;
        Ok(Self {
            client,
            credentials: Some(credentials),
            state: Mutex::new(AuthState::Unauthenticated),
        })
    }

    /// Get the API base URL, including the version.
    pub fn api_url(&self) -> &str {
        self.client.api_url()
    }

    /// Whether a token has been obtained.
    pub async fn is_authenticated(&self) -> bool {
        matches!(*self.state.lock().await, AuthState::Authenticated(_))
    }

    /// Exchange the client credentials for a bearer token.
    ///
    /// Always performs the handshake, replacing any token held.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` if the client was built from a bare
    /// token, and `ApiError::Protocol` if the response is not a string.
    #[instrument(skip(self), fields(api_url = %self.client.api_url()))]
    pub async fn authenticate(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let authed = self.handshake().await?;
        *state = AuthState::Authenticated(authed);
        Ok(())
    }

    /// Import a test execution document.
    #[instrument(skip(self, execution))]
    pub async fn import_execution(&self, execution: &Value) -> Result<Value> {
        let client = self.authenticated_client().await?;
        let response = client.post("/import/execution", &[], execution.clone()).await?;
        info!("Imported test execution");
        Ok(response)
    }

    /// Import a test execution document stored as JSON at `path`.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn import_execution_from_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let client = self.authenticated_client().await?;
        let response = client
            .post_json_file("/import/execution", &[], path.as_ref())
            .await?;
        info!("Imported test execution");
        Ok(response)
    }

    /// Return an authenticated transport, authenticating first if needed.
    async fn authenticated_client(&self) -> Result<RestClient> {
        let mut state = self.state.lock().await;
        if let AuthState::Authenticated(client) = &*state {
            return Ok(client.clone());
        }

        let client = self.handshake().await?;
        *state = AuthState::Authenticated(client.clone());
        Ok(client)
    }

    /// POST the credentials to `/authenticate` and wrap the returned token.
    async fn handshake(&self) -> Result<RestClient> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            ApiError::Validation("no client id and secret to authenticate with".to_string())
        })?;

        debug!("Authenticating with Xray");
        let body = serde_json::to_value(credentials)
            .map_err(|e| ApiError::Validation(format!("Cannot serialize credentials: {}", e)))?;
        let token = match self.client.post("/authenticate", &[], body).await? {
            Value::String(token) => token,
            other => {
                return Err(ApiError::Protocol(format!(
                    "expected a token string from /authenticate, received {}",
                    other
                )))
            }
        };
        info!("Authenticated with Xray");
        Ok(self.client.with_auth(Auth::bearer(&token)))
    }
}

/// The API URL for a host and version.
fn api_url(base_url: &str, api_version: XrayApiVersion) -> String {
    format!("{}/api/{}", base_url.trim_end_matches('/'), api_version)
}
