//! HTTP transport for the JIRA and Xray REST APIs.
//!
//! This module performs single request/response exchanges against an API
//! base URL: it attaches the standard JSON headers and the credentials,
//! enforces the request timeout, and turns HTTP failures into typed errors.
//! Nothing here retries.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::auth::Auth;
use super::error::{ApiError, Result};

/// Request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

/// A request body.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Serialized to JSON before sending.
    Json(Value),
    /// Sent unchanged.
    Raw(Bytes),
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Raw(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Raw(Bytes::from(bytes))
    }
}

/// A lazily consumed response body.
///
/// Dropping the stream closes the underlying connection.
#[derive(Debug)]
pub struct ByteStream {
    response: Response,
}

impl ByteStream {
    /// Read the next chunk of the body, or `None` once it is exhausted.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.response.chunk().await?)
    }

    /// The body length announced by the server, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }
}

/// The REST transport client.
///
/// Bound to one API base URL for its lifetime. Cloning is cheap: the
/// underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct RestClient {
    /// The HTTP client.
    client: Client,
    /// The API base URL, without trailing slash.
    api_url: String,
    /// Credentials, if the API requires them.
    auth: Option<Auth>,
    /// Headers sent with every request.
    headers: HeaderMap,
}

impl RestClient {
    /// Create a client for the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_url: &str, auth: Option<Auth>) -> Result<Self> {
        Ok(Self {
            client: Self::build_http_client()?,
            api_url: normalize_base_url(api_url),
            auth,
            headers: default_headers(),
        })
    }

    /// Build the HTTP client with appropriate settings.
    fn build_http_client() -> Result<Client> {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(ApiError::Network)
    }

    /// A copy of this client that authenticates with `auth`.
    pub fn with_auth(&self, auth: Auth) -> Self {
        Self {
            auth: Some(auth),
            ..self.clone()
        }
    }

    /// Replace the standard `Accept`/`Content-Type` headers.
    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Get the API base URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Get the credentials, if any.
    pub fn auth(&self) -> Option<&Auth> {
        self.auth.as_ref()
    }

    /// Perform a GET request and parse the JSON response.
    #[instrument(skip(self, params))]
    pub async fn get(&self, action: &str, params: &[(&str, String)]) -> Result<Value> {
        let response = self.send(Method::GET, action, params, None).await?;
        parse_body(response).await
    }

    /// Perform a GET request and return the body as a stream.
    #[instrument(skip(self, params))]
    pub async fn get_stream(&self, action: &str, params: &[(&str, String)]) -> Result<ByteStream> {
        let response = self.send(Method::GET, action, params, None).await?;
        Ok(ByteStream { response })
    }

    /// Perform a POST request and parse the JSON response.
    #[instrument(skip(self, params, body))]
    pub async fn post(
        &self,
        action: &str,
        params: &[(&str, String)],
        body: impl Into<Payload>,
    ) -> Result<Value> {
        let response = self
            .send(Method::POST, action, params, Some(body.into()))
            .await?;
        parse_body(response).await
    }

    /// Perform a PUT request and parse the JSON response.
    #[instrument(skip(self, params, body))]
    pub async fn put(
        &self,
        action: &str,
        params: &[(&str, String)],
        body: impl Into<Payload>,
    ) -> Result<Value> {
        let response = self
            .send(Method::PUT, action, params, Some(body.into()))
            .await?;
        parse_body(response).await
    }

    /// POST the JSON document stored at `path`.
    pub async fn post_json_file(
        &self,
        action: &str,
        params: &[(&str, String)],
        path: impl AsRef<Path>,
    ) -> Result<Value> {
        let body = read_json_file(path.as_ref()).await?;
        self.post(action, params, body).await
    }

    /// PUT the JSON document stored at `path`.
    pub async fn put_json_file(
        &self,
        action: &str,
        params: &[(&str, String)],
        path: impl AsRef<Path>,
    ) -> Result<Value> {
        let body = read_json_file(path.as_ref()).await?;
        self.put(action, params, body).await
    }

    /// Execute a single request and check its status.
    async fn send(
        &self,
        method: Method,
        action: &str,
        params: &[(&str, String)],
        payload: Option<Payload>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.api_url, action);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .headers(self.headers.clone())
            .query(params);

        if let Some(auth) = &self.auth {
            request = request.header(header::AUTHORIZATION, auth.header_value());
        }

        request = match payload {
            Some(Payload::Json(value)) => request.body(
                serde_json::to_vec(&value)
                    .map_err(|e| ApiError::Validation(format!("Cannot serialize body: {}", e)))?,
            ),
            Some(Payload::Raw(bytes)) => request.body(bytes),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(status = %status, error = %e, "Failed to read error response body");
                String::new()
            }
        };
        debug!("Error response body: {}", body);

        let params: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Err(ApiError::from_response_parts(status, &url, body, &params))
    }
}

/// The headers every request carries unless overridden.
fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers
}

/// Parse a response body as JSON. An empty body is `null`.
async fn parse_body(response: Response) -> Result<Value> {
    let bytes = response.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::MalformedResponse(format!("Failed to parse response: {}", e)))
}

/// Load a JSON document from disk.
pub(crate) async fn read_json_file(path: &Path) -> Result<Value> {
    let content = tokio::fs::read(path).await?;
    serde_json::from_slice(&content).map_err(|source| ApiError::InvalidJsonFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Normalize the base URL by removing trailing slashes.
pub(crate) fn normalize_base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');

    // Warn if not HTTPS (but don't enforce for localhost/testing)
    if !url.starts_with("https://") && !url.contains("localhost") && !url.contains("127.0.0.1") {
        warn!("URL does not use HTTPS: {}. This is insecure for production use.", url);
    }

    url.to_string()
}
