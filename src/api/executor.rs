//! JQL query execution against the JIRA REST API.
//!
//! `JiraQueryExecutor` runs paginated searches, updates single issue fields
//! and downloads attachments through the `latest` REST API.

use std::path::{Component, Path, PathBuf};

use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::auth::{get_token, Auth};
use super::client::RestClient;
use super::error::{ApiError, Result};
use super::search::{apply_default_order, collect_pages, MAX_RESULTS_PER_REQUEST};
use crate::config::{AuthMethod, Profile};

/// Path of the REST API below the JIRA base URL.
pub const API_PATH: &str = "/rest/api/latest";

/// Write buffer size for attachment downloads.
const DOWNLOAD_CHUNK_SIZE: usize = 1024;

/// Executes JQL queries and issue operations.
#[derive(Debug, Clone)]
pub struct JiraQueryExecutor {
    client: RestClient,
}

impl JiraQueryExecutor {
    /// Create an executor for the JIRA instance at `jira_url`.
    ///
    /// # Arguments
    ///
    /// * `auth` - The credentials to send with every request
    /// * `jira_url` - The JIRA server URL (e.g. "https://jira.myhost.com")
    pub fn new(auth: Auth, jira_url: &str) -> Result<Self> {
        let api_url = format!("{}{}", jira_url.trim_end_matches('/'), API_PATH);
        debug!(api_url = %api_url, scheme = auth.scheme(), "Creating JIRA executor");
        Ok(Self {
            client: RestClient::new(&api_url, Some(auth))?,
        })
    }

    /// Create an executor authenticating with a bearer token.
    pub fn from_token(access_token: &str, jira_url: &str) -> Result<Self> {
        Self::new(Auth::bearer(access_token), jira_url)
    }

    /// Create an executor authenticating with email and API token.
    pub fn from_mail_and_token(mail: &str, token: &str, jira_url: &str) -> Result<Self> {
        Self::new(Auth::basic(mail, token)?, jira_url)
    }

    /// Create an executor from a profile, reading the token from the OS keyring.
    #[instrument(skip(profile), fields(profile_name = %profile.name))]
    pub fn from_profile(profile: &Profile) -> Result<Self> {
        info!("Creating JIRA executor for profile");
        let token = get_token(&profile.name)?;
        Self::new(profile_auth(profile, &token)?, &profile.url)
    }

    /// Execute a JQL query and return every matching issue.
    ///
    /// Pages of `MAX_RESULTS_PER_REQUEST` issues are requested until the
    /// total declared by the server is reached.
    ///
    /// # Arguments
    ///
    /// * `query` - The JQL to be executed
    /// * `fields` - The fields to return per issue; `None` for the server default
    /// * `default_order` - Append `ORDER BY updated DESC` to the query
    ///
    /// # Errors
    ///
    /// Returns `ApiError::CountMismatch` if the number of issues gathered
    /// differs from the last total the server declared.
    #[instrument(skip(self, fields), fields(jql = %query))]
    pub async fn execute_query(
        &self,
        query: &str,
        fields: Option<&[String]>,
        default_order: bool,
    ) -> Result<Vec<Value>> {
        let jql = apply_default_order(query, default_order);
        let fields = fields
            .filter(|fields| !fields.is_empty())
            .map(|fields| fields.join(","));

        let issues = collect_pages(|start_at| {
            let mut params = vec![
                ("jql", jql.clone()),
                ("maxResults", MAX_RESULTS_PER_REQUEST.to_string()),
                ("startAt", start_at.to_string()),
            ];
            if let Some(fields) = &fields {
                params.push(("fields", fields.clone()));
            }
            debug!("Searching issues: startAt={}", start_at);
            async move { self.client.get("/search", &params).await }
        })
        .await?;

        info!("Query returned {} issues", issues.len());
        Ok(issues)
    }

    /// Fetch a single issue.
    #[instrument(skip(self, fields), fields(issue_key = %key))]
    pub async fn get_issue(&self, key: &str, fields: Option<&[String]>) -> Result<Value> {
        let mut params = Vec::new();
        if let Some(fields) = fields.filter(|fields| !fields.is_empty()) {
            params.push(("fields", fields.join(",")));
        }
        self.client
            .get(&format!("/issue/{}", urlencoding::encode(key)), &params)
            .await
    }

    /// Set the value of one field of an issue.
    ///
    /// # Arguments
    ///
    /// * `issue_key` - The key of the issue (e.g., "PROJ-123")
    /// * `field` - The field to update
    /// * `value` - The new value, any JSON value
    /// * `notify_users` - Whether watchers are notified of the change
    ///
    /// # Returns
    ///
    /// The response body, `null` when the server sends none.
    #[instrument(skip(self, value))]
    pub async fn set_field(
        &self,
        issue_key: &str,
        field: &str,
        value: impl Into<Value>,
        notify_users: bool,
    ) -> Result<Value> {
        let body = field_update(field, value.into());
        let params = [("notifyUsers", notify_users.to_string())];

        let response = self
            .client
            .put(
                &format!("/issue/{}", urlencoding::encode(issue_key)),
                &params,
                body,
            )
            .await?;

        info!("Updated field");
        Ok(response)
    }

    /// Download an issue attachment into `destination`.
    ///
    /// # Arguments
    ///
    /// * `attachment` - The attachment object as returned in issue fields
    /// * `destination` - Directory the file is written to
    /// * `filename` - File name to use instead of the attachment's own
    ///
    /// # Returns
    ///
    /// The path of the written file. An existing file is overwritten.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` if the attachment has no id, or if the
    /// file name is missing, empty or not a plain name inside `destination`.
    /// No request is sent in that case.
    #[instrument(skip(self, attachment, destination))]
    pub async fn download_attachment(
        &self,
        attachment: &Value,
        destination: impl AsRef<Path>,
        filename: Option<&str>,
    ) -> Result<PathBuf> {
        let id = attachment_id(attachment)?;
        let filename = attachment_filename(attachment, filename)?;
        let output = destination.as_ref().join(filename);

        let mut stream = self
            .client
            .get_stream(&format!("/attachment/content/{}", urlencoding::encode(&id)), &[])
            .await?;
        let expected = stream.content_length();
        debug!(path = %output.display(), expected = ?expected, "Writing attachment");

        let file = tokio::fs::File::create(&output).await?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, file);
        let mut written = 0u64;
        while let Some(chunk) = stream.next_chunk().await? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        if let Some(expected) = expected.filter(|&expected| expected != written) {
            warn!(expected, written, "Attachment size differs from Content-Length");
        }

        info!(path = %output.display(), bytes = written, "Downloaded attachment");
        Ok(output)
    }
}

/// Credentials for a profile's auth method.
fn profile_auth(profile: &Profile, token: &str) -> Result<Auth> {
    match (profile.auth, profile.email.as_deref()) {
        (AuthMethod::Basic, Some(email)) => Auth::basic(email, token),
        (AuthMethod::Basic, None) => Err(ApiError::Validation(format!(
            "profile '{}' uses basic auth but has no email",
            profile.name
        ))),
        (AuthMethod::Bearer, _) => Ok(Auth::bearer(token)),
    }
}

/// Build the update document setting `field` to `value`.
fn field_update(field: &str, value: Value) -> Value {
    json!({ "update": { field: [{ "set": value }] } })
}

/// Read the attachment id, which JIRA sends as a string but may be a number.
fn attachment_id(attachment: &Value) -> Result<String> {
    if !attachment.is_object() {
        return Err(ApiError::Validation(
            "The attachment object is invalid".to_string(),
        ));
    }
    match attachment.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(ApiError::Validation("The attachment has no id".to_string())),
    }
}

/// Pick the file name for an attachment download.
///
/// An empty explicit name falls back to the attachment's own. The result
/// must be a single normal path component.
fn attachment_filename(attachment: &Value, explicit: Option<&str>) -> Result<String> {
    let name = match explicit.filter(|name| !name.is_empty()) {
        Some(name) => name,
        None => attachment
            .get("filename")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::Validation("The attachment has no filename".to_string()))?,
    };

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name.to_string()),
        _ => Err(ApiError::Validation(format!(
            "Invalid attachment file name '{}'",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use super::*;
    use crate::logging::capture::CapturedLogs;

    fn executor(server: &MockServer) -> JiraQueryExecutor {
        JiraQueryExecutor::from_mail_and_token("a@b.com", "tok", &format!("{}/", server.uri()))
            .unwrap()
    }

    fn issues(range: std::ops::Range<usize>) -> Vec<Value> {
        range.map(|i| json!({"key": format!("TES-{}", i)})).collect()
    }

    /// Respond to `/search` by slicing `total` synthetic issues at `startAt`.
    fn paged_search(total: usize) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync {
        move |request: &Request| {
            let start_at: usize = request
                .url
                .query_pairs()
                .find(|(k, _)| k == "startAt")
                .and_then(|(_, v)| v.parse().ok())
                .unwrap_or(0);
            let end = (start_at + MAX_RESULTS_PER_REQUEST).min(total);
            let start_at = start_at.min(end);
            ResponseTemplate::new(200).set_body_json(json!({
                "startAt": start_at,
                "maxResults": MAX_RESULTS_PER_REQUEST,
                "total": total,
                "issues": issues(start_at..end),
            }))
        }
    }

    #[test]
    fn test_field_update_document() {
        assert_eq!(
            field_update("summary", json!("new title")),
            json!({"update": {"summary": [{"set": "new title"}]}})
        );
        assert_eq!(
            field_update("labels", json!(["a", "b"])),
            json!({"update": {"labels": [{"set": ["a", "b"]}]}})
        );
    }

    #[test]
    fn test_profile_auth() {
        let mut profile = Profile::new(
            "work".to_string(),
            "https://company.atlassian.net".to_string(),
            Some("a@b.com".to_string()),
        );
        assert_eq!(
            profile_auth(&profile, "tok").unwrap().header_value(),
            "Basic YUBiLmNvbTp0b2s="
        );

        profile.auth = AuthMethod::Bearer;
        assert_eq!(profile_auth(&profile, "tok").unwrap().header_value(), "Bearer tok");

        profile.auth = AuthMethod::Basic;
        profile.email = None;
        assert!(matches!(
            profile_auth(&profile, "tok"),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_attachment_id() {
        assert_eq!(attachment_id(&json!({"id": "10001"})).unwrap(), "10001");
        assert_eq!(attachment_id(&json!({"id": 10001})).unwrap(), "10001");
        assert!(matches!(
            attachment_id(&json!({"filename": "a.txt"})),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            attachment_id(&Value::Null),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_attachment_filename() {
        let attachment = json!({"id": "1", "filename": "a.txt"});
        assert_eq!(attachment_filename(&attachment, None).unwrap(), "a.txt");
        assert_eq!(attachment_filename(&attachment, Some("b.txt")).unwrap(), "b.txt");
        assert_eq!(attachment_filename(&attachment, Some("")).unwrap(), "a.txt");

        for name in ["../escaped.txt", "/tmp/abs.txt", "sub/a.txt", "..", "."] {
            assert!(
                matches!(
                    attachment_filename(&attachment, Some(name)),
                    Err(ApiError::Validation(_))
                ),
                "{} should be rejected",
                name
            );
        }
        assert!(matches!(
            attachment_filename(&json!({"id": "1", "filename": ""}), None),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            attachment_filename(&json!({"id": "1", "filename": "../x"}), Some("")),
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_query_aggregates_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/latest/search"))
            .and(query_param("jql", "project = TES ORDER BY updated DESC"))
            .and(query_param("maxResults", "100"))
            .and(header("authorization", "Basic YUBiLmNvbTp0b2s="))
            .respond_with(paged_search(230))
            .expect(3)
            .mount(&server)
            .await;

        let result = executor(&server)
            .execute_query("project = TES", None, true)
            .await
            .unwrap();

        assert_eq!(result, issues(0..230));
    }

    #[tokio::test]
    async fn test_execute_query_sends_fields_without_default_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/latest/search"))
            .and(query_param("jql", "project = TES"))
            .and(query_param("fields", "summary,status"))
            .and(query_param("startAt", "0"))
            .respond_with(paged_search(2))
            .expect(1)
            .mount(&server)
            .await;

        let fields = vec!["summary".to_string(), "status".to_string()];
        let result = executor(&server)
            .execute_query("project = TES", Some(fields.as_slice()), false)
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_execute_query_omits_fields_when_not_given() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/latest/search"))
            .and(query_param_is_missing("fields"))
            .respond_with(paged_search(0))
            .expect(1)
            .mount(&server)
            .await;

        let result = executor(&server)
            .execute_query("project = TES", None, false)
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_execute_query_is_repeatable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/latest/search"))
            .respond_with(paged_search(150))
            .mount(&server)
            .await;

        let executor = executor(&server);
        let first = executor.execute_query("project = TES", None, true).await.unwrap();
        let second = executor.execute_query("project = TES", None, true).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_execute_query_empty_page_with_positive_total_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("startAt", "0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"issues": issues(0..3), "total": 5})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("startAt", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"issues": [], "total": 5})))
            .expect(1)
            .mount(&server)
            .await;

        let (logs, _guard) = CapturedLogs::start();
        let err = executor(&server)
            .execute_query("project = TES", None, true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::CountMismatch {
                retrieved: 3,
                total: 5
            }
        ));
        assert!(
            logs.warnings()
                .iter()
                .any(|line| line.contains("start_at=3") && line.contains("total=5")),
            "{}",
            logs.contents()
        );
    }

    #[tokio::test]
    async fn test_execute_query_bad_jql_is_query_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"errorMessages": ["Error in the JQL Query"]})),
            )
            .mount(&server)
            .await;

        let err = executor(&server)
            .execute_query("project = = TES", None, false)
            .await
            .unwrap_err();
        match err {
            ApiError::Query { params, .. } => {
                assert!(params.contains(&("jql".to_string(), "project = = TES".to_string())));
                assert!(params.contains(&("startAt".to_string(), "0".to_string())));
            }
            other => panic!("Expected Query error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_set_field_puts_update_document() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/rest/api/latest/issue/KEY-1"))
            .and(query_param("notifyUsers", "true"))
            .and(body_json(json!({"update": {"summary": [{"set": "new title"}]}})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let response = executor(&server)
            .set_field("KEY-1", "summary", "new title", true)
            .await
            .unwrap();
        assert_eq!(response, Value::Null);
    }

    #[tokio::test]
    async fn test_set_field_without_notification() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(query_param("notifyUsers", "false"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        executor(&server)
            .set_field("KEY-1", "priority", json!({"name": "High"}), false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_issue() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/latest/issue/KEY-1"))
            .and(query_param("fields", "summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"key": "KEY-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let fields = vec!["summary".to_string()];
        let issue = executor(&server).get_issue("KEY-1", Some(fields.as_slice())).await.unwrap();
        assert_eq!(issue["key"], "KEY-1");
    }

    #[tokio::test]
    async fn test_download_attachment_writes_file() {
        let server = MockServer::start().await;
        let content: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        Mock::given(method("GET"))
            .and(path("/rest/api/latest/attachment/content/10001"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let attachment = json!({"id": "10001", "filename": "report.bin"});
        let output = executor(&server)
            .download_attachment(&attachment, dir.path(), None)
            .await
            .unwrap();

        assert_eq!(output, dir.path().join("report.bin"));
        assert_eq!(std::fs::read(&output).unwrap(), content);
    }

    #[tokio::test]
    async fn test_download_attachment_overwrites_with_explicit_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/latest/attachment/content/7"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("renamed.txt");
        std::fs::write(&target, b"previous content that is longer").unwrap();

        let output = executor(&server)
            .download_attachment(&json!({"id": "7"}), dir.path(), Some("renamed.txt"))
            .await
            .unwrap();

        assert_eq!(output, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_download_attachment_requires_filename() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let err = executor(&server)
            .download_attachment(&json!({"id": "10001"}), dir.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_attachment_rejects_names_outside_destination() {
        let server = MockServer::start().await;
        let root = tempfile::tempdir().unwrap();
        let dest = root.path().join("dest");
        std::fs::create_dir(&dest).unwrap();
        let absolute = root.path().join("abs.txt");

        let escaping = json!({"id": "1", "filename": "../escaped.txt"});
        let err = executor(&server)
            .download_attachment(&escaping, &dest, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = executor(&server)
            .download_attachment(&json!({"id": "1"}), &dest, absolute.to_str())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        assert!(!root.path().join("escaped.txt").exists());
        assert!(!absolute.exists());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_attachment_empty_name_uses_attachment_filename() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/latest/attachment/content/1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = executor(&server)
            .download_attachment(&json!({"id": "1", "filename": "a.txt"}), dir.path(), Some(""))
            .await
            .unwrap();

        assert_eq!(output, dir.path().join("a.txt"));
        assert_eq!(std::fs::read(&output).unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_download_attachment_empty_attachment_filename_sends_nothing() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let err = executor(&server)
            .download_attachment(&json!({"id": "1", "filename": ""}), dir.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_attachment_requires_id() {
        let server = MockServer::start().await;
        let err = executor(&server)
            .download_attachment(&json!({"filename": "a.txt"}), "/tmp", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_download_attachment_http_error_creates_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = executor(&server)
            .download_attachment(&json!({"id": "1", "filename": "a.txt"}), dir.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Http { .. }));
        assert!(!dir.path().join("a.txt").exists());
    }
}
