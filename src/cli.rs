//! Command-line interface.
//!
//! Each subcommand builds a client from a configured profile (or from the
//! `JIRA_*` environment variables when no profile is configured), runs one
//! operation and prints the result as JSON on stdout.

use std::io::BufRead;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::api::{self, JiraQueryExecutor, XrayApiVersion, XrayClient};
use crate::config::{ensure_xray_credentials_file, Config, JiraEnv};
use crate::error::{AppError, Result};

/// Script-friendly access to JIRA issues and Xray imports.
#[derive(Debug, Parser)]
#[command(name = "jira-access", version, about)]
pub struct Cli {
    /// Profile from the configuration file.
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Configuration file to use instead of the default location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write log events to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a JQL query and print every matching issue.
    Search {
        /// The JQL query.
        jql: String,
        /// Comma-separated fields to return per issue.
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        /// Do not append `ORDER BY updated DESC`.
        #[arg(long)]
        no_default_order: bool,
    },
    /// Set one field of an issue.
    SetField {
        /// The issue key, e.g. PROJ-123.
        key: String,
        /// The field to update.
        field: String,
        /// The new value. Parsed as JSON when possible, otherwise sent as a string.
        value: String,
        /// Always send VALUE as a string.
        #[arg(long)]
        string: bool,
        /// Do not notify watchers.
        #[arg(long)]
        no_notify: bool,
    },
    /// Download an attachment.
    Download {
        /// The attachment JSON object, or a bare attachment id.
        attachment: String,
        /// Directory to write the file to.
        #[arg(long, default_value = ".")]
        dest: PathBuf,
        /// File name to use instead of the attachment's.
        #[arg(long)]
        filename: Option<String>,
    },
    /// Import an Xray test execution from a JSON file.
    XrayImport {
        /// The execution document.
        file: PathBuf,
        /// JSON file with `client_id` and `client_secret`. Created as a template if missing.
        #[arg(long)]
        auth_file: PathBuf,
        /// Xray API version.
        #[arg(long, value_enum)]
        api_version: Option<ApiVersionArg>,
    },
    /// Manage the API token stored in the OS keyring for a profile.
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum TokenAction {
    /// Store a token. Read from stdin when not given.
    Set {
        token: Option<String>,
    },
    /// Delete the stored token.
    Delete,
    /// Report whether a token is stored.
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ApiVersionArg {
    V1,
    V2,
}

impl From<ApiVersionArg> for XrayApiVersion {
    fn from(arg: ApiVersionArg) -> Self {
        match arg {
            ApiVersionArg::V1 => XrayApiVersion::V1,
            ApiVersionArg::V2 => XrayApiVersion::V2,
        }
    }
}

/// Run a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Search {
            ref jql,
            ref fields,
            no_default_order,
        } => {
            let executor = executor(&cli, &config)?;
            let default_order = config.settings.default_order && !no_default_order;
            let fields = (!fields.is_empty()).then_some(fields.as_slice());
            let issues = executor.execute_query(jql, fields, default_order).await?;
            print_json(&Value::Array(issues));
        }
        Command::SetField {
            ref key,
            ref field,
            ref value,
            string,
            no_notify,
        } => {
            let executor = executor(&cli, &config)?;
            let notify = config.settings.notify_users && !no_notify;
            let response = executor
                .set_field(key, field, parse_value(value, string), notify)
                .await?;
            print_json(&response);
        }
        Command::Download {
            ref attachment,
            ref dest,
            ref filename,
        } => {
            let executor = executor(&cli, &config)?;
            let attachment = parse_attachment(attachment)?;
            let path = executor
                .download_attachment(&attachment, dest, filename.as_deref())
                .await?;
            println!("{}", path.display());
        }
        Command::XrayImport {
            ref file,
            ref auth_file,
            api_version,
        } => {
            let auth_file = ensure_xray_credentials_file(auth_file)?;
            let version = api_version
                .map(XrayApiVersion::from)
                .unwrap_or(config.settings.xray_api_version);
            let xray = XrayClient::from_id_and_secret_file(&auth_file, version).await?;
            let response = xray.import_execution_from_file(file).await?;
            print_json(&response);
        }
        Command::Token { ref action } => {
            let profile = config.profile(cli.profile.as_deref())?;
            match action {
                TokenAction::Set { token } => {
                    let token = match token {
                        Some(token) => token.clone(),
                        None => read_token_from_stdin()?,
                    };
                    api::store_token(&profile.name, &token)?;
                    info!(profile = %profile.name, "Stored API token");
                }
                TokenAction::Delete => {
                    api::delete_token(&profile.name)?;
                    info!(profile = %profile.name, "Deleted API token");
                }
                TokenAction::Status => {
                    let stored = api::has_token(&profile.name);
                    print_json(&json!({"profile": profile.name, "token_stored": stored}));
                }
            }
        }
    }

    Ok(())
}

/// Build an executor from the selected profile, or from the environment
/// when no profile is configured or requested.
fn executor(cli: &Cli, config: &Config) -> Result<JiraQueryExecutor> {
    if cli.profile.is_none() && config.profiles.is_empty() {
        debug!("No profile configured, reading JIRA_* environment variables");
        let env = JiraEnv::from_env()?;
        return Ok(JiraQueryExecutor::new(env.auth()?, &env.base_url)?);
    }

    let profile = config.profile(cli.profile.as_deref())?;
    Ok(JiraQueryExecutor::from_profile(profile)?)
}

/// Interpret a command-line field value.
fn parse_value(raw: &str, force_string: bool) -> Value {
    if force_string {
        return Value::String(raw.to_string());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Accept either an attachment object or a bare id.
fn parse_attachment(raw: &str) -> Result<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(Value::String(id)) => Ok(json!({ "id": id })),
        Ok(Value::Number(id)) => Ok(json!({ "id": id.to_string() })),
        Ok(_) => Err(AppError::usage(
            "attachment must be a JSON object or an attachment id",
        )),
        Err(_) if !raw.trim().is_empty() => Ok(json!({ "id": raw.trim() })),
        Err(_) => Err(AppError::usage("attachment cannot be empty")),
    }
}

fn read_token_from_stdin() -> Result<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let token = line.trim();
    if token.is_empty() {
        return Err(AppError::usage("no token given on stdin"));
    }
    Ok(token.to_string())
}

fn print_json(value: &Value) {
    println!("{:#}", value);
}
