//! jira-access - a client library for the JIRA REST API and Xray imports.
//!
//! The core is [`api::JiraQueryExecutor`], which runs paginated JQL searches,
//! updates issue fields and downloads attachments, and [`api::XrayClient`],
//! which imports test executions into Xray Cloud.
//!
//! ```no_run
//! use jira_access::api::JiraQueryExecutor;
//!
//! # async fn example() -> jira_access::api::Result<()> {
//! let executor = JiraQueryExecutor::from_mail_and_token(
//!     "user@example.com",
//!     "api-token",
//!     "https://company.atlassian.net",
//! )?;
//! let issues = executor
//!     .execute_query("project = TES AND assignee = currentuser()", None, true)
//!     .await?;
//! println!("{} issues", issues.len());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
