//! JIRA and Xray API clients.
//!
//! This module provides the interface for communicating with the JIRA REST API
//! and the Xray Cloud import API.

mod auth;
mod client;
pub mod error;
mod executor;
pub mod search;
mod xray;

pub use auth::{delete_token, get_token, has_token, store_token, Auth};
pub use client::{ByteStream, Payload, RestClient, REQUEST_TIMEOUT_SECS};
pub use error::{ApiError, Result};
pub use executor::{JiraQueryExecutor, API_PATH};
pub use xray::{ClientCredentials, XrayApiVersion, XrayClient, XRAY_API_BASE_URL};
