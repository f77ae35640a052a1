//! Authentication handling for the JIRA and Xray APIs.
//!
//! This module builds the `authorization` header for Basic Auth
//! (email + API token) and Bearer tokens, and handles secure token
//! storage via the OS keyring.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use super::error::{ApiError, Result};

/// The keyring service name for jira-access tokens.
const KEYRING_SERVICE: &str = "jira-access";

/// Credentials attached to every outgoing request.
///
/// The header value is computed once when the credentials are created and
/// reused for every request.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Basic Auth with an email and API token.
    Basic {
        /// The user's email address.
        email: String,
        /// The complete "Basic ..." header value.
        header: String,
    },
    /// An opaque bearer token.
    Bearer {
        /// The complete "Bearer ..." header value.
        header: String,
    },
}

impl Auth {
    /// Create Basic Auth credentials from email and token.
    ///
    /// The token is immediately encoded and the raw token is not stored.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::AuthEncoding` if `email:token` is not ASCII.
    pub fn basic(email: &str, token: &str) -> Result<Self> {
        let header = build_basic_header(email, token)?;
        Ok(Self::Basic {
            email: email.to_string(),
            header,
        })
    }

    /// Create Bearer credentials from a token.
    pub fn bearer(token: &str) -> Self {
        Self::Bearer {
            header: format!("Bearer {}", token),
        }
    }

    /// Get the authorization header value for HTTP requests.
    pub fn header_value(&self) -> &str {
        match self {
            Auth::Basic { header, .. } | Auth::Bearer { header } => header,
        }
    }

    /// Get the email address, for Basic Auth.
    pub fn email(&self) -> Option<&str> {
        match self {
            Auth::Basic { email, .. } => Some(email),
            Auth::Bearer { .. } => None,
        }
    }

    /// The scheme name, as used in the header.
    pub fn scheme(&self) -> &'static str {
        match self {
            Auth::Basic { .. } => "Basic",
            Auth::Bearer { .. } => "Bearer",
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic { email, .. } => f
                .debug_struct("Basic")
                .field("email", email)
                .finish_non_exhaustive(),
            Auth::Bearer { .. } => f.debug_struct("Bearer").finish_non_exhaustive(),
        }
    }
}

/// Build the Basic Auth header value.
///
/// Encodes "email:token" in Base64 and prepends "Basic ".
fn build_basic_header(email: &str, token: &str) -> Result<String> {
    let credentials = format!("{}:{}", email, token);
    if !credentials.is_ascii() {
        return Err(ApiError::AuthEncoding(
            "email and token must be ASCII".to_string(),
        ));
    }
    let encoded = BASE64.encode(credentials.as_bytes());
    Ok(format!("Basic {}", encoded))
}

/// Store an API token in the OS keyring.
///
/// # Arguments
///
/// * `profile_name` - The profile name to use as the keyring username
/// * `token` - The API token to store
///
/// # Errors
///
/// Returns an error if the token cannot be stored in the keyring.
pub fn store_token(profile_name: &str, token: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, profile_name)
        .map_err(|e| ApiError::Keyring(format!("failed to create keyring entry: {}", e)))?;

    entry
        .set_password(token)
        .map_err(|e| ApiError::Keyring(format!("failed to store token: {}", e)))?;

    Ok(())
}

/// Retrieve an API token from the OS keyring.
///
/// # Errors
///
/// Returns an error if the token cannot be retrieved from the keyring.
pub fn get_token(profile_name: &str) -> Result<String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, profile_name)
        .map_err(|e| ApiError::Keyring(format!("failed to access keyring: {}", e)))?;

    entry
        .get_password()
        .map_err(|e| ApiError::Keyring(format!("failed to retrieve token: {}", e)))
}

/// Delete an API token from the OS keyring.
///
/// # Errors
///
/// Returns an error if the token cannot be deleted from the keyring.
pub fn delete_token(profile_name: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, profile_name)
        .map_err(|e| ApiError::Keyring(format!("failed to access keyring: {}", e)))?;

    entry
        .delete_password()
        .map_err(|e| ApiError::Keyring(format!("failed to delete token: {}", e)))?;

    Ok(())
}

/// Check if a token exists in the OS keyring for a profile.
pub fn has_token(profile_name: &str) -> bool {
    get_token(profile_name).is_ok()
}
