//! Default settings applied to every command.

use serde::{Deserialize, Serialize};

use crate::api::XrayApiVersion;

/// Settings from the `[settings]` table of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// The name of the default profile to use.
    pub default_profile: Option<String>,
    /// Whether searches are ordered by `updated DESC` unless told otherwise.
    pub default_order: bool,
    /// Whether field updates notify watchers unless told otherwise.
    pub notify_users: bool,
    /// The Xray API version used for imports.
    pub xray_api_version: XrayApiVersion,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_profile: None,
            default_order: true,
            notify_users: true,
            xray_api_version: XrayApiVersion::default(),
        }
    }
}
