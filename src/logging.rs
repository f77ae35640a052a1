//! Logging configuration using the tracing ecosystem.
//!
//! Log events always go to a daily-rotated file. With `--verbose` they are
//! also written to stderr, leaving stdout to command output.

use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Default log level if RUST_LOG is not set.
const DEFAULT_LOG_FILTER: &str = "jira_access=info,warn";

/// Initialize the logging system.
///
/// Sets up tracing with:
/// - Daily rotating file appender in the user's local data directory
/// - Log level configuration via `RUST_LOG` environment variable
/// - A stderr layer when `verbose` is set
///
/// # Log Directory
///
/// - Linux: `~/.local/share/jira-access/logs/`
/// - macOS: `~/Library/Application Support/jira-access/logs/`
/// - Windows: `C:\Users\<User>\AppData\Local\jira-access\logs\`
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or the
/// subscriber cannot be installed.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "jira-access.log");

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let stderr_layer = verbose.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
    });

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(stderr_layer)
        .with(filter);

    tracing::subscriber::set_global_default(subscriber)?;

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), log_dir = %log_dir.display(), "jira-access starting");

    Ok(())
}

/// Get the log directory path.
fn get_log_directory() -> anyhow::Result<PathBuf> {
    let base_dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine local data directory"))?;

    Ok(base_dir.join("jira-access").join("logs"))
}

/// Get the path where logs are stored.
pub fn log_directory() -> Option<PathBuf> {
    get_log_directory().ok()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_has_expected_structure() {
        let dir = get_log_directory().unwrap();
        assert!(dir.ends_with("jira-access/logs"));
    }

    #[test]
    fn test_log_directory_public_function() {
        let dir = log_directory();
        assert!(dir.is_some());
    }
}
