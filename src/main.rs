//! jira-access - command-line access to JIRA issues and Xray imports.

use std::process::ExitCode;

use clap::Parser;

use jira_access::cli::{self, Cli};
use jira_access::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("warning: logging disabled: {}", e);
    }

    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", err);
            eprintln!("error: {}", err.user_message());
            if let Some(action) = err.suggested_action() {
                eprintln!("hint: {}", action);
            }
            if let Some(dir) = logging::log_directory() {
                eprintln!("logs: {}", dir.display());
            }
            ExitCode::from(err.exit_code())
        }
    }
}
