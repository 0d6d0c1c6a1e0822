mod app;
mod commands;
mod render;

use std::process::ExitCode;

use murmur_chat::settings::SettingsStore;
use tracing_subscriber::EnvFilter;

use crate::app::TerminalApp;

/// Terminal chat host.
///
/// Logs go to stderr (`RUST_LOG`, default `info`) so the transcript on stdout stays
/// readable. Settings come from the user config directory with `MURMUR_*`
/// environment overrides.
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings_store = SettingsStore::load();
    tracing::debug!(path = ?settings_store.config_path(), "settings loaded");

    let result = match TerminalApp::new(settings_store) {
        Ok(app) => app.run().await,
        Err(error) => Err(error),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "murmur exited with an error");
            ExitCode::FAILURE
        }
    }
}
