//! Coursebook - a command line client for the course-learning platform.
//!
//! Browse the catalogue, enroll, track progress and manage your profile
//! from the terminal. The session survives between runs and the access
//! token is renewed automatically.

mod commands;
mod render;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use coursebook_core::auth::{open_token_store, Navigator};
use coursebook_core::{Config, CourseClient, SessionManager};

use commands::{Cli, Command};

/// Directory for an optional daily log file
const ENV_LOG_DIR: &str = "COURSEBOOK_LOG_DIR";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "coursebook.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// Terminal stand-in for page navigation.
struct CliNavigator {
    login_route: String,
}

impl Navigator for CliNavigator {
    fn redirect(&self, route: &str) {
        debug!(route, "Redirect");
        if route == self.login_route {
            eprintln!("Your session has ended. Run `coursebook login` to sign in again.");
        } else {
            eprintln!("Logged out.");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let _log_guard = init_tracing();
    info!("Coursebook starting");

    let mut config = Config::load()?;
    if let Some(ref url) = cli.api_url {
        config.api_base_url = url.clone();
    }
    debug!(api = %config.api_base_url, storage = ?config.token_storage, "Config loaded");

    let store = open_token_store(&config)?;
    let navigator = Arc::new(CliNavigator {
        login_route: config.login_route.clone(),
    });
    let session = SessionManager::new(config.clone(), store, navigator)?;

    // A restored token already inside the renewal window gets no timer, so
    // renew it before the first request instead of waiting for a 401.
    if session.renewal_due() && !matches!(cli.command, Command::Logout | Command::Login { .. }) {
        debug!("Stored access token due for renewal");
        session.renew().await;
    }

    let client = CourseClient::new(session);
    let result = commands::run(cli.command, &client, &mut config).await;

    if let Err(ref e) = result {
        if let Some(api_err) = e.downcast_ref::<coursebook_core::ApiError>() {
            if api_err.is_auth_error() {
                eprintln!("Not logged in. Run `coursebook login` first.");
            }
        }
    }

    info!("Coursebook shutting down");
    result
}
