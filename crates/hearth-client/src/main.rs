//! hearth CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use hearth_core::{TracingConfig, init_tracing};

use hearth_client::cli::{AuthAction, Cli, Command};
use hearth_client::commands;
use hearth_client::config::ClientConfig;
use hearth_client::error::{ClientError, ClientResult};
use hearth_client::App;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing = if cli.debug {
        TracingConfig::cli_debug()
    } else if matches!(cli.command, Command::Daemon) {
        TracingConfig::daemon()
    } else {
        TracingConfig::default()
    };
    if let Err(e) = init_tracing(tracing) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ ClientError::AuthRequired(_)) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };
    let app = App::build(config)?;

    match cli.command {
        Command::Sync => commands::sync::run(&app).await,
        Command::Select { calendar_id } => commands::calendar::select(&app, &calendar_id),
        Command::Deselect => commands::calendar::deselect(&app),
        Command::Calendars { json } => commands::calendar::list(&app, json).await,
        Command::Status { json } => commands::status::run(&app, json),
        Command::Today { watch, json } => commands::today::run(&app, watch, json).await,
        Command::Auth { action } => match action {
            AuthAction::Token {
                access_token,
                refresh_token,
                expires_in,
            } => commands::auth::store_token(&app, &access_token, refresh_token, expires_in),
            AuthAction::Logout => commands::auth::logout(&app),
        },
        Command::Daemon => commands::daemon::run(&app).await,
    }
}
