//! Fingerprint identity server.
//!
//! `serve` runs the HTTP API; `clean` purges expired reset tokens, scope
//! groupings and empty sessions, then exits.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Error, bail};
use chrono::Utc;
use fingerprint::{Deadline, IdentityManager, db::Database};
use fp_server::{api, config::ServerConfig, logging};
use pico_args::Arguments;
use tracing::{info, warn};

const HELP: &str = "\
Run the fingerprint identity server

USAGE:
  fp_server [COMMAND] [OPTIONS]

COMMANDS:
  serve                    Serve the HTTP API  [default]
  clean                    Purge expired reset tokens, scope groupings and empty sessions

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL             PostgreSQL connection string (required unless --db-url)
  SEALING_KEY              Hex-encoded 32-byte token sealing key (required)
  SEALING_KEY_ID           Key id written into token footers
  PREVIOUS_SEALING_KEYS    Comma-separated kid:hex keys still accepted when opening
  PASSWORD_PEPPER          Password hashing pepper (required)
  REQUEST_DEADLINE_SECS    Per-request deadline  [default: 10]
  (See .env.example for all configuration options)
";

enum Command {
    Serve,
    Clean,
}

struct Args {
    command: Command,
    bind: Option<SocketAddr>,
    database_url: Option<String>,
}

fn parse_args() -> Result<Args, Error> {
    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let command = match pargs.subcommand()?.as_deref() {
        None | Some("serve") => Command::Serve,
        Some("clean") => Command::Clean,
        Some(other) => bail!("Unknown command '{other}'. See --help"),
    };

    let args = Args {
        command,
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        bail!("Unexpected arguments: {remaining:?}");
    }

    Ok(args)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let args = parse_args()?;

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url)?;
    config.validate()?;

    info!("Connecting to database");
    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected successfully");

    db.migrate()
        .await
        .context("Failed to apply database migrations")?;

    let identity = Arc::new(config.identity_manager(Arc::new(db.identity_store()))?);

    let result = match args.command {
        Command::Serve => serve(&config, identity).await,
        Command::Clean => clean(&config, &identity).await,
    };

    db.close().await;
    result
}

async fn serve(config: &ServerConfig, identity: Arc<IdentityManager>) -> Result<(), Error> {
    let app = api::create_router(api::AppState {
        identity,
        request_deadline: config.request_deadline,
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    Ok(())
}

async fn clean(config: &ServerConfig, identity: &IdentityManager) -> Result<(), Error> {
    let report = identity
        .purge_expired(Utc::now(), Deadline::after(config.request_deadline))
        .await
        .context("Purge failed")?;

    info!(
        reset_tokens = report.reset_tokens,
        scope_groupings = report.scope_groupings,
        sessions = report.sessions,
        "Removed {} expired row(s)",
        report.total()
    );
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C, shutting down: {}", e);
    }
}
