//! qcrm-api - Qualify CRM HTTP server
//!
//! Loads configuration, opens (and migrates) the SQLite database, creates
//! the bootstrap admin on first start and serves the JSON API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use qcrm_api::{build_router, AppState};
use qcrm_common::config::load_config;
use qcrm_common::db::{init_database, profiles, RetryPolicy};
use qcrm_common::integrations::{HttpTranscriber, LogNotifier, Transcriber};
use qcrm_common::qualification::SessionStore;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "qcrm-api", version, about = "Qualify CRM HTTP server")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<String>,

    /// Address to listen on (overrides the config file)
    #[arg(long, env = "QCRM_BIND")]
    bind: Option<String>,

    /// SQLite database path (overrides the config file)
    #[arg(long, env = "QCRM_DATABASE")]
    database: Option<String>,

    /// Email of the admin created when no profiles exist
    #[arg(long, env = "QCRM_BOOTSTRAP_ADMIN")]
    bootstrap_admin: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise start at info and switch to the configured
    // level once the config file has been read
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) = reload::Layer::new(
        env_filter.unwrap_or_else(|| tracing_subscriber::EnvFilter::new("info")),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Qualify CRM API (qcrm-api) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut config =
        load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if !from_env {
        filter_handle
            .reload(tracing_subscriber::EnvFilter::new(&config.logging.level))
            .context("Failed to apply configured log level")?;
    }

    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(database) = args.database {
        config.database.path = database.into();
    }
    if let Some(email) = args.bootstrap_admin {
        config.bootstrap.admin_email = Some(email);
    }

    info!("Database path: {}", config.database.path.display());
    let pool = match init_database(&config.database.path, config.database.max_connections).await {
        Ok(pool) => {
            info!("✓ Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    match config.bootstrap.admin_email.as_deref() {
        Some(email) => {
            if let Some(admin) = profiles::ensure_bootstrap_admin(&pool, email).await? {
                info!(
                    email = %admin.email,
                    token = %admin.api_token,
                    "Created bootstrap admin; use this token to sign in"
                );
            }
        }
        None => warn!("No bootstrap admin configured; the API is unusable until a profile exists"),
    }

    let transcriber: Arc<dyn Transcriber> =
        Arc::from(HttpTranscriber::from_config(&config.transcription)?);
    info!("Transcription provider: {}", transcriber.name());
    if config.booking.base_url.is_none() {
        info!("No booking calendar configured; booking links disabled");
    }

    let sessions = SessionStore::with_idle_timeout(config.sessions.idle_timeout());
    let state = AppState::new(
        pool,
        RetryPolicy::from(config.storage),
        transcriber,
        Arc::new(LogNotifier),
        config.booking.clone(),
    )
    .with_sessions(sessions.clone());

    // Abandoned sessions are also dropped on insert; this catches idle servers
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = sessions.sweep().await;
            if evicted > 0 {
                info!("Dropped {} idle qualification session(s)", evicted);
            }
        }
    });

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    info!("qcrm-api listening on http://{}", config.server.bind_address);
    info!("Health check: http://{}/health", config.server.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
