use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use warden::{
    api::{shutdown_signal, start_api_server, ApiState},
    auth::{spawn_presence_worker, CleanupService, PresenceTracker, TokenCodec},
    notify,
    observability::{init_observability, logging::log_config_info},
    storage::{create_pool, Repositories},
    AppConfig, Result, APP_NAME, VERSION,
};

/// How long background workers get to stop after the API server has shut down.
const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Authentication and authorization service")]
struct Args {
    /// Run on process-local repositories instead of PostgreSQL
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let args = Args::parse();
    let config = AppConfig::from_env();

    init_observability(&config.observability).await?;

    info!(app_name = APP_NAME, version = VERSION, in_memory = args.in_memory, "Starting Warden");

    if args.in_memory {
        config.validate_without_database()?;
    } else {
        config.validate()?;
    }
    log_config_info(&config);

    let (repositories, pool) = if args.in_memory {
        warn!("Running on in-memory repositories; all state is lost on exit");
        (Repositories::in_memory(), None)
    } else {
        info!("Creating database connection pool");
        let pool = create_pool(&config.database).await?;
        (Repositories::postgres(pool.clone()), Some(pool))
    };

    let codec =
        Arc::new(TokenCodec::new(config.auth.jwt_secret.as_bytes(), config.auth.token_ttl()));
    let (presence, presence_rx) = PresenceTracker::channel(config.auth.presence_queue_capacity);

    let cancel = CancellationToken::new();
    let presence_worker =
        spawn_presence_worker(presence_rx, repositories.principals.clone(), cancel.clone());

    let state = ApiState::new(
        &repositories,
        codec,
        presence,
        notify::from_config(&config.notify),
        &config.auth,
        pool,
    );

    let cleanup = CleanupService::new(
        state.store.clone(),
        repositories.reset_tokens.clone(),
        config.auth.idle_threshold(),
        config.auth.used_reset_token_retention(),
    );
    let cleanup_worker = cleanup.spawn(config.auth.sweep_interval(), cancel.clone());

    let served = start_api_server(&config.server, state, shutdown_signal(), cancel.clone()).await;
    cancel.cancel();

    for (name, handle) in [("presence", presence_worker), ("cleanup", cleanup_worker)] {
        match tokio::time::timeout(WORKER_STOP_TIMEOUT, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(worker = name, error = %e, "background worker panicked"),
            Err(_) => warn!(worker = name, "background worker did not stop in time"),
        }
    }

    if let Err(e) = &served {
        error!(error = %e, "API server terminated with error");
    }
    info!("Warden shutdown completed");
    served
}
