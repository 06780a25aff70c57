use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::errors::Error;

use super::routes::{build_router, ApiState};

/// Serve the API until `shutdown` resolves, then drain in-flight requests for at most
/// the configured grace period. `cancel` is triggered as soon as shutdown begins.
pub async fn start_api_server<F>(
    config: &ServerConfig,
    state: ApiState,
    shutdown: F,
    cancel: CancellationToken,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| Error::config(format!("Invalid API address: {}", e)))?;

    let router: Router = build_router(state, config);

    let listener = TcpListener::bind(addr).await.map_err(|e| Error::Io {
        source: e,
        context: format!("Failed to bind API server on {}", addr),
    })?;

    info!(address = %addr, "Starting HTTP API server");

    let drain_started = cancel.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        shutdown.await;
        info!("Shutdown signal received, draining API server");
        drain_started.cancel();
    });

    let grace = config.shutdown_grace();
    let serve = async move {
        server.await.map_err(|e| Error::Io { source: e, context: "API server error".into() })
    };
    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => result?,
        _ = async {
            cancel.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_secs = grace.as_secs(), "Shutdown grace period elapsed, abandoning in-flight requests");
        }
    }

    info!("API server shutdown completed");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "API server shutdown listener failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM listener failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
