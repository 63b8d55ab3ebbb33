//! HTTP server.

pub mod router;
pub mod types;

pub use router::{api_routes, create_router, with_security_layers};
pub use types::{MAX_REQUEST_BODY_SIZE, ServerState};

use std::net::SocketAddr;
use std::time::Duration;

use neothink_core::Config;

/// How often expired cache entries, rate-limit rows and CSRF tokens are purged.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Run the server until Ctrl+C or SIGTERM.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let bind = config.bind;
    let state = ServerState::new(config)?;

    let cleanup_state = state.clone();
    let cleanup = tokio::spawn(async move {
        cleanup_task(cleanup_state, CLEANUP_INTERVAL).await;
    });

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(category = "http", bind = %bind, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(crate::shutdown::shutdown_signal())
    .await?;

    cleanup.abort();
    tracing::info!(category = "http", "Server shutdown complete");
    Ok(())
}

/// Periodically purge expired entries. Failures are logged and retried on
/// the next tick.
pub async fn cleanup_task(state: ServerState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let cached = state.cache.cleanup().await;
        let now = chrono::Utc::now();
        let limits = match state.rate_limiter.cleanup(now).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(category = "cleanup", error = %e, "Rate limit cleanup failed");
                0
            }
        };
        let tokens = match state.csrf.purge_expired().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(category = "cleanup", error = %e, "CSRF token purge failed");
                0
            }
        };
        tracing::debug!(
            category = "cleanup",
            cached,
            limits,
            tokens,
            "Expired entries removed"
        );
    }
}
