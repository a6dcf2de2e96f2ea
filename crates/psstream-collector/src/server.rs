//! Router construction and the serve loop.

use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, MethodRouter};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::endpoint::{health, ingest, CollectorState};

/// Every path answers `GET` (health) and `POST` (ingest).
pub fn router(state: CollectorState, max_body_bytes: usize) -> Router {
    let endpoint: MethodRouter<CollectorState> = get(health).post(ingest);
    Router::new()
        .route("/", endpoint.clone())
        .route("/*path", endpoint)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until ctrl-c, then finish in-flight requests and return.
pub async fn serve(
    state: CollectorState,
    addr: SocketAddr,
    max_body_bytes: usize,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(
        topic = state.topic(),
        "Listening for connections on {}",
        listener.local_addr()?
    );
    axum::serve(listener, router(state, max_body_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("collector stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            warn!("cannot listen for ctrl-c: {e}; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
