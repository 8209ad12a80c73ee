mod handlers;
mod routes;

use crate::app_state::AppState;
use crate::config::ServerSettings;
use crate::error::{Result, ServerError};
use axum_server::Handle;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use routes::create_router;

// Grace period for open connections once a shutdown signal arrives.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Serves the trigger endpoint until SIGINT, then lets any running retention
/// cycle finish before returning.
pub async fn run_server(app_state: Arc<AppState>, settings: &ServerSettings) -> Result<()> {
    let ip = settings
        .host
        .parse()
        .map_err(|e| ServerError::Init(format!("Invalid host {}: {}", settings.host, e)))?;
    let addr = SocketAddr::new(ip, settings.port);

    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    info!("Waiting for retention triggers on {}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(create_router(app_state.clone()).into_make_service())
        .await
        .map_err(|e| ServerError::Init(format!("Server error: {}", e)))?;

    info!("Server stopped, waiting for the running job cycle");
    app_state.wait_idle().await;
    Ok(())
}

async fn shutdown_on_signal(handle: Handle) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
