use filestore_snapshot_scheduler::app_state::AppState;
use filestore_snapshot_scheduler::config::Settings;
use filestore_snapshot_scheduler::prelude::*;
use filestore_snapshot_scheduler::server::run_server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("Starting Filestore snapshot scheduler");

    let settings = Settings::new()?;
    let app_state = AppState::from_settings(&settings)?;

    run_server(app_state, &settings.server).await?;
    Ok(())
}
