use crate::app_state::AppState;
use axum::{body::Bytes, extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

/// Liveness plus the outcome of the most recent retention cycle.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let last_run = state.last_run().map(|run| {
        json!({
            "status": run.status.as_str(),
            "finished_at": run.finished_at.to_rfc3339(),
        })
    });
    let response = json!({
        "status": "ok",
        "uptime_secs": state.start_time.elapsed().unwrap_or_default().as_secs(),
        "last_run": last_run,
    });
    debug!(%response, "Health check");
    Json(response)
}

/// Runs one retention cycle for the posted payload. The cycle keeps going if
/// the trigger disconnects before it is done.
pub async fn run_retention(State(state): State<Arc<AppState>>, body: Bytes) -> &'static str {
    state
        .spawn_job(body.to_vec())
        .instrument(info_span!("job_cycle"))
        .await
        .as_str()
}
