use super::handlers::{health_check, run_retention};
use crate::app_state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(run_retention))
        .route("/health", get(health_check))
        .with_state(app_state)
}
