// HTTP request handlers
use crate::application::ingestion_service::IngestionSnapshot;
use crate::presentation::app_state::AppState;
use axum::{Json, extract::State};
use std::sync::Arc;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Received / ingested / dropped counters since the ingestion loop started
pub async fn ingestion_stats(State(state): State<Arc<AppState>>) -> Json<IngestionSnapshot> {
    Json(state.ingestion_stats.snapshot())
}
