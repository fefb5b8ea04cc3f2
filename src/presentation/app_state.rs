// Application state for the ingestion status handlers
use crate::application::ingestion_service::IngestionStats;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub ingestion_stats: Arc<IngestionStats>,
}
