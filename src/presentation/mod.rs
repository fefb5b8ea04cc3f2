// Presentation layer - Ingestion status HTTP surface
pub mod app_state;
pub mod handlers;
pub mod server;
