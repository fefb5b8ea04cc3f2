// Application layer - Simulator and ingestion state machines, services and ports
pub mod errors;
pub mod ingestion_service;
pub mod kpi_service;
pub mod phase_scheduler;
pub mod signal_model;
pub mod simulator;
pub mod simulator_service;
pub mod telemetry_repository;
pub mod validator;
