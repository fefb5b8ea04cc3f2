// Domain layer - Furnace phases, telemetry records and heat KPIs
pub mod kpi;
pub mod phase;
pub mod telemetry;
