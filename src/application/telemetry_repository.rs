// Repository traits for telemetry storage and transport
use crate::domain::kpi::{HeatKpi, KpiReading, TelemetryRow};
use crate::domain::telemetry::ValidatedRecord;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Durable append-only point sink.
///
/// Implementations must tolerate points for one heat arriving out of order.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Append one validated telemetry record as a storage point
    async fn write_record(&self, record: &ValidatedRecord) -> anyhow::Result<()>;
}

/// Range and aggregation queries plus the derived-measurement writes of the analytics jobs
#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Raw telemetry rows (time, heat, energy, tons) from the last `minutes`
    async fn query_telemetry_rows(&self, minutes: u32) -> anyhow::Result<Vec<TelemetryRow>>;

    /// Most recent kWh/ton KPI stored within the last `hours`
    async fn latest_kwh_per_ton(&self, hours: u32) -> anyhow::Result<Option<KpiReading>>;

    async fn write_heat_kpis(&self, kpis: &[HeatKpi]) -> anyhow::Result<()>;

    async fn write_kwh_per_ton_alert(
        &self,
        reading: &KpiReading,
        threshold: f64,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

/// Producer side of the telemetry topic. Delivery is at-most-once.
#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    async fn publish(&self, payload: Vec<u8>) -> anyhow::Result<()>;
}

/// One message taken off the telemetry topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}
