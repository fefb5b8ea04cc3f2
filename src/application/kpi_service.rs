// KPI service - Per-heat kWh/ton computation and the kWh/ton alert rule
use crate::application::telemetry_repository::TelemetryRepository;
use crate::domain::kpi::{AlertOutcome, HeatKpi, compute_heat_kpis, evaluate_kwh_per_ton};
use chrono::Utc;
use std::sync::Arc;

/// How far back the alert rule looks for the latest KPI.
const ALERT_LOOKBACK_HOURS: u32 = 6;

#[derive(Clone)]
pub struct KpiService {
    repository: Arc<dyn TelemetryRepository>,
}

impl KpiService {
    pub fn new(repository: Arc<dyn TelemetryRepository>) -> Self {
        Self { repository }
    }

    /// Compute KPIs for every complete heat in the window and store them back.
    pub async fn refresh_heat_kpis(&self, lookback_minutes: u32) -> anyhow::Result<Vec<HeatKpi>> {
        let rows = self.repository.query_telemetry_rows(lookback_minutes).await?;
        if rows.is_empty() {
            tracing::info!(lookback_minutes, "no telemetry found; run the simulator and ingestion first");
            return Ok(Vec::new());
        }

        let kpis = compute_heat_kpis(&rows);
        if kpis.is_empty() {
            tracing::info!(rows = rows.len(), "telemetry present but no complete heat yet");
            return Ok(kpis);
        }

        for kpi in &kpis {
            tracing::info!(
                heat_id = %kpi.heat_id,
                start = %kpi.start_time,
                end = %kpi.end_time,
                tons = kpi.tons,
                energy_kwh = kpi.energy_kwh,
                kwh_per_ton = kpi.kwh_per_ton,
                "heat kpi"
            );
        }

        self.repository.write_heat_kpis(&kpis).await?;
        Ok(kpis)
    }

    /// Compare the latest kWh/ton against `threshold`, storing an alert point when exceeded.
    pub async fn check_kwh_per_ton(&self, threshold: f64) -> anyhow::Result<Option<AlertOutcome>> {
        let Some(reading) = self.repository.latest_kwh_per_ton(ALERT_LOOKBACK_HOURS).await? else {
            tracing::info!("no KPI data yet");
            return Ok(None);
        };

        let outcome = evaluate_kwh_per_ton(&reading, threshold);
        match &outcome {
            AlertOutcome::Raised { heat_id, value, threshold } => {
                self.repository
                    .write_kwh_per_ton_alert(&reading, *threshold, Utc::now())
                    .await?;
                tracing::warn!(heat_id = %heat_id, kwh_per_ton = value, threshold, "kWh/ton above threshold");
            }
            AlertOutcome::Clear { heat_id, value, threshold } => {
                tracing::info!(heat_id = %heat_id, kwh_per_ton = value, threshold, "kWh/ton within threshold");
            }
        }
        Ok(Some(outcome))
    }
}
