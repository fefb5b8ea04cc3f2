// Per-heat energy KPI domain models
use super::telemetry::round_to;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const KPI_MEASUREMENT: &str = "kpi_eaf";
pub const ALERT_MEASUREMENT: &str = "alerts";
pub const KWH_PER_TON_ALERT_TYPE: &str = "kwh_per_ton_high";

/// Heats that consumed less than this are treated as partial and skipped.
const MIN_HEAT_ENERGY_KWH: f64 = 0.1;

/// The subset of a stored telemetry point that the KPI job reads back.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRow {
    pub time: DateTime<Utc>,
    pub heat_id: String,
    pub energy_kwh_total: f64,
    pub tons: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeatKpi {
    pub heat_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub tons: f64,
    pub energy_kwh: f64,
    pub kwh_per_ton: f64,
}

/// Latest stored kWh/ton value, as read back by the alert rule.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiReading {
    pub heat_id: String,
    pub kwh_per_ton: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    Raised { heat_id: String, value: f64, threshold: f64 },
    Clear { heat_id: String, value: f64, threshold: f64 },
}

struct HeatAccumulator {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    energy_start: f64,
    energy_end: f64,
    tons: f64,
}

/// Group telemetry rows by heat and derive energy per ton for each complete heat.
pub fn compute_heat_kpis(rows: &[TelemetryRow]) -> Vec<HeatKpi> {
    let mut heats: BTreeMap<&str, HeatAccumulator> = BTreeMap::new();

    for row in rows {
        heats
            .entry(row.heat_id.as_str())
            .and_modify(|acc| {
                acc.start_time = acc.start_time.min(row.time);
                acc.end_time = acc.end_time.max(row.time);
                acc.energy_start = acc.energy_start.min(row.energy_kwh_total);
                acc.energy_end = acc.energy_end.max(row.energy_kwh_total);
                acc.tons = acc.tons.max(row.tons);
            })
            .or_insert(HeatAccumulator {
                start_time: row.time,
                end_time: row.time,
                energy_start: row.energy_kwh_total,
                energy_end: row.energy_kwh_total,
                tons: row.tons,
            });
    }

    let mut kpis: Vec<HeatKpi> = heats
        .into_iter()
        .filter_map(|(heat_id, acc)| {
            let energy_kwh = round_to(acc.energy_end - acc.energy_start, 3);
            if energy_kwh <= MIN_HEAT_ENERGY_KWH || acc.tons <= 0.0 {
                return None;
            }
            Some(HeatKpi {
                heat_id: heat_id.to_string(),
                start_time: acc.start_time,
                end_time: acc.end_time,
                tons: acc.tons,
                energy_kwh,
                kwh_per_ton: round_to(energy_kwh / acc.tons, 3),
            })
        })
        .collect();

    kpis.sort_by_key(|k| heat_sort_key(&k.heat_id));
    kpis
}

// Numeric heat ids sort numerically, anything else after them lexically.
fn heat_sort_key(heat_id: &str) -> (u8, u64, String) {
    match heat_id.parse::<u64>() {
        Ok(n) => (0, n, String::new()),
        Err(_) => (1, 0, heat_id.to_string()),
    }
}

pub fn evaluate_kwh_per_ton(reading: &KpiReading, threshold: f64) -> AlertOutcome {
    let heat_id = reading.heat_id.clone();
    let value = reading.kwh_per_ton;
    if value > threshold {
        AlertOutcome::Raised { heat_id, value, threshold }
    } else {
        AlertOutcome::Clear { heat_id, value, threshold }
    }
}
