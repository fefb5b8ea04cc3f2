// Telemetry data domain models
use super::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Measurement name for raw furnace telemetry in the time-series store.
pub const TELEMETRY_MEASUREMENT: &str = "telemetry_eaf";

/// One simulator tick as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub heat_id: u64,
    #[serde(rename = "mode")]
    pub phase: Phase,
    pub power_kw: f64,
    pub energy_kwh_total: f64,
    pub pump_kw: f64,
    pub compressor_kw: f64,
    pub tons: f64,
}

impl TelemetrySample {
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// A message that passed admission checks and is ready to become a storage point.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub heat_id: String,
    pub mode: Phase,
    pub power_kw: f64,
    pub energy_kwh_total: f64,
    pub pump_kw: f64,
    pub compressor_kw: f64,
    pub tons: f64,
}

/// Round to a fixed number of decimal places for stable published values.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1234.5678, 2), 1234.57);
        assert_eq!(round_to(0.0004, 3), 0.0);
        assert_eq!(round_to(99.95, 1), 100.0);
    }

    #[test]
    fn test_sample_uses_wire_field_names() {
        let sample = TelemetrySample {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            device_id: "eaf01_meter01".to_string(),
            heat_id: 3,
            phase: Phase::Refine,
            power_kw: 1800.25,
            energy_kwh_total: 12.5,
            pump_kw: 60.0,
            compressor_kw: 45.5,
            tons: 101.2,
        };

        let value: serde_json::Value = serde_json::from_slice(&sample.to_json().unwrap()).unwrap();
        let object = value.as_object().unwrap();

        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "compressor_kw",
                "device_id",
                "energy_kwh_total",
                "heat_id",
                "mode",
                "power_kw",
                "pump_kw",
                "tons",
                "ts"
            ]
        );
        assert_eq!(object["mode"], "refine");
        assert_eq!(object["heat_id"], 3);
        assert!(object["ts"].as_str().unwrap().starts_with("2024-01-01T00:00:00"));
    }
}
