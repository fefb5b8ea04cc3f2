// Validator - Admission checks that turn an untyped message into a ValidatedRecord
use crate::application::errors::{IngestError, Rejection};
use crate::domain::phase::Phase;
use crate::domain::telemetry::ValidatedRecord;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub const REQUIRED_FIELDS: [&str; 9] = [
    "ts",
    "device_id",
    "heat_id",
    "mode",
    "power_kw",
    "energy_kwh_total",
    "pump_kw",
    "compressor_kw",
    "tons",
];

/// Inclusive admission bounds, checked in this order.
const RANGE_CHECKS: [(&str, f64, f64); 4] = [
    ("power_kw", 0.0, 6000.0),
    ("pump_kw", 0.0, 500.0),
    ("compressor_kw", 0.0, 500.0),
    ("tons", 0.0, 400.0),
];

/// Decode a raw transport payload into a JSON object.
pub fn decode_payload(raw: &[u8]) -> Result<Map<String, Value>, IngestError> {
    let text = std::str::from_utf8(raw).map_err(|e| IngestError::Decode(e.to_string()))?;
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(IngestError::Decode(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(IngestError::Decode(e.to_string())),
    }
}

/// Check one decoded message.
///
/// Checks run completeness, mode, ranges, then timestamp, and stop at the
/// first failure. The function is pure and safe to call from any thread.
pub fn validate_payload(payload: &Map<String, Value>) -> Result<ValidatedRecord, Rejection> {
    let mut missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|f| !payload.contains_key(**f))
        .map(|f| f.to_string())
        .collect();
    if !missing.is_empty() {
        missing.sort();
        return Err(Rejection::MissingFields(missing));
    }

    let mode = match &payload["mode"] {
        Value::String(s) => s
            .parse::<Phase>()
            .map_err(|_| Rejection::InvalidMode(s.clone()))?,
        other => return Err(Rejection::InvalidMode(other.to_string())),
    };

    let mut bounded = [0.0; RANGE_CHECKS.len()];
    for (slot, (field, min, max)) in bounded.iter_mut().zip(RANGE_CHECKS) {
        let value = number_field(payload, field)?;
        if !(min..=max).contains(&value) {
            return Err(Rejection::OutOfRange { field, value, min, max });
        }
        *slot = value;
    }
    let [power_kw, pump_kw, compressor_kw, tons] = bounded;

    let energy_kwh_total = number_field(payload, "energy_kwh_total")?;
    if !energy_kwh_total.is_finite() {
        return Err(Rejection::InvalidNumber {
            field: "energy_kwh_total",
            raw: payload["energy_kwh_total"].to_string(),
        });
    }

    let timestamp = match &payload["ts"] {
        Value::String(s) => parse_timestamp(s)?,
        other => return Err(Rejection::BadTimestamp(other.to_string())),
    };

    Ok(ValidatedRecord {
        timestamp,
        device_id: identifier(&payload["device_id"]),
        heat_id: identifier(&payload["heat_id"]),
        mode,
        power_kw,
        energy_kwh_total,
        pump_kw,
        compressor_kw,
        tons,
    })
}

/// Parse an RFC 3339 / ISO-8601 instant and normalize it to UTC. `Z` and
/// `+00:00` are equivalent; a timestamp without an offset is refused.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, Rejection> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| Rejection::BadTimestamp(raw.to_string()))
}

// Numbers arrive as JSON numbers or, from lenient producers, numeric strings.
fn number_field(payload: &Map<String, Value>, field: &'static str) -> Result<f64, Rejection> {
    let value = &payload[field];
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| Rejection::InvalidNumber {
        field,
        raw: value.to_string(),
    })
}

fn identifier(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn valid() -> Map<String, Value> {
        match json!({
            "ts": "2024-01-01T00:00:00Z",
            "device_id": "eaf01_meter01",
            "heat_id": 7,
            "mode": "melt",
            "power_kw": 3200.5,
            "energy_kwh_total": 812.125,
            "pump_kw": 80.0,
            "compressor_kw": 55.25,
            "tons": 101.3
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn with(field: &str, value: Value) -> Map<String, Value> {
        let mut payload = valid();
        payload.insert(field.to_string(), value);
        payload
    }

    #[test]
    fn test_accepts_valid_message() {
        let record = validate_payload(&valid()).unwrap();
        assert_eq!(record.device_id, "eaf01_meter01");
        assert_eq!(record.heat_id, "7");
        assert_eq!(record.mode, Phase::Melt);
        assert_eq!(record.power_kw, 3200.5);
        assert_eq!(record.energy_kwh_total, 812.125);
        assert_eq!(record.timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_missing_fields_are_listed_sorted() {
        let mut payload = valid();
        payload.remove("tons");
        payload.remove("mode");
        payload.remove("compressor_kw");

        assert_eq!(
            validate_payload(&payload),
            Err(Rejection::MissingFields(vec![
                "compressor_kw".to_string(),
                "mode".to_string(),
                "tons".to_string()
            ]))
        );
    }

    #[test]
    fn test_completeness_checked_before_mode() {
        let mut payload = with("mode", json!("melting"));
        payload.remove("ts");
        assert_eq!(
            validate_payload(&payload),
            Err(Rejection::MissingFields(vec!["ts".to_string()]))
        );
    }

    #[test]
    fn test_mode_membership() {
        assert_eq!(
            validate_payload(&with("mode", json!("melting"))),
            Err(Rejection::InvalidMode("melting".to_string()))
        );
        assert!(matches!(
            validate_payload(&with("mode", json!(3))),
            Err(Rejection::InvalidMode(_))
        ));
        for mode in ["idle", "melt", "refine", "downtime"] {
            assert!(validate_payload(&with("mode", json!(mode))).is_ok());
        }
    }

    #[test]
    fn test_power_bounds_are_inclusive() {
        assert!(validate_payload(&with("power_kw", json!(6000.0))).is_ok());
        assert!(validate_payload(&with("power_kw", json!(0.0))).is_ok());
        assert_eq!(
            validate_payload(&with("power_kw", json!(6000.01))),
            Err(Rejection::OutOfRange {
                field: "power_kw",
                value: 6000.01,
                min: 0.0,
                max: 6000.0
            })
        );
        assert!(matches!(
            validate_payload(&with("power_kw", json!(-0.01))),
            Err(Rejection::OutOfRange { field: "power_kw", .. })
        ));
    }

    #[test]
    fn test_each_range_reported_distinctly() {
        let cases = [
            ("pump_kw", 500.5),
            ("compressor_kw", 501.0),
            ("tons", 400.1),
            ("tons", -1.0),
        ];
        for (field, value) in cases {
            match validate_payload(&with(field, json!(value))) {
                Err(Rejection::OutOfRange { field: f, value: v, .. }) => {
                    assert_eq!(f, field);
                    assert_eq!(v, value);
                }
                other => panic!("{field}={value}: {other:?}"),
            }
        }
        assert!(validate_payload(&with("pump_kw", json!(500))).is_ok());
    }

    #[test]
    fn test_first_failing_range_wins() {
        let mut payload = with("power_kw", json!(9000.0));
        payload.insert("tons".to_string(), json!(900.0));
        assert!(matches!(
            validate_payload(&payload),
            Err(Rejection::OutOfRange { field: "power_kw", .. })
        ));
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let record = validate_payload(&with("pump_kw", json!("75.5"))).unwrap();
        assert_eq!(record.pump_kw, 75.5);

        assert_eq!(
            validate_payload(&with("pump_kw", json!("lots"))),
            Err(Rejection::InvalidNumber {
                field: "pump_kw",
                raw: "\"lots\"".to_string()
            })
        );
        assert!(matches!(
            validate_payload(&with("energy_kwh_total", Value::Null)),
            Err(Rejection::InvalidNumber { field: "energy_kwh_total", .. })
        ));
    }

    #[test]
    fn test_zulu_and_offset_timestamps_match() {
        let zulu = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        let offset = parse_timestamp("2024-01-01T00:00:00+00:00").unwrap();
        let shifted = parse_timestamp("2024-01-01T02:00:00+02:00").unwrap();
        assert_eq!(zulu, offset);
        assert_eq!(zulu, shifted);
    }

    #[test]
    fn test_bad_timestamps() {
        for raw in ["2024-01-01T00:00:00", "yesterday", "2024-13-01T00:00:00Z", ""] {
            assert_eq!(
                validate_payload(&with("ts", json!(raw))),
                Err(Rejection::BadTimestamp(raw.to_string()))
            );
        }
        assert!(matches!(
            validate_payload(&with("ts", json!(1704067200))),
            Err(Rejection::BadTimestamp(_))
        ));
    }

    #[test]
    fn test_range_checked_before_timestamp() {
        let mut payload = with("ts", json!("garbage"));
        payload.insert("tons".to_string(), json!(1000));
        assert!(matches!(validate_payload(&payload), Err(Rejection::OutOfRange { .. })));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let payload = valid();
        assert_eq!(validate_payload(&payload), validate_payload(&payload));
    }

    #[test]
    fn test_decode_payload() {
        assert!(decode_payload(br#"{"a": 1}"#).is_ok());
        assert!(matches!(decode_payload(b"[1,2]"), Err(IngestError::Decode(_))));
        assert!(matches!(decode_payload(b"{not json"), Err(IngestError::Decode(_))));
        assert!(matches!(decode_payload(&[0xff, 0xfe]), Err(IngestError::Decode(_))));
    }
}
