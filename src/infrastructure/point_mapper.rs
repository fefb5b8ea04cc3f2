// Mapper to convert domain records to InfluxDB points (second precision timestamps)
use crate::domain::kpi::{ALERT_MEASUREMENT, HeatKpi, KPI_MEASUREMENT, KWH_PER_TON_ALERT_TYPE, KpiReading};
use crate::domain::telemetry::{TELEMETRY_MEASUREMENT, ValidatedRecord};
use chrono::{DateTime, Utc};
use influxdb2::models::DataPoint;

pub fn record_to_point(record: &ValidatedRecord) -> anyhow::Result<DataPoint> {
    let point = DataPoint::builder(TELEMETRY_MEASUREMENT)
        .tag("device_id", record.device_id.as_str())
        .tag("mode", record.mode.as_str())
        .tag("heat_id", record.heat_id.as_str())
        .field("power_kw", record.power_kw)
        .field("energy_kwh_total", record.energy_kwh_total)
        .field("pump_kw", record.pump_kw)
        .field("compressor_kw", record.compressor_kw)
        .field("tons", record.tons)
        .timestamp(record.timestamp.timestamp())
        .build()?;
    Ok(point)
}

pub fn kpi_to_point(kpi: &HeatKpi) -> anyhow::Result<DataPoint> {
    let point = DataPoint::builder(KPI_MEASUREMENT)
        .tag("heat_id", kpi.heat_id.as_str())
        .field("energy_kwh", kpi.energy_kwh)
        .field("tons", kpi.tons)
        .field("kwh_per_ton", kpi.kwh_per_ton)
        .timestamp(kpi.end_time.timestamp())
        .build()?;
    Ok(point)
}

pub fn alert_to_point(
    reading: &KpiReading,
    threshold: f64,
    at: DateTime<Utc>,
) -> anyhow::Result<DataPoint> {
    let point = DataPoint::builder(ALERT_MEASUREMENT)
        .tag("type", KWH_PER_TON_ALERT_TYPE)
        .tag("heat_id", reading.heat_id.as_str())
        .field("value", reading.kwh_per_ton)
        .field("threshold", threshold)
        .timestamp(at.timestamp())
        .build()?;
    Ok(point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::phase::Phase;
    use chrono::TimeZone;
    use influxdb2::models::WriteDataPoint;

    fn line(point: DataPoint) -> String {
        let mut buf = Vec::new();
        point.write_data_point_to(&mut buf).unwrap();
        String::from_utf8(buf).unwrap().trim_end().to_string()
    }

    #[test]
    fn test_record_point_layout() {
        let record = ValidatedRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            device_id: "eaf01_meter01".to_string(),
            heat_id: "7".to_string(),
            mode: Phase::Melt,
            power_kw: 3200.5,
            energy_kwh_total: 812.125,
            pump_kw: 80.25,
            compressor_kw: 55.25,
            tons: 101.3,
        };

        let line = line(record_to_point(&record).unwrap());
        assert!(line.starts_with("telemetry_eaf,"), "{line}");
        for part in [
            "device_id=eaf01_meter01",
            "heat_id=7",
            "mode=melt",
            "power_kw=3200.5",
            "energy_kwh_total=812.125",
            "pump_kw=80.25",
            "compressor_kw=55.25",
            "tons=101.3",
        ] {
            assert!(line.contains(part), "{part} missing from {line}");
        }
        assert!(line.ends_with(" 1704067200"), "{line}");
    }

    #[test]
    fn test_alert_point_layout() {
        let reading = KpiReading {
            heat_id: "12".to_string(),
            kwh_per_ton: 61.5,
        };
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();

        let line = line(alert_to_point(&reading, 55.5, at).unwrap());
        assert!(line.starts_with("alerts,"), "{line}");
        assert!(line.contains("type=kwh_per_ton_high"));
        assert!(line.contains("value=61.5"));
        assert!(line.contains("threshold=55.5"));
    }
}
