// InfluxDB repository implementation
use crate::application::telemetry_repository::{TelemetryRepository, TelemetrySink};
use crate::domain::kpi::{HeatKpi, KpiReading, TelemetryRow};
use crate::domain::telemetry::ValidatedRecord;
use crate::infrastructure::config::prepare_query;
use crate::infrastructure::point_mapper::{alert_to_point, kpi_to_point, record_to_point};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use influxdb2::api::write::TimestampPrecision;
use influxdb2::models::DataPoint;
use serde::Deserialize;
use std::collections::HashMap;

const TELEMETRY_ROWS_QUERY: &str = "SELECT \"energy_kwh_total\", \"tons\" FROM \"telemetry_eaf\" \
     WHERE time >= now() - ${minutes}m GROUP BY \"heat_id\"";

const LATEST_KPI_QUERY: &str = "SELECT \"kwh_per_ton\", \"heat_id\" FROM \"kpi_eaf\" \
     WHERE time >= now() - ${hours}h ORDER BY time DESC LIMIT 1";

/// Writes go through the InfluxDB 2 client; reads use the InfluxQL
/// compatibility endpoint so results come back as plain JSON series.
pub struct InfluxRepository {
    client: influxdb2::Client,
    http: reqwest::Client,
    host: String,
    token: String,
    bucket: String,
    retention_policy: String,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    #[allow(dead_code)]
    name: String,
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    tags: Option<HashMap<String, String>>,
}

impl InfluxQLSeries {
    fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

impl InfluxRepository {
    pub fn new(host: String, org: String, token: String, bucket: String, retention_policy: String) -> Self {
        let host = host.trim_end_matches('/').to_string();
        Self {
            client: influxdb2::Client::new(host.clone(), org, token.clone()),
            http: reqwest::Client::new(),
            host,
            token,
            bucket,
            retention_policy,
        }
    }

    fn build_query_url(&self, query: &str) -> String {
        let encoded_query = urlencoding::encode(query);
        format!(
            "{}/query?db={}&rp={}&q={}",
            self.host, self.bucket, self.retention_policy, encoded_query
        )
    }

    async fn execute_query(&self, query: &str) -> Result<InfluxQLResponse> {
        let url = self.build_query_url(query);
        tracing::debug!("Executing InfluxQL query: {}", query);

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to InfluxDB")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB query failed with status {}: {}", status, body);
        }

        let data = response
            .json::<InfluxQLResponse>()
            .await
            .context("Failed to parse InfluxDB response")?;

        // Check for errors in the response
        if let Some(result) = data.results.first() {
            if let Some(error) = &result.error {
                anyhow::bail!("InfluxDB query error: {}", error);
            }
        }

        Ok(data)
    }

    async fn write_points(&self, points: Vec<DataPoint>) -> Result<()> {
        self.client
            .write_with_precision(
                &self.bucket,
                futures::stream::iter(points),
                TimestampPrecision::Seconds,
            )
            .await
            .with_context(|| format!("Failed to write to InfluxDB bucket '{}'", self.bucket))
    }
}

#[async_trait]
impl TelemetrySink for InfluxRepository {
    async fn write_record(&self, record: &ValidatedRecord) -> Result<()> {
        let point = record_to_point(record)?;
        self.write_points(vec![point]).await
    }
}

#[async_trait]
impl TelemetryRepository for InfluxRepository {
    async fn query_telemetry_rows(&self, minutes: u32) -> Result<Vec<TelemetryRow>> {
        let vars = HashMap::from([("minutes".to_string(), minutes.to_string())]);
        let response = self.execute_query(&prepare_query(TELEMETRY_ROWS_QUERY, &vars)).await?;
        let rows = telemetry_rows(&response);
        tracing::debug!("Fetched {} telemetry rows from the last {}m", rows.len(), minutes);
        Ok(rows)
    }

    async fn latest_kwh_per_ton(&self, hours: u32) -> Result<Option<KpiReading>> {
        let vars = HashMap::from([("hours".to_string(), hours.to_string())]);
        let response = self.execute_query(&prepare_query(LATEST_KPI_QUERY, &vars)).await?;
        Ok(latest_kpi(&response))
    }

    async fn write_heat_kpis(&self, kpis: &[HeatKpi]) -> Result<()> {
        let points = kpis.iter().map(kpi_to_point).collect::<Result<Vec<_>>>()?;
        self.write_points(points).await
    }

    async fn write_kwh_per_ton_alert(
        &self,
        reading: &KpiReading,
        threshold: f64,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let point = alert_to_point(reading, threshold, at)?;
        self.write_points(vec![point]).await
    }
}

fn parse_time(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

// One series per heat_id because of the GROUP BY; the heat id lives in the tags.
fn telemetry_rows(response: &InfluxQLResponse) -> Vec<TelemetryRow> {
    let mut rows = Vec::new();
    let Some(series_list) = response.results.first().and_then(|r| r.series.as_ref()) else {
        return rows;
    };

    for series in series_list {
        let Some(heat_id) = series.tags.as_ref().and_then(|t| t.get("heat_id")) else {
            continue;
        };
        let (Some(time_idx), Some(energy_idx), Some(tons_idx)) = (
            series.column("time"),
            series.column("energy_kwh_total"),
            series.column("tons"),
        ) else {
            continue;
        };

        for value_row in &series.values {
            let time = value_row.get(time_idx).and_then(parse_time);
            let energy = value_row.get(energy_idx).and_then(|v| v.as_f64());
            let tons = value_row.get(tons_idx).and_then(|v| v.as_f64());
            if let (Some(time), Some(energy_kwh_total), Some(tons)) = (time, energy, tons) {
                rows.push(TelemetryRow {
                    time,
                    heat_id: heat_id.clone(),
                    energy_kwh_total,
                    tons,
                });
            }
        }
    }

    rows
}

fn latest_kpi(response: &InfluxQLResponse) -> Option<KpiReading> {
    let series = response.results.first()?.series.as_ref()?.first()?;
    let value_row = series.values.first()?;

    let kwh_per_ton = value_row.get(series.column("kwh_per_ton")?)?.as_f64()?;
    let heat_id = series
        .column("heat_id")
        .and_then(|idx| value_row.get(idx))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    Some(KpiReading { heat_id, kwh_per_ton })
}
