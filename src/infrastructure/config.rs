use crate::application::errors::StartupError;
use crate::application::signal_model::AnomalyFlags;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Process configuration, read once at startup and handed to the services.
///
/// Keys match the lower-cased environment variable names (`MQTT_HOST` →
/// `mqtt_host`), so the optional `config/eaf.toml` and the environment share
/// one flat namespace.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_mqtt_host")]
    pub mqtt_host: String,
    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,
    #[serde(default = "default_mqtt_topic")]
    pub mqtt_topic: String,
    #[serde(default)]
    pub mqtt_client_id: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub mqtt_connect_timeout_secs: u64,

    #[serde(default = "default_influx_url")]
    pub influx_url: String,
    #[serde(default = "default_influx_org")]
    pub influx_org: String,
    #[serde(default = "default_influx_bucket")]
    pub influx_bucket: String,
    #[serde(default)]
    pub influx_token: String,
    #[serde(default = "default_retention_policy")]
    pub influx_retention_policy: String,

    #[serde(default = "default_device_id")]
    pub sim_device_id: String,
    #[serde(default = "default_seed")]
    pub sim_seed: u64,
    #[serde(default = "default_interval_ms")]
    pub sim_interval_ms: u64,
    #[serde(default = "default_log_every")]
    pub sim_log_every: u64,
    #[serde(default)]
    pub sim_idle_load_increase: bool,
    #[serde(default)]
    pub sim_sensor_bias_kw: Option<f64>,

    #[serde(default = "default_status_addr")]
    pub status_addr: String,
    #[serde(default = "default_kpi_lookback_minutes")]
    pub kpi_lookback_minutes: u32,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold_kwh_per_ton: f64,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_topic() -> String {
    "steelplant/eaf01/telemetry".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_influx_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_influx_org() -> String {
    "steelplant".to_string()
}

fn default_influx_bucket() -> String {
    "telemetry".to_string()
}

fn default_retention_policy() -> String {
    "autogen".to_string()
}

fn default_device_id() -> String {
    "eaf01_meter01".to_string()
}

fn default_seed() -> u64 {
    42
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_log_every() -> u64 {
    5
}

fn default_status_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_kpi_lookback_minutes() -> u32 {
    180
}

fn default_alert_threshold() -> f64 {
    55.0
}

impl AppConfig {
    pub fn mqtt_addr(&self) -> String {
        format!("{}:{}", self.mqtt_host, self.mqtt_port)
    }

    pub fn sim_interval(&self) -> Duration {
        Duration::from_millis(self.sim_interval_ms.max(1))
    }

    pub fn mqtt_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.mqtt_connect_timeout_secs)
    }

    pub fn anomalies(&self) -> AnomalyFlags {
        AnomalyFlags {
            idle_load_increase: self.sim_idle_load_increase,
            sensor_bias_kw: self.sim_sensor_bias_kw,
        }
    }

    /// The storage token, or the fatal startup error when it is blank.
    pub fn require_influx_token(&self) -> Result<&str, StartupError> {
        let token = self.influx_token.trim();
        if token.is_empty() {
            return Err(StartupError::MissingCredential);
        }
        Ok(token)
    }
}

pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name("config/eaf").required(false))
        .add_source(config::Environment::default().try_parsing(true));
    build_app_config(builder)
}

fn build_app_config(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> anyhow::Result<AppConfig> {
    let settings = builder.build()?;
    Ok(settings.try_deserialize()?)
}

/// Replace template variables in a query string
pub fn prepare_query(query: &str, vars: &HashMap<String, String>) -> String {
    let mut result = query.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
