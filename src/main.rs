// Main entry point - Dependency injection and subcommand dispatch
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use crate::application::ingestion_service::IngestionService;
use crate::application::kpi_service::KpiService;
use crate::application::simulator::EafSimulator;
use crate::application::simulator_service::SimulatorService;
use crate::infrastructure::config::{AppConfig, load_app_config};
use crate::infrastructure::influx_repository::InfluxRepository;
use crate::infrastructure::mqtt_transport::{connect_publisher, connect_subscriber};
use crate::presentation::app_state::AppState;
use crate::presentation::server::StatusServer;

/// How long shutdown waits for the MQTT DISCONNECT and the status endpoint drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[derive(Parser)]
#[command(name = "eaf-telemetry", about = "Electric arc furnace telemetry simulator and ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish simulated furnace telemetry at a fixed cadence
    Simulate {
        /// Override the configured RNG seed
        #[arg(long)]
        seed: Option<u64>,
        /// Inflate idle-phase power to mimic wasted standby draw
        #[arg(long)]
        idle_load_increase: bool,
        /// Add a constant offset (kW) to reported power
        #[arg(long, allow_negative_numbers = true)]
        sensor_bias_kw: Option<f64>,
    },
    /// Validate telemetry from the broker and append it to InfluxDB
    Ingest,
    /// Compute kWh/ton per heat and store the results
    Kpi {
        #[arg(long)]
        lookback_minutes: Option<u32>,
    },
    /// Raise an alert point when the latest kWh/ton exceeds the threshold
    Alert {
        #[arg(long)]
        threshold: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // Load configuration once; everything downstream receives it explicitly
    let config = load_app_config()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(4);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
            let _ = shutdown_tx.send(());
        }
    });

    match cli.command {
        Command::Simulate {
            seed,
            idle_load_increase,
            sensor_bias_kw,
        } => {
            let mut anomalies = config.anomalies();
            anomalies.idle_load_increase |= idle_load_increase;
            if sensor_bias_kw.is_some() {
                anomalies.sensor_bias_kw = sensor_bias_kw;
            }
            run_simulator(&config, seed.unwrap_or(config.sim_seed), anomalies, shutdown_rx).await
        }
        Command::Ingest => run_ingestion(&config, shutdown_rx).await,
        Command::Kpi { lookback_minutes } => {
            let service = KpiService::new(Arc::new(influx_repository(&config)?));
            service
                .refresh_heat_kpis(lookback_minutes.unwrap_or(config.kpi_lookback_minutes))
                .await?;
            Ok(())
        }
        Command::Alert { threshold } => {
            let service = KpiService::new(Arc::new(influx_repository(&config)?));
            service
                .check_kwh_per_ton(threshold.unwrap_or(config.alert_threshold_kwh_per_ton))
                .await?;
            Ok(())
        }
    }
}

fn influx_repository(config: &AppConfig) -> anyhow::Result<InfluxRepository> {
    let token = config.require_influx_token()?;
    tracing::info!(
        url = %config.influx_url,
        org = %config.influx_org,
        bucket = %config.influx_bucket,
        "influx target"
    );
    Ok(InfluxRepository::new(
        config.influx_url.clone(),
        config.influx_org.clone(),
        token.to_string(),
        config.influx_bucket.clone(),
        config.influx_retention_policy.clone(),
    ))
}

async fn run_simulator(
    config: &AppConfig,
    seed: u64,
    anomalies: crate::application::signal_model::AnomalyFlags,
    shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let publisher = Arc::new(connect_publisher(config).await?);
    tracing::info!(
        addr = %config.mqtt_addr(),
        topic = %config.mqtt_topic,
        seed,
        ?anomalies,
        "publishing simulated telemetry"
    );

    let simulator = EafSimulator::new(config.sim_device_id.clone(), seed, anomalies);
    let service = SimulatorService::new(
        simulator,
        publisher.clone(),
        config.sim_interval(),
        config.sim_log_every,
    );
    service.run(shutdown).await;

    publisher.disconnect(SHUTDOWN_GRACE).await;
    Ok(())
}

async fn run_ingestion(config: &AppConfig, shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
    // Credential check comes first so nothing connects without it
    let repository = Arc::new(influx_repository(config)?);
    let inbound = connect_subscriber(config).await?;
    tracing::info!(addr = %config.mqtt_addr(), topic = %config.mqtt_topic, "mqtt subscribe");

    let service = IngestionService::new(repository);

    // Create application state
    let state = Arc::new(AppState {
        ingestion_stats: service.stats(),
    });

    let addr: SocketAddr = config.status_addr.parse()?;
    let server = StatusServer::start(addr, state).await?;

    service.run(inbound, shutdown).await;

    // The endpoint stops with the loop, whichever way the loop ended.
    if let Err(e) = server.shutdown(SHUTDOWN_GRACE).await {
        tracing::error!(error = %format!("{e:#}"), "status endpoint shutdown");
    }
    Ok(())
}
