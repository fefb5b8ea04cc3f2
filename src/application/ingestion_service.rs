// Ingestion service - Decode, validate and store each inbound telemetry message
use crate::application::errors::IngestError;
use crate::application::telemetry_repository::{InboundMessage, TelemetrySink};
use crate::application::validator::{decode_payload, validate_payload};
use crate::domain::telemetry::ValidatedRecord;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};

/// Running counters exposed on the status endpoint.
#[derive(Debug, Default)]
pub struct IngestionStats {
    received: AtomicU64,
    ingested: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestionSnapshot {
    pub received: u64,
    pub ingested: u64,
    pub dropped: u64,
}

impl IngestionStats {
    pub fn snapshot(&self) -> IngestionSnapshot {
        IngestionSnapshot {
            received: self.received.load(Ordering::Relaxed),
            ingested: self.ingested.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Messages are handled one at a time, so writes reach the sink serialized.
#[derive(Clone)]
pub struct IngestionService {
    sink: Arc<dyn TelemetrySink>,
    stats: Arc<IngestionStats>,
}

impl IngestionService {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            sink,
            stats: Arc::new(IngestionStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<IngestionStats> {
        self.stats.clone()
    }

    /// Consume `inbound` until it closes or `shutdown` fires. A message that
    /// is already being handled finishes before the loop exits.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("ingestion stopping");
                    break;
                }
                message = inbound.recv() => {
                    let Some(message) = message else {
                        tracing::warn!("transport channel closed");
                        break;
                    };
                    self.process(&message).await;
                }
            }
        }
    }

    /// Handle one message end to end, logging the outcome. Never fails.
    pub async fn process(&self, message: &InboundMessage) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        match self.handle_message(message).await {
            Ok(record) => {
                self.stats.ingested.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    ts = %record.timestamp,
                    heat_id = %record.heat_id,
                    mode = %record.mode,
                    power_kw = record.power_kw,
                    "ingested point"
                );
            }
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    topic = %message.topic,
                    reason = %e,
                    payload = %String::from_utf8_lossy(&message.payload),
                    "dropped message"
                );
            }
        }
    }

    pub async fn handle_message(&self, message: &InboundMessage) -> Result<ValidatedRecord, IngestError> {
        let payload = decode_payload(&message.payload)?;
        let record = validate_payload(&payload)?;
        self.sink
            .write_record(&record)
            .await
            .map_err(IngestError::StorageWrite)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::Rejection;
    use crate::application::signal_model::AnomalyFlags;
    use crate::application::simulator::EafSimulator;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<ValidatedRecord>>,
        fail_heat: Option<String>,
    }

    #[async_trait]
    impl TelemetrySink for RecordingSink {
        async fn write_record(&self, record: &ValidatedRecord) -> anyhow::Result<()> {
            if self.fail_heat.as_deref() == Some(record.heat_id.as_str()) {
                anyhow::bail!("influx returned 503");
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn message(payload: impl Into<Bytes>) -> InboundMessage {
        InboundMessage {
            topic: "steelplant/eaf01/telemetry".to_string(),
            payload: payload.into(),
        }
    }

    fn sample_messages(n: usize) -> Vec<InboundMessage> {
        let mut sim = EafSimulator::new("eaf01_meter01", 42, AnomalyFlags::default());
        (0..n)
            .map(|_| message(sim.step(1.0, chrono::Utc::now()).unwrap().to_json().unwrap()))
            .collect()
    }

    #[tokio::test]
    async fn test_error_kinds() {
        let service = IngestionService::new(Arc::new(RecordingSink {
            fail_heat: Some("9".to_string()),
            ..Default::default()
        }));

        let decode = service.handle_message(&message("not json")).await;
        assert!(matches!(decode, Err(IngestError::Decode(_))));

        let rejected = service.handle_message(&message(r#"{"mode": "idle"}"#)).await;
        assert!(matches!(
            rejected,
            Err(IngestError::Rejected(Rejection::MissingFields(_)))
        ));

        let storage = service
            .handle_message(&message(
                r#"{"ts":"2024-01-01T00:00:00Z","device_id":"d","heat_id":9,"mode":"idle",
                    "power_kw":400,"energy_kwh_total":1.5,"pump_kw":50,"compressor_kw":40,"tons":100}"#,
            ))
            .await;
        assert!(matches!(storage, Err(IngestError::StorageWrite(_))));
    }

    #[tokio::test]
    async fn test_bad_messages_are_dropped_and_loop_continues() {
        let sink = Arc::new(RecordingSink::default());
        let service = IngestionService::new(sink.clone());
        let (tx, rx) = mpsc::channel(32);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let good = sample_messages(3);
        tx.send(good[0].clone()).await.unwrap();
        tx.send(message(vec![0xff, 0x00])).await.unwrap();
        tx.send(good[1].clone()).await.unwrap();
        tx.send(message(r#"{"ts":"x"}"#)).await.unwrap();
        tx.send(good[2].clone()).await.unwrap();
        drop(tx);

        service.run(rx, shutdown_rx).await;

        assert_eq!(sink.records.lock().unwrap().len(), 3);
        assert_eq!(
            service.stats().snapshot(),
            IngestionSnapshot {
                received: 5,
                ingested: 3,
                dropped: 2
            }
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_waiting_loop() {
        let service = IngestionService::new(Arc::new(RecordingSink::default()));
        let (_tx, rx) = mpsc::channel::<InboundMessage>(1);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let runner = service.clone();
        let handle = tokio::spawn(async move { runner.run(rx, shutdown_rx).await });
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(service.stats().snapshot().received, 0);
    }

    #[tokio::test]
    async fn test_full_cycle_is_ingested() {
        let sink = Arc::new(RecordingSink::default());
        let service = IngestionService::new(sink.clone());

        for msg in sample_messages(520) {
            service.process(&msg).await;
        }

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 520);
        assert_eq!(records.first().unwrap().heat_id, "1");
        assert_eq!(records.last().unwrap().heat_id, "2");
        assert_eq!(service.stats().snapshot().dropped, 0);
    }
}
