// Simulator service - Fixed-cadence loop that steps the simulator and publishes each sample
use crate::application::simulator::EafSimulator;
use crate::application::telemetry_repository::TelemetryPublisher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

pub struct SimulatorService {
    simulator: EafSimulator,
    publisher: Arc<dyn TelemetryPublisher>,
    interval: Duration,
    log_every: u64,
}

impl SimulatorService {
    pub fn new(
        simulator: EafSimulator,
        publisher: Arc<dyn TelemetryPublisher>,
        interval: Duration,
        log_every: u64,
    ) -> Self {
        Self {
            simulator,
            publisher,
            interval,
            log_every: log_every.max(1),
        }
    }

    /// Run until `shutdown` fires, returning the number of ticks taken.
    ///
    /// Each tick advances the simulator by the configured interval worth of
    /// simulated time. The step and its publish always complete before the
    /// shutdown signal is looked at again.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> u64 {
        let dt_s = self.interval.as_secs_f64();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately.
        ticker.tick().await;

        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(ticks, "simulator stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(dt_s, ticks).await;
                    ticks += 1;
                }
            }
        }
        ticks
    }

    async fn tick(&mut self, dt_s: f64, index: u64) {
        let (sample, transition) = match self.simulator.step_with_transition(dt_s, chrono::Utc::now()) {
            Ok(step) => step,
            Err(e) => {
                tracing::error!(error = %e, "simulator step rejected");
                return;
            }
        };

        if let Some(t) = transition {
            tracing::info!(
                from = %t.from,
                to = %t.to,
                new_heat = t.new_heat,
                heat_id = sample.heat_id,
                tons = sample.tons,
                "phase change"
            );
        }

        let payload = match sample.to_json() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode sample");
                return;
            }
        };

        match self.publisher.publish(payload).await {
            Ok(()) if index % self.log_every == 0 => tracing::info!(
                ts = %sample.timestamp,
                heat_id = sample.heat_id,
                mode = %sample.phase,
                power_kw = sample.power_kw,
                energy_kwh_total = sample.energy_kwh_total,
                "published sample"
            ),
            Ok(()) => tracing::debug!(
                heat_id = sample.heat_id,
                mode = %sample.phase,
                power_kw = sample.power_kw,
                "published sample"
            ),
            Err(e) => tracing::warn!(
                heat_id = sample.heat_id,
                mode = %sample.phase,
                error = %format!("{e:#}"),
                "publish failed, sample dropped"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::signal_model::AnomalyFlags;
    use crate::domain::telemetry::TelemetrySample;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<Vec<u8>>>,
        calls: AtomicUsize,
        fail_every_other: bool,
    }

    #[async_trait]
    impl TelemetryPublisher for RecordingPublisher {
        async fn publish(&self, payload: Vec<u8>) -> anyhow::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_every_other && call % 2 == 1 {
                anyhow::bail!("broker unreachable");
            }
            self.sent.lock().unwrap().push(payload);
            Ok(())
        }
    }

    fn service(publisher: Arc<RecordingPublisher>) -> SimulatorService {
        let sim = EafSimulator::new("eaf01_meter01", 42, AnomalyFlags::default());
        SimulatorService::new(sim, publisher, Duration::from_secs(1), 5)
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_in_tick_order_until_shutdown() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(service(publisher.clone()).run(rx));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        tx.send(()).unwrap();
        let ticks = handle.await.unwrap();

        let sent = publisher.sent.lock().unwrap();
        assert_eq!(ticks, 10);
        assert_eq!(sent.len(), 10);

        let samples: Vec<TelemetrySample> = sent
            .iter()
            .map(|p| serde_json::from_slice(p).unwrap())
            .collect();
        for w in samples.windows(2) {
            assert!(w[1].energy_kwh_total >= w[0].energy_kwh_total);
            assert!(w[1].timestamp >= w[0].timestamp);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failures_do_not_stop_loop() {
        let publisher = Arc::new(RecordingPublisher {
            fail_every_other: true,
            ..Default::default()
        });
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(service(publisher.clone()).run(rx));

        tokio::time::sleep(Duration::from_millis(6_500)).await;
        tx.send(()).unwrap();
        let ticks = handle.await.unwrap();

        assert_eq!(ticks, 6);
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 6);
        assert_eq!(publisher.sent.lock().unwrap().len(), 3);
    }
}
