// EAF simulator - Owns the scheduler, signal model and seeded RNG for one device stream
use crate::application::errors::SimResult;
use crate::application::phase_scheduler::{PhaseScheduler, PhaseTransition};
use crate::application::signal_model::{AnomalyFlags, SignalModel};
use crate::domain::telemetry::TelemetrySample;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Deterministic signal generator for a single furnace meter.
///
/// Every random draw comes from the owned ChaCha8 stream, so two simulators
/// built with the same seed and stepped with the same `dt` sequence emit the
/// same values (timestamps aside).
#[derive(Debug, Clone)]
pub struct EafSimulator {
    device_id: String,
    rng: ChaCha8Rng,
    scheduler: PhaseScheduler,
    model: SignalModel,
    sim_time_s: f64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl EafSimulator {
    pub fn new(device_id: impl Into<String>, seed: u64, anomalies: AnomalyFlags) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let scheduler = PhaseScheduler::new(&mut rng);
        Self {
            device_id: device_id.into(),
            rng,
            scheduler,
            model: SignalModel::new(anomalies),
            sim_time_s: 0.0,
            last_timestamp: None,
        }
    }

    #[cfg(test)]
    pub fn step(&mut self, dt_s: f64, now: DateTime<Utc>) -> SimResult<TelemetrySample> {
        self.step_with_transition(dt_s, now).map(|(sample, _)| sample)
    }

    /// Advance the furnace by `dt_s` simulated seconds and emit the resulting
    /// sample along with the phase change it caused, if any.
    ///
    /// The phase moves first, so the sample reflects the phase the furnace is in
    /// after the step. `now` is clamped to the previous timestamp so a wall
    /// clock that steps backwards cannot reorder the stream.
    pub fn step_with_transition(
        &mut self,
        dt_s: f64,
        now: DateTime<Utc>,
    ) -> SimResult<(TelemetrySample, Option<PhaseTransition>)> {
        let transition = self.scheduler.advance(dt_s, &mut self.rng)?;
        self.sim_time_s += dt_s;

        let reading = self
            .model
            .sample(self.scheduler.phase(), self.sim_time_s, dt_s, &mut self.rng);

        let timestamp = match self.last_timestamp {
            Some(last) if now < last => last,
            _ => now,
        };
        self.last_timestamp = Some(timestamp);

        let sample = TelemetrySample {
            timestamp,
            device_id: self.device_id.clone(),
            heat_id: self.scheduler.heat_id(),
            phase: self.scheduler.phase(),
            power_kw: reading.power_kw,
            energy_kwh_total: reading.energy_kwh_total,
            pump_kw: reading.pump_kw,
            compressor_kw: reading.compressor_kw,
            tons: self.scheduler.tons(),
        };
        Ok((sample, transition))
    }
}
