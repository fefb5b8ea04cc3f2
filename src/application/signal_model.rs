// Signal model - Per-phase power draw, auxiliary loads and energy integration
use crate::domain::phase::Phase;
use crate::domain::telemetry::round_to;
use rand::Rng;
use std::f64::consts::TAU;
use std::ops::RangeInclusive;

const OSCILLATION_AMPLITUDE_KW: f64 = 100.0;
const OSCILLATION_PERIOD_S: f64 = 15.0;
const NOISE_KW: RangeInclusive<f64> = -50.0..=50.0;
const PUMP_KW: RangeInclusive<f64> = 40.0..=120.0;
const COMPRESSOR_KW: RangeInclusive<f64> = 30.0..=90.0;

/// Multiplier applied to idle power when wasted standby draw is injected.
pub const IDLE_LOAD_INCREASE_FACTOR: f64 = 1.35;

fn base_power_kw(phase: Phase) -> RangeInclusive<f64> {
    match phase {
        Phase::Idle => 300.0..=600.0,
        Phase::Melt => 2500.0..=4200.0,
        Phase::Refine => 1500.0..=2600.0,
        Phase::Downtime => 100.0..=250.0,
    }
}

/// Externally toggled fault injection. Everything is off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnomalyFlags {
    pub idle_load_increase: bool,
    /// Constant offset added to reported power, simulating a miscalibrated meter.
    pub sensor_bias_kw: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalReading {
    pub power_kw: f64,
    pub pump_kw: f64,
    pub compressor_kw: f64,
    pub energy_kwh_total: f64,
}

#[derive(Debug, Clone)]
pub struct SignalModel {
    anomalies: AnomalyFlags,
    energy_kwh_total: f64,
}

impl SignalModel {
    pub fn new(anomalies: AnomalyFlags) -> Self {
        Self {
            anomalies,
            energy_kwh_total: 0.0,
        }
    }

    /// Unrounded running energy integral.
    #[cfg(test)]
    pub fn energy_kwh_total(&self) -> f64 {
        self.energy_kwh_total
    }

    /// Draw one reading for `phase` at simulated time `sim_time_s` and integrate
    /// the reported power over `dt_s`. Reported power is never negative, so the
    /// energy total never decreases for a positive step.
    pub fn sample<R: Rng>(
        &mut self,
        phase: Phase,
        sim_time_s: f64,
        dt_s: f64,
        rng: &mut R,
    ) -> SignalReading {
        let mut power_kw = rng.gen_range(base_power_kw(phase));
        if phase == Phase::Idle && self.anomalies.idle_load_increase {
            power_kw *= IDLE_LOAD_INCREASE_FACTOR;
        }

        let oscillation =
            OSCILLATION_AMPLITUDE_KW * (TAU * sim_time_s / OSCILLATION_PERIOD_S).sin();
        power_kw = (power_kw + oscillation + rng.gen_range(NOISE_KW)).max(0.0);

        if let Some(bias) = self.anomalies.sensor_bias_kw {
            power_kw = (power_kw + bias).max(0.0);
        }

        let pump_kw = rng.gen_range(PUMP_KW);
        let compressor_kw = rng.gen_range(COMPRESSOR_KW);

        // Integrate what is reported so the stored total matches the stored power.
        let power_kw = round_to(power_kw, 2);
        self.energy_kwh_total += power_kw * dt_s / 3600.0;

        SignalReading {
            power_kw,
            pump_kw: round_to(pump_kw, 2),
            compressor_kw: round_to(compressor_kw, 2),
            energy_kwh_total: round_to(self.energy_kwh_total, 3),
        }
    }
}
