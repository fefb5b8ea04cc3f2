// Phase scheduler - Drives the furnace through the fixed heat cycle
use crate::application::errors::{SimError, SimResult};
use crate::domain::phase::Phase;
use crate::domain::telemetry::round_to;
use rand::Rng;
use std::ops::RangeInclusive;

/// Charge mass drawn for every new heat.
const TONS_RANGE: RangeInclusive<f64> = 80.0..=120.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    /// True when the transition closed one heat and opened the next.
    pub new_heat: bool,
}

#[derive(Debug, Clone)]
pub struct PhaseScheduler {
    phase: Phase,
    elapsed_in_phase_s: f64,
    heat_id: u64,
    tons: f64,
}

impl PhaseScheduler {
    /// Start in idle on heat 1 with a freshly sampled charge.
    pub fn new<R: Rng>(rng: &mut R) -> Self {
        Self {
            phase: Phase::Idle,
            elapsed_in_phase_s: 0.0,
            heat_id: 1,
            tons: sample_tons(rng),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[cfg(test)]
    pub fn elapsed_in_phase_s(&self) -> f64 {
        self.elapsed_in_phase_s
    }

    pub fn heat_id(&self) -> u64 {
        self.heat_id
    }

    pub fn tons(&self) -> f64 {
        self.tons
    }

    /// Add `dt_s` simulated seconds to the current phase.
    ///
    /// At most one transition happens per call and the phase clock restarts at
    /// zero, so an oversized step can never skip a phase. Non-positive or
    /// non-finite steps are rejected without touching any state.
    pub fn advance<R: Rng>(
        &mut self,
        dt_s: f64,
        rng: &mut R,
    ) -> SimResult<Option<PhaseTransition>> {
        if !dt_s.is_finite() || dt_s <= 0.0 {
            return Err(SimError::InvalidArg {
                what: "dt must be positive and finite",
            });
        }

        self.elapsed_in_phase_s += dt_s;
        if self.elapsed_in_phase_s < self.phase.nominal_duration_s() {
            return Ok(None);
        }

        let from = self.phase;
        self.phase = from.next();
        self.elapsed_in_phase_s = 0.0;

        let new_heat = from == Phase::Downtime && self.phase == Phase::Idle;
        if new_heat {
            self.heat_id += 1;
            self.tons = sample_tons(rng);
        }

        Ok(Some(PhaseTransition {
            from,
            to: self.phase,
            new_heat,
        }))
    }
}

fn sample_tons<R: Rng>(rng: &mut R) -> f64 {
    round_to(rng.gen_range(TONS_RANGE), 1)
}
