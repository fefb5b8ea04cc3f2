// Furnace phase domain model
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating mode of the furnace. The cycle always runs in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Melt,
    Refine,
    Downtime,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Idle, Phase::Melt, Phase::Refine, Phase::Downtime];

    /// Nominal phase length in simulated seconds.
    pub fn nominal_duration_s(self) -> f64 {
        match self {
            Phase::Idle => 60.0,
            Phase::Melt => 240.0,
            Phase::Refine => 180.0,
            Phase::Downtime => 40.0,
        }
    }

    pub fn next(self) -> Phase {
        match self {
            Phase::Idle => Phase::Melt,
            Phase::Melt => Phase::Refine,
            Phase::Refine => Phase::Downtime,
            Phase::Downtime => Phase::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Melt => "melt",
            Phase::Refine => "refine",
            Phase::Downtime => "downtime",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase '{0}'")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}
