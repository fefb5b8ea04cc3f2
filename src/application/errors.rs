// Error taxonomy for simulation, admission and ingestion
use thiserror::Error;

/// Contract violations raised by the simulator state machines.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },
}

pub type SimResult<T> = Result<T, SimError>;

/// Why the validator refused a telemetry message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("missing fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error("invalid number in {field}: {raw}")]
    InvalidNumber { field: &'static str, raw: String },

    #[error("{field}={value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("bad timestamp: {0}")]
    BadTimestamp(String),
}

/// Per-message failures inside the ingestion loop. None of these stop the loop.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("decode failure: {0}")]
    Decode(String),

    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("storage write failure: {0:#}")]
    StorageWrite(anyhow::Error),
}

/// Conditions that abort a process before its loop starts.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("INFLUX_TOKEN is empty; set it in the environment or config/eaf.toml")]
    MissingCredential,

    #[error("cannot connect to transport at {addr}: {reason}")]
    TransportConnect { addr: String, reason: String },
}
