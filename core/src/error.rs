use std::path::PathBuf;

use thiserror::Error;

/// A call record could not be appended to the log store.
///
/// Never surfaced to the tool-execution layer: `CallRecorder::record`
/// logs it and bumps a failure counter instead.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to write call record to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize call record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Malformed verifier configuration. The only error class that reaches
/// the caller of a verification request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid length bounds: min {min} must not exceed max {max}, and max must be positive")]
    InvalidLengthBounds { min: usize, max: usize },
    #[error("recency window must be at least one minute")]
    ZeroWindow,
    #[error("step keyword group '{group}' must contain at least one non-empty keyword")]
    EmptyKeywordGroup { group: &'static str },
}

/// Failure of a locally executed tool.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("current price must be positive (received {0})")]
    NonPositivePrice(f64),
    #[error("prices must be finite numbers")]
    NonFinitePrice,
}

/// Machine-readable reason codes attached to failing verdicts, in the
/// order their clauses appear in the verdict message.
pub mod codes {
    pub const LENGTH_OUT_OF_BOUNDS: &str = "length_out_of_bounds";
    pub const UNMATCHED_VALUES: &str = "unmatched_values";
    pub const SUSPICIOUS_ALERTS: &str = "suspicious_alerts";
    pub const REQUIRED_STEPS_MISSING: &str = "required_steps_missing";
}
