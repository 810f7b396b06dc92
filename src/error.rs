//! Error taxonomy for the gesture engine.
//!
//! The split follows recoverability: transient sensor conditions
//! (stalls, uncalibrated reads) are recoverable and the caller retries;
//! configuration-shape problems (bad envelope table, missing model) are
//! actionable failures surfaced at load/start time. Sensor bus faults are
//! the SampleSource's concern and never reach this enum as panics; they
//! arrive as a typed "no sample" signal.

use thiserror::Error;

use crate::types::EngineMode;

/// All failure modes surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `update()` was requested before a calibration completed.
    /// Recoverable: calibrate, then retry.
    #[error("orientation estimator is not calibrated")]
    Uncalibrated,

    /// The calibration window yielded too few samples (starved source).
    /// Recoverable: re-run calibration or fall back to zeroed bias.
    #[error("calibration collected {got} samples, need at least {need}")]
    InsufficientSamples { got: usize, need: usize },

    /// A reference envelope failed validation. The prior table stays
    /// active; nothing is partially applied.
    #[error("reference envelope invalid: label {label:?} is missing feature {feature:?}")]
    InvalidEnvelope { label: String, feature: String },

    /// An envelope document could not be parsed at all.
    #[error("reference envelope unreadable: {0}")]
    EnvelopeFormat(#[from] serde_json::Error),

    /// The external learned classifier is not available. Modes depending
    /// on it must refuse to start; range-scored modes are unaffected.
    #[error("learned classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    /// No sample arrived within the expected window. Logged and tolerated
    /// by the producer; surfaced only when a caller asks synchronously.
    #[error("sample source stalled for {elapsed_ms} ms")]
    SourceStall { elapsed_ms: u64 },

    /// A start request arrived while a mode was already active.
    /// Explicit rejection rather than undefined double-start behavior.
    #[error("engine is already active in {0:?} mode")]
    AlreadyActive(EngineMode),

    /// A request required a label the active vocabulary does not define.
    #[error("label {0:?} is not in the loaded vocabulary")]
    UnknownLabel(String),

    /// The producer thread could not be spawned.
    #[error("producer thread could not be started: {0}")]
    ProducerSpawn(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_strings() {
        let e = EngineError::InsufficientSamples { got: 3, need: 10 };
        assert_eq!(e.to_string(), "calibration collected 3 samples, need at least 10");

        let e = EngineError::InvalidEnvelope {
            label: "A".into(),
            feature: "flex3".into(),
        };
        assert!(e.to_string().contains("flex3"));

        let e = EngineError::AlreadyActive(EngineMode::Translate);
        assert!(e.to_string().contains("Translate"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: serde_json::Error = serde_json::from_str::<serde_json::Value>("{not json")
            .expect_err("must fail");
        let e: EngineError = parse.into();
        assert!(matches!(e, EngineError::EnvelopeFormat(_)));
    }
}
