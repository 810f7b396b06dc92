//! SignWave Core
//!
//! A real-time gesture recognition engine for a wearable sensor glove.
//! Raw IMU and flex-sensor samples go in; discrete, debounced gesture
//! events ("the user signed B") come out.
//!
//! # Design Philosophy
//!
//! - **Frames are cheap, events are expensive**: every sample is
//!   estimated, normalized and classified, but an event only fires after
//!   the hysteresis layer confirms a stable gesture. Consumers never see
//!   per-frame flicker.
//! - **One feature contract**: the 14-column feature order is declared
//!   once ([`features::FEATURE_COLUMNS`]) and every consumer addresses
//!   columns by name. No stage assumes positions.
//! - **Strategies behind seams**: orientation fusion (complementary vs
//!   Kalman), per-frame classification (range scoring vs a learned
//!   model) and event decision (streak FSM vs majority vote) are all
//!   construction-time choices behind traits or config enums.
//! - **Degrade loudly, never crash**: a stalled source is a logged,
//!   counted condition the producer rides out; an invalid reference
//!   envelope is rejected wholesale with the prior table left active.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use signwave_core::engine::{EngineConfig, GestureEngine, ScriptedSource};
//! use signwave_core::envelope::ReferenceEnvelope;
//!
//! let envelope = Arc::new(ReferenceEnvelope::from_json(&table_json)?);
//! let source = Box::new(ScriptedSource::new(recorded_samples));
//! let mut engine = GestureEngine::new(source, envelope, EngineConfig::default());
//!
//! engine.calibrate(Duration::from_secs(2))?;
//! let events = engine.start_translate()?;
//! while let Ok(event) = events.recv() {
//!     println!("{:?}", event.kind);
//! }
//! ```

pub mod buffer;
pub mod classifier;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod estimator;
pub mod features;
pub mod state_machine;
pub mod types;

#[cfg(test)]
mod integration_tests;

// Re-export the types most callers touch.
pub use classifier::{FrameClassifier, LearnedModel};
pub use engine::{
    ClassifierKind, EngineConfig, GestureEngine, PolicyKind, PracticeReport, SampleSource,
};
pub use envelope::ReferenceEnvelope;
pub use error::{EngineError, Result};
pub use types::{
    Classification, EngineMode, EngineStatus, GestureEvent, GestureKind, Label, Orientation,
    RawSample,
};
