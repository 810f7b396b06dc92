//! Core data types for the glove gesture engine.
//!
//! This module defines the fundamental types used throughout the
//! recognition pipeline: raw sensor samples, fused orientation, gesture
//! labels, per-frame classifications, and the discrete events the engine
//! emits.
//!
//! Design principle: Types should make intent obvious. If a concept exists,
//! it gets a type. Never pass raw tuples or untyped collections across
//! boundaries. The feature-column ordering bug class this rules out is
//! exactly the one the engine exists to prevent.

use serde::{Deserialize, Serialize};

use crate::features::FeatureVector;

/// Number of flex (finger bend) channels on the glove, thumb..pinky.
pub const FLEX_CHANNELS: usize = 5;

/// A single raw sample from the glove sensors.
///
/// This is the minimal input contract: three-axis accelerometer, three-axis
/// gyroscope, and five flex channel readings, with a monotonic timestamp.
/// A sample is never mutated after capture.
///
/// Design note: We use f32 for on-device execution to save memory. The
/// flex channels are raw 10-bit ADC counts (0..=1023).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// Monotonic timestamp in milliseconds. Required for temporal ordering.
    pub timestamp_ms: u64,

    /// Accelerometer reading [x, y, z] in g.
    pub accel: [f32; 3],

    /// Gyroscope reading [x, y, z] in deg/s.
    pub gyro: [f32; 3],

    /// Flex channel readings, thumb..pinky, 0..=1023.
    pub flex: [u16; FLEX_CHANNELS],
}

impl RawSample {
    /// Creates a new raw sample.
    ///
    /// Assumptions:
    /// - timestamp_ms must be monotonically increasing within a sequence
    /// - flex readings are raw ADC counts; values above 1023 indicate a
    ///   bus fault and are the SampleSource's concern, not ours
    pub fn new(
        timestamp_ms: u64,
        accel: [f32; 3],
        gyro: [f32; 3],
        flex: [u16; FLEX_CHANNELS],
    ) -> Self {
        Self {
            timestamp_ms,
            accel,
            gyro,
            flex,
        }
    }

    /// A stationary sample: unit gravity on z, zero rotation, straight
    /// fingers. Useful as a calibration-posture reference and in tests.
    pub fn at_rest(timestamp_ms: u64) -> Self {
        Self::new(timestamp_ms, [0.0, 0.0, 1.0], [0.0, 0.0, 0.0], [0; FLEX_CHANNELS])
    }

    /// Magnitude of the accelerometer vector in g.
    pub fn accel_magnitude(&self) -> f32 {
        let [x, y, z] = self.accel;
        (x * x + y * y + z * z).sqrt()
    }

    /// Magnitude of the gyroscope vector in deg/s.
    pub fn gyro_magnitude(&self) -> f32 {
        let [x, y, z] = self.gyro;
        (x * x + y * y + z * z).sqrt()
    }
}

/// Fused attitude estimate in degrees.
///
/// Owned exclusively by the orientation estimator; everything downstream
/// receives read-only copies. Yaw is pure gyro integration and drifts
/// unboundedly over a session, a documented limitation, not a bug.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Orientation {
    /// Rotation about the x axis, degrees.
    pub roll: f32,
    /// Rotation about the y axis, degrees.
    pub pitch: f32,
    /// Rotation about the z axis, degrees. Uncorrected integration.
    pub yaw: f32,
}

impl Orientation {
    pub fn new(roll: f32, pitch: f32, yaw: f32) -> Self {
        Self { roll, pitch, yaw }
    }

    /// Largest absolute angle across the three axes. Used by the heuristic
    /// relax detector ("hand held level").
    pub fn max_abs_angle(&self) -> f32 {
        self.roll.abs().max(self.pitch.abs()).max(self.yaw.abs())
    }
}

/// A gesture vocabulary label.
///
/// Labels are short strings ("A".."Z" for the letter vocabulary) plus the
/// reserved relax label. Comparison is case-sensitive; the envelope loader
/// owns normalization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(pub String);

impl Label {
    /// The reserved "no sign, hand at rest" label used to re-arm the
    /// gesture state machine.
    pub const RELAX_NAME: &'static str = "relax";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The reserved relax label.
    pub fn relax() -> Self {
        Self(Self::RELAX_NAME.to_string())
    }

    /// True if this is the reserved relax label.
    pub fn is_relax(&self) -> bool {
        self.0 == Self::RELAX_NAME
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Result of classifying one frame.
///
/// `label` is None when no candidate cleared the global confidence floor.
/// Confidence is always in [0, 1]; a None label carries confidence 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: Option<Label>,
    pub confidence: f32,
}

impl Classification {
    pub fn new(label: Label, confidence: f32) -> Self {
        Self {
            label: Some(label),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// The "nothing cleared the floor" result.
    pub fn none() -> Self {
        Self {
            label: None,
            confidence: 0.0,
        }
    }

    /// True if a label was assigned.
    pub fn is_some(&self) -> bool {
        self.label.is_some()
    }

    /// True if the assigned label is the reserved relax label.
    pub fn is_relax(&self) -> bool {
        self.label.as_ref().map(Label::is_relax).unwrap_or(false)
    }
}

/// Sensor context captured alongside an emitted event.
///
/// Carries the frame that confirmed the gesture so transports can show
/// the user what the glove looked like at emission time.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub timestamp_ms: u64,
    pub features: FeatureVector,
    pub classification: Classification,
}

/// The kind of discrete gesture event.
#[derive(Debug, Clone, PartialEq)]
pub enum GestureKind {
    /// The hand returned to rest; the state machine is re-armed.
    Relax,
    /// A letter was held stably and confidently.
    Letter(Label),
}

/// A discrete, debounced gesture event.
///
/// Emitted at most once per stable detection episode. The state machine
/// guarantees two identical Letter events are always separated by a Relax
/// (or a mode-specific reset); that invariant is the whole point of the
/// hysteresis layer.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureEvent {
    pub kind: GestureKind,
    pub snapshot: FrameSnapshot,
    pub timestamp_ms: u64,
}

impl GestureEvent {
    pub fn new(kind: GestureKind, snapshot: FrameSnapshot) -> Self {
        let timestamp_ms = snapshot.timestamp_ms;
        Self {
            kind,
            snapshot,
            timestamp_ms,
        }
    }

    /// The letter carried by this event, if it is a letter event.
    pub fn letter(&self) -> Option<&Label> {
        match &self.kind {
            GestureKind::Letter(label) => Some(label),
            GestureKind::Relax => None,
        }
    }

    /// True for relax events.
    pub fn is_relax(&self) -> bool {
        matches!(self.kind, GestureKind::Relax)
    }
}

/// One entry in the frame buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameEntry {
    /// Capture timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Normalized feature vector for this frame.
    pub features: FeatureVector,
    /// Per-frame classification result.
    pub classification: Classification,
}

impl FrameEntry {
    pub fn new(timestamp_ms: u64, features: FeatureVector, classification: Classification) -> Self {
        Self {
            timestamp_ms,
            features,
            classification,
        }
    }

    /// Convert to an event snapshot.
    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            timestamp_ms: self.timestamp_ms,
            features: self.features.clone(),
            classification: self.classification.clone(),
        }
    }
}

/// The engine's current operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// No recognition running. Calibration is allowed.
    Idle,
    /// Continuous translation: relax-gated letter emission.
    Translate,
    /// Practice: streak detection against a target letter, no relax gate.
    Practice,
}

impl EngineMode {
    pub fn is_idle(&self) -> bool {
        matches!(self, EngineMode::Idle)
    }
}

/// A point-in-time report of engine health, served to status endpoints.
///
/// An uncalibrated or stalled engine reads as "not ready" here rather than
/// silently emitting events.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    /// Current operating mode.
    pub mode: EngineMode,
    /// Whether a calibration has completed this session.
    pub calibrated: bool,
    /// Number of frames currently buffered.
    pub buffered_frames: usize,
    /// Count of source stalls observed since the mode started.
    pub stall_count: u64,
    /// Version string of the active reference envelope, if one is loaded.
    pub envelope_version: Option<String>,
}

impl EngineStatus {
    /// Ready means calibrated and actively producing frames.
    pub fn is_ready(&self) -> bool {
        self.calibrated && !self.mode.is_idle()
    }
}
