//! Per-frame classification strategies.
//!
//! Two interchangeable strategies sit behind the [`FrameClassifier`]
//! trait so the gesture state machine never knows which one is active:
//!
//! - [`RangeScorer`]: heuristic weighted hit ratio against a reference
//!   envelope. Flex channels carry most of the weight; IMU channels get a
//!   small say, boosted for the motion-heavy letters.
//! - [`LearnedClassifierAdapter`]: wraps an externally trained model
//!   behind the opaque [`LearnedModel`] trait and applies the same
//!   confidence floor. Feature scaling/encoding lives with the model
//!   artifact, loaded once and immutable for the session.
//!
//! Selection is a construction-time choice, never a per-call branch.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::envelope::ReferenceEnvelope;
use crate::features::{FeatureVector, FEATURE_COLUMNS};
use crate::types::{Classification, Label};

/// Maps a normalized feature vector to a `(label, confidence)` result.
///
/// Object-safe: the engine stores a `Box<dyn FrameClassifier + Send>`.
pub trait FrameClassifier: Send {
    fn classify(&self, features: &FeatureVector) -> Classification;
}

/// Channel weights for the range scorer.
#[derive(Debug, Clone)]
pub struct ScoreWeights {
    /// Weight per flex channel. Finger posture dominates letter identity.
    pub flex: f32,
    /// Weight per orientation/IMU channel.
    pub imu: f32,
    /// IMU weight used instead of `imu` for labels in `imu_boost_labels`.
    pub imu_boosted: f32,
    /// Labels whose identity depends on hand motion/attitude (the
    /// original vocabulary boosted C, J and Z).
    pub imu_boost_labels: BTreeSet<Label>,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            flex: 2.0,
            imu: 0.5,
            imu_boosted: 1.0,
            imu_boost_labels: ["C", "J", "Z"].into_iter().map(Label::new).collect(),
        }
    }
}

/// Configuration for the range scorer.
#[derive(Debug, Clone)]
pub struct RangeScorerConfig {
    pub weights: ScoreWeights,
    /// Global confidence floor. Below it the frame classifies as
    /// `(None, 0.0)`. Reference: 0.55.
    pub min_confidence: f32,
}

impl Default for RangeScorerConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            min_confidence: 0.55,
        }
    }
}

/// Heuristic classifier scoring each label by a weighted hit ratio.
///
/// `confidence(label) = Σ weight·[value ∈ range] / Σ weight` over all 14
/// feature columns. The best label is the argmax; exact ties keep the
/// first label in sorted vocabulary order, an explicit, reproducible
/// tie-break, not an accident of iteration.
pub struct RangeScorer {
    envelope: Arc<ReferenceEnvelope>,
    config: RangeScorerConfig,
}

impl RangeScorer {
    pub fn new(envelope: Arc<ReferenceEnvelope>, config: RangeScorerConfig) -> Self {
        Self { envelope, config }
    }

    /// Swap in a replacement envelope. Atomic from the scorer's
    /// perspective: each classification sees exactly one table.
    pub fn replace_envelope(&mut self, envelope: Arc<ReferenceEnvelope>) {
        self.envelope = envelope;
    }

    pub fn envelope(&self) -> &Arc<ReferenceEnvelope> {
        &self.envelope
    }

    /// Score one label. Validation guarantees every column exists; a
    /// label that somehow cannot be scored contributes zero confidence.
    pub fn score(&self, features: &FeatureVector, label: &Label) -> f32 {
        let Some(ranges) = self.envelope.ranges_for(label) else {
            return 0.0;
        };

        let imu_weight = if self.config.weights.imu_boost_labels.contains(label) {
            self.config.weights.imu_boosted
        } else {
            self.config.weights.imu
        };

        let mut hits = 0.0f32;
        let mut total = 0.0f32;
        for column in FEATURE_COLUMNS {
            let weight = if column.starts_with("flex") {
                self.config.weights.flex
            } else {
                imu_weight
            };
            total += weight;

            let (Some(value), Some(range)) = (features.get(column), ranges.get(column)) else {
                continue;
            };
            if range.contains(value) {
                hits += weight;
            }
        }

        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

impl FrameClassifier for RangeScorer {
    fn classify(&self, features: &FeatureVector) -> Classification {
        let mut best: Option<(&Label, f32)> = None;
        for label in self.envelope.labels() {
            let confidence = self.score(features, label);
            // Strict > keeps the earliest (sorted-order) label on ties.
            if best.map(|(_, c)| confidence > c).unwrap_or(true) {
                best = Some((label, confidence));
            }
        }

        match best {
            Some((label, confidence)) if confidence >= self.config.min_confidence => {
                Classification::new(label.clone(), confidence)
            }
            _ => Classification::none(),
        }
    }
}

/// An already-fitted external discriminant, treated as a black box.
///
/// Implementations own their scaling and label encoding; the engine's
/// only obligations are the canonical feature order (via
/// `FeatureVector::to_array`) and the confidence floor. Held behind an
/// `Arc` because the artifact is session-immutable and shared between
/// the engine and the recognizing thread.
pub trait LearnedModel: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> (Label, f32);
}

/// Adapter putting a [`LearnedModel`] behind the common classifier trait.
pub struct LearnedClassifierAdapter {
    model: Arc<dyn LearnedModel>,
    /// Per-mode floor; predictions below it classify as `(None, 0.0)`.
    min_confidence: f32,
}

impl LearnedClassifierAdapter {
    pub fn new(model: Arc<dyn LearnedModel>, min_confidence: f32) -> Self {
        Self {
            model,
            min_confidence,
        }
    }

    /// Build from an optionally loaded model artifact. Selecting the
    /// learned strategy without one is a hard error, not a silent
    /// fallback to the range scorer.
    pub fn from_loaded(
        model: Option<Arc<dyn LearnedModel>>,
        min_confidence: f32,
    ) -> crate::error::Result<Self> {
        match model {
            Some(model) => Ok(Self::new(model, min_confidence)),
            None => Err(crate::error::EngineError::ClassifierUnavailable(
                "no learned model artifact loaded for this session".to_string(),
            )),
        }
    }
}

impl FrameClassifier for LearnedClassifierAdapter {
    fn classify(&self, features: &FeatureVector) -> Classification {
        let (label, confidence) = self.model.predict(features);
        if confidence >= self.min_confidence {
            Classification::new(label, confidence)
        } else {
            Classification::none()
        }
    }
}
