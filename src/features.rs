//! Feature normalization and the canonical column contract.
//!
//! The classifier, the reference envelope, and any trained model must all
//! agree on which value sits in which column. The source variants of this
//! system disagreed about that across files, which is a correctness bug,
//! not a type error, so the order is declared exactly once here
//! ([`FEATURE_COLUMNS`]) and every access goes through named fields.
//!
//! Canonical order: roll, pitch, yaw, gx, gy, gz, ax, ay, az,
//! flex0..flex4 (thumb..pinky).

use crate::types::{Orientation, RawSample, FLEX_CHANNELS};

/// Total number of feature columns.
pub const FEATURE_COUNT: usize = 9 + FLEX_CHANNELS;

/// The canonical feature column names, in the one authoritative order.
///
/// Envelope tables and trained models are validated against these names;
/// nothing in the crate indexes features positionally except through
/// [`FeatureVector::to_array`], which is itself derived from this list.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "roll", "pitch", "yaw", "gx", "gy", "gz", "ax", "ay", "az", "flex0", "flex1", "flex2",
    "flex3", "flex4",
];

/// A normalized per-frame feature vector with named fields.
///
/// Flex readings are carried as f32 so one numeric type flows through
/// scoring; they remain in raw ADC counts (0..=1023), not rescaled;
/// the envelope ranges are expressed in the same counts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureVector {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
    pub flex: [f32; FLEX_CHANNELS],
}

impl FeatureVector {
    /// The pure normalization step: combine a fused orientation with the
    /// raw sample's rate, acceleration, and flex channels. No hidden state.
    pub fn from_parts(orientation: &Orientation, sample: &RawSample) -> Self {
        let mut flex = [0.0; FLEX_CHANNELS];
        for (out, raw) in flex.iter_mut().zip(sample.flex.iter()) {
            *out = *raw as f32;
        }

        Self {
            roll: orientation.roll,
            pitch: orientation.pitch,
            yaw: orientation.yaw,
            gx: sample.gyro[0],
            gy: sample.gyro[1],
            gz: sample.gyro[2],
            ax: sample.accel[0],
            ay: sample.accel[1],
            az: sample.accel[2],
            flex,
        }
    }

    /// Look up a feature value by its canonical column name.
    ///
    /// Returns None for names outside [`FEATURE_COLUMNS`]; envelope
    /// validation guarantees scorers never hit that branch.
    pub fn get(&self, name: &str) -> Option<f32> {
        let value = match name {
            "roll" => self.roll,
            "pitch" => self.pitch,
            "yaw" => self.yaw,
            "gx" => self.gx,
            "gy" => self.gy,
            "gz" => self.gz,
            "ax" => self.ax,
            "ay" => self.ay,
            "az" => self.az,
            "flex0" => self.flex[0],
            "flex1" => self.flex[1],
            "flex2" => self.flex[2],
            "flex3" => self.flex[3],
            "flex4" => self.flex[4],
            _ => return None,
        };
        Some(value)
    }

    /// Flatten into the canonical column order, for feeding trained models
    /// that consume a dense row.
    pub fn to_array(&self) -> [f32; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for (slot, name) in out.iter_mut().zip(FEATURE_COLUMNS.iter()) {
            // get() covers every canonical name by construction
            *slot = self.get(name).unwrap_or(0.0);
        }
        out
    }

    /// Maximum absolute gyro rate across axes, for stillness checks.
    pub fn max_abs_rate(&self) -> f32 {
        self.gx.abs().max(self.gy.abs()).max(self.gz.abs())
    }

    /// Maximum flex reading across fingers, for the relax heuristic.
    pub fn max_flex(&self) -> f32 {
        self.flex.iter().fold(0.0, |acc, v| acc.max(*v))
    }

    /// Orientation portion as a snapshot type.
    pub fn orientation(&self) -> Orientation {
        Orientation::new(self.roll, self.pitch, self.yaw)
    }
}
