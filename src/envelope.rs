//! Reference envelope tables for heuristic classification.
//!
//! An envelope maps each vocabulary label to an inclusive `[lo, hi]` range
//! per feature column. Tables arrive as JSON (the format the training-side
//! tooling exports) and are validated wholesale: a table missing any of
//! the canonical feature columns for any label is rejected as a unit, and
//! whatever table was active before stays active. No partial update is
//! ever visible to classification.
//!
//! Backed by `BTreeMap` so the vocabulary iterates in sorted label order;
//! that order is the documented, reproducible tie-break for the range
//! scorer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::features::FEATURE_COLUMNS;
use crate::types::Label;

/// An inclusive value range for one feature column.
///
/// Serialized as the two-element `[lo, hi]` array the training tooling
/// exports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Range {
    pub lo: f32,
    pub hi: f32,
}

impl From<[f32; 2]> for Range {
    fn from([lo, hi]: [f32; 2]) -> Self {
        Self { lo, hi }
    }
}

impl From<Range> for [f32; 2] {
    fn from(range: Range) -> Self {
        [range.lo, range.hi]
    }
}

impl Range {
    pub fn new(lo: f32, hi: f32) -> Self {
        Self { lo, hi }
    }

    /// Inclusive containment check.
    pub fn contains(&self, value: f32) -> bool {
        self.lo <= value && value <= self.hi
    }

    /// Center of the range; used by tests and practice hints.
    pub fn midpoint(&self) -> f32 {
        (self.lo + self.hi) / 2.0
    }
}

/// Per-label feature ranges. Keys are canonical feature column names.
pub type LabelRanges = BTreeMap<String, Range>;

/// A validated reference envelope table.
///
/// Construct with [`ReferenceEnvelope::from_json`] or
/// [`ReferenceEnvelope::from_labels`]; both validate before returning, so
/// a held `ReferenceEnvelope` is always complete. Replacement is by whole
/// value (the engine swaps an `Arc`), never by mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEnvelope {
    /// Optional version tag, echoed in engine status reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// label -> feature -> inclusive range.
    pub ranges: BTreeMap<Label, LabelRanges>,
}

impl ReferenceEnvelope {
    /// Parse and validate a JSON document.
    ///
    /// Accepts either the versioned wrapper (`{"version": ..,
    /// "ranges": {..}}`) or the bare `{label: {feature: [lo, hi]}}`
    /// mapping older exports use.
    pub fn from_json(document: &str) -> Result<Self> {
        let envelope: ReferenceEnvelope = match serde_json::from_str(document) {
            Ok(wrapped) => wrapped,
            Err(_) => {
                let ranges: BTreeMap<Label, LabelRanges> = serde_json::from_str(document)?;
                ReferenceEnvelope {
                    version: None,
                    ranges,
                }
            }
        };
        envelope.validate()?;
        info!(
            labels = envelope.ranges.len(),
            version = envelope.version.as_deref().unwrap_or("none"),
            "reference envelope loaded"
        );
        Ok(envelope)
    }

    /// Build from an in-memory table, validating it.
    pub fn from_labels(
        version: Option<String>,
        ranges: BTreeMap<Label, LabelRanges>,
    ) -> Result<Self> {
        let envelope = Self { version, ranges };
        envelope.validate()?;
        Ok(envelope)
    }

    /// Serialize back to JSON. Round-trips structurally: `BTreeMap` keys
    /// come out in a deterministic order.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that every label defines every canonical feature column.
    ///
    /// The scorer assumes completeness, so an incomplete table must never
    /// become active.
    pub fn validate(&self) -> Result<()> {
        for (label, features) in &self.ranges {
            for column in FEATURE_COLUMNS {
                if !features.contains_key(column) {
                    return Err(EngineError::InvalidEnvelope {
                        label: label.as_str().to_string(),
                        feature: column.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Vocabulary in sorted label order.
    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.ranges.keys()
    }

    /// Ranges for one label.
    pub fn ranges_for(&self, label: &Label) -> Option<&LabelRanges> {
        self.ranges.get(label)
    }

    /// True when the vocabulary defines this label.
    pub fn contains(&self, label: &Label) -> bool {
        self.ranges.contains_key(label)
    }

    /// Number of vocabulary labels.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Complete ranges centered on the given flex profile, with wide-open
    /// IMU bands. Keeps test tables valid without repeating 14 columns.
    pub fn label_ranges(flex_centers: [f32; 5]) -> LabelRanges {
        let mut ranges = LabelRanges::new();
        for name in ["roll", "pitch", "yaw"] {
            ranges.insert(name.to_string(), Range::new(-180.0, 180.0));
        }
        for name in ["gx", "gy", "gz"] {
            ranges.insert(name.to_string(), Range::new(-500.0, 500.0));
        }
        for name in ["ax", "ay", "az"] {
            ranges.insert(name.to_string(), Range::new(-2.0, 2.0));
        }
        for (i, center) in flex_centers.iter().enumerate() {
            ranges.insert(format!("flex{i}"), Range::new(center - 50.0, center + 50.0));
        }
        ranges
    }

    /// A small but complete vocabulary: A (fist-ish), B (flat), relax.
    pub fn small_envelope() -> ReferenceEnvelope {
        let mut table = BTreeMap::new();
        table.insert(Label::new("A"), label_ranges([700.0, 650.0, 640.0, 630.0, 620.0]));
        table.insert(Label::new("B"), label_ranges([200.0, 150.0, 140.0, 130.0, 120.0]));
        table.insert(Label::relax(), label_ranges([20.0, 20.0, 20.0, 20.0, 20.0]));
        ReferenceEnvelope::from_labels(Some("test-1".into()), table).expect("valid test table")
    }
}
