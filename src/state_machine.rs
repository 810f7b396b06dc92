//! Hysteresis layer turning per-frame classifications into discrete events.
//!
//! The per-frame classifier answers "what does this frame look like";
//! this module answers "did the user actually sign something". Two
//! interchangeable decision policies:
//!
//! - [`GestureStateMachine`]: streak debounce. In Translate mode the
//!   machine cycles Latch → DetectRelax → DetectSign → SendSign, so a
//!   letter only fires after a confirmed rest and a run of consecutive
//!   agreeing frames. Practice mode drops the relax gate and optionally
//!   filters to a target letter.
//! - [`MajorityVotePolicy`]: windowed vote over the frame buffer,
//!   tolerant of isolated misclassified frames.
//!
//! Both implement [`DecisionPolicy`], so the engine treats them alike.

use tracing::debug;

use crate::buffer::FrameBuffer;
use crate::features::FeatureVector;
use crate::types::{FrameEntry, GestureEvent, GestureKind, Label};

/// Geometric "hand at rest" detector.
///
/// Covers vocabularies without an explicit relax label: a level hand
/// with straight fingers counts as rest regardless of what the
/// classifier thought the frame was.
#[derive(Debug, Clone)]
pub struct RelaxBand {
    /// Maximum absolute roll/pitch/yaw, degrees.
    pub max_abs_angle_deg: f32,
    /// Maximum flex reading per channel, raw counts. Straight fingers
    /// read near the sensor noise floor.
    pub max_flex: f32,
}

impl Default for RelaxBand {
    fn default() -> Self {
        Self {
            max_abs_angle_deg: 10.0,
            max_flex: 120.0,
        }
    }
}

impl RelaxBand {
    /// True when every orientation and flex channel sits inside the band.
    pub fn contains(&self, features: &FeatureVector) -> bool {
        features.orientation().max_abs_angle() <= self.max_abs_angle_deg
            && features.max_flex() <= self.max_flex
    }
}

/// Tunables for the streak state machine.
#[derive(Debug, Clone)]
pub struct StateMachineConfig {
    /// Consecutive agreeing frames needed to confirm a relax or a letter.
    /// At 30 Hz, 5 frames is roughly 170 ms of holding still.
    pub stable_count: u32,
    /// Per-mode confidence floor for letter frames. Lower than the
    /// classifier's global floor: frames arriving here already cleared
    /// that one.
    pub min_confidence: f32,
    /// Geometric rest detector, used alongside the relax label.
    pub relax_band: RelaxBand,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            stable_count: 5,
            min_confidence: 0.45,
            relax_band: RelaxBand::default(),
        }
    }
}

/// Which gating profile the machine runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeProfile {
    /// Relax-gated: every letter needs an intervening confirmed rest.
    Translate,
    /// No relax gate; `target` restricts which letter counts toward a
    /// streak (a non-target frame breaks the run).
    Practice { target: Option<Label> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    /// Re-arm: counters reset before the next detection cycle.
    Latch,
    /// Waiting for `stable_count` consecutive rest frames.
    DetectRelax,
    /// Waiting for `stable_count` consecutive agreeing letter frames.
    DetectSign,
}

/// A policy consuming buffered frames and occasionally emitting an event.
///
/// `decide` is called once per pushed frame; `reset` on every mode start
/// so no session inherits streaks or vote history from the previous one.
pub trait DecisionPolicy: Send {
    fn decide(&mut self, buffer: &FrameBuffer) -> Option<GestureEvent>;
    fn reset(&mut self);
}

/// Streak-debounce gesture state machine.
pub struct GestureStateMachine {
    config: StateMachineConfig,
    profile: ModeProfile,
    phase: Phase,
    relax_run: u32,
    candidate: Option<Label>,
    candidate_run: u32,
}

impl GestureStateMachine {
    pub fn new(config: StateMachineConfig, profile: ModeProfile) -> Self {
        Self {
            config,
            profile,
            phase: Phase::Latch,
            relax_run: 0,
            candidate: None,
            candidate_run: 0,
        }
    }

    pub fn translate(config: StateMachineConfig) -> Self {
        Self::new(config, ModeProfile::Translate)
    }

    pub fn practice(config: StateMachineConfig, target: Option<Label>) -> Self {
        Self::new(config, ModeProfile::Practice { target })
    }

    /// Feed one classified frame; returns an event when a streak confirms.
    pub fn step(&mut self, entry: &FrameEntry) -> Option<GestureEvent> {
        if self.phase == Phase::Latch {
            self.rearm();
        }
        match self.phase {
            Phase::DetectRelax => self.step_relax(entry),
            _ => self.step_sign(entry),
        }
    }

    /// Reset counters and enter the mode's initial detection phase.
    fn rearm(&mut self) {
        self.relax_run = 0;
        self.candidate = None;
        self.candidate_run = 0;
        self.phase = match self.profile {
            ModeProfile::Translate => Phase::DetectRelax,
            ModeProfile::Practice { .. } => Phase::DetectSign,
        };
    }

    fn is_rest(&self, entry: &FrameEntry) -> bool {
        entry.classification.is_relax() || self.config.relax_band.contains(&entry.features)
    }

    fn step_relax(&mut self, entry: &FrameEntry) -> Option<GestureEvent> {
        if !self.is_rest(entry) {
            self.relax_run = 0;
            return None;
        }
        self.relax_run += 1;
        if self.relax_run < self.config.stable_count {
            return None;
        }
        debug!(frames = self.relax_run, "rest confirmed, arming sign detection");
        self.relax_run = 0;
        self.phase = Phase::DetectSign;
        Some(GestureEvent::new(GestureKind::Relax, entry.snapshot()))
    }

    fn step_sign(&mut self, entry: &FrameEntry) -> Option<GestureEvent> {
        let accepted = entry
            .classification
            .label
            .as_ref()
            .filter(|label| !label.is_relax())
            .filter(|_| entry.classification.confidence >= self.config.min_confidence)
            .filter(|label| match &self.profile {
                ModeProfile::Practice { target: Some(target) } => *label == target,
                _ => true,
            });

        let Some(label) = accepted else {
            // Any break clears the streak entirely.
            self.candidate = None;
            self.candidate_run = 0;
            return None;
        };

        if self.candidate.as_ref() == Some(label) {
            self.candidate_run += 1;
        } else {
            // A different confident letter starts a fresh run of one.
            self.candidate = Some(label.clone());
            self.candidate_run = 1;
        }
        if self.candidate_run < self.config.stable_count {
            return None;
        }

        let confirmed = self.candidate.take()?;
        self.candidate_run = 0;
        debug!(letter = %confirmed, "sign confirmed");
        // Translate re-latches (next letter needs a rest first); practice
        // goes straight back to detection.
        self.phase = match self.profile {
            ModeProfile::Translate => Phase::Latch,
            ModeProfile::Practice { .. } => Phase::DetectSign,
        };
        Some(GestureEvent::new(
            GestureKind::Letter(confirmed),
            entry.snapshot(),
        ))
    }
}

impl DecisionPolicy for GestureStateMachine {
    fn decide(&mut self, buffer: &FrameBuffer) -> Option<GestureEvent> {
        let entry = buffer.latest()?;
        self.step(&entry)
    }

    fn reset(&mut self) {
        self.phase = Phase::Latch;
        self.relax_run = 0;
        self.candidate = None;
        self.candidate_run = 0;
    }
}

/// Windowed majority vote as a selectable alternative to the streak FSM.
///
/// The vote itself lives on [`FrameBuffer`]; this wrapper tracks the last
/// emitted label so a held sign fires once, and maps a winning relax
/// label to a [`GestureKind::Relax`] event.
#[derive(Default)]
pub struct MajorityVotePolicy {
    last_emitted: Option<Label>,
}

impl MajorityVotePolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecisionPolicy for MajorityVotePolicy {
    fn decide(&mut self, buffer: &FrameBuffer) -> Option<GestureEvent> {
        let winner = buffer.majority_vote(self.last_emitted.as_ref())?;
        let label = winner.classification.label.clone()?;
        self.last_emitted = Some(label.clone());
        let kind = if label.is_relax() {
            GestureKind::Relax
        } else {
            GestureKind::Letter(label)
        };
        debug!(event = ?kind, "majority vote emission");
        Some(GestureEvent::new(kind, winner.snapshot()))
    }

    fn reset(&mut self) {
        self.last_emitted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{FrameBuffer, FrameBufferConfig};
    use crate::types::{Classification, Orientation, RawSample};

    /// A rest frame: level hand, straight fingers, classified relax.
    fn rest_frame(timestamp_ms: u64) -> FrameEntry {
        let features =
            FeatureVector::from_parts(&Orientation::default(), &RawSample::at_rest(timestamp_ms));
        FrameEntry::new(
            timestamp_ms,
            features,
            Classification::new(Label::relax(), 0.9),
        )
    }

    /// A letter frame with bent fingers so the geometric band never fires.
    fn sign_frame(timestamp_ms: u64, letter: &str, confidence: f32) -> FrameEntry {
        let sample = RawSample::new(
            timestamp_ms,
            [0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0],
            [700; 5],
        );
        let orientation = Orientation::new(20.0, -15.0, 5.0);
        let features = FeatureVector::from_parts(&orientation, &sample);
        FrameEntry::new(
            timestamp_ms,
            features,
            Classification::new(Label::new(letter), confidence),
        )
    }

    fn feed(machine: &mut GestureStateMachine, entries: &[FrameEntry]) -> Vec<GestureEvent> {
        entries.iter().filter_map(|e| machine.step(e)).collect()
    }

    fn rest_frames(start_ms: u64, n: u64) -> Vec<FrameEntry> {
        (0..n).map(|i| rest_frame(start_ms + i * 33)).collect()
    }

    fn sign_frames(start_ms: u64, n: u64, letter: &str) -> Vec<FrameEntry> {
        (0..n)
            .map(|i| sign_frame(start_ms + i * 33, letter, 0.8))
            .collect()
    }

    #[test]
    fn test_translate_requires_rest_before_first_letter() {
        let mut machine = GestureStateMachine::translate(StateMachineConfig::default());
        // Letters before any rest do nothing.
        assert!(feed(&mut machine, &sign_frames(0, 10, "A")).is_empty());
        // Rest arms detection.
        let events = feed(&mut machine, &rest_frames(400, 5));
        assert_eq!(events.len(), 1);
        assert!(events[0].is_relax());
        // Now the letter lands.
        let events = feed(&mut machine, &sign_frames(600, 5, "A"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].letter(), Some(&Label::new("A")));
    }

    #[test]
    fn test_repeated_letter_needs_intervening_relax() {
        let mut machine = GestureStateMachine::translate(StateMachineConfig::default());
        let mut events = Vec::new();
        events.extend(feed(&mut machine, &rest_frames(0, 5)));
        events.extend(feed(&mut machine, &sign_frames(200, 30, "A"))); // held long
        events.extend(feed(&mut machine, &rest_frames(1300, 5)));
        events.extend(feed(&mut machine, &sign_frames(1500, 30, "A")));

        let letters: Vec<_> = events.iter().filter_map(GestureEvent::letter).collect();
        assert_eq!(letters, vec![&Label::new("A"), &Label::new("A")]);
        // Holding A for 30 frames produced exactly one event, and every
        // pair of identical letters has a relax between them.
        let kinds: Vec<bool> = events.iter().map(GestureEvent::is_relax).collect();
        assert_eq!(kinds, vec![true, false, true, false]);
    }

    #[test]
    fn test_candidate_break_restarts_the_run() {
        let mut machine = GestureStateMachine::translate(StateMachineConfig::default());
        feed(&mut machine, &rest_frames(0, 5));
        // Three A frames, then B frames: the A run dies, B needs five of
        // its own.
        let mut entries = sign_frames(200, 3, "A");
        entries.extend(sign_frames(300, 4, "B"));
        assert!(feed(&mut machine, &entries).is_empty());
        let events = feed(&mut machine, &sign_frames(450, 1, "B"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].letter(), Some(&Label::new("B")));
    }

    #[test]
    fn test_low_confidence_frames_break_the_streak() {
        let mut machine = GestureStateMachine::translate(StateMachineConfig::default());
        feed(&mut machine, &rest_frames(0, 5));
        let entries = vec![
            sign_frame(200, "A", 0.8),
            sign_frame(233, "A", 0.8),
            sign_frame(266, "A", 0.3), // below the 0.45 floor
            sign_frame(300, "A", 0.8),
            sign_frame(333, "A", 0.8),
        ];
        assert!(feed(&mut machine, &entries).is_empty());
    }

    #[test]
    fn test_geometric_band_counts_as_rest_without_relax_label() {
        let mut machine = GestureStateMachine::translate(StateMachineConfig::default());
        // At-rest geometry but the classifier found nothing at all.
        let entries: Vec<FrameEntry> = (0..5u64)
            .map(|i| {
                let features = FeatureVector::from_parts(
                    &Orientation::default(),
                    &RawSample::at_rest(i * 33),
                );
                FrameEntry::new(i * 33, features, Classification::none())
            })
            .collect();
        let events = feed(&mut machine, &entries);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_relax());
    }

    #[test]
    fn test_practice_skips_the_relax_gate_and_filters_target() {
        let config = StateMachineConfig::default();
        let mut machine =
            GestureStateMachine::practice(config, Some(Label::new("B")));
        // No rest needed, but A frames never count toward the B target.
        assert!(feed(&mut machine, &sign_frames(0, 10, "A")).is_empty());
        let events = feed(&mut machine, &sign_frames(400, 5, "B"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].letter(), Some(&Label::new("B")));
        // Practice re-arms straight into detection: holding B re-fires.
        let events = feed(&mut machine, &sign_frames(600, 5, "B"));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_majority_vote_policy_emits_once_per_label_change() {
        let mut buffer = FrameBuffer::new(FrameBufferConfig::default());
        let mut policy = MajorityVotePolicy::new();
        let mut events = Vec::new();
        for i in 0..10u64 {
            buffer.push(sign_frame(1000 + i * 30, "A", 0.8));
            events.extend(policy.decide(&buffer));
        }
        // A wins the vote as soon as the ratio clears, then stays quiet.
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].letter(), Some(&Label::new("A")));

        // A winning relax vote maps to a Relax event.
        for i in 0..12u64 {
            buffer.push(rest_frame(1300 + i * 30));
            events.extend(policy.decide(&buffer));
        }
        assert_eq!(events.len(), 2);
        assert!(events[1].is_relax());
    }

    #[test]
    fn test_policy_reset_clears_history() {
        let mut buffer = FrameBuffer::new(FrameBufferConfig::default());
        let mut policy = MajorityVotePolicy::new();
        for i in 0..10u64 {
            buffer.push(sign_frame(1000 + i * 30, "A", 0.8));
        }
        assert!(policy.decide(&buffer).is_some());
        assert!(policy.decide(&buffer).is_none());
        policy.reset();
        // After reset the same buffered content may emit again.
        assert!(policy.decide(&buffer).is_some());
    }
}
