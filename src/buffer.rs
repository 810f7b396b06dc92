//! Bounded frame history and the majority-vote decision policy.
//!
//! The buffer holds the last few seconds of classified frames in a fixed
//! ring. Producers push, consumers copy out; memory stays constant no
//! matter how long a session runs. The majority vote reads the trailing
//! window of this buffer and is the alternative decision policy to the
//! streak state machine: it tolerates isolated misclassified frames at
//! the cost of per-letter repeat latency.

use std::collections::{HashMap, VecDeque};

use crate::types::{FrameEntry, Label};

/// Sizing and vote parameters for the frame buffer.
#[derive(Debug, Clone)]
pub struct FrameBufferConfig {
    /// Expected frame rate in Hz. Reference glove streams at 30.
    pub frame_rate_hz: u32,
    /// Retained history in seconds.
    pub window_seconds: u32,
    /// Trailing span inspected by the majority vote, in milliseconds.
    pub vote_window_ms: u64,
    /// Fraction of labeled frames a label must win to carry the vote.
    pub vote_ratio: f32,
}

impl Default for FrameBufferConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 30,
            window_seconds: 3,
            vote_window_ms: 300,
            vote_ratio: 0.60,
        }
    }
}

impl FrameBufferConfig {
    /// Fixed capacity in frames.
    pub fn capacity(&self) -> usize {
        (self.frame_rate_hz as usize * self.window_seconds as usize).max(1)
    }
}

/// Fixed-capacity FIFO of classified frames.
///
/// Pushing into a full buffer silently drops the oldest entry. Reads copy
/// entries out so callers never hold a borrow across a producer push.
pub struct FrameBuffer {
    config: FrameBufferConfig,
    frames: VecDeque<FrameEntry>,
}

impl FrameBuffer {
    pub fn new(config: FrameBufferConfig) -> Self {
        let capacity = config.capacity();
        Self {
            config,
            frames: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a frame, evicting the oldest when full.
    pub fn push(&mut self, entry: FrameEntry) {
        if self.frames.len() == self.config.capacity() {
            self.frames.pop_front();
        }
        self.frames.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Most recent frame, copied out.
    pub fn latest(&self) -> Option<FrameEntry> {
        self.frames.back().cloned()
    }

    /// The full retained history, oldest first, copied out.
    pub fn snapshot(&self) -> Vec<FrameEntry> {
        self.frames.iter().cloned().collect()
    }

    /// Frames within the trailing vote window, oldest first.
    ///
    /// The window is anchored at the newest frame's timestamp, not wall
    /// time, so replayed captures vote identically to live streams.
    pub fn trailing_window(&self) -> Vec<FrameEntry> {
        let Some(newest) = self.frames.back() else {
            return Vec::new();
        };
        let cutoff = newest.timestamp_ms.saturating_sub(self.config.vote_window_ms);
        self.frames
            .iter()
            .filter(|entry| entry.timestamp_ms >= cutoff)
            .cloned()
            .collect()
    }

    /// Majority vote over the trailing window.
    ///
    /// A label wins when it holds at least `vote_ratio` of the *labeled*
    /// frames in the window and differs from `last_emitted`. Unlabeled
    /// frames count toward nothing; the same label twice in a row never
    /// wins, which is what keeps a held sign from repeating every 300 ms.
    pub fn majority_vote(&self, last_emitted: Option<&Label>) -> Option<FrameEntry> {
        let window = self.trailing_window();
        let mut counts: HashMap<&Label, usize> = HashMap::new();
        let mut labeled = 0usize;
        for entry in &window {
            if let Some(label) = &entry.classification.label {
                *counts.entry(label).or_insert(0) += 1;
                labeled += 1;
            }
        }
        if labeled == 0 {
            return None;
        }

        // Ties resolve to the lexicographically first label, same as the
        // per-frame scorer, so the two layers never disagree on ordering.
        let (winner, votes) = counts
            .into_iter()
            .min_by(|(la, ca), (lb, cb)| cb.cmp(ca).then_with(|| la.cmp(lb)))?;

        let ratio = votes as f32 / labeled as f32;
        if ratio < self.config.vote_ratio {
            return None;
        }
        if last_emitted == Some(winner) {
            return None;
        }

        let winner = winner.clone();
        // Emit the newest frame carrying the winning label for context.
        window
            .iter()
            .rev()
            .find(|entry| entry.classification.label.as_ref() == Some(&winner))
            .cloned()
    }

    /// Drop all retained frames. Used on mode transitions so a new session
    /// never votes on stale history.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureVector;
    use crate::types::{Classification, Orientation, RawSample};

    fn frame(timestamp_ms: u64, label: Option<&str>, confidence: f32) -> FrameEntry {
        let features =
            FeatureVector::from_parts(&Orientation::default(), &RawSample::at_rest(timestamp_ms));
        let classification = match label {
            Some(name) => Classification::new(Label::new(name), confidence),
            None => Classification::none(),
        };
        FrameEntry::new(timestamp_ms, features, classification)
    }

    fn small_buffer() -> FrameBuffer {
        FrameBuffer::new(FrameBufferConfig {
            frame_rate_hz: 10,
            window_seconds: 1,
            ..FrameBufferConfig::default()
        })
    }

    #[test]
    fn test_capacity_eviction_keeps_newest() {
        let mut buffer = small_buffer(); // capacity 10
        for i in 0..11u64 {
            buffer.push(frame(i * 33, Some("A"), 0.8));
        }
        assert_eq!(buffer.len(), 10);
        let snapshot = buffer.snapshot();
        // Oldest (t=0) evicted; order preserved oldest-first.
        assert_eq!(snapshot.first().map(|e| e.timestamp_ms), Some(33));
        assert_eq!(snapshot.last().map(|e| e.timestamp_ms), Some(330));
        let timestamps: Vec<u64> = snapshot.iter().map(|e| e.timestamp_ms).collect();
        let mut sorted = timestamps.clone();
        sorted.sort_unstable();
        assert_eq!(timestamps, sorted);
    }

    #[test]
    fn test_trailing_window_anchored_to_newest_frame() {
        let mut buffer = small_buffer();
        buffer.push(frame(0, Some("A"), 0.8));
        buffer.push(frame(500, Some("A"), 0.8));
        buffer.push(frame(700, Some("B"), 0.8));
        // Window is [400, 700]: the t=0 frame falls outside.
        let window = buffer.trailing_window();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].timestamp_ms, 500);
    }

    #[test]
    fn test_vote_passes_at_seventy_percent() {
        let mut buffer = small_buffer();
        // 7 A-frames and 3 B-frames within 300 ms: 0.7 >= 0.6.
        for i in 0..10u64 {
            let label = if i < 7 { "A" } else { "B" };
            buffer.push(frame(1000 + i * 30, Some(label), 0.8));
        }
        let winner = buffer.majority_vote(None).expect("A should carry the vote");
        assert_eq!(winner.classification.label, Some(Label::new("A")));
        // Context frame is the newest A in the window.
        assert_eq!(winner.timestamp_ms, 1000 + 6 * 30);
    }

    #[test]
    fn test_split_vote_emits_nothing() {
        let mut buffer = small_buffer();
        // 5/5 split: neither label reaches 0.6.
        for i in 0..10u64 {
            let label = if i % 2 == 0 { "A" } else { "B" };
            buffer.push(frame(1000 + i * 30, Some(label), 0.8));
        }
        assert!(buffer.majority_vote(None).is_none());
    }

    #[test]
    fn test_vote_suppresses_repeat_of_last_emitted() {
        let mut buffer = small_buffer();
        for i in 0..10u64 {
            buffer.push(frame(1000 + i * 30, Some("A"), 0.8));
        }
        let last = Label::new("A");
        assert!(buffer.majority_vote(Some(&last)).is_none());
        // A different previous emission does not suppress.
        let other = Label::new("B");
        assert!(buffer.majority_vote(Some(&other)).is_some());
    }

    #[test]
    fn test_unlabeled_frames_do_not_dilute_the_vote() {
        let mut buffer = small_buffer();
        // 3 labeled A-frames among 7 unlabeled: A holds 100% of labels.
        for i in 0..10u64 {
            let label = if i < 3 { Some("A") } else { None };
            buffer.push(frame(1000 + i * 30, label, 0.8));
        }
        let winner = buffer.majority_vote(None).expect("A holds all labeled frames");
        assert_eq!(winner.classification.label, Some(Label::new("A")));
    }

    #[test]
    fn test_empty_and_unlabeled_windows_vote_nothing() {
        let mut buffer = small_buffer();
        assert!(buffer.majority_vote(None).is_none());
        buffer.push(frame(0, None, 0.0));
        assert!(buffer.majority_vote(None).is_none());
    }

    #[test]
    fn test_clear_resets_history() {
        let mut buffer = small_buffer();
        buffer.push(frame(0, Some("A"), 0.8));
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.latest().is_none());
    }
}
