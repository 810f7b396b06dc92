//! End-to-end scenario tests for the complete recognition pipeline.
//!
//! Each test drives a real engine (producer thread, estimator,
//! classifier, buffer and decision policy) with a scripted capture and
//! checks the emitted event stream, the way a transport layer would see
//! it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::engine::{EngineConfig, GestureEngine, PolicyKind, SampleSource, ScriptedSource};
use crate::envelope::test_support::small_envelope;
use crate::error::Result;
use crate::types::{GestureEvent, GestureKind, Label, RawSample};

const TICK: Duration = Duration::from_millis(2);

/// Flex profile matching the test envelope's "A" letter.
const FLEX_A: [u16; 5] = [700, 650, 640, 630, 620];
/// Flex profile matching the test envelope's "B" letter.
const FLEX_B: [u16; 5] = [200, 150, 140, 130, 120];
/// Straight fingers, inside the relax label's band.
const FLEX_REST: [u16; 5] = [20; 5];

/// Append a stationary hold of `frames` samples with the given posture.
fn hold(script: &mut Vec<Option<RawSample>>, start_ms: u64, frames: u64, flex: [u16; 5]) {
    for i in 0..frames {
        script.push(Some(RawSample::new(
            start_ms + i * 33,
            [0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0],
            flex,
        )));
    }
}

/// A source fed sample-by-sample from the test body, the way a bus
/// reader thread would feed a live engine.
struct ChannelSource(Receiver<RawSample>);

impl SampleSource for ChannelSource {
    fn next(&mut self, timeout: Duration) -> Result<Option<RawSample>> {
        Ok(self.0.recv_timeout(timeout).ok())
    }
}

fn feed_hold(tx: &Sender<RawSample>, start_ms: u64, frames: u64, flex: [u16; 5]) {
    for i in 0..frames {
        let _ = tx.send(RawSample::new(
            start_ms + i * 33,
            [0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0],
            flex,
        ));
    }
}

fn engine_for(script: Vec<Option<RawSample>>, policy: PolicyKind) -> GestureEngine {
    let config = EngineConfig {
        policy,
        sample_period: TICK,
        ..EngineConfig::default()
    };
    GestureEngine::new(
        Box::new(ScriptedSource::from_script(script)),
        Arc::new(small_envelope()),
        config,
    )
}

/// Drain the event stream until it goes quiet.
fn collect_events(rx: &Receiver<GestureEvent>) -> Vec<GestureEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.recv_timeout(Duration::from_millis(300)) {
        events.push(event);
    }
    events
}

/// Condensed view of an event stream for assertions.
fn kinds(events: &[GestureEvent]) -> Vec<GestureKind> {
    events.iter().map(|e| e.kind.clone()).collect()
}

#[test]
fn test_translate_session_emits_gated_letter_sequence() {
    let mut script = Vec::new();
    hold(&mut script, 0, 80, FLEX_REST); // calibration window + slack
    hold(&mut script, 3000, 20, FLEX_REST);
    hold(&mut script, 3700, 20, FLEX_A);
    hold(&mut script, 4400, 20, FLEX_REST);
    hold(&mut script, 5100, 20, FLEX_B);
    let mut engine = engine_for(script, PolicyKind::Streak);

    engine
        .calibrate(Duration::from_millis(80))
        .expect("stationary window calibrates");
    let rx = engine.start_translate().expect("start translate");
    let events = collect_events(&rx);
    engine.stop_translate();

    assert_eq!(
        kinds(&events),
        vec![
            GestureKind::Relax,
            GestureKind::Letter(Label::new("A")),
            GestureKind::Relax,
            GestureKind::Letter(Label::new("B")),
        ]
    );
    // Event snapshots carry the confirming frame's classification.
    let letter_a = &events[1];
    assert_eq!(letter_a.snapshot.classification.label, Some(Label::new("A")));
    assert!(letter_a.snapshot.classification.confidence >= 0.55);
}

#[test]
fn test_held_letter_fires_once_and_repeats_need_relax() {
    let mut script = Vec::new();
    hold(&mut script, 0, 80, FLEX_REST);
    hold(&mut script, 3000, 10, FLEX_REST);
    hold(&mut script, 3400, 60, FLEX_A); // held for ~2 s of capture time
    hold(&mut script, 5400, 10, FLEX_REST);
    hold(&mut script, 5800, 20, FLEX_A); // same letter again
    let mut engine = engine_for(script, PolicyKind::Streak);

    engine
        .calibrate(Duration::from_millis(80))
        .expect("stationary window calibrates");
    let rx = engine.start_translate().expect("start translate");
    let events = collect_events(&rx);
    engine.stop_translate();

    let letters: Vec<&Label> = events.iter().filter_map(GestureEvent::letter).collect();
    assert_eq!(letters, vec![&Label::new("A"), &Label::new("A")]);
    // The defining guarantee: identical consecutive letters never appear
    // without an intervening relax.
    for pair in events.windows(2) {
        if let (GestureKind::Letter(a), GestureKind::Letter(b)) = (&pair[0].kind, &pair[1].kind) {
            assert_ne!(a, b, "consecutive identical letters in {:?}", kinds(&events));
        }
    }
}

#[test]
fn test_majority_vote_rides_out_misclassified_frames() {
    let mut script = Vec::new();
    hold(&mut script, 0, 80, FLEX_REST);
    // An A hold with every fifth frame flickering to rest: the streak
    // machine would keep resetting, the vote should not care.
    for i in 0..40u64 {
        let flex = if i % 5 == 4 { FLEX_REST } else { FLEX_A };
        hold(&mut script, 3000 + i * 33, 1, flex);
    }
    let mut engine = engine_for(script, PolicyKind::MajorityVote);

    engine
        .calibrate(Duration::from_millis(80))
        .expect("stationary window calibrates");
    let rx = engine.start_translate().expect("start translate");
    let events = collect_events(&rx);
    engine.stop_translate();

    let letters: Vec<&Label> = events.iter().filter_map(GestureEvent::letter).collect();
    assert!(
        letters.contains(&&Label::new("A")),
        "vote never confirmed A: {:?}",
        kinds(&events)
    );
    // Suppression: the held letter confirms once, not per window.
    assert_eq!(letters.iter().filter(|l| ***l == Label::new("A")).count(), 1);
}

#[test]
fn test_envelope_swap_applies_to_the_next_session() {
    let (tx, source_rx) = unbounded();
    let config = EngineConfig {
        sample_period: TICK,
        ..EngineConfig::default()
    };
    let mut engine = GestureEngine::new(
        Box::new(ChannelSource(source_rx)),
        Arc::new(small_envelope()),
        config,
    );

    feed_hold(&tx, 0, 40, FLEX_REST);
    engine
        .calibrate(Duration::from_millis(80))
        .expect("stationary window calibrates");

    // First session: A is in the vocabulary and gets recognized.
    let rx = engine.start_translate().expect("start translate");
    feed_hold(&tx, 3000, 10, FLEX_REST);
    feed_hold(&tx, 3400, 20, FLEX_A);
    let first = collect_events(&rx);
    engine.stop_translate();
    assert!(
        first.iter().any(|e| e.letter() == Some(&Label::new("A"))),
        "A not recognized before the swap: {:?}",
        kinds(&first)
    );

    // Replace the vocabulary with one that keeps relax but drops A.
    let mut replacement = small_envelope();
    replacement.version = Some("test-2".to_string());
    replacement.ranges.remove(&Label::new("A"));
    engine
        .load_envelope(&replacement.to_json().expect("serializable"))
        .expect("valid replacement");
    assert_eq!(engine.status().envelope_version.as_deref(), Some("test-2"));

    // Same posture sequence against the new table: the rest still gates,
    // but the dropped letter can no longer confirm.
    let rx = engine.start_translate().expect("restart");
    feed_hold(&tx, 6000, 10, FLEX_REST);
    feed_hold(&tx, 6400, 30, FLEX_A);
    let second = collect_events(&rx);
    engine.stop_translate();
    assert!(
        second.iter().any(GestureEvent::is_relax),
        "second session produced no events at all"
    );
    assert!(
        second.iter().all(|e| e.letter() != Some(&Label::new("A"))),
        "dropped letter still recognized: {:?}",
        kinds(&second)
    );
}

#[test]
fn test_stop_is_prompt_and_session_restartable() {
    let mut script = Vec::new();
    hold(&mut script, 0, 80, FLEX_REST);
    hold(&mut script, 3000, 2000, FLEX_REST); // far more than we consume
    let mut engine = engine_for(script, PolicyKind::Streak);

    engine
        .calibrate(Duration::from_millis(80))
        .expect("stationary window calibrates");
    let _rx = engine.start_translate().expect("start translate");
    std::thread::sleep(Duration::from_millis(20));

    let begun = Instant::now();
    engine.stop_translate();
    // One tick plus scheduling slack, nowhere near a blocking join on
    // the remaining script.
    assert!(
        begun.elapsed() < Duration::from_millis(250),
        "stop took {:?}",
        begun.elapsed()
    );

    let _rx = engine.start_translate().expect("restart without recalibration");
    engine.stop_translate();
}
