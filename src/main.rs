//! SignWave Core demo binary.
//!
//! Runs the full pipeline against a scripted capture: calibrate on a
//! stationary window, then translate a rest → A → rest → B sequence and
//! print every emitted gesture event. For library use, see lib.rs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use signwave_core::engine::{EngineConfig, GestureEngine, ScriptedSource};
use signwave_core::envelope::{LabelRanges, Range, ReferenceEnvelope};
use signwave_core::types::{Label, RawSample};

/// Complete ranges for one letter: wide IMU bands, tight flex bands
/// around the given per-finger centers.
fn letter_ranges(flex_centers: [f32; 5]) -> LabelRanges {
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

fn demo_envelope() -> signwave_core::Result<ReferenceEnvelope> {
    let mut table = BTreeMap::new();
    table.insert(Label::new("A"), letter_ranges([700.0, 650.0, 640.0, 630.0, 620.0]));
    table.insert(Label::new("B"), letter_ranges([200.0, 150.0, 140.0, 130.0, 120.0]));
    table.insert(Label::relax(), letter_ranges([20.0; 5]));
    ReferenceEnvelope::from_labels(Some("demo-1".to_string()), table)
}

fn hold(samples: &mut Vec<RawSample>, start_ms: u64, frames: u64, flex: [u16; 5]) {
    for i in 0..frames {
        samples.push(RawSample::new(
            start_ms + i * 33,
            [0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0],
            flex,
        ));
    }
}

fn main() -> signwave_core::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Scripted capture: calibration window, rest, hold A, rest, hold B.
    let mut samples = Vec::new();
    hold(&mut samples, 0, 60, [0; 5]); // calibration + initial rest
    hold(&mut samples, 2000, 20, [0; 5]);
    hold(&mut samples, 2700, 20, [700, 650, 640, 630, 620]); // A
    hold(&mut samples, 3400, 20, [0; 5]);
    hold(&mut samples, 4100, 20, [200, 150, 140, 130, 120]); // B

    let envelope = Arc::new(demo_envelope()?);
    let config = EngineConfig {
        sample_period: Duration::from_millis(5), // replay faster than live
        ..EngineConfig::default()
    };
    let mut engine = GestureEngine::new(
        Box::new(ScriptedSource::new(samples)),
        envelope,
        config,
    );

    println!("SignWave Core v0.1.0");
    let calibration = engine.calibrate(Duration::from_millis(150))?;
    println!(
        "calibrated: bias {:?}, initial roll/pitch {:.2}/{:.2}",
        calibration.gyro_bias, calibration.initial.roll, calibration.initial.pitch
    );

    let events = engine.start_translate()?;
    while let Ok(event) = events.recv_timeout(Duration::from_millis(500)) {
        println!("event @ {} ms: {:?}", event.timestamp_ms, event.kind);
    }
    engine.stop_translate();

    let status = engine.status();
    println!(
        "session done: {} frames buffered, {} stalls",
        status.buffered_frames, status.stall_count
    );
    Ok(())
}
