//! Engine assembly: source → estimator → normalizer → classifier →
//! buffer → decision policy, driven by one producer thread.
//!
//! [`GestureEngine`] owns the whole pipeline and exposes the control
//! surface: `calibrate`, `start_translate` / `stop_translate`,
//! `start_practice` / `stop_practice`, plus the `last_frame` and
//! `status` observation queries. Recognized gestures stream over a
//! crossbeam channel returned by the start calls.
//!
//! The producer thread paces itself against a monotonic clock. A tick
//! with no data is a logged stall, never a crash; the stop flag is
//! observed within one sample period, and the estimator, buffer and
//! source come back from the thread ready for the next session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::buffer::{FrameBuffer, FrameBufferConfig};
use crate::classifier::{
    FrameClassifier, LearnedClassifierAdapter, LearnedModel, RangeScorer, RangeScorerConfig,
};
use crate::envelope::{LabelRanges, ReferenceEnvelope};
use crate::error::{EngineError, Result};
use crate::estimator::{Calibration, EstimatorConfig, OrientationEstimator};
use crate::features::FeatureVector;
use crate::state_machine::{
    DecisionPolicy, GestureStateMachine, MajorityVotePolicy, StateMachineConfig,
};
use crate::types::{
    EngineMode, EngineStatus, FrameEntry, GestureEvent, Label, RawSample, FLEX_CHANNELS,
};

/// Blocking sample provider, one reading per call.
///
/// `next` waits up to `timeout` for a sample; `Ok(None)` means the tick
/// passed without data (a stall, handled by the caller). Hardware
/// adapters put their bus I/O behind this seam; tests script it.
pub trait SampleSource: Send {
    fn next(&mut self, timeout: Duration) -> Result<Option<RawSample>>;
}

/// Deterministic in-memory source for tests and the demo binary.
///
/// Plays back a fixed script, one entry per tick. A `None` entry is a
/// scripted stall; an exhausted script stalls forever.
pub struct ScriptedSource {
    script: VecDeque<Option<RawSample>>,
}

impl ScriptedSource {
    pub fn new(samples: Vec<RawSample>) -> Self {
        Self {
            script: samples.into_iter().map(Some).collect(),
        }
    }

    /// Full control over stall placement.
    pub fn from_script(script: Vec<Option<RawSample>>) -> Self {
        Self {
            script: script.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl SampleSource for ScriptedSource {
    fn next(&mut self, _timeout: Duration) -> Result<Option<RawSample>> {
        Ok(self.script.pop_front().flatten())
    }
}

/// Which decision policy a recognition session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Streak state machine with relax gating (the default).
    Streak,
    /// Windowed majority vote over the frame buffer.
    MajorityVote,
}

/// Which per-frame classifier strategy a recognition session runs.
///
/// The learned strategy needs a model artifact loaded through
/// [`GestureEngine::load_model`]; starting a session without one fails
/// with `ClassifierUnavailable` rather than silently falling back to
/// the range scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    /// Weighted hit ratio against the reference envelope (the default).
    Range,
    /// Externally trained model behind [`LearnedModel`].
    Learned,
}

/// Top-level engine configuration bundling the per-stage configs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub estimator: EstimatorConfig,
    pub buffer: FrameBufferConfig,
    pub state_machine: StateMachineConfig,
    pub scorer: RangeScorerConfig,
    pub policy: PolicyKind,
    pub classifier: ClassifierKind,
    /// Target producer tick. The reference glove streams at 30 Hz.
    pub sample_period: Duration,
    /// Average target confidence a practice session must reach to pass.
    pub practice_pass_threshold: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            estimator: EstimatorConfig::default(),
            buffer: FrameBufferConfig::default(),
            state_machine: StateMachineConfig::default(),
            scorer: RangeScorerConfig::default(),
            policy: PolicyKind::Streak,
            classifier: ClassifierKind::Range,
            sample_period: Duration::from_millis(33),
            practice_pass_threshold: 0.75,
        }
    }
}

/// Per-finger correction computed from a practice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerHint {
    /// Mostly inside the target range.
    Hold,
    /// Readings sat below the range: the finger needs more curl.
    BendMore,
    /// Readings sat above the range: the finger is over-bent.
    Straighten,
}

/// Summary returned by `stop_practice`.
#[derive(Debug, Clone, PartialEq)]
pub struct PracticeReport {
    pub target: Label,
    /// Frames processed during the session.
    pub frames: usize,
    /// Frames the classifier attributed to the target.
    pub matched_frames: usize,
    /// Mean score of the target posture over every frame, not just the
    /// matched ones. A brief lucky match among many misses averages low.
    pub average_confidence: f32,
    /// Whether `average_confidence` reached the pass threshold AND every
    /// finger sat inside its target range for a majority of frames.
    pub passed: bool,
    /// Majority verdict per flex channel, thumb..pinky.
    pub finger_hints: [FingerHint; FLEX_CHANNELS],
}

/// Running tallies behind a practice report. The target is scored on
/// every frame against the envelope, independent of which label the
/// session classifier picked.
struct PracticeStats {
    target: Label,
    target_ranges: LabelRanges,
    scorer: RangeScorer,
    frames: usize,
    matched_frames: usize,
    confidence_sum: f32,
    /// Per channel: [below range, inside, above range].
    flex_counts: [[usize; 3]; FLEX_CHANNELS],
}

impl PracticeStats {
    fn new(target: Label, target_ranges: LabelRanges, scorer: RangeScorer) -> Self {
        Self {
            target,
            target_ranges,
            scorer,
            frames: 0,
            matched_frames: 0,
            confidence_sum: 0.0,
            flex_counts: [[0; 3]; FLEX_CHANNELS],
        }
    }

    fn observe(&mut self, entry: &FrameEntry) {
        self.frames += 1;
        self.confidence_sum += self.scorer.score(&entry.features, &self.target);
        if entry.classification.label.as_ref() == Some(&self.target) {
            self.matched_frames += 1;
        }
        for channel in 0..FLEX_CHANNELS {
            let Some(range) = self.target_ranges.get(&format!("flex{channel}")) else {
                continue;
            };
            let value = entry.features.flex[channel];
            let bucket = if value < range.lo {
                0
            } else if value > range.hi {
                2
            } else {
                1
            };
            self.flex_counts[channel][bucket] += 1;
        }
    }

    fn report(&self, pass_threshold: f32) -> PracticeReport {
        let average_confidence = if self.frames > 0 {
            self.confidence_sum / self.frames as f32
        } else {
            0.0
        };
        let mut finger_hints = [FingerHint::Hold; FLEX_CHANNELS];
        let mut all_fingers_held = true;
        for channel in 0..FLEX_CHANNELS {
            let [below, inside, above] = self.flex_counts[channel];
            let total = below + inside + above;
            // A finger is held only when it sat inside the range for a
            // strict majority of the session's frames.
            if total == 0 || 2 * inside > total {
                finger_hints[channel] = FingerHint::Hold;
            } else {
                all_fingers_held = false;
                finger_hints[channel] = if below > above {
                    FingerHint::BendMore
                } else {
                    FingerHint::Straighten
                };
            }
        }
        PracticeReport {
            target: self.target.clone(),
            frames: self.frames,
            matched_frames: self.matched_frames,
            average_confidence,
            passed: self.frames > 0
                && average_confidence >= pass_threshold
                && all_fingers_held,
            finger_hints,
        }
    }
}

/// State shared between the engine facade and the producer thread.
struct SharedState {
    buffer: Mutex<FrameBuffer>,
    stop: AtomicBool,
    stall_count: AtomicU64,
}

impl SharedState {
    fn lock_buffer(&self) -> MutexGuard<'_, FrameBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything the producer thread owns. Returned whole when the thread
/// joins so the next session reuses the calibrated estimator and source.
struct Worker {
    source: Box<dyn SampleSource>,
    estimator: OrientationEstimator,
    classifier: Box<dyn FrameClassifier>,
    policy: Box<dyn DecisionPolicy>,
    practice: Option<PracticeStats>,
    period: Duration,
    nominal_dt_s: f32,
}

impl Worker {
    /// Producer loop: read, estimate, normalize, classify, buffer, decide.
    fn run(mut self, shared: Arc<SharedState>, events: Sender<GestureEvent>) -> Self {
        let mut last_timestamp_ms: Option<u64> = None;
        while !shared.stop.load(Ordering::Acquire) {
            let tick_start = Instant::now();
            match self.source.next(self.period) {
                Ok(Some(sample)) => {
                    let dt_s = match last_timestamp_ms {
                        Some(prev) => {
                            sample.timestamp_ms.saturating_sub(prev) as f32 / 1000.0
                        }
                        None => self.nominal_dt_s,
                    };
                    last_timestamp_ms = Some(sample.timestamp_ms);
                    self.process(&sample, dt_s, &shared, &events);
                }
                Ok(None) => {
                    shared.stall_count.fetch_add(1, Ordering::Relaxed);
                    debug!("no data this tick");
                }
                Err(error) => {
                    shared.stall_count.fetch_add(1, Ordering::Relaxed);
                    warn!(%error, "sample source error, waiting for next tick");
                }
            }
            // Cooperative pacing: whatever the source left of the period
            // is slept off, which also bounds stop latency to one period.
            let remaining = self.period.saturating_sub(tick_start.elapsed());
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
        }
        self
    }

    fn process(
        &mut self,
        sample: &RawSample,
        dt_s: f32,
        shared: &SharedState,
        events: &Sender<GestureEvent>,
    ) {
        let orientation = match self.estimator.update(sample, dt_s) {
            Ok(orientation) => orientation,
            Err(error) => {
                warn!(%error, "dropping frame");
                return;
            }
        };
        let features = FeatureVector::from_parts(&orientation, sample);
        let classification = self.classifier.classify(&features);
        let entry = FrameEntry::new(sample.timestamp_ms, features, classification);
        if let Some(stats) = &mut self.practice {
            stats.observe(&entry);
        }

        let decision = {
            let mut buffer = shared.lock_buffer();
            buffer.push(entry);
            self.policy.decide(&buffer)
        };
        if let Some(event) = decision {
            info!(kind = ?event.kind, timestamp_ms = event.timestamp_ms, "gesture event");
            // A dropped receiver just discards events; recognition
            // itself keeps running until stopped.
            let _ = events.send(event);
        }
    }
}

/// Resources held while no recognition session is running.
struct IdleParts {
    source: Box<dyn SampleSource>,
    estimator: OrientationEstimator,
}

/// The assembled recognition engine.
pub struct GestureEngine {
    config: EngineConfig,
    envelope: Arc<ReferenceEnvelope>,
    model: Option<Arc<dyn LearnedModel>>,
    mode: EngineMode,
    shared: Arc<SharedState>,
    idle: Option<IdleParts>,
    running: Option<JoinHandle<Worker>>,
}

impl GestureEngine {
    pub fn new(
        source: Box<dyn SampleSource>,
        envelope: Arc<ReferenceEnvelope>,
        config: EngineConfig,
    ) -> Self {
        let shared = Arc::new(SharedState {
            buffer: Mutex::new(FrameBuffer::new(config.buffer.clone())),
            stop: AtomicBool::new(false),
            stall_count: AtomicU64::new(0),
        });
        let estimator = OrientationEstimator::new(config.estimator.clone());
        Self {
            config,
            envelope,
            model: None,
            mode: EngineMode::Idle,
            shared,
            idle: Some(IdleParts { source, estimator }),
            running: None,
        }
    }

    /// Collect a stationary window from the source and calibrate.
    ///
    /// Only valid while idle; the glove is assumed level with straight
    /// fingers for the duration. Short or silent windows fail with
    /// `InsufficientSamples` and leave any previous calibration active.
    pub fn calibrate(&mut self, duration: Duration) -> Result<Calibration> {
        if !self.mode.is_idle() {
            return Err(EngineError::AlreadyActive(self.mode));
        }
        let Some(idle) = self.idle.as_mut() else {
            return Err(EngineError::AlreadyActive(self.mode));
        };

        info!(?duration, "calibration window opened");
        let period = self.config.sample_period;
        let deadline = Instant::now() + duration;
        let mut window = Vec::new();
        while Instant::now() < deadline {
            let tick_start = Instant::now();
            match idle.source.next(period)? {
                Some(sample) => window.push(sample),
                None => debug!("no data this tick"),
            }
            let remaining = period.saturating_sub(tick_start.elapsed());
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
        }
        idle.estimator.calibrate_from_samples(&window)
    }

    /// Start continuous translation. Returns the gesture event stream.
    pub fn start_translate(&mut self) -> Result<Receiver<GestureEvent>> {
        let policy: Box<dyn DecisionPolicy> = match self.config.policy {
            PolicyKind::Streak => Box::new(GestureStateMachine::translate(
                self.config.state_machine.clone(),
            )),
            PolicyKind::MajorityVote => Box::new(MajorityVotePolicy::new()),
        };
        self.start_session(EngineMode::Translate, policy, None)
    }

    /// Stop translation. A no-op when translation is not running.
    pub fn stop_translate(&mut self) {
        if self.mode == EngineMode::Translate {
            self.stop_session();
        }
    }

    /// Start a practice session against `target`.
    ///
    /// The target must be a non-relax vocabulary label. Practice always
    /// uses the streak machine; the vote's repeat suppression would
    /// fight the whole point of drilling one letter.
    pub fn start_practice(&mut self, target: Label) -> Result<Receiver<GestureEvent>> {
        if target.is_relax() || !self.envelope.contains(&target) {
            return Err(EngineError::UnknownLabel(target.as_str().to_string()));
        }
        let ranges = self
            .envelope
            .ranges_for(&target)
            .cloned()
            .ok_or_else(|| EngineError::UnknownLabel(target.as_str().to_string()))?;
        let policy = Box::new(GestureStateMachine::practice(
            self.config.state_machine.clone(),
            Some(target.clone()),
        ));
        // Practice scores the target against the envelope regardless of
        // which classifier strategy drives the session's events.
        let scorer = RangeScorer::new(self.envelope.clone(), self.config.scorer.clone());
        let stats = PracticeStats::new(target, ranges, scorer);
        self.start_session(EngineMode::Practice, policy, Some(stats))
    }

    /// Stop practice and summarize the session. `None` when practice was
    /// not running.
    pub fn stop_practice(&mut self) -> Option<PracticeReport> {
        if self.mode != EngineMode::Practice {
            return None;
        }
        let stats = self.stop_session()?;
        let report = stats.report(self.config.practice_pass_threshold);
        info!(
            target = %report.target,
            frames = report.frames,
            average_confidence = report.average_confidence,
            passed = report.passed,
            "practice session summary"
        );
        Some(report)
    }

    /// Replace the reference envelope from a JSON document.
    ///
    /// An invalid document is rejected wholesale and the previous table
    /// stays active. A running session keeps the table it started with;
    /// the replacement applies from the next start.
    pub fn load_envelope(&mut self, document: &str) -> Result<()> {
        let replacement = ReferenceEnvelope::from_json(document)?;
        info!(
            labels = replacement.len(),
            version = replacement.version.as_deref().unwrap_or("none"),
            "reference envelope replaced"
        );
        self.envelope = Arc::new(replacement);
        Ok(())
    }

    /// Install a trained model artifact for the learned strategy.
    ///
    /// Like `load_envelope`, a running session keeps the classifier it
    /// started with; the model applies from the next start.
    pub fn load_model(&mut self, model: Arc<dyn LearnedModel>) {
        info!("learned model artifact loaded");
        self.model = Some(model);
    }

    pub fn envelope(&self) -> &Arc<ReferenceEnvelope> {
        &self.envelope
    }

    /// Most recent classified frame, for transports polling at their own
    /// cadence.
    pub fn last_frame(&self) -> Option<FrameEntry> {
        self.shared.lock_buffer().latest()
    }

    /// Point-in-time health report.
    pub fn status(&self) -> EngineStatus {
        let calibrated = match (&self.idle, self.mode) {
            (Some(idle), _) => idle.estimator.is_calibrated(),
            // The estimator lives on the producer thread while a mode is
            // active, and starting a mode requires calibration.
            (None, mode) if !mode.is_idle() => true,
            _ => false,
        };
        EngineStatus {
            mode: self.mode,
            calibrated,
            buffered_frames: self.shared.lock_buffer().len(),
            stall_count: self.shared.stall_count.load(Ordering::Relaxed),
            envelope_version: self.envelope.version.clone(),
        }
    }

    fn start_session(
        &mut self,
        mode: EngineMode,
        mut policy: Box<dyn DecisionPolicy>,
        practice: Option<PracticeStats>,
    ) -> Result<Receiver<GestureEvent>> {
        if !self.mode.is_idle() {
            return Err(EngineError::AlreadyActive(self.mode));
        }
        // Built before any state changes so a missing model leaves the
        // engine exactly as it was.
        let classifier: Box<dyn FrameClassifier> = match self.config.classifier {
            ClassifierKind::Range => Box::new(RangeScorer::new(
                self.envelope.clone(),
                self.config.scorer.clone(),
            )),
            ClassifierKind::Learned => Box::new(LearnedClassifierAdapter::from_loaded(
                self.model.clone(),
                self.config.scorer.min_confidence,
            )?),
        };
        let Some(idle) = self.idle.take() else {
            return Err(EngineError::AlreadyActive(self.mode));
        };
        if !idle.estimator.is_calibrated() {
            self.idle = Some(idle);
            return Err(EngineError::Uncalibrated);
        }

        policy.reset();
        self.shared.lock_buffer().clear();
        self.shared.stall_count.store(0, Ordering::Relaxed);
        self.shared.stop.store(false, Ordering::Release);

        let worker = Worker {
            source: idle.source,
            estimator: idle.estimator,
            classifier,
            policy,
            practice,
            period: self.config.sample_period,
            nominal_dt_s: self.config.estimator.nominal_dt_s,
        };
        let (tx, rx) = unbounded();
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("signwave-producer".to_string())
            .spawn(move || worker.run(shared, tx))?;

        self.running = Some(handle);
        self.mode = mode;
        info!(?mode, "recognition session started");
        Ok(rx)
    }

    /// Signal the producer, join it, and reclaim its resources.
    fn stop_session(&mut self) -> Option<PracticeStats> {
        let handle = self.running.take()?;
        self.shared.stop.store(true, Ordering::Release);
        match handle.join() {
            Ok(worker) => {
                let Worker {
                    source,
                    estimator,
                    practice,
                    ..
                } = worker;
                self.idle = Some(IdleParts { source, estimator });
                self.mode = EngineMode::Idle;
                info!("recognition session stopped");
                practice
            }
            Err(_) => {
                // A panicked producer forfeits the source; the engine
                // stays usable for status queries but cannot restart.
                warn!("producer thread panicked");
                self.mode = EngineMode::Idle;
                None
            }
        }
    }
}

impl Drop for GestureEngine {
    fn drop(&mut self) {
        if self.running.is_some() {
            self.stop_session();
        }
    }
}
