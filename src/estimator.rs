//! Orientation estimation from gyroscope and accelerometer fusion.
//!
//! Maintains fused roll/pitch/yaw in degrees plus a per-session gyro bias.
//! Two interchangeable fusion strategies, selected at construction:
//!
//! - **Complementary filter**: fixed-weight blend of the gyro-integrated
//!   angle and the accelerometer-derived angle,
//!   `angle = α·(angle + rate·dt) + (1-α)·angle_accel` with α close to 1.
//!   Cheap and stable for slow hand poses.
//! - **Kalman filter**: per-axis 2-state (angle, gyro bias) recursive
//!   estimator with explicit process noise `(Q_angle, Q_bias)` and
//!   measurement noise `R_measure`. Tracks and removes residual gyro bias
//!   continuously, not just at calibration, which matters for long
//!   translation sessions.
//!
//! Yaw has no gravity reference on either strategy: it is pure gyro
//! integration and drifts unboundedly. Documented limitation.
//!
//! Calibration assumes the glove is held stationary: gyro bias is the
//! window mean, and the initial roll/pitch come from the mean
//! accelerometer vector via `roll = atan2(ay, az)`,
//! `pitch = atan2(-ax, sqrt(ay² + az²))`.

use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::types::{Orientation, RawSample};

/// Floor applied to `az` in the atan2 denominator so a hand held exactly
/// edge-on does not produce a singular angle.
const AZ_EPSILON: f32 = 1e-8;

/// Fusion strategy, fixed for the lifetime of an estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterStrategy {
    /// Fixed-weight complementary blend. `alpha` is the gyro weight,
    /// typically 0.95..0.99.
    Complementary { alpha: f32 },

    /// Per-axis 2-state Kalman filter (angle, bias).
    Kalman {
        /// Process noise on the angle state.
        q_angle: f32,
        /// Process noise on the bias state.
        q_bias: f32,
        /// Measurement noise of the accelerometer-derived angle.
        r_measure: f32,
    },
}

impl FilterStrategy {
    /// Reference complementary filter (α = 0.98).
    pub fn complementary() -> Self {
        FilterStrategy::Complementary { alpha: 0.98 }
    }

    /// Kalman with the usual MPU-6050 tuning.
    pub fn kalman() -> Self {
        FilterStrategy::Kalman {
            q_angle: 0.001,
            q_bias: 0.003,
            r_measure: 0.03,
        }
    }
}

/// Configuration for the orientation estimator.
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// Fusion strategy and its tunables.
    pub strategy: FilterStrategy,

    /// Nominal sample period in seconds, substituted when the caller
    /// supplies a zero or negative dt.
    pub nominal_dt_s: f32,

    /// Upper clamp on dt in seconds. A stalled source otherwise produces
    /// a huge integration step and, on the Kalman path, covariance
    /// blow-up. Reference: 0.2 s.
    pub max_dt_s: f32,

    /// Minimum number of samples a calibration window must contain.
    pub min_calibration_samples: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            strategy: FilterStrategy::complementary(),
            nominal_dt_s: 1.0 / 30.0, // 30 Hz glove sampling
            max_dt_s: 0.2,
            min_calibration_samples: 10,
        }
    }
}

/// Gyro bias and initial attitude produced by one calibration pass.
///
/// Created by `calibrate_from_samples`, held for the session, replaced
/// wholesale by the next calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Gyro bias [x, y, z] in deg/s, subtracted from every reading.
    pub gyro_bias: [f32; 3],
    /// Roll/pitch derived from the mean accelerometer vector. Yaw starts
    /// at zero by definition.
    pub initial: Orientation,
}

impl Calibration {
    /// The all-zero fallback a caller may apply when a starved source
    /// makes a proper calibration impossible.
    pub fn zeroed() -> Self {
        Self {
            gyro_bias: [0.0; 3],
            initial: Orientation::default(),
        }
    }
}

/// One axis of the 2-state Kalman filter.
///
/// Process model: `angle' = angle + dt·(rate - bias)`, `bias' = bias`.
/// Measurement: the accelerometer-derived angle.
#[derive(Debug, Clone, Copy)]
struct AxisKalman {
    q_angle: f32,
    q_bias: f32,
    r_measure: f32,

    angle: f32,
    bias: f32,
    /// 2x2 error covariance, row-major.
    p: [[f32; 2]; 2],
}

impl AxisKalman {
    fn new(q_angle: f32, q_bias: f32, r_measure: f32, initial_angle: f32) -> Self {
        Self {
            q_angle,
            q_bias,
            r_measure,
            angle: initial_angle,
            bias: 0.0,
            // Start uncertain about both states so the first measurements
            // pull the estimate in quickly.
            p: [[1.0, 0.0], [0.0, 1.0]],
        }
    }

    /// Predict with the gyro rate, then correct against the measured
    /// (accelerometer) angle. Returns the fused angle.
    fn update(&mut self, rate: f32, measured_angle: f32, dt: f32) -> f32 {
        // Prediction
        let unbiased_rate = rate - self.bias;
        self.angle += dt * unbiased_rate;

        self.p[0][0] += dt * (dt * self.p[1][1] - self.p[0][1] - self.p[1][0] + self.q_angle);
        self.p[0][1] -= dt * self.p[1][1];
        self.p[1][0] -= dt * self.p[1][1];
        self.p[1][1] += self.q_bias * dt;

        // Correction: gain from the angle row of the covariance
        let innovation = measured_angle - self.angle;
        let s = self.p[0][0] + self.r_measure;
        let k0 = self.p[0][0] / s;
        let k1 = self.p[1][0] / s;

        self.angle += k0 * innovation;
        self.bias += k1 * innovation;

        // Covariance update: (I - KH)P with H = [1, 0]
        let p00 = self.p[0][0];
        let p01 = self.p[0][1];
        self.p[0][0] -= k0 * p00;
        self.p[0][1] -= k0 * p01;
        self.p[1][0] -= k1 * p00;
        self.p[1][1] -= k1 * p01;

        self.angle
    }
}

/// Per-strategy mutable fusion state, created at calibration time.
#[derive(Debug, Clone)]
enum FusionState {
    Complementary {
        alpha: f32,
    },
    Kalman {
        roll: AxisKalman,
        pitch: AxisKalman,
    },
}

/// The orientation estimator.
///
/// Exactly one instance exists per physical device session. Before
/// calibration the attitude is defined as zero and `update()` is refused;
/// after `reset()` a fresh calibration starts cleanly.
#[derive(Debug, Clone)]
pub struct OrientationEstimator {
    config: EstimatorConfig,
    calibration: Option<Calibration>,
    fusion: Option<FusionState>,
    attitude: Orientation,
    sample_count: u64,
}

impl OrientationEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            calibration: None,
            fusion: None,
            attitude: Orientation::default(),
            sample_count: 0,
        }
    }

    /// True once a calibration (including the zeroed fallback) is active.
    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    /// Current attitude. Defined as zero while uncalibrated.
    pub fn attitude(&self) -> Orientation {
        self.attitude
    }

    /// The active calibration, if any.
    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Number of samples fused since the last calibration.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Derive a calibration from a stationary sample window and make it
    /// active. Replaces any previous calibration wholesale.
    ///
    /// Fails with `InsufficientSamples` when the window is too small:
    /// the caller retries or applies `Calibration::zeroed()`.
    pub fn calibrate_from_samples(&mut self, samples: &[RawSample]) -> Result<Calibration> {
        if samples.len() < self.config.min_calibration_samples {
            warn!(
                got = samples.len(),
                need = self.config.min_calibration_samples,
                "calibration window too small"
            );
            return Err(EngineError::InsufficientSamples {
                got: samples.len(),
                need: self.config.min_calibration_samples,
            });
        }

        let n = samples.len() as f32;
        let mut gyro_sum = [0.0f32; 3];
        let mut accel_sum = [0.0f32; 3];
        for sample in samples {
            for axis in 0..3 {
                gyro_sum[axis] += sample.gyro[axis];
                accel_sum[axis] += sample.accel[axis];
            }
        }

        let gyro_bias = [gyro_sum[0] / n, gyro_sum[1] / n, gyro_sum[2] / n];
        let (roll0, pitch0) =
            accel_angles(accel_sum[0] / n, accel_sum[1] / n, accel_sum[2] / n);

        let calibration = Calibration {
            gyro_bias,
            initial: Orientation::new(roll0, pitch0, 0.0),
        };
        debug!(
            bias = ?calibration.gyro_bias,
            roll0, pitch0,
            samples = samples.len(),
            "calibration complete"
        );
        self.apply_calibration(calibration);
        Ok(calibration)
    }

    /// Make a calibration active (also used for the zeroed fallback).
    pub fn apply_calibration(&mut self, calibration: Calibration) {
        self.attitude = calibration.initial;
        self.sample_count = 0;
        self.fusion = Some(match self.config.strategy {
            FilterStrategy::Complementary { alpha } => FusionState::Complementary { alpha },
            FilterStrategy::Kalman {
                q_angle,
                q_bias,
                r_measure,
            } => FusionState::Kalman {
                roll: AxisKalman::new(q_angle, q_bias, r_measure, calibration.initial.roll),
                pitch: AxisKalman::new(q_angle, q_bias, r_measure, calibration.initial.pitch),
            },
        });
        self.calibration = Some(calibration);
    }

    /// Fuse one sample into the attitude estimate.
    ///
    /// `dt_s` is the elapsed time since the previous sample; zero or
    /// negative values are replaced by the nominal period, and everything
    /// is clamped to `max_dt_s` so a stalled source cannot cause an angle
    /// jump or covariance blow-up.
    pub fn update(&mut self, sample: &RawSample, dt_s: f32) -> Result<Orientation> {
        let calibration = self.calibration.ok_or(EngineError::Uncalibrated)?;
        let dt = self.clamp_dt(dt_s);

        let gx = sample.gyro[0] - calibration.gyro_bias[0];
        let gy = sample.gyro[1] - calibration.gyro_bias[1];
        let gz = sample.gyro[2] - calibration.gyro_bias[2];

        let (roll_accel, pitch_accel) =
            accel_angles(sample.accel[0], sample.accel[1], sample.accel[2]);

        // fusion is always Some when calibration is
        match self.fusion.as_mut() {
            Some(FusionState::Complementary { alpha }) => {
                let a = *alpha;
                let roll_gyro = self.attitude.roll + gx * dt;
                let pitch_gyro = self.attitude.pitch + gy * dt;
                self.attitude.roll = a * roll_gyro + (1.0 - a) * roll_accel;
                self.attitude.pitch = a * pitch_gyro + (1.0 - a) * pitch_accel;
            }
            Some(FusionState::Kalman { roll, pitch }) => {
                self.attitude.roll = roll.update(gx, roll_accel, dt);
                self.attitude.pitch = pitch.update(gy, pitch_accel, dt);
            }
            None => return Err(EngineError::Uncalibrated),
        }

        // No gravity reference for yaw on either path.
        self.attitude.yaw += gz * dt;

        self.sample_count += 1;
        Ok(self.attitude)
    }

    /// Drop calibration and attitude so a fresh session can start.
    pub fn reset(&mut self) {
        self.calibration = None;
        self.fusion = None;
        self.attitude = Orientation::default();
        self.sample_count = 0;
    }

    fn clamp_dt(&self, dt_s: f32) -> f32 {
        if dt_s <= 0.0 || !dt_s.is_finite() {
            self.config.nominal_dt_s
        } else {
            dt_s.min(self.config.max_dt_s)
        }
    }
}

/// Roll and pitch (degrees) from an accelerometer vector in g.
///
/// `az` is floored to ±epsilon so the atan2 denominator never collapses.
fn accel_angles(ax: f32, ay: f32, az: f32) -> (f32, f32) {
    let az_safe = if az.abs() > AZ_EPSILON { az } else { AZ_EPSILON };
    let roll = ay.atan2(az_safe).to_degrees();
    let pitch = (-ax).atan2((ay * ay + az * az).sqrt()).to_degrees();
    (roll, pitch)
}
