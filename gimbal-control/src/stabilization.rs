//! Platform stabilization: gyro conditioning and world-to-axis rate transform.
//!
//! Motion modes express what they want as a world-frame angular velocity. The
//! [`Stabilizer`] adds the axis-frame correction that cancels vehicle rotation
//! so the aim point stays put while the hull pitches, rolls and yaws.
//!
//! # Gyro conditioning
//!
//! Each gyro axis passes through a single-pole IIR low-pass filter. The yaw
//! rate additionally has a learned bias subtracted before filtering. The bias
//! is only learned while the vehicle is judged stationary, which requires the
//! gyro magnitude and the change in accelerometer magnitude to stay below
//! thresholds for a hold time.
//!
//! # Transform
//!
//! How body rates map onto the two gimbal axes depends on the mount
//! kinematics, so it is a [`StabilizationTransform`] chosen at construction.
//! [`KinematicDecoupling`] is the default for an azimuth-over-elevation mount.

use std::time::{Duration, Instant};

use nalgebra::{Rotation3, Vector3};
use tracing::{debug, trace};

use crate::config::{StabilizationConfig, StationaryConfig};
use crate::state::SystemStateSnapshot;

/// Single-pole IIR low-pass filter: `y = α·x + (1-α)·y_prev`.
#[derive(Debug, Clone, PartialEq)]
pub struct LowPassFilter {
    alpha: f64,
    value: Option<f64>,
}

impl LowPassFilter {
    /// Build a filter for `cutoff_hz` at `sample_rate_hz`.
    ///
    /// α is clamped to [0.01, 0.99] so the filter neither freezes nor
    /// passes everything.
    pub fn new(cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        let dt = 1.0 / sample_rate_hz;
        let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
        let alpha = dt / (rc + dt);
        let alpha = if alpha.is_finite() { alpha } else { 0.99 };
        Self {
            alpha: alpha.clamp(0.01, 0.99),
            value: None,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Feed one sample. The first sample after construction or reset
    /// initializes the output directly.
    pub fn update(&mut self, input: f64) -> f64 {
        let output = match self.value {
            Some(prev) => self.alpha * input + (1.0 - self.alpha) * prev,
            None => input,
        };
        self.value = Some(output);
        output
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// Yaw-rate bias learned from windows of stationary samples.
#[derive(Debug, Clone, PartialEq)]
pub struct GyroBiasEstimator {
    window: usize,
    sum: f64,
    count: usize,
    bias: f64,
}

impl GyroBiasEstimator {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            sum: 0.0,
            count: 0,
            bias: 0.0,
        }
    }

    /// Current bias estimate in deg/s.
    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Accumulate one raw Z sample. Leaving the stationary state discards
    /// the partial window.
    pub fn update(&mut self, raw_gyro_z: f64, stationary: bool) {
        if !stationary || !raw_gyro_z.is_finite() {
            self.sum = 0.0;
            self.count = 0;
            return;
        }

        self.sum += raw_gyro_z;
        self.count += 1;
        if self.count >= self.window {
            self.bias = self.sum / self.count as f64;
            debug!("Gyro Z bias updated: {:.4} deg/s", self.bias);
            self.sum = 0.0;
            self.count = 0;
        }
    }
}

/// Decides whether the vehicle is at rest from consecutive IMU samples.
#[derive(Debug, Clone, PartialEq)]
pub struct StationaryDetector {
    config: StationaryConfig,
    prev_accel_magnitude: Option<f64>,
    quiet_since: Option<Instant>,
    stationary: bool,
}

impl StationaryDetector {
    pub fn new(config: StationaryConfig) -> Self {
        Self {
            config,
            prev_accel_magnitude: None,
            quiet_since: None,
            stationary: false,
        }
    }

    pub fn is_stationary(&self) -> bool {
        self.stationary
    }

    /// Feed one sample taken at `now`; returns the updated verdict.
    pub fn update(&mut self, gyro_magnitude: f64, accel_magnitude: f64, now: Instant) -> bool {
        let accel_delta = self
            .prev_accel_magnitude
            .map_or(0.0, |prev| (accel_magnitude - prev).abs());
        self.prev_accel_magnitude = Some(accel_magnitude);

        let quiet = gyro_magnitude < self.config.gyro_threshold_dps
            && accel_delta < self.config.accel_delta_threshold_g;

        if quiet {
            let since = *self.quiet_since.get_or_insert(now);
            let hold = Duration::from_millis(self.config.hold_time_ms);
            if !self.stationary && now.duration_since(since) > hold {
                debug!("Vehicle stationary");
                self.stationary = true;
            }
        } else {
            if self.stationary {
                debug!("Vehicle moving");
            }
            self.stationary = false;
            self.quiet_since = None;
        }
        self.stationary
    }

    /// Forget the quiet interval and the previous acceleration sample.
    pub fn reset(&mut self) {
        self.prev_accel_magnitude = None;
        self.quiet_since = None;
        self.stationary = false;
    }
}

/// Maps filtered body rates to the axis-frame rates induced by vehicle motion.
pub trait StabilizationTransform: Send {
    /// Axis rates (az, el) in deg/s that the vehicle motion imposes on the
    /// line of sight.
    ///
    /// # Arguments
    /// * `body_rates` - (pitch, roll, yaw) rates about the IMU X, Y, Z axes in deg/s
    /// * `az_deg` - Current gimbal azimuth relative to the hull
    /// * `el_deg` - Current gimbal elevation
    fn platform_effect(&self, body_rates: Vector3<f64>, az_deg: f64, el_deg: f64) -> (f64, f64);
}

/// Rotation-matrix decoupling for an azimuth-over-elevation mount.
///
/// Body rates are rotated into the azimuth frame; the component about the
/// elevation axis disturbs elevation directly, while the cross-axis component
/// leaks into azimuth in proportion to `tan(el)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KinematicDecoupling;

impl StabilizationTransform for KinematicDecoupling {
    fn platform_effect(&self, body_rates: Vector3<f64>, az_deg: f64, el_deg: f64) -> (f64, f64) {
        let rotated =
            Rotation3::from_axis_angle(&Vector3::z_axis(), az_deg.to_radians()) * body_rates;
        let yaw_rate = body_rates.z;

        let el_effect = rotated.x;
        let cos_el = el_deg.to_radians().cos();
        let az_effect = if cos_el.abs() < 1e-6 {
            yaw_rate
        } else {
            yaw_rate + el_deg.to_radians().tan() * rotated.y
        };
        (az_effect, el_effect)
    }
}

/// Yaw disturbs azimuth and pitch disturbs elevation, nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectSubtraction;

impl StabilizationTransform for DirectSubtraction {
    fn platform_effect(&self, body_rates: Vector3<f64>, _az_deg: f64, _el_deg: f64) -> (f64, f64) {
        (body_rates.z, body_rates.x)
    }
}

/// Gyro conditioning plus the world-to-axis velocity transform.
pub struct Stabilizer {
    config: StabilizationConfig,
    filters: [LowPassFilter; 3],
    bias: GyroBiasEstimator,
    stationary: StationaryDetector,
    transform: Box<dyn StabilizationTransform>,
}

impl Stabilizer {
    pub fn new(config: StabilizationConfig) -> Self {
        Self::with_transform(config, Box::new(KinematicDecoupling))
    }

    pub fn with_transform(
        config: StabilizationConfig,
        transform: Box<dyn StabilizationTransform>,
    ) -> Self {
        let filter = LowPassFilter::new(config.filter_cutoff_hz, config.sample_rate_hz);
        Self {
            filters: [filter.clone(), filter.clone(), filter],
            bias: GyroBiasEstimator::new(config.bias_window),
            stationary: StationaryDetector::new(config.stationary),
            config,
            transform,
        }
    }

    pub fn gyro_bias(&self) -> f64 {
        self.bias.bias()
    }

    pub fn is_stationary(&self) -> bool {
        self.stationary.is_stationary()
    }

    /// Refresh the stationary verdict and the yaw bias from this tick's IMU sample.
    ///
    /// While the IMU is disconnected the detector, the partial bias window
    /// and the gyro filters are all reset, so an outage never counts towards
    /// the stationary hold time.
    pub fn update_gyro_bias(&mut self, snapshot: &SystemStateSnapshot, now: Instant) {
        if !snapshot.imu_connected {
            self.bias.update(0.0, false);
            self.stationary.reset();
            self.reset_filters();
            return;
        }
        let imu = &snapshot.imu;
        let stationary =
            self.stationary
                .update(imu.gyro_magnitude(), imu.accel_magnitude(), now);
        self.bias.update(imu.gyro_z, stationary);
    }

    /// Axis-frame correction (az, el) in deg/s cancelling vehicle rotation.
    ///
    /// Advances the gyro filters. Zero when the IMU is down or reports
    /// non-finite rates.
    pub fn correction(&mut self, snapshot: &SystemStateSnapshot) -> (f64, f64) {
        let imu = &snapshot.imu;
        if !snapshot.imu_connected
            || !(imu.gyro_x.is_finite() && imu.gyro_y.is_finite() && imu.gyro_z.is_finite())
        {
            return (0.0, 0.0);
        }

        let pitch = self.filters[0].update(imu.gyro_x);
        let roll = self.filters[1].update(imu.gyro_y);
        let yaw = self.filters[2].update(imu.gyro_z - self.bias.bias());

        let (az_effect, el_effect) = self.transform.platform_effect(
            Vector3::new(pitch, roll, yaw),
            snapshot.gimbal_az,
            snapshot.gimbal_el,
        );

        let limit = self.config.max_correction_dps;
        let correction = (
            (-az_effect).clamp(-limit, limit),
            (-el_effect).clamp(-limit, limit),
        );
        trace!(
            "Stabilization correction az={:.3} el={:.3}",
            correction.0,
            correction.1
        );
        correction
    }

    /// Convert a desired world-frame velocity into axis-frame velocity.
    ///
    /// The correction is only applied when stabilization is enabled in the
    /// snapshot, but the filters advance either way.
    pub fn stabilize(
        &mut self,
        desired_az_dps: f64,
        desired_el_dps: f64,
        snapshot: &SystemStateSnapshot,
    ) -> (f64, f64) {
        let (az_corr, el_corr) = self.correction(snapshot);
        if snapshot.enable_stabilization {
            (desired_az_dps + az_corr, desired_el_dps + el_corr)
        } else {
            (desired_az_dps, desired_el_dps)
        }
    }

    pub fn reset_filters(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }
}

impl std::fmt::Debug for Stabilizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stabilizer")
            .field("config", &self.config)
            .field("bias", &self.bias)
            .field("stationary", &self.stationary)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn moving_snapshot(gyro_x: f64, gyro_y: f64, gyro_z: f64) -> SystemStateSnapshot {
        let mut snapshot = SystemStateSnapshot {
            enable_stabilization: true,
            ..Default::default()
        };
        snapshot.imu.gyro_x = gyro_x;
        snapshot.imu.gyro_y = gyro_y;
        snapshot.imu.gyro_z = gyro_z;
        snapshot
    }

    #[test]
    fn test_filter_alpha_from_cutoff() {
        let filter = LowPassFilter::new(5.0, 20.0);
        let rc = 1.0 / (2.0 * std::f64::consts::PI * 5.0);
        assert_relative_eq!(filter.alpha(), 0.05 / (rc + 0.05), epsilon = 1e-12);
    }

    #[test]
    fn test_filter_alpha_is_clamped() {
        assert_relative_eq!(LowPassFilter::new(1e6, 20.0).alpha(), 0.99);
        assert_relative_eq!(LowPassFilter::new(1e-6, 20.0).alpha(), 0.01);
        assert_relative_eq!(LowPassFilter::new(0.0, 20.0).alpha(), 0.01);
    }

    #[test]
    fn test_filter_first_sample_initializes() {
        let mut filter = LowPassFilter::new(5.0, 20.0);
        assert_relative_eq!(filter.update(4.0), 4.0);
        let alpha = filter.alpha();
        assert_relative_eq!(filter.update(0.0), 4.0 * (1.0 - alpha), epsilon = 1e-12);

        filter.reset();
        assert_eq!(filter.value(), None);
        assert_relative_eq!(filter.update(-1.0), -1.0);
    }

    #[test]
    fn test_bias_published_after_full_window() {
        let mut estimator = GyroBiasEstimator::new(50);
        for _ in 0..49 {
            estimator.update(0.2, true);
        }
        assert_relative_eq!(estimator.bias(), 0.0);
        estimator.update(0.2, true);
        assert_relative_eq!(estimator.bias(), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_bias_window_discarded_when_moving() {
        let mut estimator = GyroBiasEstimator::new(50);
        for _ in 0..40 {
            estimator.update(1.0, true);
        }
        estimator.update(1.0, false);
        for _ in 0..49 {
            estimator.update(0.1, true);
        }
        // Partial window from before the motion never completes a publish
        assert_relative_eq!(estimator.bias(), 0.0);
        estimator.update(0.1, true);
        assert_relative_eq!(estimator.bias(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_stationary_requires_hold_time() {
        let mut detector = StationaryDetector::new(StationaryConfig::default());
        let t0 = Instant::now();

        assert!(!detector.update(0.1, 1.0, t0));
        assert!(!detector.update(0.1, 1.0, t0 + Duration::from_millis(2000)));
        assert!(detector.update(0.1, 1.0, t0 + Duration::from_millis(2050)));

        // A jolt in acceleration clears the verdict and restarts the timer
        assert!(!detector.update(0.1, 1.05, t0 + Duration::from_millis(2100)));
        assert!(!detector.update(0.1, 1.05, t0 + Duration::from_millis(3000)));
        assert!(!detector.update(0.1, 1.05, t0 + Duration::from_millis(4200)));
        assert!(detector.update(0.1, 1.05, t0 + Duration::from_millis(5050)));

        assert!(!detector.update(0.8, 1.05, t0 + Duration::from_millis(5100)));
    }

    #[test]
    fn test_imu_outage_restarts_stationary_hold() {
        let mut stabilizer = Stabilizer::new(StabilizationConfig::default());
        let parked = moving_snapshot(0.0, 0.0, 0.0);
        let t0 = Instant::now();

        stabilizer.update_gyro_bias(&parked, t0);
        stabilizer.update_gyro_bias(&parked, t0 + Duration::from_millis(1000));
        assert!(!stabilizer.is_stationary());

        let mut lost = parked.clone();
        lost.imu_connected = false;
        stabilizer.update_gyro_bias(&lost, t0 + Duration::from_millis(1500));

        // Back after five seconds: the outage does not count as quiet time
        stabilizer.update_gyro_bias(&parked, t0 + Duration::from_millis(6500));
        assert!(!stabilizer.is_stationary());
        stabilizer.update_gyro_bias(&parked, t0 + Duration::from_millis(8000));
        assert!(!stabilizer.is_stationary());
        stabilizer.update_gyro_bias(&parked, t0 + Duration::from_millis(8550));
        assert!(stabilizer.is_stationary());
    }

    #[test]
    fn test_imu_outage_resets_gyro_filters() {
        let mut stabilizer = Stabilizer::new(StabilizationConfig::default());
        let t0 = Instant::now();
        stabilizer.correction(&moving_snapshot(4.0, 0.0, 0.0));

        let mut lost = moving_snapshot(0.0, 0.0, 0.0);
        lost.imu_connected = false;
        stabilizer.update_gyro_bias(&lost, t0);

        // First sample after the outage initializes the filter directly
        let (_, el) = stabilizer.correction(&moving_snapshot(1.0, 0.0, 0.0));
        assert_relative_eq!(el, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_stabilizer_learns_bias_when_parked() {
        let mut stabilizer = Stabilizer::new(StabilizationConfig::default());
        let snapshot = moving_snapshot(0.0, 0.0, 0.3);
        let t0 = Instant::now();

        for i in 0..200 {
            stabilizer.update_gyro_bias(&snapshot, t0 + Duration::from_millis(50 * i));
        }
        assert!(stabilizer.is_stationary());
        assert_relative_eq!(stabilizer.gyro_bias(), 0.3, epsilon = 1e-12);

        // Bias-corrected yaw rate is zero, so there is nothing to correct
        let (az, el) = stabilizer.correction(&snapshot);
        assert_abs_diff_eq!(az, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(el, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_yaw_rate_counter_rotates_azimuth() {
        let mut stabilizer = Stabilizer::new(StabilizationConfig::default());
        let snapshot = moving_snapshot(0.0, 0.0, 2.0);
        let (az, el) = stabilizer.stabilize(1.0, 0.0, &snapshot);
        assert_relative_eq!(az, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(el, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_correction_depends_on_azimuth() {
        let mut stabilizer = Stabilizer::new(StabilizationConfig::default());

        // Facing forward, hull pitch goes straight into elevation
        let snapshot = moving_snapshot(3.0, 0.0, 0.0);
        let (_, el) = stabilizer.correction(&snapshot);
        assert_relative_eq!(el, -3.0, epsilon = 1e-12);

        // Facing the side, hull roll tilts the line of sight instead
        let mut stabilizer = Stabilizer::new(StabilizationConfig::default());
        let mut snapshot = moving_snapshot(0.0, 3.0, 0.0);
        snapshot.gimbal_az = 90.0;
        let (_, el) = stabilizer.correction(&snapshot);
        assert_relative_eq!(el, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_elevated_line_of_sight_couples_into_azimuth() {
        let transform = KinematicDecoupling;
        let (az, _) = transform.platform_effect(Vector3::new(0.0, 1.0, 0.0), 0.0, 45.0);
        assert_relative_eq!(az, 1.0, epsilon = 1e-9);

        // Straight up, azimuth only sees yaw
        let (az, _) = transform.platform_effect(Vector3::new(0.0, 1.0, 0.5), 0.0, 90.0);
        assert_relative_eq!(az, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_correction_clamped() {
        let mut stabilizer = Stabilizer::new(StabilizationConfig::default());
        let (az, el) = stabilizer.correction(&moving_snapshot(-40.0, 0.0, 40.0));
        assert_relative_eq!(az, -5.0);
        assert_relative_eq!(el, 5.0);
    }

    #[test]
    fn test_nan_rates_give_no_correction() {
        let mut stabilizer = Stabilizer::new(StabilizationConfig::default());
        let (az, el) = stabilizer.stabilize(2.0, -1.0, &moving_snapshot(f64::NAN, 0.0, 1.0));
        assert_relative_eq!(az, 2.0);
        assert_relative_eq!(el, -1.0);
    }

    #[test]
    fn test_disabled_stabilization_passes_desired_through() {
        let mut stabilizer = Stabilizer::new(StabilizationConfig::default());
        let mut snapshot = moving_snapshot(1.0, 1.0, 1.0);
        snapshot.enable_stabilization = false;
        assert_eq!(stabilizer.stabilize(3.0, 4.0, &snapshot), (3.0, 4.0));
    }

    #[test]
    fn test_direct_subtraction() {
        let mut stabilizer = Stabilizer::with_transform(
            StabilizationConfig::default(),
            Box::new(DirectSubtraction),
        );
        let mut snapshot = moving_snapshot(1.5, 2.0, -0.5);
        snapshot.gimbal_az = 90.0;
        snapshot.gimbal_el = 30.0;
        let (az, el) = stabilizer.correction(&snapshot);
        assert_relative_eq!(az, 0.5);
        assert_relative_eq!(el, -1.5);
    }
}
