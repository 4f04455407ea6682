//! Tuning and geometry for the gimbal control core.
//!
//! Every constant the control laws use lives here, grouped per concern, with
//! defaults matching the fielded platform. A [`GimbalConfig`] is built once and
//! injected into the controller; nothing reads configuration from globals.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading or saving a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for configuration I/O.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// PID gains and integral clamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Accumulated integral is clamped to ±this value
    pub max_integral: f64,
}

impl PidGains {
    pub const fn new(kp: f64, ki: f64, kd: f64, max_integral: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            max_integral,
        }
    }
}

impl Default for PidGains {
    fn default() -> Self {
        Self::new(1.0, 0.0, 0.0, 10.0)
    }
}

/// Conversion between angular rates and driver speed units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisScaling {
    /// Azimuth driver steps per output revolution
    pub az_steps_per_rev: f64,
    /// Elevation driver steps per output revolution
    pub el_steps_per_rev: f64,
    /// Elevation driver counts positive speed as downward motion
    pub invert_elevation: bool,
}

impl Default for AxisScaling {
    fn default() -> Self {
        Self {
            az_steps_per_rev: 222_500.0,
            el_steps_per_rev: 200_000.0,
            invert_elevation: true,
        }
    }
}

impl AxisScaling {
    pub fn az_steps_per_degree(&self) -> f64 {
        self.az_steps_per_rev / 360.0
    }

    pub fn el_steps_per_degree(&self) -> f64 {
        self.el_steps_per_rev / 360.0
    }

    /// Azimuth rate in deg/s to driver speed in steps/s, truncated toward zero.
    pub fn az_speed(&self, deg_per_sec: f64) -> i32 {
        (deg_per_sec * self.az_steps_per_degree()) as i32
    }

    /// Elevation rate in deg/s to driver speed in steps/s, truncated toward
    /// zero, with the wire direction applied.
    pub fn el_speed(&self, deg_per_sec: f64) -> i32 {
        let speed = (deg_per_sec * self.el_steps_per_degree()) as i32;
        if self.invert_elevation {
            -speed
        } else {
            speed
        }
    }
}

/// Thresholds for deciding the vehicle is at rest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationaryConfig {
    /// Gyro magnitude must stay below this (deg/s)
    pub gyro_threshold_dps: f64,
    /// Tick-to-tick change in accel magnitude must stay below this (G)
    pub accel_delta_threshold_g: f64,
    /// Both conditions must hold for longer than this
    pub hold_time_ms: u64,
}

impl Default for StationaryConfig {
    fn default() -> Self {
        Self {
            gyro_threshold_dps: 0.5,
            accel_delta_threshold_g: 0.01,
            hold_time_ms: 2000,
        }
    }
}

/// Gyro filtering, bias learning and correction limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizationConfig {
    pub filter_cutoff_hz: f64,
    pub sample_rate_hz: f64,
    /// Per-axis stabilization correction limit (deg/s)
    pub max_correction_dps: f64,
    /// Stationary samples averaged per bias update
    pub bias_window: usize,
    pub stationary: StationaryConfig,
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            filter_cutoff_hz: 5.0,
            sample_rate_hz: 20.0,
            max_correction_dps: 5.0,
            bias_window: 50,
            stationary: StationaryConfig::default(),
        }
    }
}

/// Soft elevation travel limits in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationLimits {
    pub min_deg: f64,
    pub max_deg: f64,
}

impl Default for ElevationLimits {
    fn default() -> Self {
        Self {
            min_deg: -10.0,
            max_deg: 50.0,
        }
    }
}

/// Which measurement closed-loop modes use as current elevation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ElevationFeedback {
    /// IMU pitch angle
    #[default]
    ImuPitch,
    /// Elevation encoder
    Encoder,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualConfig {
    /// Joystick exponential smoothing factor
    pub smoothing_alpha: f64,
    /// Response curve exponent
    pub shaping_exponent: f64,
    /// Full-deflection speed at 100% speed setting (steps/s)
    pub max_speed_hz: f64,
    /// Ramp limit while speeding up (steps/s²)
    pub max_accel_hz_per_sec: f64,
    /// Targets below this magnitude snap to zero (steps/s)
    pub deadband_hz: f64,
    pub acceleration: u32,
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.4,
            shaping_exponent: 1.5,
            max_speed_hz: 25_000.0,
            max_accel_hz_per_sec: 15_000.0,
            deadband_hz: 100.0,
            acceleration: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub az_gains: PidGains,
    pub el_gains: PidGains,
    /// Target position smoothing factor
    pub position_alpha: f64,
    /// Target velocity smoothing factor
    pub velocity_alpha: f64,
    /// Fraction of the target's own angular velocity fed forward
    pub feedforward_gain: f64,
    pub max_velocity_dps: f64,
    /// Largest per-tick change in commanded velocity (deg/s)
    pub velocity_change_limit_dps: f64,
    /// Below this error the output is scaled down (deg)
    pub scaling_threshold_deg: f64,
    /// Output fraction at zero error
    pub min_scale: f64,
    pub acceleration: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        let gains = PidGains::new(0.15, 0.005, 0.01, 10.0);
        Self {
            az_gains: gains,
            el_gains: gains,
            position_alpha: 0.3,
            velocity_alpha: 0.2,
            feedforward_gain: 0.5,
            max_velocity_dps: 15.0,
            velocity_change_limit_dps: 5.0,
            scaling_threshold_deg: 2.0,
            min_scale: 0.3,
            acceleration: 50_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarSlewConfig {
    pub gains: PidGains,
    pub max_speed_dps: f64,
    pub cruise_speed_dps: f64,
    pub deceleration_distance_deg: f64,
    pub arrival_threshold_deg: f64,
    pub velocity_change_limit_dps: f64,
    /// Assumed height of the sensor above the radar's ground plane (m)
    pub system_height_m: f64,
    pub acceleration: u32,
}

impl Default for RadarSlewConfig {
    fn default() -> Self {
        Self {
            gains: PidGains::new(1.5, 0.08, 0.15, 30.0),
            max_speed_dps: 25.0,
            cruise_speed_dps: 12.0,
            deceleration_distance_deg: 5.0,
            arrival_threshold_deg: 0.2,
            velocity_change_limit_dps: 3.0,
            system_height_m: 15.0,
            acceleration: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorScanConfig {
    pub gains: PidGains,
    pub arrival_threshold_deg: f64,
    pub deceleration_distance_deg: f64,
    /// Zone scan speed is multiplied by this to get the cruise rate (deg/s)
    pub scan_speed_scale: f64,
    pub acceleration: u32,
}

impl Default for SectorScanConfig {
    fn default() -> Self {
        Self {
            gains: PidGains::new(1.0, 0.01, 0.05, 20.0),
            arrival_threshold_deg: 0.2,
            deceleration_distance_deg: 2.0,
            scan_speed_scale: 0.1,
            acceleration: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrpScanConfig {
    pub gains: PidGains,
    pub travel_speed_dps: f64,
    pub deceleration_distance_deg: f64,
    pub arrival_threshold_deg: f64,
    pub acceleration: u32,
}

impl Default for TrpScanConfig {
    fn default() -> Self {
        Self {
            gains: PidGains::new(1.2, 0.1, 0.1, 20.0),
            travel_speed_dps: 15.0,
            deceleration_distance_deg: 3.0,
            arrival_threshold_deg: 0.1,
            acceleration: 200_000,
        }
    }
}

/// Complete controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GimbalConfig {
    /// Control tick period
    pub tick_period_ms: u64,
    /// Global clamp on commanded axis velocity (deg/s)
    pub max_velocity_dps: f64,
    /// Upper bound on any acceleration setting (steps/s²)
    pub max_acceleration: u32,
    /// Delay between the two edges of the alarm-reset pulse
    pub alarm_reset_delay_ms: u64,
    pub scaling: AxisScaling,
    pub stabilization: StabilizationConfig,
    pub elevation_limits: ElevationLimits,
    pub elevation_feedback: ElevationFeedback,
    pub manual: ManualConfig,
    pub tracking: TrackingConfig,
    pub radar_slew: RadarSlewConfig,
    pub sector_scan: SectorScanConfig,
    pub trp_scan: TrpScanConfig,
}

impl Default for GimbalConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 50,
            max_velocity_dps: 30.0,
            max_acceleration: 1_000_000_000,
            alarm_reset_delay_ms: 1000,
            scaling: AxisScaling::default(),
            stabilization: StabilizationConfig::default(),
            elevation_limits: ElevationLimits::default(),
            elevation_feedback: ElevationFeedback::default(),
            manual: ManualConfig::default(),
            tracking: TrackingConfig::default(),
            radar_slew: RadarSlewConfig::default(),
            sector_scan: SectorScanConfig::default(),
            trp_scan: TrpScanConfig::default(),
        }
    }
}

impl GimbalConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Nominal tick interval in seconds.
    pub fn dt_s(&self) -> f64 {
        self.tick_period_ms as f64 / 1000.0
    }

    pub fn alarm_reset_delay(&self) -> Duration {
        Duration::from_millis(self.alarm_reset_delay_ms)
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file. Missing fields take their defaults.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
