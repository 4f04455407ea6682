//! System state as seen by the control core.
//!
//! The external state provider owns and mutates the snapshot; the core only
//! ever reads a private copy taken at the start of each tick.

use hardware::{ImuReading, Interlocks};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::config::ElevationFeedback;
use crate::zones::AreaZone;

/// Operator- or system-selected motion mode.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumIter,
)]
pub enum MotionModeKind {
    #[default]
    Idle,
    Manual,
    AutoTrack,
    ManualTrack,
    RadarSlew,
    AutoSectorScan,
    #[strum(serialize = "TRPScan")]
    TrpScan,
}

impl MotionModeKind {
    /// Modes in which the operator must hold the dead-man switch.
    pub fn requires_dead_man(self) -> bool {
        matches!(self, MotionModeKind::Manual | MotionModeKind::AutoTrack)
    }

    /// Modes driven by the video tracker.
    pub fn is_tracking(self) -> bool {
        matches!(self, MotionModeKind::AutoTrack | MotionModeKind::ManualTrack)
    }
}

/// Two-point sector the AutoSectorScan mode sweeps back and forth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoSectorScanZone {
    pub id: u32,
    pub enabled: bool,
    pub az1: f64,
    pub el1: f64,
    pub az2: f64,
    pub el2: f64,
    /// Operator scan speed setting
    #[serde(default = "default_scan_speed")]
    pub scan_speed: f64,
}

fn default_scan_speed() -> f64 {
    20.0
}

/// Predefined waypoint, grouped into pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReferencePoint {
    pub id: u32,
    /// Page this point belongs to
    pub page: u32,
    /// Visit order within the page
    pub index_in_page: u32,
    pub azimuth: f64,
    pub elevation: f64,
    /// Dwell time at this point in seconds
    pub halt_time_s: f64,
}

/// Radar track report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarPlot {
    pub id: u32,
    /// Bearing in degrees
    pub azimuth: f64,
    /// Slant range in metres
    pub range_m: f64,
    pub relative_course: f64,
    pub relative_speed: f64,
}

/// Video tracker output in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackerState {
    pub has_valid_target: bool,
    pub target_x_px: f64,
    pub target_y_px: f64,
    pub velocity_x_px_s: f64,
    pub velocity_y_px_s: f64,
}

/// Active camera geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    pub image_width_px: u32,
    pub image_height_px: u32,
    pub day_hfov_deg: f64,
    pub night_hfov_deg: f64,
    pub day_camera_active: bool,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            image_width_px: 1024,
            image_height_px: 768,
            day_hfov_deg: 9.0,
            night_hfov_deg: 8.0,
            day_camera_active: true,
        }
    }
}

impl CameraState {
    /// Horizontal field of view of whichever camera is selected.
    pub fn active_hfov_deg(&self) -> f64 {
        if self.day_camera_active {
            self.day_hfov_deg
        } else {
            self.night_hfov_deg
        }
    }

    /// Image centre in pixels.
    pub fn centre_px(&self) -> (f64, f64) {
        (
            self.image_width_px as f64 / 2.0,
            self.image_height_px as f64 / 2.0,
        )
    }
}

/// Everything the control core reads in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStateSnapshot {
    // Gimbal feedback
    pub gimbal_az: f64,
    pub gimbal_el: f64,
    pub az_servo_connected: bool,
    pub el_servo_connected: bool,

    // Platform IMU
    pub imu: ImuReading,
    pub imu_connected: bool,
    pub enable_stabilization: bool,

    // Operator console
    pub joystick_az: f64,
    pub joystick_el: f64,
    /// Speed setting in percent
    pub gimbal_speed_percent: f64,

    pub interlocks: Interlocks,

    // Video tracking
    pub camera: CameraState,
    pub tracker: TrackerState,

    // Mode selection and the data modes consume
    pub motion_mode: MotionModeKind,
    pub active_sector_scan_zone_id: u32,
    pub active_trp_page: u32,
    /// 0 means no track selected
    pub selected_radar_track_id: u32,
    pub radar_plots: Vec<RadarPlot>,
    pub sector_scan_zones: Vec<AutoSectorScanZone>,
    pub target_reference_points: Vec<TargetReferencePoint>,
    pub area_zones: Vec<AreaZone>,

    /// Derived by the controller and pushed back to the provider
    pub reticle_in_no_traverse_zone: bool,
}

impl Default for SystemStateSnapshot {
    fn default() -> Self {
        Self {
            gimbal_az: 0.0,
            gimbal_el: 0.0,
            az_servo_connected: true,
            el_servo_connected: true,
            imu: ImuReading {
                accel_z: 1.0,
                ..Default::default()
            },
            imu_connected: true,
            enable_stabilization: false,
            joystick_az: 0.0,
            joystick_el: 0.0,
            gimbal_speed_percent: 50.0,
            interlocks: Interlocks::default(),
            camera: CameraState::default(),
            tracker: TrackerState::default(),
            motion_mode: MotionModeKind::Idle,
            active_sector_scan_zone_id: 0,
            active_trp_page: 0,
            selected_radar_track_id: 0,
            radar_plots: Vec::new(),
            sector_scan_zones: Vec::new(),
            target_reference_points: Vec::new(),
            area_zones: Vec::new(),
            reticle_in_no_traverse_zone: false,
        }
    }
}

impl SystemStateSnapshot {
    /// Current elevation according to the configured feedback source.
    ///
    /// `None` when that source is unavailable.
    pub fn elevation(&self, feedback: ElevationFeedback) -> Option<f64> {
        match feedback {
            ElevationFeedback::ImuPitch if self.imu_connected => Some(self.imu.pitch_deg),
            ElevationFeedback::ImuPitch => None,
            ElevationFeedback::Encoder if self.el_servo_connected => Some(self.gimbal_el),
            ElevationFeedback::Encoder => None,
        }
    }

    pub fn find_radar_plot(&self, id: u32) -> Option<&RadarPlot> {
        self.radar_plots.iter().find(|p| p.id == id)
    }

    pub fn find_sector_scan_zone(&self, id: u32) -> Option<&AutoSectorScanZone> {
        self.sector_scan_zones.iter().find(|z| z.id == id)
    }

    /// Waypoints on `page`, in visit order.
    pub fn trp_page(&self, page: u32) -> Vec<TargetReferencePoint> {
        let mut points: Vec<_> = self
            .target_reference_points
            .iter()
            .filter(|p| p.page == page)
            .cloned()
            .collect();
        points.sort_by_key(|p| p.index_in_page);
        points
    }
}
