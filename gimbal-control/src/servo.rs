//! Servo command writer for the azimuth/elevation axis pair.
//!
//! Converts axis-frame velocities to driver units and forwards them. Writes
//! are fire-and-forget: a failed write is logged once per outage and the tick
//! carries on.

use hardware::{AxisAlarm, AxisError, AxisId, AxisResult, ServoAxis};
use tracing::{info, warn};

use crate::config::AxisScaling;

/// Boxed axis handle as injected into the controller.
pub type BoxedAxis = Box<dyn ServoAxis + Send>;

/// Axis-frame velocity command in deg/s.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisCommand {
    pub az_dps: f64,
    pub el_dps: f64,
}

impl AxisCommand {
    pub const ZERO: Self = Self {
        az_dps: 0.0,
        el_dps: 0.0,
    };

    pub fn new(az_dps: f64, el_dps: f64) -> Self {
        Self { az_dps, el_dps }
    }

    /// Clamp both components to ±`limit`.
    pub fn clamped(self, limit: f64) -> Self {
        Self {
            az_dps: self.az_dps.clamp(-limit, limit),
            el_dps: self.el_dps.clamp(-limit, limit),
        }
    }
}

/// The two axis drivers plus the unit conversion between them and the modes.
pub struct GimbalAxes {
    az: BoxedAxis,
    el: BoxedAxis,
    scaling: AxisScaling,
    max_acceleration: u32,
    failing: [bool; 2],
    /// Write failures at the start of an outage, until taken
    faults: Vec<AxisError>,
}

impl GimbalAxes {
    pub fn new(az: BoxedAxis, el: BoxedAxis, scaling: AxisScaling, max_acceleration: u32) -> Self {
        Self {
            az,
            el,
            scaling,
            max_acceleration,
            failing: [false; 2],
            faults: Vec::new(),
        }
    }

    pub fn scaling(&self) -> &AxisScaling {
        &self.scaling
    }

    /// Send a velocity command to both axes.
    pub fn write_velocity(&mut self, command: AxisCommand) {
        let az_speed = self.scaling.az_speed(command.az_dps);
        let el_speed = self.scaling.el_speed(command.el_dps);
        let result = self.az.write_velocity(az_speed);
        self.report(AxisId::Azimuth, "velocity", result);
        let result = self.el.write_velocity(el_speed);
        self.report(AxisId::Elevation, "velocity", result);
    }

    /// Bring both axes to a standstill.
    pub fn stop(&mut self) {
        let result = self.az.stop();
        self.report(AxisId::Azimuth, "stop", result);
        let result = self.el.stop();
        self.report(AxisId::Elevation, "stop", result);
    }

    /// Set the acceleration profile on both axes, clamped to the hardware maximum.
    pub fn set_acceleration(&mut self, steps_per_sec2: u32) {
        let accel = steps_per_sec2.min(self.max_acceleration);
        let result = self.az.set_acceleration(accel);
        self.report(AxisId::Azimuth, "acceleration", result);
        let result = self.el.set_acceleration(accel);
        self.report(AxisId::Elevation, "acceleration", result);
    }

    pub fn read_alarm(&mut self, axis: AxisId) -> AxisResult<Option<AxisAlarm>> {
        self.axis_mut(axis).read_alarm_status()
    }

    pub fn clear_alarm(&mut self, axis: AxisId) -> AxisResult<()> {
        self.axis_mut(axis).clear_alarm()
    }

    pub fn is_connected(&self, axis: AxisId) -> bool {
        match axis {
            AxisId::Azimuth => self.az.is_connected(),
            AxisId::Elevation => self.el.is_connected(),
        }
    }

    /// Drain the failures that started an outage since the last call.
    pub fn take_faults(&mut self) -> Vec<AxisError> {
        std::mem::take(&mut self.faults)
    }

    fn axis_mut(&mut self, axis: AxisId) -> &mut BoxedAxis {
        match axis {
            AxisId::Azimuth => &mut self.az,
            AxisId::Elevation => &mut self.el,
        }
    }

    fn report(&mut self, axis: AxisId, what: &str, result: AxisResult<()>) {
        let index = match axis {
            AxisId::Azimuth => 0,
            AxisId::Elevation => 1,
        };
        match result {
            Err(e) if !self.failing[index] => {
                warn!("{axis} {what} write failed: {e}");
                self.failing[index] = true;
                self.faults.push(e);
            }
            Ok(()) if self.failing[index] => {
                info!("{axis} writes recovered");
                self.failing[index] = false;
            }
            _ => {}
        }
    }
}

impl std::fmt::Debug for GimbalAxes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GimbalAxes")
            .field("scaling", &self.scaling)
            .field("max_acceleration", &self.max_acceleration)
            .finish_non_exhaustive()
    }
}
