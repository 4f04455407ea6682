//! Centralized safety gate evaluated before every mode update.

use hardware::AxisId;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ElevationLimits;
use crate::state::{MotionModeKind, SystemStateSnapshot};

/// Condition that forces both axes to stop.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyFault {
    #[error("station disabled")]
    StationDisabled,

    #[error("emergency stop active")]
    EmergencyStop,

    #[error("dead-man switch released")]
    DeadManReleased,

    #[error("{0} servo disconnected")]
    AxisDisconnected(AxisId),
}

/// Elevation directions blocked by a limit sensor or soft limit.
///
/// Motion away from the limit stays allowed so the operator can back off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElevationInhibit {
    pub raise: bool,
    pub lower: bool,
}

impl ElevationInhibit {
    pub fn from_snapshot(snapshot: &SystemStateSnapshot, limits: &ElevationLimits) -> Self {
        Self {
            raise: snapshot.interlocks.upper_limit || snapshot.gimbal_el >= limits.max_deg,
            lower: snapshot.interlocks.lower_limit || snapshot.gimbal_el <= limits.min_deg,
        }
    }

    /// Zero an elevation rate that drives further into a blocked direction.
    pub fn apply(&self, el_dps: f64) -> f64 {
        if (self.raise && el_dps > 0.0) || (self.lower && el_dps < 0.0) {
            0.0
        } else {
            el_dps
        }
    }
}

/// Evaluates interlocks and logs transitions in and out of a fault.
#[derive(Debug, Default)]
pub struct SafetyGate {
    active_fault: Option<SafetyFault>,
}

impl SafetyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault currently holding the axes, if any.
    pub fn active_fault(&self) -> Option<SafetyFault> {
        self.active_fault
    }

    /// Check every interlock for `mode`.
    ///
    /// Returns the elevation inhibit to apply when motion is allowed.
    pub fn check(
        &mut self,
        snapshot: &SystemStateSnapshot,
        mode: MotionModeKind,
        limits: &ElevationLimits,
    ) -> Result<ElevationInhibit, SafetyFault> {
        let result =
            evaluate(snapshot, mode).map(|()| ElevationInhibit::from_snapshot(snapshot, limits));

        match (&result, self.active_fault) {
            (Err(fault), previous) if previous != Some(*fault) => {
                warn!("Safety gate tripped in {mode}: {fault}");
                self.active_fault = Some(*fault);
            }
            (Ok(_), Some(fault)) => {
                info!("Safety gate cleared ({fault} resolved)");
                self.active_fault = None;
            }
            _ => {}
        }
        result
    }
}

fn evaluate(snapshot: &SystemStateSnapshot, mode: MotionModeKind) -> Result<(), SafetyFault> {
    let interlocks = &snapshot.interlocks;
    if interlocks.emergency_stop {
        return Err(SafetyFault::EmergencyStop);
    }
    if !interlocks.station_enabled {
        return Err(SafetyFault::StationDisabled);
    }
    if mode.requires_dead_man() && !interlocks.dead_man_switch {
        return Err(SafetyFault::DeadManReleased);
    }
    if !snapshot.az_servo_connected {
        return Err(SafetyFault::AxisDisconnected(AxisId::Azimuth));
    }
    if !snapshot.el_servo_connected {
        return Err(SafetyFault::AxisDisconnected(AxisId::Elevation));
    }
    Ok(())
}
