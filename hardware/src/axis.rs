//! Servo axis interface for the azimuth and elevation drives.
//!
//! Each gimbal axis is driven by a stepper/servo driver that accepts a signed
//! operating speed in driver steps per second. The control core never talks to
//! the wire protocol directly; it only sees this trait.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which gimbal axis a driver or alarm belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisId {
    Azimuth,
    Elevation,
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisId::Azimuth => write!(f, "azimuth"),
            AxisId::Elevation => write!(f, "elevation"),
        }
    }
}

/// Fault reported by an axis driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisAlarm {
    /// Driver-specific alarm code
    pub code: u16,
    /// Human-readable description from the driver's alarm table
    pub description: String,
}

impl AxisAlarm {
    pub fn new(code: u16, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

/// Errors that can occur while commanding an axis.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AxisError {
    /// Driver is not reachable.
    #[error("Axis driver disconnected")]
    Disconnected,

    /// Transport accepted the request but the driver rejected or dropped it.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Command queue to the worker thread is full; the command was dropped.
    #[error("Command queue full")]
    QueueFull,

    /// Background worker has exited.
    #[error("Axis worker stopped")]
    WorkerStopped,
}

/// Result type for axis operations.
pub type AxisResult<T> = Result<T, AxisError>;

/// Interface for a single servo axis.
///
/// Abstracts the drive hardware so the motion modes can be exercised against
/// simulated axes.
pub trait ServoAxis {
    /// Command a continuous operating speed.
    ///
    /// # Arguments
    /// * `steps_per_sec` - Signed speed in driver steps per second (Hz)
    fn write_velocity(&mut self, steps_per_sec: i32) -> AxisResult<()>;

    /// Command an absolute position move in driver steps.
    fn write_target_position(&mut self, steps: i64) -> AxisResult<()>;

    /// Set the acceleration/deceleration rate in steps/s².
    fn set_acceleration(&mut self, steps_per_sec2: u32) -> AxisResult<()>;

    /// Decelerate to a standstill.
    fn stop(&mut self) -> AxisResult<()>;

    /// Current alarm, if the driver reports one.
    fn read_alarm_status(&mut self) -> AxisResult<Option<AxisAlarm>>;

    /// Clear a latched alarm on the driver itself.
    fn clear_alarm(&mut self) -> AxisResult<()>;

    /// Whether the transport to the driver is up.
    fn is_connected(&self) -> bool;
}

impl<T: ServoAxis + ?Sized> ServoAxis for Box<T> {
    fn write_velocity(&mut self, steps_per_sec: i32) -> AxisResult<()> {
        (**self).write_velocity(steps_per_sec)
    }

    fn write_target_position(&mut self, steps: i64) -> AxisResult<()> {
        (**self).write_target_position(steps)
    }

    fn set_acceleration(&mut self, steps_per_sec2: u32) -> AxisResult<()> {
        (**self).set_acceleration(steps_per_sec2)
    }

    fn stop(&mut self) -> AxisResult<()> {
        (**self).stop()
    }

    fn read_alarm_status(&mut self) -> AxisResult<Option<AxisAlarm>> {
        (**self).read_alarm_status()
    }

    fn clear_alarm(&mut self) -> AxisResult<()> {
        (**self).clear_alarm()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
