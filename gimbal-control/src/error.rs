//! Failure taxonomy for the motion-control core.
//!
//! None of these are thrown across the control tick. Each one is logged or
//! published as an event, and the tick turns it into a stop or a hold.

use hardware::{AxisError, AxisId};
use thiserror::Error;

use crate::safety::SafetyFault;
use crate::state::MotionModeKind;

/// Errors surfaced by the gimbal controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GimbalError {
    /// A mode needed zone or waypoint data that is missing or disabled.
    #[error("{mode} unavailable: {reason}")]
    ConfigurationMissing {
        mode: MotionModeKind,
        reason: String,
    },

    /// An interlock tripped; both axes were stopped.
    #[error("Safety violation: {0}")]
    SafetyViolation(SafetyFault),

    /// An axis or the IMU dropped off the bus.
    #[error("Communication lost: {0}")]
    CommunicationLoss(String),

    /// An axis driver reported a fault code.
    #[error("{axis} alarm {code:#06x}")]
    HardwareAlarm { axis: AxisId, code: u16 },

    /// The tracked or commanded target can no longer be resolved.
    #[error("Target lost")]
    TargetLost,

    /// An axis write failed.
    #[error("Axis error: {0}")]
    Axis(#[from] AxisError),
}

/// Result type for controller operations.
pub type GimbalResult<T> = Result<T, GimbalError>;
