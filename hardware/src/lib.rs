//! Device seams for the two-axis gimbal.
//!
//! This crate defines the narrow interfaces the motion-control core uses to
//! reach the outside world: one [`ServoAxis`] per gimbal axis, the platform
//! [`Imu`], and the station [`Plc`] carrying interlocks and the alarm-reset
//! line. Wire-level framing lives behind these traits in the transport layer.
//!
//! # Features
//!
//! - `mock` - Simulated axis, IMU and PLC devices for tests and the simulator

pub mod axis;
pub mod imu;
pub mod plc;
pub mod queued;

#[cfg(feature = "mock")]
pub mod mock;

pub use axis::{AxisAlarm, AxisError, AxisId, AxisResult, ServoAxis};
pub use imu::{Imu, ImuReading};
pub use plc::{Interlocks, Plc};
pub use queued::QueuedAxis;
