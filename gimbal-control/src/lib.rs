//! Motion-control core for a two-axis azimuth/elevation gimbal.
//!
//! Turns operator and system intent (follow the joystick, track a target,
//! slew to a radar plot, sweep a sector, tour reference points) into
//! stabilized velocity commands for the two servo axes, behind a safety gate
//! that stops both axes whenever an interlock trips.
//!
//! The pieces, leaves first:
//!
//! - [`pid`] - PID controller with integral clamping and selectable derivative source
//! - [`stabilization`] - gyro filtering, bias learning and the world-to-axis transform
//! - [`modes`] - the six motion modes as a single sum type
//! - [`safety`] - interlock evaluation and the elevation limit inhibit
//! - [`controller`] - mode lifecycle, the control tick, alarm relay
//! - [`store`] / [`control_loop`] - snapshot ownership and the fixed-period scheduler
//!
//! Devices are injected through the traits in the `hardware` crate.
//!
//! # Features
//!
//! - `sim` - Builds the `gimbal_sim` binary against simulated devices

pub mod angles;
pub mod config;
pub mod control_loop;
pub mod controller;
pub mod error;
pub mod modes;
pub mod pid;
pub mod safety;
pub mod servo;
pub mod stabilization;
pub mod state;
pub mod store;
pub mod zones;

pub use config::{ConfigError, ConfigResult, GimbalConfig, PidGains};
pub use control_loop::{ControlLoop, ControlLoopHandle};
pub use controller::{GimbalController, GimbalEvent};
pub use error::{GimbalError, GimbalResult};
pub use modes::{ModeInput, MotionDemand, MotionMode, TargetUpdate};
pub use pid::{DerivativeSource, PidController};
pub use safety::{ElevationInhibit, SafetyFault};
pub use servo::{AxisCommand, BoxedAxis};
pub use stabilization::{DirectSubtraction, KinematicDecoupling, StabilizationTransform, Stabilizer};
pub use state::{MotionModeKind, SystemStateSnapshot};
pub use store::StateStore;
