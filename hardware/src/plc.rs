//! PLC interlock inputs and the alarm-reset output line.

use serde::{Deserialize, Serialize};

use crate::axis::AxisResult;

/// Digital interlock inputs read from the station PLC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Interlocks {
    pub station_enabled: bool,
    pub emergency_stop: bool,
    pub dead_man_switch: bool,
    pub upper_limit: bool,
    pub lower_limit: bool,
}

/// Interface for the station PLC.
pub trait Plc {
    /// Current interlock inputs.
    fn read_interlocks(&mut self) -> Interlocks;

    /// Drive the alarm-reset output line (0 = asserted, 1 = released).
    fn set_reset_alarm(&mut self, level: u16) -> AxisResult<()>;
}
