//! Simulated devices for tests and the bench simulator.
//!
//! Every simulated device is a cheap cloneable handle over shared state, so a
//! test can hand one clone to the controller and keep another to inspect what
//! was commanded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::axis::{AxisAlarm, AxisError, AxisResult, ServoAxis};
use crate::imu::{Imu, ImuReading};
use crate::plc::{Interlocks, Plc};

/// One request received by a [`SimulatedAxis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOp {
    Velocity(i32),
    TargetPosition(i64),
    Acceleration(u32),
    Stop,
    ClearAlarm,
}

/// Everything a [`SimulatedAxis`] has been told, plus its integrated position.
#[derive(Debug, Clone, Default)]
pub struct SimulatedAxisState {
    /// Every request in arrival order
    pub ops: Vec<AxisOp>,
    /// Last commanded speed in steps/s (0 after a stop)
    pub speed: i32,
    /// Every velocity command in order
    pub velocity_history: Vec<i32>,
    /// Last absolute position target
    pub target_position: Option<i64>,
    /// Last acceleration setting
    pub acceleration: Option<u32>,
    /// Number of stop commands received
    pub stop_count: usize,
    /// Integrated position in steps
    pub position_steps: f64,
    /// Active alarm
    pub alarm: Option<AxisAlarm>,
    /// Link state
    pub connected: bool,
    /// Number of clear-alarm requests received
    pub clear_count: usize,
}

/// Simulated servo axis.
#[derive(Debug, Clone)]
pub struct SimulatedAxis {
    state: Arc<Mutex<SimulatedAxisState>>,
}

impl Default for SimulatedAxis {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAxis {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimulatedAxisState {
                connected: true,
                ..Default::default()
            })),
        }
    }

    /// Snapshot of the axis state.
    pub fn state(&self) -> SimulatedAxisState {
        lock(&self.state).clone()
    }

    /// Last commanded speed in steps/s.
    pub fn speed(&self) -> i32 {
        lock(&self.state).speed
    }

    /// Advance the simulated position by `dt_s` at the commanded speed.
    pub fn advance(&self, dt_s: f64) {
        let mut s = lock(&self.state);
        s.position_steps += s.speed as f64 * dt_s;
    }

    /// Forget recorded requests, keeping position and link state.
    pub fn clear_ops(&self) {
        let mut s = lock(&self.state);
        s.ops.clear();
        s.velocity_history.clear();
    }

    /// Position in steps.
    pub fn position_steps(&self) -> f64 {
        lock(&self.state).position_steps
    }

    pub fn set_position_steps(&self, steps: f64) {
        lock(&self.state).position_steps = steps;
    }

    /// Raise or clear a driver alarm.
    pub fn set_alarm(&self, alarm: Option<AxisAlarm>) {
        lock(&self.state).alarm = alarm;
    }

    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
    }

    fn with_link<T>(&self, f: impl FnOnce(&mut SimulatedAxisState) -> T) -> AxisResult<T> {
        let mut s = lock(&self.state);
        if !s.connected {
            return Err(AxisError::Disconnected);
        }
        Ok(f(&mut s))
    }
}

impl ServoAxis for SimulatedAxis {
    fn write_velocity(&mut self, steps_per_sec: i32) -> AxisResult<()> {
        self.with_link(|s| {
            s.speed = steps_per_sec;
            s.velocity_history.push(steps_per_sec);
            s.ops.push(AxisOp::Velocity(steps_per_sec));
        })
    }

    fn write_target_position(&mut self, steps: i64) -> AxisResult<()> {
        self.with_link(|s| {
            s.target_position = Some(steps);
            s.ops.push(AxisOp::TargetPosition(steps));
        })
    }

    fn set_acceleration(&mut self, steps_per_sec2: u32) -> AxisResult<()> {
        self.with_link(|s| {
            s.acceleration = Some(steps_per_sec2);
            s.ops.push(AxisOp::Acceleration(steps_per_sec2));
        })
    }

    fn stop(&mut self) -> AxisResult<()> {
        self.with_link(|s| {
            s.speed = 0;
            s.stop_count += 1;
            s.ops.push(AxisOp::Stop);
        })
    }

    fn read_alarm_status(&mut self) -> AxisResult<Option<AxisAlarm>> {
        self.with_link(|s| s.alarm.clone())
    }

    fn clear_alarm(&mut self) -> AxisResult<()> {
        self.with_link(|s| {
            s.alarm = None;
            s.clear_count += 1;
            s.ops.push(AxisOp::ClearAlarm);
        })
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}

/// Simulated IMU returning whatever reading was last set.
#[derive(Debug, Clone)]
pub struct SimulatedImu {
    state: Arc<Mutex<(ImuReading, bool)>>,
}

impl Default for SimulatedImu {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedImu {
    /// Level, at rest, 1 G on Z.
    pub fn new() -> Self {
        let reading = ImuReading {
            accel_z: 1.0,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new((reading, true))),
        }
    }

    pub fn set_reading(&self, reading: ImuReading) {
        lock(&self.state).0 = reading;
    }

    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).1 = connected;
    }
}

impl Imu for SimulatedImu {
    fn read(&mut self) -> ImuReading {
        lock(&self.state).0
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).1
    }
}

#[derive(Debug, Default)]
struct PlcState {
    interlocks: Interlocks,
    reset_writes: Vec<u16>,
}

/// Simulated PLC recording writes to the alarm-reset line.
#[derive(Debug, Clone)]
pub struct SimulatedPlc {
    state: Arc<Mutex<PlcState>>,
}

impl Default for SimulatedPlc {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlc {
    /// Station enabled, no E-stop, dead-man held.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PlcState {
                interlocks: Interlocks {
                    station_enabled: true,
                    dead_man_switch: true,
                    ..Default::default()
                },
                reset_writes: Vec::new(),
            })),
        }
    }

    pub fn set_interlocks(&self, interlocks: Interlocks) {
        lock(&self.state).interlocks = interlocks;
    }

    /// Every level written to the alarm-reset line, in order.
    pub fn reset_writes(&self) -> Vec<u16> {
        lock(&self.state).reset_writes.clone()
    }
}

impl Plc for SimulatedPlc {
    fn read_interlocks(&mut self) -> Interlocks {
        lock(&self.state).interlocks
    }

    fn set_reset_alarm(&mut self, level: u16) -> AxisResult<()> {
        lock(&self.state).reset_writes.push(level);
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
