//! Joystick-driven manual mode.

use crate::config::ManualConfig;
use crate::safety::ElevationInhibit;

use super::{MotionDemand, TickContext};

/// Raw stick values closer to centre than this count as released.
const STICK_CENTRE: f64 = 1e-3;

/// Per-axis joystick shaping and speed ramp, in driver units (steps/s).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct StickChannel {
    filtered: f64,
    current_hz: f64,
}

impl StickChannel {
    fn step(&mut self, raw: f64, speed_fraction: f64, config: &ManualConfig, dt: f64) -> f64 {
        if raw.abs() < STICK_CENTRE {
            // Releasing the stick stops at once rather than decaying through the filter
            self.filtered = 0.0;
        } else {
            self.filtered =
                config.smoothing_alpha * raw + (1.0 - config.smoothing_alpha) * self.filtered;
        }

        let shaped = self.filtered.signum() * self.filtered.abs().powf(config.shaping_exponent);
        let mut target = shaped * speed_fraction * config.max_speed_hz;
        if target.abs() < config.deadband_hz {
            target = 0.0;
        }

        if target.abs() > self.current_hz.abs() {
            let max_change = config.max_accel_hz_per_sec * dt;
            self.current_hz += (target - self.current_hz).clamp(-max_change, max_change);
        } else {
            self.current_hz = target;
        }
        self.current_hz
    }
}

/// Operator joystick control.
///
/// Speeding up is ramped; slowing down, reversing toward zero and releasing
/// the stick take effect on the next tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualMode {
    config: ManualConfig,
    az: StickChannel,
    el: StickChannel,
}

impl ManualMode {
    pub fn new(config: ManualConfig) -> Self {
        Self {
            config,
            az: StickChannel::default(),
            el: StickChannel::default(),
        }
    }

    pub(super) fn enter(&mut self) -> u32 {
        self.az = StickChannel::default();
        self.el = StickChannel::default();
        self.config.acceleration
    }

    pub(super) fn exit(&mut self) {
        self.az = StickChannel::default();
        self.el = StickChannel::default();
    }

    /// Current ramped speeds (az, el) in steps/s.
    pub fn current_speed_hz(&self) -> (f64, f64) {
        (self.az.current_hz, self.el.current_hz)
    }

    pub(super) fn update(&mut self, ctx: &TickContext<'_>) -> MotionDemand {
        let snapshot = ctx.snapshot;
        let dt = ctx.config.dt_s();
        let speed_fraction = (snapshot.gimbal_speed_percent / 100.0).clamp(0.0, 1.0);

        let inhibit = ElevationInhibit::from_snapshot(snapshot, &ctx.config.elevation_limits);
        let el_input = inhibit.apply(snapshot.joystick_el);

        let az_hz = self
            .az
            .step(snapshot.joystick_az, speed_fraction, &self.config, dt);
        let el_hz = self.el.step(el_input, speed_fraction, &self.config, dt);

        let scaling = &ctx.config.scaling;
        MotionDemand::Velocity {
            az_dps: az_hz / scaling.az_steps_per_degree(),
            el_dps: el_hz / scaling.el_steps_per_degree(),
        }
    }
}
