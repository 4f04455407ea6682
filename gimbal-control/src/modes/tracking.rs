//! Closed-loop tracking of a target reported by the video tracker.
//!
//! Target updates arrive asynchronously through [`TargetUpdate`]. Each tick
//! the target position and velocity are smoothed independently, the position
//! error is fed to one PID per axis (derivative on measurement), and a fraction
//! of the target's own angular velocity is fed forward. Near zero error the
//! output is scaled down so the gimbal does not chatter on target.

use std::time::Instant;

use tracing::{debug, info};

use crate::angles::{normalize_azimuth_error, rate_limit, AzimuthUnwrapper};
use crate::config::TrackingConfig;
use crate::pid::{DerivativeSource, PidController};
use crate::servo::AxisCommand;

use super::{MotionDemand, TickContext};

/// Target position and angular velocity from the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TargetUpdate {
    pub az: f64,
    pub el: f64,
    /// deg/s
    pub vel_az: f64,
    /// deg/s
    pub vel_el: f64,
    pub valid: bool,
}

impl TargetUpdate {
    /// Marker for a lost target.
    pub fn invalid() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Smoothed {
    az: f64,
    el: f64,
    vel_az: f64,
    vel_el: f64,
}

/// Visual tracking mode.
#[derive(Debug, Clone)]
pub struct TrackingMode {
    config: TrackingConfig,
    az_pid: PidController,
    el_pid: PidController,
    target: TargetUpdate,
    smoothed: Smoothed,
    previous: AxisCommand,
    last_update: Option<Instant>,
    az_unwrapper: AzimuthUnwrapper,
    /// Set on a valid to invalid transition, until taken
    target_lost: bool,
}

impl TrackingMode {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            az_pid: PidController::new(config.az_gains),
            el_pid: PidController::new(config.el_gains),
            config,
            target: TargetUpdate::invalid(),
            smoothed: Smoothed::default(),
            previous: AxisCommand::ZERO,
            last_update: None,
            az_unwrapper: AzimuthUnwrapper::default(),
            target_lost: false,
        }
    }

    pub fn has_target(&self) -> bool {
        self.target.valid
    }

    /// Whether the target dropped out since the last call.
    pub fn take_target_lost(&mut self) -> bool {
        std::mem::take(&mut self.target_lost)
    }

    /// Command sent on the previous tick (deg/s).
    pub fn previous_command(&self) -> AxisCommand {
        self.previous
    }

    /// Output multiplier for an error of `abs_error_deg`.
    ///
    /// Rises quadratically from `min_scale` at zero error to 1.0 at the
    /// scaling threshold and stays at 1.0 beyond it.
    pub fn velocity_scale(&self, abs_error_deg: f64) -> f64 {
        let threshold = self.config.scaling_threshold_deg;
        if abs_error_deg < threshold {
            let ratio = abs_error_deg / threshold;
            self.config.min_scale + (1.0 - self.config.min_scale) * ratio * ratio
        } else {
            1.0
        }
    }

    pub(super) fn enter(&mut self) -> u32 {
        self.target = TargetUpdate::invalid();
        self.smoothed = Smoothed::default();
        self.target_lost = false;
        self.reset_loop();
        self.config.acceleration
    }

    pub(super) fn exit(&mut self) {
        self.target = TargetUpdate::invalid();
        self.reset_loop();
    }

    fn reset_loop(&mut self) {
        self.az_pid.reset();
        self.el_pid.reset();
        self.previous = AxisCommand::ZERO;
        self.last_update = None;
        self.az_unwrapper.reset();
    }

    /// Accept a new tracker report.
    pub fn on_target_update(&mut self, update: TargetUpdate) {
        if update.valid && !self.target.valid {
            info!(
                "Target acquired at az={:.2} el={:.2}",
                update.az, update.el
            );
            self.az_pid.reset();
            self.el_pid.reset();
            self.smoothed = Smoothed {
                az: update.az,
                el: update.el,
                vel_az: update.vel_az,
                vel_el: update.vel_el,
            };
        }

        if update.valid {
            self.target = update;
        } else {
            if self.target.valid {
                info!("Target lost, holding");
                self.target_lost = true;
            }
            self.target.valid = false;
            self.target.vel_az = 0.0;
            self.target.vel_el = 0.0;
            self.smoothed.vel_az = 0.0;
            self.smoothed.vel_el = 0.0;
            self.previous = AxisCommand::ZERO;
        }
    }

    pub(super) fn update(&mut self, ctx: &TickContext<'_>) -> MotionDemand {
        if !self.target.valid {
            self.previous = AxisCommand::ZERO;
            self.last_update = None;
            return MotionDemand::Hold;
        }
        let snapshot = ctx.snapshot;
        let Some(current_el) = snapshot.elevation(ctx.config.elevation_feedback) else {
            return MotionDemand::Hold;
        };

        let dt = self
            .last_update
            .map(|t| ctx.now.saturating_duration_since(t).as_secs_f64())
            .filter(|dt| *dt > 0.0)
            .unwrap_or_else(|| ctx.config.dt_s());
        self.last_update = Some(ctx.now);

        let pos_alpha = self.config.position_alpha;
        let vel_alpha = self.config.velocity_alpha;
        let sm = &mut self.smoothed;
        sm.az += pos_alpha * normalize_azimuth_error(self.target.az - sm.az);
        sm.el = pos_alpha * self.target.el + (1.0 - pos_alpha) * sm.el;
        sm.vel_az = vel_alpha * self.target.vel_az + (1.0 - vel_alpha) * sm.vel_az;
        sm.vel_el = vel_alpha * self.target.vel_el + (1.0 - vel_alpha) * sm.vel_el;

        let err_az = normalize_azimuth_error(sm.az - snapshot.gimbal_az);
        let err_el = sm.el - current_el;

        let az_measurement = self.az_unwrapper.unwrap(snapshot.gimbal_az);
        let ff = self.config.feedforward_gain;
        let az_raw = self
            .az_pid
            .compute(err_az, az_measurement, DerivativeSource::Measurement, dt)
            + ff * sm.vel_az;
        let el_raw = self
            .el_pid
            .compute(err_el, current_el, DerivativeSource::Measurement, dt)
            + ff * sm.vel_el;

        let az_out = az_raw * self.velocity_scale(err_az.abs());
        let el_out = el_raw * self.velocity_scale(err_el.abs());

        let limited = AxisCommand::new(az_out, el_out).clamped(self.config.max_velocity_dps);
        let step = self.config.velocity_change_limit_dps;
        let command = AxisCommand::new(
            rate_limit(limited.az_dps, self.previous.az_dps, step),
            rate_limit(limited.el_dps, self.previous.el_dps, step),
        );
        self.previous = command;

        debug!(
            "Tracking err=({:.3}, {:.3}) cmd=({:.3}, {:.3}) dt={:.3}",
            err_az, err_el, command.az_dps, command.el_dps, dt
        );
        MotionDemand::Velocity {
            az_dps: command.az_dps,
            el_dps: command.el_dps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GimbalConfig;
    use crate::state::SystemStateSnapshot;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn target(az: f64, el: f64) -> TargetUpdate {
        TargetUpdate {
            az,
            el,
            vel_az: 0.0,
            vel_el: 0.0,
            valid: true,
        }
    }

    fn velocity(demand: MotionDemand) -> (f64, f64) {
        match demand {
            MotionDemand::Velocity { az_dps, el_dps } => (az_dps, el_dps),
            other => panic!("expected velocity, got {other:?}"),
        }
    }

    #[test]
    fn test_velocity_scale_endpoints() {
        let mode = TrackingMode::new(TrackingConfig::default());
        assert_relative_eq!(mode.velocity_scale(0.0), 0.3);
        assert_relative_eq!(mode.velocity_scale(1.0), 0.3 + 0.7 * 0.25);
        assert_relative_eq!(mode.velocity_scale(2.0), 1.0);
        assert_relative_eq!(mode.velocity_scale(45.0), 1.0);
    }

    #[test]
    fn test_no_target_holds() {
        let config = GimbalConfig::default();
        let mut mode = TrackingMode::new(config.tracking);
        mode.enter();
        let snapshot = SystemStateSnapshot::default();
        let ctx = TickContext {
            snapshot: &snapshot,
            config: &config,
            now: Instant::now(),
        };
        assert_eq!(mode.update(&ctx), MotionDemand::Hold);
    }

    #[test]
    fn test_acquisition_snaps_smoothing() {
        let config = GimbalConfig::default();
        let mut mode = TrackingMode::new(config.tracking);
        mode.enter();
        mode.on_target_update(target(15.0, 0.0));

        let snapshot = SystemStateSnapshot {
            gimbal_az: 10.0,
            ..Default::default()
        };
        let ctx = TickContext {
            snapshot: &snapshot,
            config: &config,
            now: Instant::now(),
        };
        let (az, el) = velocity(mode.update(&ctx));

        // Smoothed target starts at the target itself, so error is the full 5 degrees
        let expected = 0.15 * 5.0 + 0.005 * 5.0 * 0.05;
        assert_relative_eq!(az, expected, epsilon = 1e-12);
        assert_relative_eq!(el, 0.0);
    }

    #[test]
    fn test_output_clamped_and_rate_limited() {
        let config = GimbalConfig::default();
        let mut mode = TrackingMode::new(config.tracking);
        mode.enter();
        mode.on_target_update(TargetUpdate {
            vel_az: 100.0,
            ..target(90.0, 0.0)
        });

        let snapshot = SystemStateSnapshot::default();
        let t0 = Instant::now();
        let mut previous = 0.0;
        for i in 0..10 {
            let ctx = TickContext {
                snapshot: &snapshot,
                config: &config,
                now: t0 + Duration::from_millis(50 * i),
            };
            let (az, _) = velocity(mode.update(&ctx));
            assert!(az - previous <= 5.0 + 1e-9);
            assert!(az <= 15.0);
            previous = az;
        }
        assert_relative_eq!(previous, 15.0);
    }

    #[test]
    fn test_target_loss_clears_velocity_state() {
        let config = GimbalConfig::default();
        let mut mode = TrackingMode::new(config.tracking);
        mode.enter();
        mode.on_target_update(TargetUpdate {
            vel_az: 3.0,
            ..target(20.0, 0.0)
        });
        let snapshot = SystemStateSnapshot::default();
        let ctx = TickContext {
            snapshot: &snapshot,
            config: &config,
            now: Instant::now(),
        };
        mode.update(&ctx);
        assert!(mode.previous_command().az_dps > 0.0);

        assert!(!mode.take_target_lost());
        mode.on_target_update(TargetUpdate::invalid());
        assert!(!mode.has_target());
        assert_eq!(mode.previous_command(), AxisCommand::ZERO);
        assert_eq!(mode.update(&ctx), MotionDemand::Hold);

        // Reported on the edge only
        assert!(mode.take_target_lost());
        mode.on_target_update(TargetUpdate::invalid());
        assert!(!mode.take_target_lost());
    }

    #[test]
    fn test_azimuth_error_takes_short_way_round() {
        let config = GimbalConfig::default();
        let mut mode = TrackingMode::new(config.tracking);
        mode.enter();
        mode.on_target_update(target(2.0, 0.0));
        let snapshot = SystemStateSnapshot {
            gimbal_az: 358.0,
            ..Default::default()
        };
        let ctx = TickContext {
            snapshot: &snapshot,
            config: &config,
            now: Instant::now(),
        };
        let (az, _) = velocity(mode.update(&ctx));
        assert!(az > 0.0);
        assert!(az < 1.0);
    }

    #[test]
    fn test_lost_imu_holds() {
        let config = GimbalConfig::default();
        let mut mode = TrackingMode::new(config.tracking);
        mode.enter();
        mode.on_target_update(target(20.0, 0.0));
        let snapshot = SystemStateSnapshot {
            imu_connected: false,
            ..Default::default()
        };
        let ctx = TickContext {
            snapshot: &snapshot,
            config: &config,
            now: Instant::now(),
        };
        assert_eq!(mode.update(&ctx), MotionDemand::Hold);
    }
}
