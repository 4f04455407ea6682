//! Slew to a radar plot selected by the operator.

use tracing::{debug, info, warn};

use crate::angles::{normalize_azimuth, normalize_azimuth_error, rate_limit};
use crate::config::RadarSlewConfig;
use crate::servo::AxisCommand;
use crate::state::RadarPlot;

use super::profile::{Approach, AxisPids};
use super::{MotionDemand, TickContext};

/// Where the slew state machine is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlewState {
    /// Holding position until a new track is selected (also the post-arrival state)
    AwaitingCommand,
    SlewInProgress {
        track_id: u32,
        target_az: f64,
        target_el: f64,
    },
}

#[derive(Debug, Clone)]
pub struct RadarSlewMode {
    config: RadarSlewConfig,
    pids: AxisPids,
    state: SlewState,
    /// Track the mode has adopted; 0 when none
    current_track: u32,
    /// Last id reported missing, to avoid repeating the warning every tick
    missing_track: Option<u32>,
    previous: AxisCommand,
    /// Set when a selected track could not be found, until taken
    target_lost: bool,
}

impl RadarSlewMode {
    pub fn new(config: RadarSlewConfig) -> Self {
        Self {
            pids: AxisPids::new(config.gains),
            config,
            state: SlewState::AwaitingCommand,
            current_track: 0,
            missing_track: None,
            previous: AxisCommand::ZERO,
            target_lost: false,
        }
    }

    pub fn state(&self) -> SlewState {
        self.state
    }

    /// Accumulated PID integrals (az, el).
    pub fn pid_integrals(&self) -> (f64, f64) {
        self.pids.integrals()
    }

    /// Whether a slew was aborted for a missing plot since the last call.
    pub fn take_target_lost(&mut self) -> bool {
        std::mem::take(&mut self.target_lost)
    }

    /// Elevation that points at a plot at `range_m` from a sensor mounted
    /// `height_m` above it.
    pub fn elevation_for_range(range_m: f64, height_m: f64) -> f64 {
        (-height_m).atan2(range_m).to_degrees()
    }

    pub(super) fn enter(&mut self) -> u32 {
        self.state = SlewState::AwaitingCommand;
        self.current_track = 0;
        self.missing_track = None;
        self.previous = AxisCommand::ZERO;
        self.target_lost = false;
        self.pids.reset();
        self.config.acceleration
    }

    pub(super) fn exit(&mut self) {
        self.state = SlewState::AwaitingCommand;
        self.current_track = 0;
        self.previous = AxisCommand::ZERO;
    }

    fn retarget(&mut self, track_id: u32, plot: Option<&RadarPlot>) {
        self.pids.reset();
        self.previous = AxisCommand::ZERO;

        match plot {
            Some(plot) => {
                let target_az = normalize_azimuth(plot.azimuth);
                let target_el =
                    Self::elevation_for_range(plot.range_m, self.config.system_height_m);
                info!(
                    "Slewing to radar track {track_id}: az={target_az:.2} el={target_el:.2} range={:.0} m",
                    plot.range_m
                );
                self.current_track = track_id;
                self.missing_track = None;
                self.state = SlewState::SlewInProgress {
                    track_id,
                    target_az,
                    target_el,
                };
            }
            None => {
                if self.missing_track != Some(track_id) {
                    warn!("Radar track {track_id} not found, slew aborted");
                    self.missing_track = Some(track_id);
                    self.target_lost = true;
                }
                self.current_track = 0;
                self.state = SlewState::AwaitingCommand;
            }
        }
    }

    pub(super) fn update(&mut self, ctx: &TickContext<'_>) -> MotionDemand {
        let snapshot = ctx.snapshot;
        let selected = snapshot.selected_radar_track_id;
        if selected != 0 && selected != self.current_track {
            self.retarget(selected, snapshot.find_radar_plot(selected));
        }

        let SlewState::SlewInProgress {
            track_id,
            target_az,
            target_el,
        } = self.state
        else {
            return MotionDemand::Hold;
        };
        let Some(current_el) = snapshot.elevation(ctx.config.elevation_feedback) else {
            return MotionDemand::Hold;
        };

        let err_az = normalize_azimuth_error(target_az - snapshot.gimbal_az);
        let err_el = target_el - current_el;

        let arrival = self.config.arrival_threshold_deg;
        if err_az.abs() < arrival && err_el.abs() < arrival {
            info!("Arrived at radar track {track_id}");
            self.state = SlewState::AwaitingCommand;
            self.previous = AxisCommand::ZERO;
            return MotionDemand::Hold;
        }

        let approach = Approach {
            cruise_speed_dps: self.config.cruise_speed_dps,
            deceleration_distance_deg: self.config.deceleration_distance_deg,
        };
        let (az, el) = approach.velocity(err_az, err_el, &mut self.pids, ctx.config.dt_s());

        let limited = AxisCommand::new(az, el).clamped(self.config.max_speed_dps);
        let step = self.config.velocity_change_limit_dps;
        let command = AxisCommand::new(
            rate_limit(limited.az_dps, self.previous.az_dps, step),
            rate_limit(limited.el_dps, self.previous.el_dps, step),
        );
        self.previous = command;

        debug!(
            "Slew err=({err_az:.3}, {err_el:.3}) cmd=({:.3}, {:.3})",
            command.az_dps, command.el_dps
        );
        MotionDemand::Velocity {
            az_dps: command.az_dps,
            el_dps: command.el_dps,
        }
    }
}
