//! Tour of a page of target reference points with a dwell at each.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::angles::normalize_azimuth_error;
use crate::config::TrpScanConfig;
use crate::state::TargetReferencePoint;

use super::profile::{Approach, AxisPids};
use super::{MotionDemand, TickContext};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrpState {
    /// Constructed but not entered
    Idle,
    Moving,
    Halted { since: Instant },
}

#[derive(Debug, Clone)]
pub struct TrpScanMode {
    config: TrpScanConfig,
    page: u32,
    points: Vec<TargetReferencePoint>,
    index: usize,
    state: TrpState,
    pids: AxisPids,
}

impl TrpScanMode {
    /// The caller has already checked that `points` is not empty.
    pub fn new(config: TrpScanConfig, page: u32, points: Vec<TargetReferencePoint>) -> Self {
        Self {
            pids: AxisPids::new(config.gains),
            config,
            page,
            points,
            index: 0,
            state: TrpState::Idle,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn state(&self) -> TrpState {
        self.state
    }

    /// Waypoint currently being approached or dwelt at.
    pub fn current_point(&self) -> Option<&TargetReferencePoint> {
        self.points.get(self.index)
    }

    pub(super) fn enter(&mut self) -> u32 {
        self.index = 0;
        self.state = if self.points.is_empty() {
            TrpState::Idle
        } else {
            TrpState::Moving
        };
        self.pids.reset();
        self.config.acceleration
    }

    pub(super) fn exit(&mut self) {
        self.state = TrpState::Idle;
    }

    pub(super) fn update(&mut self, ctx: &TickContext<'_>) -> MotionDemand {
        let Some(point) = self.points.get(self.index).cloned() else {
            return MotionDemand::Hold;
        };

        match self.state {
            TrpState::Idle => MotionDemand::Hold,
            TrpState::Halted { since } => {
                let halt = Duration::from_secs_f64(point.halt_time_s.max(0.0));
                if ctx.now.saturating_duration_since(since) >= halt {
                    self.index = (self.index + 1) % self.points.len();
                    self.state = TrpState::Moving;
                    self.pids.reset();
                    debug!("TRP page {} heading to point {}", self.page, self.index);
                }
                MotionDemand::Hold
            }
            TrpState::Moving => {
                let snapshot = ctx.snapshot;
                let Some(current_el) = snapshot.elevation(ctx.config.elevation_feedback) else {
                    return MotionDemand::Hold;
                };
                let err_az = normalize_azimuth_error(point.azimuth - snapshot.gimbal_az);
                let err_el = point.elevation - current_el;

                if err_az.hypot(err_el) < self.config.arrival_threshold_deg {
                    info!(
                        "TRP {} reached (page {}, halting {:.1} s)",
                        point.id, self.page, point.halt_time_s
                    );
                    self.state = TrpState::Halted { since: ctx.now };
                    return MotionDemand::Hold;
                }

                let approach = Approach {
                    cruise_speed_dps: self.config.travel_speed_dps,
                    deceleration_distance_deg: self.config.deceleration_distance_deg,
                };
                let (az_dps, el_dps) =
                    approach.velocity(err_az, err_el, &mut self.pids, ctx.config.dt_s());
                MotionDemand::Velocity { az_dps, el_dps }
            }
        }
    }
}
