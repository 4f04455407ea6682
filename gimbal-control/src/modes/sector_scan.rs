//! Back-and-forth sweep between the two endpoints of a sector-scan zone.

use tracing::debug;

use crate::angles::normalize_azimuth_error;
use crate::config::SectorScanConfig;
use crate::state::AutoSectorScanZone;

use super::profile::{Approach, AxisPids};
use super::{MotionDemand, TickContext};

#[derive(Debug, Clone)]
pub struct SectorScanMode {
    config: SectorScanConfig,
    zone: AutoSectorScanZone,
    pids: AxisPids,
    moving_to_point2: bool,
}

impl SectorScanMode {
    /// The caller has already checked that `zone` is enabled.
    pub fn new(config: SectorScanConfig, zone: AutoSectorScanZone) -> Self {
        Self {
            pids: AxisPids::new(config.gains),
            config,
            zone,
            moving_to_point2: true,
        }
    }

    pub fn zone(&self) -> &AutoSectorScanZone {
        &self.zone
    }

    pub fn is_moving_to_point2(&self) -> bool {
        self.moving_to_point2
    }

    fn target(&self) -> (f64, f64) {
        if self.moving_to_point2 {
            (self.zone.az2, self.zone.el2)
        } else {
            (self.zone.az1, self.zone.el1)
        }
    }

    pub(super) fn enter(&mut self) -> u32 {
        self.pids.reset();
        self.moving_to_point2 = true;
        self.config.acceleration
    }

    pub(super) fn exit(&mut self) {
        self.moving_to_point2 = true;
    }

    pub(super) fn update(&mut self, ctx: &TickContext<'_>) -> MotionDemand {
        let snapshot = ctx.snapshot;
        let Some(current_el) = snapshot.elevation(ctx.config.elevation_feedback) else {
            return MotionDemand::Hold;
        };

        let errors = |target: (f64, f64)| {
            (
                normalize_azimuth_error(target.0 - snapshot.gimbal_az),
                target.1 - current_el,
            )
        };
        let (mut err_az, mut err_el) = errors(self.target());

        if err_az.hypot(err_el) < self.config.arrival_threshold_deg {
            self.moving_to_point2 = !self.moving_to_point2;
            self.pids.reset();
            debug!(
                "Sector scan zone {} reversing towards point {}",
                self.zone.id,
                if self.moving_to_point2 { 2 } else { 1 }
            );
            (err_az, err_el) = errors(self.target());
        }

        let approach = Approach {
            cruise_speed_dps: self.zone.scan_speed * self.config.scan_speed_scale,
            deceleration_distance_deg: self.config.deceleration_distance_deg,
        };
        let (az_dps, el_dps) = approach.velocity(err_az, err_el, &mut self.pids, ctx.config.dt_s());
        MotionDemand::Velocity { az_dps, el_dps }
    }
}
