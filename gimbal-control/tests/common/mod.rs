//! Shared rig for the integration tests: a controller wired to simulated
//! devices plus a minimal plant that integrates the commanded speeds.

#![allow(dead_code)]

use std::time::Instant;

use gimbal_control::angles::normalize_azimuth;
use gimbal_control::state::{AutoSectorScanZone, TargetReferencePoint};
use gimbal_control::{GimbalConfig, GimbalController, MotionModeKind, SystemStateSnapshot};
use hardware::mock::{SimulatedAxis, SimulatedPlc};
use hardware::Interlocks;

pub struct Bench {
    pub controller: GimbalController,
    pub az: SimulatedAxis,
    pub el: SimulatedAxis,
    pub plc: SimulatedPlc,
    pub snapshot: SystemStateSnapshot,
    pub config: GimbalConfig,
    pub now: Instant,
}

impl Bench {
    pub fn new() -> Self {
        Self::with_config(GimbalConfig::default())
    }

    pub fn with_config(config: GimbalConfig) -> Self {
        let az = SimulatedAxis::new();
        let el = SimulatedAxis::new();
        let plc = SimulatedPlc::new();
        let controller = GimbalController::new(
            config.clone(),
            Box::new(az.clone()),
            Box::new(el.clone()),
            Box::new(plc.clone()),
        );
        Self {
            controller,
            az,
            el,
            plc,
            snapshot: ready_snapshot(),
            config,
            now: Instant::now(),
        }
    }

    /// Select `kind` in the snapshot and publish the change.
    pub fn select(&mut self, kind: MotionModeKind) {
        self.snapshot.motion_mode = kind;
        self.controller.on_state_changed(&self.snapshot);
    }

    /// One control tick, then advance the clock by a tick period.
    pub fn tick(&mut self) {
        self.controller.tick(&self.snapshot, self.now);
        self.now += self.config.tick_period();
    }

    /// Integrate the commanded speeds over one tick and feed the angles back.
    pub fn advance_plant(&mut self) {
        let dt = self.config.dt_s();
        self.az.advance(dt);
        self.el.advance(dt);

        let scaling = &self.config.scaling;
        let az = normalize_azimuth(self.az.position_steps() / scaling.az_steps_per_degree());
        let mut el = self.el.position_steps() / scaling.el_steps_per_degree();
        if scaling.invert_elevation {
            el = -el;
        }
        self.snapshot.gimbal_az = az;
        self.snapshot.gimbal_el = el;
        self.snapshot.imu.pitch_deg = el;
    }

    /// Put the simulated mount at `az_deg`.
    pub fn place_azimuth(&mut self, az_deg: f64) {
        self.az
            .set_position_steps(az_deg * self.config.scaling.az_steps_per_degree());
        self.snapshot.gimbal_az = az_deg;
    }
}

/// Station enabled, dead-man held, gimbal level inside the soft limits.
pub fn ready_snapshot() -> SystemStateSnapshot {
    SystemStateSnapshot {
        interlocks: Interlocks {
            station_enabled: true,
            dead_man_switch: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn sector_zone(id: u32, enabled: bool, az1: f64, az2: f64) -> AutoSectorScanZone {
    AutoSectorScanZone {
        id,
        enabled,
        az1,
        el1: 0.0,
        az2,
        el2: 0.0,
        scan_speed: 20.0,
    }
}

pub fn trp(id: u32, page: u32, index: u32, azimuth: f64, elevation: f64) -> TargetReferencePoint {
    TargetReferencePoint {
        id,
        page,
        index_in_page: index,
        azimuth,
        elevation,
        halt_time_s: 1.0,
    }
}

/// Snapshot carrying one enabled scan zone (id 1) and one TRP page (page 1).
pub fn snapshot_with_mode_data() -> SystemStateSnapshot {
    SystemStateSnapshot {
        active_sector_scan_zone_id: 1,
        active_trp_page: 1,
        sector_scan_zones: vec![sector_zone(1, true, 10.0, 40.0)],
        target_reference_points: vec![trp(1, 1, 0, 20.0, 0.0), trp(2, 1, 1, 30.0, 0.0)],
        ..ready_snapshot()
    }
}
