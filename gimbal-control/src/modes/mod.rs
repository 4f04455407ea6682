//! Motion modes and the lifecycle they share.
//!
//! Exactly one [`MotionMode`] is alive at a time. A mode never touches the
//! hardware: each tick it turns the snapshot into a [`MotionDemand`], and the
//! controller owns stabilization, limits and the servo writes.
//!
//! Lifecycle, driven by the controller:
//!
//! ```text
//! build(kind) ──► enter() ──► update() … update() ──► exit()
//!     │
//!     └─ missing/disabled zone or empty TRP page ──► Idle
//! ```

pub mod manual;
pub mod profile;
pub mod radar_slew;
pub mod sector_scan;
pub mod tracking;
pub mod trp_scan;

use std::time::Instant;

use crate::config::GimbalConfig;
use crate::error::{GimbalError, GimbalResult};
use crate::state::{MotionModeKind, SystemStateSnapshot};

pub use manual::ManualMode;
pub use radar_slew::{RadarSlewMode, SlewState};
pub use sector_scan::SectorScanMode;
pub use tracking::{TargetUpdate, TrackingMode};
pub use trp_scan::{TrpScanMode, TrpState};

/// Read-only inputs to one mode update.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub snapshot: &'a SystemStateSnapshot,
    pub config: &'a GimbalConfig,
    pub now: Instant,
}

/// What a mode asks of the axes for this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionDemand {
    /// World-frame velocity in deg/s, to be stabilized and sent
    Velocity { az_dps: f64, el_dps: f64 },
    /// Keep the aim point fixed in the world (stabilized zero velocity)
    Hold,
    /// Leave the axes alone
    Idle,
}

/// Mode-specific input delivered from outside the tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModeInput {
    Target(TargetUpdate),
}

/// The active motion mode.
#[derive(Debug, Clone)]
pub enum MotionMode {
    Idle,
    Manual(ManualMode),
    Tracking(TrackingMode),
    RadarSlew(RadarSlewMode),
    AutoSectorScan(SectorScanMode),
    TrpScan(TrpScanMode),
}

impl MotionMode {
    /// Construct the mode for `kind` from the data in `snapshot`.
    ///
    /// # Errors
    /// [`GimbalError::ConfigurationMissing`] when AutoSectorScan has no enabled
    /// zone with the active id, or TRPScan's active page holds no points.
    pub fn build(
        kind: MotionModeKind,
        snapshot: &SystemStateSnapshot,
        config: &GimbalConfig,
    ) -> GimbalResult<Self> {
        let mode = match kind {
            MotionModeKind::Idle => MotionMode::Idle,
            MotionModeKind::Manual => MotionMode::Manual(ManualMode::new(config.manual)),
            MotionModeKind::AutoTrack | MotionModeKind::ManualTrack => {
                MotionMode::Tracking(TrackingMode::new(config.tracking))
            }
            MotionModeKind::RadarSlew => {
                MotionMode::RadarSlew(RadarSlewMode::new(config.radar_slew))
            }
            MotionModeKind::AutoSectorScan => {
                let id = snapshot.active_sector_scan_zone_id;
                let zone = match snapshot.find_sector_scan_zone(id) {
                    Some(zone) if zone.enabled => zone.clone(),
                    Some(_) => {
                        return Err(GimbalError::ConfigurationMissing {
                            mode: kind,
                            reason: format!("sector scan zone {id} is disabled"),
                        })
                    }
                    None => {
                        return Err(GimbalError::ConfigurationMissing {
                            mode: kind,
                            reason: format!("no sector scan zone with id {id}"),
                        })
                    }
                };
                MotionMode::AutoSectorScan(SectorScanMode::new(config.sector_scan, zone))
            }
            MotionModeKind::TrpScan => {
                let page = snapshot.active_trp_page;
                let points = snapshot.trp_page(page);
                if points.is_empty() {
                    return Err(GimbalError::ConfigurationMissing {
                        mode: kind,
                        reason: format!("TRP page {page} is empty"),
                    });
                }
                MotionMode::TrpScan(TrpScanMode::new(config.trp_scan, page, points))
            }
        };
        Ok(mode)
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            MotionMode::Idle => "Idle",
            MotionMode::Manual(_) => "Manual",
            MotionMode::Tracking(_) => "Tracking",
            MotionMode::RadarSlew(_) => "RadarSlew",
            MotionMode::AutoSectorScan(_) => "AutoSectorScan",
            MotionMode::TrpScan(_) => "TRPScan",
        }
    }

    /// Reset mode state for a fresh start.
    ///
    /// Returns the acceleration profile (steps/s²) the axes should use, if
    /// the mode has one.
    pub fn enter(&mut self) -> Option<u32> {
        match self {
            MotionMode::Idle => None,
            MotionMode::Manual(m) => Some(m.enter()),
            MotionMode::Tracking(m) => Some(m.enter()),
            MotionMode::RadarSlew(m) => Some(m.enter()),
            MotionMode::AutoSectorScan(m) => Some(m.enter()),
            MotionMode::TrpScan(m) => Some(m.enter()),
        }
    }

    /// Drop mode-local progress. The controller stops the axes.
    pub fn exit(&mut self) {
        match self {
            MotionMode::Idle => {}
            MotionMode::Manual(m) => m.exit(),
            MotionMode::Tracking(m) => m.exit(),
            MotionMode::RadarSlew(m) => m.exit(),
            MotionMode::AutoSectorScan(m) => m.exit(),
            MotionMode::TrpScan(m) => m.exit(),
        }
    }

    /// Compute this tick's demand.
    pub fn update(&mut self, ctx: &TickContext<'_>) -> MotionDemand {
        match self {
            MotionMode::Idle => MotionDemand::Idle,
            MotionMode::Manual(m) => m.update(ctx),
            MotionMode::Tracking(m) => m.update(ctx),
            MotionMode::RadarSlew(m) => m.update(ctx),
            MotionMode::AutoSectorScan(m) => m.update(ctx),
            MotionMode::TrpScan(m) => m.update(ctx),
        }
    }

    /// Whether the mode lost its target since the last call.
    pub fn take_target_lost(&mut self) -> bool {
        match self {
            MotionMode::Tracking(m) => m.take_target_lost(),
            MotionMode::RadarSlew(m) => m.take_target_lost(),
            _ => false,
        }
    }

    /// Route an external input to the mode that understands it.
    ///
    /// Returns `false` when the active mode has no use for the input.
    pub fn handle_input(&mut self, input: ModeInput) -> bool {
        match (self, input) {
            (MotionMode::Tracking(m), ModeInput::Target(update)) => {
                m.on_target_update(update);
                true
            }
            _ => false,
        }
    }
}
