//! The gimbal controller: single owner of the active motion mode.
//!
//! # Tick ordering
//!
//! Every call to [`GimbalController::tick`] runs, in order:
//!
//! 1. the second edge of a pending alarm-reset pulse, if due
//! 2. gyro-bias learning from the snapshot
//! 3. the safety gate; on failure both axes stop and the mode is skipped
//! 4. the active mode's update
//! 5. stabilization, the global velocity clamp, the elevation inhibit and
//!    the servo write
//!
//! Snapshot changes are handled separately in
//! [`GimbalController::on_state_changed`], which performs mode switches and
//! rebuilds, feeds the tracker and re-derives the no-traverse-zone flag.

use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use hardware::{AxisAlarm, AxisId, Plc};
use tracing::{debug, info, trace, warn};

use crate::angles::{angular_offset_from_pixels, normalize_azimuth};
use crate::config::GimbalConfig;
use crate::error::GimbalError;
use crate::modes::{ModeInput, MotionDemand, MotionMode, TargetUpdate, TickContext};
use crate::safety::{ElevationInhibit, SafetyGate};
use crate::servo::{AxisCommand, BoxedAxis, GimbalAxes};
use crate::stabilization::Stabilizer;
use crate::state::{MotionModeKind, SystemStateSnapshot};
use crate::store::StateStore;
use crate::zones::{is_point_in_no_fire_zone, is_point_in_no_traverse_zone};

/// Notification published by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum GimbalEvent {
    ModeChanged {
        from: MotionModeKind,
        to: MotionModeKind,
    },
    AlarmDetected {
        axis: AxisId,
        alarm: AxisAlarm,
    },
    AlarmCleared {
        axis: AxisId,
    },
    /// Edge-triggered report of a condition the tick turned into a stop or hold
    Fault(GimbalError),
}

const AXES: [AxisId; 2] = [AxisId::Azimuth, AxisId::Elevation];

fn axis_index(axis: AxisId) -> usize {
    match axis {
        AxisId::Azimuth => 0,
        AxisId::Elevation => 1,
    }
}

/// Converts the tracker's pixel report into an absolute target.
fn target_from_tracker(snapshot: &SystemStateSnapshot, current_el: f64) -> TargetUpdate {
    let tracker = &snapshot.tracker;
    if !tracker.has_valid_target {
        return TargetUpdate::invalid();
    }

    let camera = &snapshot.camera;
    let hfov = camera.active_hfov_deg();
    let (cx, cy) = camera.centre_px();
    let (off_az, off_el) = angular_offset_from_pixels(
        tracker.target_x_px - cx,
        tracker.target_y_px - cy,
        hfov,
        camera.image_width_px,
        camera.image_height_px,
    );
    let (vel_az, vel_el) = angular_offset_from_pixels(
        tracker.velocity_x_px_s,
        tracker.velocity_y_px_s,
        hfov,
        camera.image_width_px,
        camera.image_height_px,
    );

    TargetUpdate {
        az: normalize_azimuth(snapshot.gimbal_az + off_az),
        el: current_el + off_el,
        vel_az,
        vel_el,
        valid: true,
    }
}

pub struct GimbalController {
    config: GimbalConfig,
    axes: GimbalAxes,
    plc: Box<dyn Plc + Send>,
    stabilizer: Stabilizer,
    safety: SafetyGate,
    mode: MotionMode,
    mode_kind: MotionModeKind,
    previous_snapshot: Option<SystemStateSnapshot>,
    store: Option<StateStore>,
    subscribers: Vec<Sender<GimbalEvent>>,
    alarms: [Option<AxisAlarm>; 2],
    /// When the alarm-reset line goes back high
    pending_reset: Option<Instant>,
    reticle_in_ntz: bool,
    reticle_in_nfz: bool,
    imu_lost: bool,
    last_command: AxisCommand,
}

impl GimbalController {
    /// Build a controller in Idle around the injected devices.
    pub fn new(
        config: GimbalConfig,
        az: BoxedAxis,
        el: BoxedAxis,
        plc: Box<dyn Plc + Send>,
    ) -> Self {
        let axes = GimbalAxes::new(az, el, config.scaling, config.max_acceleration);
        let stabilizer = Stabilizer::new(config.stabilization);
        Self {
            config,
            axes,
            plc,
            stabilizer,
            safety: SafetyGate::new(),
            mode: MotionMode::Idle,
            mode_kind: MotionModeKind::Idle,
            previous_snapshot: None,
            store: None,
            subscribers: Vec::new(),
            alarms: [None, None],
            pending_reset: None,
            reticle_in_ntz: false,
            reticle_in_nfz: false,
            imu_lost: false,
            last_command: AxisCommand::ZERO,
        }
    }

    /// Push derived flags back through `store`.
    pub fn with_state_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the default stabilizer (e.g. to select another transform).
    pub fn with_stabilizer(mut self, stabilizer: Stabilizer) -> Self {
        self.stabilizer = stabilizer;
        self
    }

    pub fn config(&self) -> &GimbalConfig {
        &self.config
    }

    pub fn mode_kind(&self) -> MotionModeKind {
        self.mode_kind
    }

    pub fn mode(&self) -> &MotionMode {
        &self.mode
    }

    /// Axis-frame command written on the most recent tick.
    pub fn last_command(&self) -> AxisCommand {
        self.last_command
    }

    pub fn stabilizer(&self) -> &Stabilizer {
        &self.stabilizer
    }

    pub fn reticle_in_no_traverse_zone(&self) -> bool {
        self.reticle_in_ntz
    }

    /// Whether the line of sight points into an enabled no-fire zone.
    pub fn reticle_in_no_fire_zone(&self) -> bool {
        self.reticle_in_nfz
    }

    /// Alarm last seen on `axis`.
    pub fn alarm(&self, axis: AxisId) -> Option<&AxisAlarm> {
        self.alarms[axis_index(axis)].as_ref()
    }

    /// Receive every event published from now on.
    pub fn subscribe_events(&mut self) -> Receiver<GimbalEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: GimbalEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn publish_faults(&mut self) {
        for e in self.axes.take_faults() {
            self.emit(GimbalEvent::Fault(GimbalError::Axis(e)));
        }
        if self.mode.take_target_lost() {
            self.emit(GimbalEvent::Fault(GimbalError::TargetLost));
        }
    }

    /// Switch to `kind`, always running exit → stop → build → enter.
    ///
    /// A mode whose zone or waypoint data is missing is replaced by Idle.
    /// Returns the kind actually active afterwards.
    pub fn set_motion_mode(
        &mut self,
        kind: MotionModeKind,
        snapshot: &SystemStateSnapshot,
    ) -> MotionModeKind {
        let from = self.mode_kind;

        self.mode.exit();
        self.axes.stop();
        self.last_command = AxisCommand::ZERO;

        let (mut mode, to) = match MotionMode::build(kind, snapshot, &self.config) {
            Ok(mode) => (mode, kind),
            Err(e) => {
                warn!("{e}, falling back to Idle");
                self.emit(GimbalEvent::Fault(e));
                (MotionMode::Idle, MotionModeKind::Idle)
            }
        };

        if let Some(accel) = mode.enter() {
            self.axes.set_acceleration(accel);
        }
        self.mode = mode;
        self.mode_kind = to;

        info!("Motion mode {from} -> {to}");
        self.emit(GimbalEvent::ModeChanged { from, to });
        self.publish_faults();
        to
    }

    /// Deliver a mode-specific input. Returns whether the active mode used it.
    pub fn deliver(&mut self, input: ModeInput) -> bool {
        let handled = self.mode.handle_input(input);
        if !handled {
            trace!("{} ignored {input:?}", self.mode.name());
        }
        self.publish_faults();
        handled
    }

    /// React to one published snapshot change.
    pub fn on_state_changed(&mut self, snapshot: &SystemStateSnapshot) {
        let previous = self.previous_snapshot.take();
        let previous_kind = previous
            .as_ref()
            .map_or(self.mode_kind, |p| p.motion_mode);

        if snapshot.motion_mode != previous_kind {
            self.set_motion_mode(snapshot.motion_mode, snapshot);
        } else if let Some(previous) = &previous {
            let rebuild = match snapshot.motion_mode {
                MotionModeKind::AutoSectorScan => {
                    previous.active_sector_scan_zone_id != snapshot.active_sector_scan_zone_id
                }
                MotionModeKind::TrpScan => previous.active_trp_page != snapshot.active_trp_page,
                _ => false,
            };
            if rebuild {
                debug!("Active {} data changed, rebuilding mode", snapshot.motion_mode);
                self.set_motion_mode(snapshot.motion_mode, snapshot);
            }
        }

        if self.mode_kind.is_tracking() {
            let current_el = snapshot
                .elevation(self.config.elevation_feedback)
                .unwrap_or(snapshot.gimbal_el);
            let update = target_from_tracker(snapshot, current_el);
            self.deliver(ModeInput::Target(update));
        }

        let inside =
            is_point_in_no_traverse_zone(&snapshot.area_zones, snapshot.gimbal_az, snapshot.gimbal_el);
        if inside != self.reticle_in_ntz {
            debug!("Reticle in no-traverse zone: {inside}");
            self.reticle_in_ntz = inside;
        }
        if inside != snapshot.reticle_in_no_traverse_zone {
            if let Some(store) = &self.store {
                store.set_reticle_in_no_traverse_zone(inside);
            }
        }

        let no_fire =
            is_point_in_no_fire_zone(&snapshot.area_zones, snapshot.gimbal_az, snapshot.gimbal_el, None);
        if no_fire != self.reticle_in_nfz {
            debug!("Reticle in no-fire zone: {no_fire}");
            self.reticle_in_nfz = no_fire;
        }

        self.previous_snapshot = Some(snapshot.clone());
    }

    /// Run one control tick against `snapshot`.
    pub fn tick(&mut self, snapshot: &SystemStateSnapshot, now: Instant) {
        self.run_tick(snapshot, now);
        self.publish_faults();
    }

    fn run_tick(&mut self, snapshot: &SystemStateSnapshot, now: Instant) {
        self.service_alarm_reset(now);
        self.stabilizer.update_gyro_bias(snapshot, now);
        self.watch_imu_link(snapshot);

        let previous_fault = self.safety.active_fault();
        let inhibit =
            match self
                .safety
                .check(snapshot, self.mode_kind, &self.config.elevation_limits)
            {
                Ok(inhibit) => inhibit,
                Err(fault) => {
                    self.axes.stop();
                    self.last_command = AxisCommand::ZERO;
                    if previous_fault != Some(fault) {
                        self.emit(GimbalEvent::Fault(GimbalError::SafetyViolation(fault)));
                    }
                    return;
                }
            };

        let ctx = TickContext {
            snapshot,
            config: &self.config,
            now,
        };
        let demand = self.mode.update(&ctx);
        self.apply(demand, inhibit, snapshot);
    }

    fn apply(&mut self, demand: MotionDemand, inhibit: ElevationInhibit, snapshot: &SystemStateSnapshot) {
        let (az_dps, el_dps) = match demand {
            MotionDemand::Idle => return,
            MotionDemand::Hold => (0.0, 0.0),
            MotionDemand::Velocity { az_dps, el_dps } => (az_dps, el_dps),
        };

        let (az, el) = self.stabilizer.stabilize(az_dps, el_dps, snapshot);
        let limited = AxisCommand::new(az, el).clamped(self.config.max_velocity_dps);
        let command = AxisCommand::new(limited.az_dps, inhibit.apply(limited.el_dps));

        trace!(
            "{} demand=({az_dps:.3}, {el_dps:.3}) axis=({:.3}, {:.3})",
            self.mode.name(),
            command.az_dps,
            command.el_dps
        );
        self.axes.write_velocity(command);
        self.last_command = command;
    }

    fn watch_imu_link(&mut self, snapshot: &SystemStateSnapshot) {
        match (snapshot.imu_connected, self.imu_lost) {
            (false, false) => {
                warn!("IMU disconnected, closed-loop modes will hold");
                self.imu_lost = true;
                self.emit(GimbalEvent::Fault(GimbalError::CommunicationLoss(
                    "IMU disconnected".into(),
                )));
            }
            (true, true) => {
                info!("IMU reconnected");
                self.imu_lost = false;
            }
            _ => {}
        }
    }

    /// Poll both axes and publish alarm transitions.
    pub fn read_alarms(&mut self) {
        for axis in AXES {
            let alarm = match self.axes.read_alarm(axis) {
                Ok(alarm) => alarm,
                Err(e) => {
                    debug!("{axis} alarm status unavailable: {e}");
                    continue;
                }
            };

            let index = axis_index(axis);
            if alarm == self.alarms[index] {
                continue;
            }
            match &alarm {
                Some(alarm) => {
                    warn!(
                        "{}: {}",
                        GimbalError::HardwareAlarm {
                            axis,
                            code: alarm.code
                        },
                        alarm.description
                    );
                    self.emit(GimbalEvent::AlarmDetected {
                        axis,
                        alarm: alarm.clone(),
                    });
                }
                None => {
                    info!("{axis} alarm cleared");
                    self.emit(GimbalEvent::AlarmCleared { axis });
                }
            }
            self.alarms[index] = alarm;
        }
    }

    /// Operator-requested alarm clear.
    ///
    /// Drops the reset line now; [`tick`](Self::tick) raises it again once
    /// the configured delay has passed.
    pub fn clear_alarms(&mut self, now: Instant) {
        for axis in AXES {
            if let Err(e) = self.axes.clear_alarm(axis) {
                warn!("Failed to clear {axis} alarm: {e}");
            }
        }
        if let Err(e) = self.plc.set_reset_alarm(0) {
            warn!("Failed to drop alarm reset line: {e}");
        }
        self.pending_reset = Some(now + self.config.alarm_reset_delay());
        info!("Alarm reset pulse started");
    }

    fn service_alarm_reset(&mut self, now: Instant) {
        let Some(deadline) = self.pending_reset else {
            return;
        };
        if now < deadline {
            return;
        }
        self.pending_reset = None;
        match self.plc.set_reset_alarm(1) {
            Ok(()) => debug!("Alarm reset pulse complete"),
            Err(e) => warn!("Failed to raise alarm reset line: {e}"),
        }
    }

    /// Leave the active mode and stop both axes.
    pub fn shutdown(&mut self) {
        let from = self.mode_kind;
        self.mode.exit();
        self.axes.stop();
        self.mode = MotionMode::Idle;
        self.mode_kind = MotionModeKind::Idle;
        self.last_command = AxisCommand::ZERO;
        if from != MotionModeKind::Idle {
            self.emit(GimbalEvent::ModeChanged {
                from,
                to: MotionModeKind::Idle,
            });
        }
        self.publish_faults();
        info!("Gimbal controller shut down");
    }
}

impl std::fmt::Debug for GimbalController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GimbalController")
            .field("mode", &self.mode_kind)
            .field("axes", &self.axes)
            .field("stabilizer", &self.stabilizer)
            .field("last_command", &self.last_command)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AutoSectorScanZone, TrackerState};
    use crate::zones::{AreaZone, ZoneKind};
    use approx::assert_relative_eq;
    use hardware::mock::{AxisOp, SimulatedAxis, SimulatedPlc};
    use hardware::{AxisError, Interlocks};
    use std::time::Duration;

    struct Rig {
        controller: GimbalController,
        az: SimulatedAxis,
        el: SimulatedAxis,
        plc: SimulatedPlc,
    }

    fn rig() -> Rig {
        let az = SimulatedAxis::new();
        let el = SimulatedAxis::new();
        let plc = SimulatedPlc::new();
        let controller = GimbalController::new(
            GimbalConfig::default(),
            Box::new(az.clone()),
            Box::new(el.clone()),
            Box::new(plc.clone()),
        );
        Rig {
            controller,
            az,
            el,
            plc,
        }
    }

    fn ready() -> SystemStateSnapshot {
        SystemStateSnapshot {
            interlocks: Interlocks {
                station_enabled: true,
                dead_man_switch: true,
                ..Default::default()
            },
            gimbal_el: 5.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_switch_stops_before_new_profile() {
        let mut rig = rig();
        let mut snapshot = ready();
        snapshot.motion_mode = MotionModeKind::Manual;
        rig.controller.on_state_changed(&snapshot);

        assert_eq!(rig.controller.mode_kind(), MotionModeKind::Manual);
        assert_eq!(
            rig.az.state().ops,
            vec![AxisOp::Stop, AxisOp::Acceleration(100_000)]
        );
        assert_eq!(rig.el.state().stop_count, 1);
    }

    #[test]
    fn test_missing_zone_falls_back_to_idle() {
        let mut rig = rig();
        let events = rig.controller.subscribe_events();
        let mut snapshot = ready();
        snapshot.motion_mode = MotionModeKind::AutoSectorScan;
        snapshot.active_sector_scan_zone_id = 3;
        rig.controller.on_state_changed(&snapshot);

        assert_eq!(rig.controller.mode_kind(), MotionModeKind::Idle);
        let events: Vec<_> = events.try_iter().collect();
        assert!(matches!(
            events[0],
            GimbalEvent::Fault(GimbalError::ConfigurationMissing { .. })
        ));
        assert_eq!(
            events[1],
            GimbalEvent::ModeChanged {
                from: MotionModeKind::Idle,
                to: MotionModeKind::Idle
            }
        );
    }

    #[test]
    fn test_zone_change_rebuilds_scan() {
        let mut rig = rig();
        let zone = |id, az2| AutoSectorScanZone {
            id,
            enabled: true,
            az1: 0.0,
            el1: 0.0,
            az2,
            el2: 0.0,
            scan_speed: 20.0,
        };
        let mut snapshot = ready();
        snapshot.motion_mode = MotionModeKind::AutoSectorScan;
        snapshot.active_sector_scan_zone_id = 1;
        snapshot.sector_scan_zones = vec![zone(1, 30.0), zone(2, 90.0)];
        rig.controller.on_state_changed(&snapshot);

        snapshot.active_sector_scan_zone_id = 2;
        rig.controller.on_state_changed(&snapshot);

        match rig.controller.mode() {
            MotionMode::AutoSectorScan(scan) => assert_eq!(scan.zone().id, 2),
            other => panic!("unexpected {}", other.name()),
        }
        assert_eq!(rig.az.state().stop_count, 2);
    }

    #[test]
    fn test_safety_trip_stops_and_skips_mode() {
        let mut rig = rig();
        let events = rig.controller.subscribe_events();
        let mut snapshot = ready();
        snapshot.motion_mode = MotionModeKind::Manual;
        snapshot.joystick_az = 1.0;
        rig.controller.on_state_changed(&snapshot);
        rig.az.clear_ops();

        snapshot.interlocks.emergency_stop = true;
        let now = Instant::now();
        rig.controller.tick(&snapshot, now);
        rig.controller.tick(&snapshot, now + Duration::from_millis(50));

        assert_eq!(rig.az.state().ops, vec![AxisOp::Stop, AxisOp::Stop]);
        let faults = events
            .try_iter()
            .filter(|e| matches!(e, GimbalEvent::Fault(GimbalError::SafetyViolation(_))))
            .count();
        assert_eq!(faults, 1);

        snapshot.interlocks.emergency_stop = false;
        rig.controller.tick(&snapshot, now + Duration::from_millis(100));
        assert!(rig.az.speed() > 0);
    }

    #[test]
    fn test_idle_writes_nothing() {
        let mut rig = rig();
        rig.controller.tick(&ready(), Instant::now());
        assert!(rig.az.state().ops.is_empty());
        assert!(rig.el.state().ops.is_empty());
    }

    #[test]
    fn test_upper_limit_blocks_raise() {
        let mut rig = rig();
        let mut snapshot = ready();
        snapshot.motion_mode = MotionModeKind::ManualTrack;
        snapshot.interlocks.upper_limit = true;
        rig.controller.on_state_changed(&snapshot);
        assert!(rig.controller.deliver(ModeInput::Target(TargetUpdate {
            az: 0.0,
            el: 40.0,
            vel_az: 0.0,
            vel_el: 0.0,
            valid: true,
        })));
        rig.controller.tick(&snapshot, Instant::now());
        assert_eq!(rig.controller.last_command().el_dps, 0.0);
    }

    #[test]
    fn test_tracker_pixels_become_target() {
        let mut rig = rig();
        let mut snapshot = ready();
        snapshot.motion_mode = MotionModeKind::AutoTrack;
        snapshot.gimbal_az = 100.0;
        snapshot.tracker = TrackerState {
            has_valid_target: true,
            target_x_px: 512.0 + 128.0,
            target_y_px: 384.0,
            velocity_x_px_s: 0.0,
            velocity_y_px_s: 0.0,
        };
        rig.controller.on_state_changed(&snapshot);
        rig.controller.tick(&snapshot, Instant::now());

        match rig.controller.mode() {
            MotionMode::Tracking(mode) => assert!(mode.has_target()),
            other => panic!("unexpected {}", other.name()),
        }
        // 128 px of a 1024 px, 9 degree image: just over a degree to the right
        assert!(rig.controller.last_command().az_dps > 0.0);
        let update = target_from_tracker(&snapshot, 0.0);
        assert_relative_eq!(update.az, 101.125, epsilon = 1e-9);
        assert_relative_eq!(update.el, 0.0);
    }

    #[test]
    fn test_alarm_relay_and_pulse() {
        let mut rig = rig();
        let events = rig.controller.subscribe_events();
        let alarm = AxisAlarm::new(0x21, "overcurrent");

        rig.el.set_alarm(Some(alarm.clone()));
        rig.controller.read_alarms();
        rig.controller.read_alarms();
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![GimbalEvent::AlarmDetected {
                axis: AxisId::Elevation,
                alarm
            }]
        );

        let t0 = Instant::now();
        rig.controller.clear_alarms(t0);
        assert_eq!(rig.plc.reset_writes(), vec![0]);
        assert_eq!(rig.el.state().clear_count, 1);

        rig.controller.tick(&ready(), t0 + Duration::from_millis(500));
        assert_eq!(rig.plc.reset_writes(), vec![0]);
        rig.controller.tick(&ready(), t0 + Duration::from_millis(1000));
        assert_eq!(rig.plc.reset_writes(), vec![0, 1]);

        rig.controller.read_alarms();
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![GimbalEvent::AlarmCleared {
                axis: AxisId::Elevation
            }]
        );
    }

    #[test]
    fn test_no_traverse_flag_pushed_back() {
        let store = StateStore::new(ready());
        let az = SimulatedAxis::new();
        let el = SimulatedAxis::new();
        let mut controller = GimbalController::new(
            GimbalConfig::default(),
            Box::new(az),
            Box::new(el),
            Box::new(SimulatedPlc::new()),
        )
        .with_state_store(store.clone());

        store.update(|s| {
            s.gimbal_az = 45.0;
            s.area_zones = vec![AreaZone {
                id: 1,
                kind: ZoneKind::NoTraverse,
                enabled: true,
                start_azimuth: 30.0,
                end_azimuth: 60.0,
                min_elevation: -10.0,
                max_elevation: 20.0,
                min_range_m: 0.0,
                max_range_m: 0.0,
                name: "mast".into(),
            }];
        });
        controller.on_state_changed(&store.snapshot());
        assert!(controller.reticle_in_no_traverse_zone());
        assert!(store.snapshot().reticle_in_no_traverse_zone);
    }

    #[test]
    fn test_no_fire_flag_follows_reticle() {
        let mut rig = rig();
        let mut snapshot = ready();
        snapshot.gimbal_az = 350.0;
        snapshot.area_zones = vec![AreaZone {
            id: 4,
            kind: ZoneKind::NoFire,
            enabled: true,
            start_azimuth: 340.0,
            end_azimuth: 20.0,
            min_elevation: -10.0,
            max_elevation: 30.0,
            min_range_m: 0.0,
            max_range_m: 2000.0,
            name: "harbour".into(),
        }];
        rig.controller.on_state_changed(&snapshot);
        assert!(rig.controller.reticle_in_no_fire_zone());
        assert!(!rig.controller.reticle_in_no_traverse_zone());

        snapshot.gimbal_az = 90.0;
        rig.controller.on_state_changed(&snapshot);
        assert!(!rig.controller.reticle_in_no_fire_zone());
    }

    #[test]
    fn test_tracker_dropout_reports_target_lost_once() {
        let mut rig = rig();
        let events = rig.controller.subscribe_events();
        let mut snapshot = ready();
        snapshot.motion_mode = MotionModeKind::AutoTrack;
        snapshot.tracker.has_valid_target = true;
        snapshot.tracker.target_x_px = 600.0;
        snapshot.tracker.target_y_px = 384.0;
        rig.controller.on_state_changed(&snapshot);

        snapshot.tracker.has_valid_target = false;
        rig.controller.on_state_changed(&snapshot);
        rig.controller.on_state_changed(&snapshot);
        rig.controller.tick(&snapshot, Instant::now());

        let lost = events
            .try_iter()
            .filter(|e| *e == GimbalEvent::Fault(GimbalError::TargetLost))
            .count();
        assert_eq!(lost, 1);
    }

    #[test]
    fn test_missing_radar_plot_reports_target_lost() {
        let mut rig = rig();
        let events = rig.controller.subscribe_events();
        let mut snapshot = ready();
        snapshot.motion_mode = MotionModeKind::RadarSlew;
        snapshot.selected_radar_track_id = 42;
        rig.controller.on_state_changed(&snapshot);
        let now = Instant::now();
        rig.controller.tick(&snapshot, now);
        rig.controller.tick(&snapshot, now + Duration::from_millis(50));

        let lost = events
            .try_iter()
            .filter(|e| *e == GimbalEvent::Fault(GimbalError::TargetLost))
            .count();
        assert_eq!(lost, 1);
    }

    #[test]
    fn test_failed_axis_write_reported_once_per_outage() {
        let mut rig = rig();
        let events = rig.controller.subscribe_events();
        let mut snapshot = ready();
        snapshot.motion_mode = MotionModeKind::Manual;
        snapshot.joystick_az = 0.5;
        rig.controller.on_state_changed(&snapshot);

        rig.az.set_connected(false);
        let now = Instant::now();
        rig.controller.tick(&snapshot, now);
        rig.controller.tick(&snapshot, now + Duration::from_millis(50));

        let faults: Vec<_> = events
            .try_iter()
            .filter(|e| matches!(e, GimbalEvent::Fault(GimbalError::Axis(_))))
            .collect();
        assert_eq!(
            faults,
            vec![GimbalEvent::Fault(GimbalError::Axis(AxisError::Disconnected))]
        );

        // Recovery re-arms the report
        rig.az.set_connected(true);
        rig.controller.tick(&snapshot, now + Duration::from_millis(100));
        rig.az.set_connected(false);
        rig.controller.tick(&snapshot, now + Duration::from_millis(150));
        let again = events
            .try_iter()
            .filter(|e| matches!(e, GimbalEvent::Fault(GimbalError::Axis(_))))
            .count();
        assert_eq!(again, 1);
    }

    #[test]
    fn test_shutdown_exits_mode() {
        let mut rig = rig();
        let mut snapshot = ready();
        snapshot.motion_mode = MotionModeKind::RadarSlew;
        rig.controller.on_state_changed(&snapshot);
        rig.az.clear_ops();
        rig.controller.shutdown();
        assert_eq!(rig.controller.mode_kind(), MotionModeKind::Idle);
        assert_eq!(rig.az.state().ops, vec![AxisOp::Stop]);
    }
}
