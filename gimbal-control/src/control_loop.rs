//! Fixed-period scheduler driving the controller.
//!
//! Each period the loop hands every pending snapshot change to the controller
//! in publication order, polls the axis alarms, then runs one tick against a
//! fresh copy of the snapshot. Late periods are delayed rather than bursted.

use std::time::Instant;

use crossbeam_channel::Receiver;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::controller::GimbalController;
use crate::state::SystemStateSnapshot;
use crate::store::StateStore;

pub struct ControlLoop {
    controller: GimbalController,
    store: StateStore,
    changes: Receiver<SystemStateSnapshot>,
}

impl ControlLoop {
    /// Attach `controller` to `store` and apply the store's current state.
    pub fn new(controller: GimbalController, store: StateStore) -> Self {
        let changes = store.subscribe();
        let mut controller = controller.with_state_store(store.clone());
        controller.on_state_changed(&store.snapshot());
        Self {
            controller,
            store,
            changes,
        }
    }

    pub fn controller(&self) -> &GimbalController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut GimbalController {
        &mut self.controller
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// One scheduling period.
    pub fn step(&mut self, now: Instant) {
        let mut drained = 0usize;
        while let Ok(snapshot) = self.changes.try_recv() {
            self.controller.on_state_changed(&snapshot);
            drained += 1;
        }
        if drained > 1 {
            debug!("Applied {drained} state changes before tick");
        }

        self.controller.read_alarms();
        let snapshot = self.store.snapshot();
        self.controller.tick(&snapshot, now);
    }

    /// Run until `shutdown` turns true or its sender goes away, then exit the
    /// active mode and hand the controller back.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> GimbalController {
        let period = self.controller.config().tick_period();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Control loop started ({} ms period)", period.as_millis());

        loop {
            tokio::select! {
                tick = interval.tick() => self.step(tick.into_std()),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.controller.shutdown();
        info!("Control loop stopped");
        self.controller
    }

    /// Run on the tokio runtime in the background.
    pub fn spawn(self) -> ControlLoopHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(shutdown_rx));
        ControlLoopHandle {
            shutdown_tx,
            handle,
        }
    }
}

/// Owner of a spawned [`ControlLoop`]. Dropping it aborts the task.
pub struct ControlLoopHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<GimbalController>,
}

impl ControlLoopHandle {
    /// Signal shutdown and wait for the loop to stop the axes.
    pub async fn stop(mut self) -> Result<GimbalController, JoinError> {
        // Send only fails once the loop is already gone; the join reports why
        let _ = self.shutdown_tx.send(true);
        (&mut self.handle).await
    }
}

impl Drop for ControlLoopHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GimbalConfig;
    use crate::state::MotionModeKind;
    use hardware::mock::{AxisOp, SimulatedAxis, SimulatedPlc};
    use hardware::Interlocks;
    use std::time::Duration;

    fn setup(tick_period_ms: u64) -> (ControlLoop, StateStore, SimulatedAxis) {
        let config = GimbalConfig {
            tick_period_ms,
            ..Default::default()
        };
        let az = SimulatedAxis::new();
        let controller = GimbalController::new(
            config,
            Box::new(az.clone()),
            Box::new(SimulatedAxis::new()),
            Box::new(SimulatedPlc::new()),
        );
        let store = StateStore::new(SystemStateSnapshot {
            interlocks: Interlocks {
                station_enabled: true,
                dead_man_switch: true,
                ..Default::default()
            },
            gimbal_el: 5.0,
            ..Default::default()
        });
        (ControlLoop::new(controller, store.clone()), store, az)
    }

    #[test]
    fn test_step_applies_changes_before_tick() {
        let (mut control, store, az) = setup(50);
        store.update(|s| {
            s.motion_mode = MotionModeKind::Manual;
            s.joystick_az = 1.0;
        });
        control.step(Instant::now());

        assert_eq!(control.controller().mode_kind(), MotionModeKind::Manual);
        let ops = az.state().ops;
        assert_eq!(ops[0], AxisOp::Stop);
        assert_eq!(ops[1], AxisOp::Acceleration(100_000));
        assert!(matches!(ops[2], AxisOp::Velocity(v) if v > 0));
    }

    #[test]
    fn test_initial_state_applied_on_construction() {
        let az = SimulatedAxis::new();
        let controller = GimbalController::new(
            GimbalConfig::default(),
            Box::new(az.clone()),
            Box::new(SimulatedAxis::new()),
            Box::new(SimulatedPlc::new()),
        );
        let store = StateStore::new(SystemStateSnapshot {
            motion_mode: MotionModeKind::RadarSlew,
            ..Default::default()
        });
        let control = ControlLoop::new(controller, store);
        assert_eq!(control.controller().mode_kind(), MotionModeKind::RadarSlew);
    }

    #[tokio::test]
    async fn test_spawned_loop_runs_and_stops() {
        let (control, store, az) = setup(5);
        let handle = control.spawn();

        store.update(|s| {
            s.motion_mode = MotionModeKind::Manual;
            s.joystick_az = 1.0;
        });
        tokio::time::sleep(Duration::from_millis(80)).await;

        let controller = tokio_test::assert_ok!(handle.stop().await);
        assert_eq!(controller.mode_kind(), MotionModeKind::Idle);

        let state = az.state();
        assert!(state.velocity_history.iter().any(|v| *v > 0));
        assert_eq!(state.ops.last(), Some(&AxisOp::Stop));
    }
}
