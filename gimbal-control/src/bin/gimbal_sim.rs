//! Closed-loop gimbal simulation against simulated devices.
//!
//! Runs the controller on simulated axes whose commanded speeds are
//! integrated into position and fed back through the state store, and logs
//! the resulting trajectory. Scenarios:
//! - `manual`: constant joystick deflection
//! - `track`: video tracker following a target drifting in azimuth
//! - `radar-slew`: slew to a selected radar plot
//! - `sector-scan`: sweep between two zone endpoints
//! - `trp-scan`: tour a page of target reference points

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use gimbal_control::angles::{normalize_azimuth, normalize_azimuth_error};
use gimbal_control::state::{AutoSectorScanZone, RadarPlot, TargetReferencePoint, TrackerState};
use gimbal_control::{
    BoxedAxis, ControlLoop, GimbalConfig, GimbalController, GimbalEvent, MotionModeKind,
    StateStore, SystemStateSnapshot,
};
use hardware::mock::{SimulatedAxis, SimulatedImu, SimulatedPlc};
use hardware::{Imu, ImuReading, Plc, QueuedAxis, ServoAxis};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    Manual,
    Track,
    RadarSlew,
    SectorScan,
    TrpScan,
}

/// Gimbal motion-control simulator
#[derive(Parser, Debug)]
#[command(name = "gimbal_sim")]
#[command(about = "Run the gimbal controller against simulated servos and IMU")]
#[command(version)]
struct Args {
    /// Scenario to run
    #[arg(short, long, value_enum, default_value_t = Scenario::Manual)]
    scenario: Scenario,

    /// Simulated duration in seconds
    #[arg(short, long, default_value = "10.0")]
    duration: f64,

    /// JSON configuration file (defaults used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log the trajectory every N ticks
    #[arg(long, default_value = "10")]
    log_every: u64,

    /// Run the spawned control loop in wall-clock time instead of stepping
    #[arg(long)]
    realtime: bool,

    /// Put each axis behind a queued worker thread
    #[arg(long)]
    queued: bool,
}

/// Azimuth rate of the simulated tracking target (deg/s)
const TARGET_DRIFT_DPS: f64 = 0.5;

fn initial_snapshot(scenario: Scenario, plc: &mut SimulatedPlc) -> SystemStateSnapshot {
    let mut snapshot = SystemStateSnapshot {
        interlocks: plc.read_interlocks(),
        gimbal_speed_percent: 60.0,
        ..Default::default()
    };

    match scenario {
        Scenario::Manual => {
            snapshot.motion_mode = MotionModeKind::Manual;
            snapshot.joystick_az = 0.6;
            snapshot.joystick_el = 0.3;
        }
        Scenario::Track => {
            snapshot.motion_mode = MotionModeKind::AutoTrack;
        }
        Scenario::RadarSlew => {
            snapshot.motion_mode = MotionModeKind::RadarSlew;
            snapshot.radar_plots = vec![RadarPlot {
                id: 7,
                azimuth: 60.0,
                range_m: 2500.0,
                relative_course: 90.0,
                relative_speed: 8.0,
            }];
            snapshot.selected_radar_track_id = 7;
        }
        Scenario::SectorScan => {
            snapshot.motion_mode = MotionModeKind::AutoSectorScan;
            snapshot.active_sector_scan_zone_id = 1;
            snapshot.sector_scan_zones = vec![AutoSectorScanZone {
                id: 1,
                enabled: true,
                az1: 10.0,
                el1: 0.0,
                az2: 40.0,
                el2: 5.0,
                scan_speed: 20.0,
            }];
        }
        Scenario::TrpScan => {
            snapshot.motion_mode = MotionModeKind::TrpScan;
            snapshot.active_trp_page = 1;
            snapshot.target_reference_points = [(20.0, 2.0), (35.0, 8.0), (5.0, 0.0)]
                .iter()
                .enumerate()
                .map(|(i, &(azimuth, elevation))| TargetReferencePoint {
                    id: i as u32 + 1,
                    page: 1,
                    index_in_page: i as u32,
                    azimuth,
                    elevation,
                    halt_time_s: 1.0,
                })
                .collect();
        }
    }
    snapshot
}

/// Simulated mount: integrates axis speeds and publishes feedback.
struct Plant {
    az: SimulatedAxis,
    el: SimulatedAxis,
    imu: SimulatedImu,
    plc: SimulatedPlc,
    config: GimbalConfig,
    scenario: Scenario,
}

impl Plant {
    fn angles(&self) -> (f64, f64) {
        let scaling = &self.config.scaling;
        let az = normalize_azimuth(self.az.position_steps() / scaling.az_steps_per_degree());
        let mut el = self.el.position_steps() / scaling.el_steps_per_degree();
        if scaling.invert_elevation {
            el = -el;
        }
        (az, el)
    }

    fn tracker(&self, gimbal_az: f64, gimbal_el: f64, t: f64) -> TrackerState {
        let camera = SystemStateSnapshot::default().camera;
        let width = camera.image_width_px as f64;
        let height = camera.image_height_px as f64;
        let hfov = camera.active_hfov_deg();
        let vfov = 2.0 * ((hfov.to_radians() / 2.0).tan() / (width / height)).atan().to_degrees();
        let (cx, cy) = camera.centre_px();

        let target_az = 15.0 + TARGET_DRIFT_DPS * t;
        let target_el = 3.0;
        let x = cx + normalize_azimuth_error(target_az - gimbal_az) * width / hfov;
        let y = cy - (target_el - gimbal_el) * height / vfov;

        TrackerState {
            has_valid_target: (0.0..width).contains(&x) && (0.0..height).contains(&y),
            target_x_px: x,
            target_y_px: y,
            velocity_x_px_s: TARGET_DRIFT_DPS * width / hfov,
            velocity_y_px_s: 0.0,
        }
    }

    fn advance(&mut self, dt: f64, t: f64, store: &StateStore) {
        self.az.advance(dt);
        self.el.advance(dt);
        let (az, el) = self.angles();

        self.imu.set_reading(ImuReading {
            pitch_deg: el,
            accel_z: 1.0,
            ..Default::default()
        });
        let imu = self.imu.read();
        let imu_connected = self.imu.is_connected();
        let interlocks = self.plc.read_interlocks();
        let az_connected = self.az.is_connected();
        let el_connected = self.el.is_connected();
        let tracker = (self.scenario == Scenario::Track).then(|| self.tracker(az, el, t));

        store.update(|s| {
            s.gimbal_az = az;
            s.gimbal_el = el;
            s.imu = imu;
            s.imu_connected = imu_connected;
            s.interlocks = interlocks;
            s.az_servo_connected = az_connected;
            s.el_servo_connected = el_connected;
            if let Some(tracker) = tracker {
                s.tracker = tracker;
            }
        });
    }

    fn log(&self, t: f64, mode: Option<MotionModeKind>) {
        let (az, el) = self.angles();
        let mode = mode.map_or_else(|| "-".to_string(), |m| m.to_string());
        info!(
            "t={t:6.2}s mode={mode:<14} az={az:7.2} el={el:6.2} speed=({:6}, {:6})",
            self.az.speed(),
            self.el.speed()
        );
    }
}

fn log_events(events: &crossbeam_channel::Receiver<GimbalEvent>) {
    for event in events.try_iter() {
        info!("Event: {event:?}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => GimbalConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => GimbalConfig::default(),
    };
    let dt = config.dt_s();
    let ticks = (args.duration / dt).ceil().max(0.0) as u64;
    let log_every = args.log_every.max(1);

    let az = SimulatedAxis::new();
    let el = SimulatedAxis::new();
    let mut plc = SimulatedPlc::new();
    let store = StateStore::new(initial_snapshot(args.scenario, &mut plc));

    let (az_axis, el_axis): (BoxedAxis, BoxedAxis) = if args.queued {
        (
            Box::new(QueuedAxis::spawn("azimuth", az.clone())),
            Box::new(QueuedAxis::spawn("elevation", el.clone())),
        )
    } else {
        (Box::new(az.clone()), Box::new(el.clone()))
    };
    let mut controller =
        GimbalController::new(config.clone(), az_axis, el_axis, Box::new(plc.clone()));
    let events = controller.subscribe_events();

    info!(
        "Simulating {:?} for {:.1} s ({ticks} ticks of {} ms)",
        args.scenario,
        args.duration,
        config.tick_period_ms
    );
    let mut control = ControlLoop::new(controller, store.clone());
    let mut plant = Plant {
        az,
        el,
        imu: SimulatedImu::new(),
        plc,
        config: config.clone(),
        scenario: args.scenario,
    };

    if args.realtime {
        let handle = control.spawn();
        let mut interval = tokio::time::interval(config.tick_period());
        for k in 0..ticks {
            interval.tick().await;
            let t = k as f64 * dt;
            plant.advance(dt, t, &store);
            log_events(&events);
            if k % log_every == 0 {
                plant.log(t, None);
            }
        }
        let controller = handle.stop().await.context("Control loop task failed")?;
        info!("Final mode {}", controller.mode_kind());
    } else {
        let start = Instant::now();
        for k in 0..ticks {
            let t = k as f64 * dt;
            plant.advance(dt, t, &store);
            control.step(start + Duration::from_secs_f64(t));
            log_events(&events);
            if k % log_every == 0 {
                plant.log(t, Some(control.controller().mode_kind()));
            }
        }
        control.controller_mut().shutdown();
    }
    log_events(&events);

    let (az, el) = plant.angles();
    info!("Finished at az={az:.2} el={el:.2}");
    Ok(())
}
