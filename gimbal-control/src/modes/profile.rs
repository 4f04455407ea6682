//! Point-to-point approach shared by the slew and scan modes.

use crate::config::PidGains;
use crate::pid::PidController;

/// One position PID per axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisPids {
    pub az: PidController,
    pub el: PidController,
}

impl AxisPids {
    pub fn new(gains: PidGains) -> Self {
        Self {
            az: PidController::new(gains),
            el: PidController::new(gains),
        }
    }

    pub fn reset(&mut self) {
        self.az.reset();
        self.el.reset();
    }

    /// Accumulated integrals (az, el).
    pub fn integrals(&self) -> (f64, f64) {
        (self.az.integral(), self.el.integral())
    }
}

/// Cruise-then-decelerate profile towards a fixed point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Approach {
    /// Constant speed far from the target (deg/s); zero or less means PID all the way
    pub cruise_speed_dps: f64,
    /// Below this angular distance the PID takes over (deg)
    pub deceleration_distance_deg: f64,
}

impl Approach {
    /// World-frame velocity (az, el) towards a point `(err_az, err_el)` away.
    ///
    /// Far from the target the output points along the error vector at
    /// cruise speed and the PIDs are held reset so no integral builds up.
    pub fn velocity(&self, err_az: f64, err_el: f64, pids: &mut AxisPids, dt: f64) -> (f64, f64) {
        let distance = err_az.hypot(err_el);

        if self.cruise_speed_dps <= 0.0 || distance < self.deceleration_distance_deg {
            (
                pids.az.compute_on_error(err_az, dt),
                pids.el.compute_on_error(err_el, dt),
            )
        } else {
            pids.reset();
            (
                self.cruise_speed_dps * err_az / distance,
                self.cruise_speed_dps * err_el / distance,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const APPROACH: Approach = Approach {
        cruise_speed_dps: 12.0,
        deceleration_distance_deg: 5.0,
    };

    #[test]
    fn test_cruise_along_error_vector() {
        let mut pids = AxisPids::new(PidGains::new(1.0, 0.1, 0.0, 10.0));
        let (az, el) = APPROACH.velocity(30.0, 40.0, &mut pids, 0.05);
        assert_relative_eq!(az, 12.0 * 0.6);
        assert_relative_eq!(el, 12.0 * 0.8);
        assert_eq!(pids.integrals(), (0.0, 0.0));
    }

    #[test]
    fn test_pid_inside_deceleration_distance() {
        let mut pids = AxisPids::new(PidGains::new(2.0, 0.0, 0.0, 10.0));
        let (az, el) = APPROACH.velocity(3.0, -1.0, &mut pids, 0.05);
        assert_relative_eq!(az, 6.0);
        assert_relative_eq!(el, -2.0);
    }

    #[test]
    fn test_no_cruise_speed_means_pid_everywhere() {
        let mut pids = AxisPids::new(PidGains::new(1.0, 0.0, 0.0, 10.0));
        let pid_only = Approach {
            cruise_speed_dps: 0.0,
            ..APPROACH
        };
        let (az, _) = pid_only.velocity(90.0, 0.0, &mut pids, 0.05);
        assert_relative_eq!(az, 90.0);
    }
}
