//! PID controller with integral clamping and a selectable derivative source.

use crate::config::PidGains;

/// Smallest interval for which a derivative is computed (s).
const MIN_DERIVATIVE_DT: f64 = 1e-6;

/// Signal the derivative term is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeSource {
    /// `Kd * d(error)/dt`. Kicks when the setpoint jumps.
    Error,
    /// `-Kd * d(measurement)/dt`. Immune to setpoint steps.
    Measurement,
}

/// Proportional-integral-derivative controller.
///
/// The accumulated integral is kept within `±max_integral` at all times.
/// After [`reset`](Self::reset) there is no previous sample, so the first
/// update contributes no derivative term.
#[derive(Debug, Clone, PartialEq)]
pub struct PidController {
    gains: PidGains,
    integral: f64,
    prev_error: Option<f64>,
    prev_measurement: Option<f64>,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            prev_error: None,
            prev_measurement: None,
        }
    }

    pub fn gains(&self) -> &PidGains {
        &self.gains
    }

    /// Accumulated (clamped) integral of error over time.
    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Clear the integral and derivative history.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
        self.prev_measurement = None;
    }

    /// Run one controller step.
    ///
    /// # Arguments
    /// * `error` - Setpoint minus measurement (already wrapped for azimuth)
    /// * `measurement` - Current process value, used for [`DerivativeSource::Measurement`]
    /// * `source` - Where the derivative term comes from
    /// * `dt` - Measured time since the previous step in seconds
    pub fn compute(
        &mut self,
        error: f64,
        measurement: f64,
        source: DerivativeSource,
        dt: f64,
    ) -> f64 {
        let p = self.gains.kp * error;

        if dt > 0.0 {
            self.integral += error * dt;
        }
        let limit = self.gains.max_integral.abs();
        self.integral = self.integral.clamp(-limit, limit);
        let i = self.gains.ki * self.integral;

        let d = if dt > MIN_DERIVATIVE_DT {
            match source {
                DerivativeSource::Error => self
                    .prev_error
                    .map_or(0.0, |prev| self.gains.kd * (error - prev) / dt),
                DerivativeSource::Measurement => self
                    .prev_measurement
                    .map_or(0.0, |prev| -self.gains.kd * (measurement - prev) / dt),
            }
        } else {
            0.0
        };

        self.prev_error = Some(error);
        self.prev_measurement = Some(measurement);

        p + i + d
    }

    /// Step using the error derivative only.
    pub fn compute_on_error(&mut self, error: f64, dt: f64) -> f64 {
        self.compute(error, 0.0, DerivativeSource::Error, dt)
    }
}
