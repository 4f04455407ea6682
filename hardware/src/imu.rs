//! Inertial measurement unit interface.

use serde::{Deserialize, Serialize};

/// One IMU sample in the vehicle body frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuReading {
    /// Pitch angle in degrees
    pub pitch_deg: f64,
    /// Roll angle in degrees
    pub roll_deg: f64,
    /// Yaw angle in degrees
    pub yaw_deg: f64,
    /// Angular rate about X (pitch axis) in deg/s
    pub gyro_x: f64,
    /// Angular rate about Y (roll axis) in deg/s
    pub gyro_y: f64,
    /// Angular rate about Z (yaw axis) in deg/s
    pub gyro_z: f64,
    /// Acceleration along X in G
    pub accel_x: f64,
    /// Acceleration along Y in G
    pub accel_y: f64,
    /// Acceleration along Z in G
    pub accel_z: f64,
}

impl ImuReading {
    /// Magnitude of the angular rate vector in deg/s.
    pub fn gyro_magnitude(&self) -> f64 {
        (self.gyro_x * self.gyro_x + self.gyro_y * self.gyro_y + self.gyro_z * self.gyro_z).sqrt()
    }

    /// Magnitude of the acceleration vector in G.
    pub fn accel_magnitude(&self) -> f64 {
        (self.accel_x * self.accel_x + self.accel_y * self.accel_y + self.accel_z * self.accel_z)
            .sqrt()
    }
}

/// Interface for the platform IMU.
pub trait Imu {
    /// Latest sample.
    fn read(&mut self) -> ImuReading;

    /// Whether the IMU link is up.
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_magnitudes() {
        let reading = ImuReading {
            gyro_x: 3.0,
            gyro_y: 4.0,
            accel_z: 1.0,
            ..Default::default()
        };
        assert_relative_eq!(reading.gyro_magnitude(), 5.0);
        assert_relative_eq!(reading.accel_magnitude(), 1.0);
    }
}
