//! Angle arithmetic shared by the motion modes.

/// Wrap an azimuth difference into (-180, 180].
///
/// Positive results mean the shortest path is clockwise.
pub fn normalize_azimuth_error(error_deg: f64) -> f64 {
    let wrapped = (error_deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Wrap an absolute azimuth into [0, 360).
pub fn normalize_azimuth(azimuth_deg: f64) -> f64 {
    azimuth_deg.rem_euclid(360.0)
}

/// Whether `target` lies in the clockwise sector from `start` to `end`.
///
/// A sector with `start > end` (after wrapping) crosses north.
pub fn is_azimuth_in_range(target_deg: f64, start_deg: f64, end_deg: f64) -> bool {
    let target = normalize_azimuth(target_deg);
    let start = normalize_azimuth(start_deg);
    let end = normalize_azimuth(end_deg);

    if start <= end {
        target >= start && target <= end
    } else {
        target >= start || target <= end
    }
}

/// Turns a wrapping azimuth reading into a continuous angle.
///
/// Successive readings are joined along the shortest path, so crossing north
/// from 359° to 1° reads as +2° rather than -358°.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AzimuthUnwrapper {
    last: Option<(f64, f64)>,
}

impl AzimuthUnwrapper {
    /// Continuous equivalent of `azimuth_deg`.
    pub fn unwrap(&mut self, azimuth_deg: f64) -> f64 {
        let continuous = match self.last {
            Some((raw, continuous)) => continuous + normalize_azimuth_error(azimuth_deg - raw),
            None => azimuth_deg,
        };
        self.last = Some((azimuth_deg, continuous));
        continuous
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Limit how far `requested` may move away from `previous` in one step.
pub fn rate_limit(requested: f64, previous: f64, max_change: f64) -> f64 {
    previous + (requested - previous).clamp(-max_change, max_change)
}

/// Angular offset (az, el) in degrees of a pixel error from the image centre.
///
/// `err_x_px` grows to the right and `err_y_px` grows downward, so a target
/// above centre yields a positive elevation offset. The vertical field of view
/// is derived from the horizontal one through the image aspect ratio.
/// Degenerate optics (no field of view or an empty image) yield zero offset.
pub fn angular_offset_from_pixels(
    err_x_px: f64,
    err_y_px: f64,
    hfov_deg: f64,
    width_px: u32,
    height_px: u32,
) -> (f64, f64) {
    if hfov_deg <= 0.01 || width_px == 0 || height_px == 0 {
        return (0.0, 0.0);
    }
    let width = width_px as f64;
    let height = height_px as f64;

    let az = err_x_px * hfov_deg / width;

    let aspect = width / height;
    let vfov_deg = 2.0 * ((hfov_deg.to_radians() / 2.0).tan() / aspect).atan().to_degrees();
    let el = -err_y_px * vfov_deg / height;

    (az, el)
}
