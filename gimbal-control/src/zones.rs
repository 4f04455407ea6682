//! Area zones and the pure geometric checks against them.

use serde::{Deserialize, Serialize};

use crate::angles::is_azimuth_in_range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneKind {
    Safety,
    /// The aim point must not enter
    NoTraverse,
    /// Weapon release inhibited
    NoFire,
}

/// Region of az/el (and optionally range) space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaZone {
    pub id: u32,
    pub kind: ZoneKind,
    pub enabled: bool,
    /// Clockwise sector start (deg)
    pub start_azimuth: f64,
    /// Clockwise sector end (deg), may be less than start when crossing north
    pub end_azimuth: f64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub min_range_m: f64,
    pub max_range_m: f64,
    pub name: String,
}

impl AreaZone {
    /// Whether the aim direction falls inside this zone's angular extent.
    pub fn contains_direction(&self, az: f64, el: f64) -> bool {
        el >= self.min_elevation
            && el <= self.max_elevation
            && is_azimuth_in_range(az, self.start_azimuth, self.end_azimuth)
    }

    fn is_active(&self, kind: ZoneKind) -> bool {
        self.enabled && self.kind == kind
    }
}

/// Whether the aim direction lies in any enabled no-traverse zone.
pub fn is_point_in_no_traverse_zone(zones: &[AreaZone], az: f64, el: f64) -> bool {
    zones
        .iter()
        .any(|z| z.is_active(ZoneKind::NoTraverse) && z.contains_direction(az, el))
}

/// Whether the aim direction, and range when known, lies in any enabled
/// no-fire zone.
pub fn is_point_in_no_fire_zone(zones: &[AreaZone], az: f64, el: f64, range_m: Option<f64>) -> bool {
    zones.iter().any(|z| {
        z.is_active(ZoneKind::NoFire)
            && z.contains_direction(az, el)
            && range_m.map_or(true, |r| r >= z.min_range_m && r <= z.max_range_m)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(kind: ZoneKind, start: f64, end: f64) -> AreaZone {
        AreaZone {
            id: 1,
            kind,
            enabled: true,
            start_azimuth: start,
            end_azimuth: end,
            min_elevation: -5.0,
            max_elevation: 20.0,
            min_range_m: 100.0,
            max_range_m: 2000.0,
            name: "test".into(),
        }
    }

    #[test]
    fn test_no_traverse_zone_hit() {
        let zones = vec![zone(ZoneKind::NoTraverse, 30.0, 60.0)];
        assert!(is_point_in_no_traverse_zone(&zones, 45.0, 0.0));
        assert!(!is_point_in_no_traverse_zone(&zones, 45.0, 25.0));
        assert!(!is_point_in_no_traverse_zone(&zones, 90.0, 0.0));
    }

    #[test]
    fn test_no_traverse_zone_across_north() {
        let zones = vec![zone(ZoneKind::NoTraverse, 340.0, 15.0)];
        assert!(is_point_in_no_traverse_zone(&zones, 350.0, 0.0));
        assert!(is_point_in_no_traverse_zone(&zones, 10.0, 0.0));
        assert!(!is_point_in_no_traverse_zone(&zones, 180.0, 0.0));
    }

    #[test]
    fn test_disabled_and_other_kinds_ignored() {
        let mut disabled = zone(ZoneKind::NoTraverse, 0.0, 90.0);
        disabled.enabled = false;
        let zones = vec![disabled, zone(ZoneKind::NoFire, 0.0, 90.0)];
        assert!(!is_point_in_no_traverse_zone(&zones, 45.0, 0.0));
        assert!(is_point_in_no_fire_zone(&zones, 45.0, 0.0, None));
    }

    #[test]
    fn test_no_fire_zone_range() {
        let zones = vec![zone(ZoneKind::NoFire, 0.0, 90.0)];
        assert!(is_point_in_no_fire_zone(&zones, 45.0, 0.0, Some(500.0)));
        assert!(!is_point_in_no_fire_zone(&zones, 45.0, 0.0, Some(5000.0)));
    }
}
