//! # Geodesy Helpers
//!
//! Small-distance geometry for the GPS random walk.

/// Mean Earth radius in meters (haversine)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude (equirectangular approximation)
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance in meters
pub fn haversine_m(a: LatLon, b: LatLon) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Initial bearing from `from` to `to`, normalized to [0, 360)
pub fn initial_bearing_deg(from: LatLon, to: LatLon) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lon = (to.lon - from.lon).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Move `distance_m` meters along `direction_rad` (0 = north, clockwise)
pub fn offset(origin: LatLon, distance_m: f64, direction_rad: f64) -> LatLon {
    let d_lat = distance_m * direction_rad.cos() / METERS_PER_DEGREE;
    let d_lon =
        distance_m * direction_rad.sin() / (METERS_PER_DEGREE * origin.lat.to_radians().cos());
    LatLon::new(origin.lat + d_lat, origin.lon + d_lon)
}

/// Point `fraction` of the way from `from` to `to`
pub fn lerp(from: LatLon, to: LatLon, fraction: f64) -> LatLon {
    LatLon::new(
        from.lat + (to.lat - from.lat) * fraction,
        from.lon + (to.lon - from.lon) * fraction,
    )
}

/// Round to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    const ORIGIN: LatLon = LatLon::new(37.7749, -122.4194);

    #[test]
    fn test_haversine_zero_distance() {
        assert_eq!(haversine_m(ORIGIN, ORIGIN), 0.0);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_m(LatLon::new(0.0, 0.0), LatLon::new(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn test_offset_matches_haversine_for_small_steps() {
        for direction in [0.0, FRAC_PI_2, PI, 1.234] {
            let moved = offset(ORIGIN, 50.0, direction);
            let d = haversine_m(ORIGIN, moved);
            assert!((d - 50.0).abs() < 0.5, "direction {} gave {}", direction, d);
        }
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let north = offset(ORIGIN, 100.0, 0.0);
        let east = offset(ORIGIN, 100.0, FRAC_PI_2);
        let south = offset(ORIGIN, 100.0, PI);

        assert!(initial_bearing_deg(ORIGIN, north) < 0.01 || initial_bearing_deg(ORIGIN, north) > 359.99);
        assert!((initial_bearing_deg(ORIGIN, east) - 90.0).abs() < 0.1);
        assert!((initial_bearing_deg(ORIGIN, south) - 180.0).abs() < 0.01);
    }

    #[test]
    fn test_bearing_is_normalized() {
        let west = offset(ORIGIN, 100.0, -FRAC_PI_2);
        let bearing = initial_bearing_deg(ORIGIN, west);
        assert!((0.0..360.0).contains(&bearing));
        assert!((bearing - 270.0).abs() < 0.1);
    }

    #[test]
    fn test_lerp_endpoints() {
        let other = LatLon::new(38.0, -122.0);
        assert_eq!(lerp(ORIGIN, other, 0.0), ORIGIN);
        assert!(haversine_m(lerp(ORIGIN, other, 1.0), other) < 1e-6);

        let mid = lerp(ORIGIN, other, 0.5);
        let half = haversine_m(ORIGIN, other) / 2.0;
        assert!((haversine_m(ORIGIN, mid) - half).abs() < 10.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(3.14159, 2), 3.14);
        assert_eq!(round_to(37.77491234, 6), 37.774912);
        assert_eq!(round_to(-12.34, 1), -12.3);
    }
}
