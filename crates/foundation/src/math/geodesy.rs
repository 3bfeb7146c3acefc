use super::projection::{RES, W};

/// WGS84 semi-major axis (meters).
pub const WGS84_A: f64 = 6_378_137.0;

/// Geographic coordinate in degrees.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Meters covered by one unit at `zoom` on the given latitude.
pub fn ground_resolution(lat: f64, zoom: f64) -> f64 {
    (lat.to_radians()).cos() * WGS84_A * 2.0 * std::f64::consts::PI / 2f64.powf(zoom)
}

/// Meters covered by one projected world unit at `lat`.
///
/// The world spans `RES * 2^W` units, so this is the ground resolution at zoom
/// `W + log2(RES)`.
pub fn world_unit_meters(lat: f64) -> f64 {
    ground_resolution(lat, W as f64 + (RES as f64).log2())
}

#[cfg(test)]
mod tests {
    use super::{WGS84_A, ground_resolution, world_unit_meters};
    use crate::math::projection::MAX_RESOLUTION;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn equator_zoom_zero_is_circumference() {
        let circumference = 2.0 * std::f64::consts::PI * WGS84_A;
        assert_close(ground_resolution(0.0, 0.0), circumference, 1e-6);
        assert_close(ground_resolution(0.0, 1.0), circumference / 2.0, 1e-6);
    }

    #[test]
    fn resolution_shrinks_toward_the_poles() {
        let eq = ground_resolution(0.0, 10.0);
        assert_close(ground_resolution(60.0, 10.0), eq * 0.5, 1e-9);
        assert!(ground_resolution(89.0, 10.0) < eq);
    }

    #[test]
    fn world_unit_spans_the_equator() {
        let circumference = 2.0 * std::f64::consts::PI * WGS84_A;
        assert_close(world_unit_meters(0.0) * MAX_RESOLUTION, circumference, 1e-3);
    }
}
