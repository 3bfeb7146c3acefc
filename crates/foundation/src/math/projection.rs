//! Mercator-like projection into world-pixel space.
//!
//! World coordinates are pixels of a `RES`-wide tile pyramid at depth `W`. The x
//! axis runs negative with longitude; y grows northward from 0 at the south pole
//! to [`MAX_RESOLUTION`] at the north pole.

use super::{LatLng, Vec2};

/// Tile resolution in pixels.
pub const RES: u32 = 256;
/// Reference pyramid depth.
pub const W: u32 = 22;
/// Scale applied at the reference depth.
pub const SCALE: f64 = (1u64 << W) as f64;
/// World extent along y.
pub const MAX_RESOLUTION: f64 = RES as f64 * SCALE;

pub fn project(lat: f64, lng: f64) -> Vec2 {
    let res = RES as f64;
    let y = if lat == 90.0 {
        res
    } else if lat == -90.0 {
        0.0
    } else {
        let lat_rad = lat.to_radians();
        (std::f64::consts::PI - lat_rad.sin().atanh()) / std::f64::consts::PI * res / 2.0
    };
    let x = -(lng + 180.0) / 360.0 * res;

    Vec2::new(x * SCALE, y * SCALE)
}

pub fn unproject(x: f64, y: f64) -> LatLng {
    let pi = std::f64::consts::PI;
    let lat = (pi * (1.0 - y / SCALE / 128.0)).sinh().atan().to_degrees();
    let lng = -x * 360.0 / (RES as f64 * SCALE) - 180.0;
    LatLng::new(lat, lng)
}

pub fn project_latlng(p: LatLng) -> Vec2 {
    project(p.lat, p.lng)
}

pub fn unproject_world(p: Vec2) -> LatLng {
    unproject(p.x, p.y)
}

#[cfg(test)]
mod tests {
    use super::{MAX_RESOLUTION, project, unproject};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn poles_map_to_bounds_for_any_longitude() {
        for lng in [-179.0, -45.5, 0.0, 12.25, 179.9] {
            assert_eq!(project(90.0, lng).y, MAX_RESOLUTION);
            assert_eq!(project(-90.0, lng).y, 0.0);
        }
    }

    #[test]
    fn round_trip_reproduces_input() {
        let mut lat = -89.5;
        while lat < 90.0 {
            let mut lng = -179.5;
            while lng < 180.0 {
                let w = project(lat, lng);
                let g = unproject(w.x, w.y);
                assert_close(g.lat, lat, 1e-6 * lat.abs().max(1.0));
                assert_close(g.lng, lng, 1e-6 * lng.abs().max(1.0));
                lng += 17.25;
            }
            lat += 7.75;
        }
    }

    #[test]
    fn projection_is_monotonic() {
        let mut prev = project(-89.0, 0.0);
        for i in 1..=178 {
            let cur = project(-89.0 + i as f64, 0.0);
            assert!(cur.y < prev.y, "y must decrease with latitude at {i}");
            prev = cur;
        }
        assert!(project(0.0, 10.0).x < project(0.0, 9.0).x);
    }

    #[test]
    fn equator_sits_halfway() {
        let w = project(0.0, -180.0);
        assert_close(w.y, MAX_RESOLUTION / 2.0, 1e-6);
        assert_eq!(w.x, 0.0);
    }
}
