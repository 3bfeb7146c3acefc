//! Precision helpers.
//!
//! Projected coordinates at the reference depth are around `1e9`, well past the
//! `f32` mantissa. Geometry is therefore stored relative to a high-precision
//! origin and only narrowed to `f32` once it is near zero.

use super::Vec2;

/// A high-precision anchor that GPU-bound positions are expressed against.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OriginRelative {
    pub origin: Vec2,
}

impl OriginRelative {
    pub fn new(origin: Vec2) -> Self {
        Self { origin }
    }

    /// World point as an `f32` offset from the origin.
    #[inline]
    pub fn to_f32(self, world: Vec2) -> [f32; 2] {
        let d = world - self.origin;
        [d.x as f32, d.y as f32]
    }

    /// Inverse of [`Self::to_f32`] for already-relative `f64` values.
    #[inline]
    pub fn to_world(self, relative: Vec2) -> Vec2 {
        relative + self.origin
    }
}

/// Narrow a slice of `f64` to `f32` for upload.
pub fn narrow_f32(values: &[f64]) -> Vec<f32> {
    values.iter().map(|v| *v as f32).collect()
}

/// Minimum and maximum of the finite values, or `None` when there are none.
pub fn finite_extent(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

#[cfg(test)]
mod tests {
    use super::{OriginRelative, finite_extent};
    use crate::math::{Vec2, project};

    #[test]
    fn origin_relative_keeps_small_offsets_exact() {
        let origin = project(40.7, -73.9);
        let rel = OriginRelative::new(origin);
        let p = origin + Vec2::new(12.5, -3.25);
        assert_eq!(rel.to_f32(p), [12.5, -3.25]);
        assert_eq!(rel.to_world(Vec2::new(12.5, -3.25)), p);
    }

    #[test]
    fn extent_skips_non_finite() {
        assert_eq!(finite_extent([3.0, f64::NAN, -1.0, 7.5, f64::INFINITY]), Some((-1.0, 7.5)));
        assert_eq!(finite_extent([f64::NAN, f64::NEG_INFINITY]), None);
        assert_eq!(finite_extent([2.0]), Some((2.0, 2.0)));
        assert_eq!(finite_extent(std::iter::empty()), None);
    }
}
