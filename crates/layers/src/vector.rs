use std::borrow::Cow;

use earcutr::earcut;
use foundation::{EngineError, Result};
use scene::{FeatureGeometry, LayerFeature};

/// Triangulate every feature that ships polygon `rings` instead of indices.
///
/// Features that already carry indices are passed through untouched.
pub fn triangulate_features(features: &[LayerFeature], dim: usize) -> Result<Cow<'_, [LayerFeature]>> {
    let needs_work = features
        .iter()
        .any(|f| f.geometry.indices.is_none() && f.geometry.rings.is_some());
    if !needs_work {
        return Ok(Cow::Borrowed(features));
    }

    let mut out = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        let geometry = &feature.geometry;
        match (&geometry.indices, &geometry.rings) {
            (None, Some(rings)) => {
                let (coordinates, indices) = triangulate_rings(rings, dim).map_err(|e| {
                    EngineError::config(format!("feature {i}: {e}"))
                })?;
                out.push(LayerFeature::new(FeatureGeometry {
                    coordinates,
                    indices: Some(indices),
                    rings: None,
                    ..geometry.clone()
                }));
            }
            _ => out.push(feature.clone()),
        }
    }
    Ok(Cow::Owned(out))
}

/// Outer ring first, then holes; each ring flat with stride `dim`.
///
/// Earcut runs on x/y only. The returned coordinates keep the full stride with
/// closing duplicates and degenerate rings removed.
pub fn triangulate_rings(rings: &[Vec<f64>], dim: usize) -> Result<(Vec<f64>, Vec<u32>)> {
    if dim < 2 {
        return Err(EngineError::config(format!("cannot triangulate dimension {dim}")));
    }

    let mut coords: Vec<f64> = Vec::new();
    let mut holes: Vec<usize> = Vec::new();
    for (ring_i, ring) in rings.iter().enumerate() {
        if ring.len() % dim != 0 {
            return Err(EngineError::config(format!(
                "ring {ring_i} has {} values, not a multiple of {dim}",
                ring.len()
            )));
        }
        let ring = drop_closing_duplicate(ring, dim);
        if ring.len() < 3 * dim {
            if ring_i == 0 {
                return Ok((Vec::new(), Vec::new()));
            }
            continue;
        }
        if ring_i > 0 {
            holes.push(coords.len() / dim);
        }
        coords.extend_from_slice(ring);
    }

    let indices = earcut(&coords, &holes, dim)
        .map_err(|e| EngineError::config(format!("polygon triangulation failed: {e:?}")))?;
    Ok((coords, indices.into_iter().map(|i| i as u32).collect()))
}

fn drop_closing_duplicate(ring: &[f64], dim: usize) -> &[f64] {
    let n = ring.len() / dim;
    if n >= 2 {
        let first = &ring[..dim];
        let last = &ring[(n - 1) * dim..];
        if first.iter().zip(last).all(|(a, b)| (a - b).abs() < 1e-9) {
            return &ring[..(n - 1) * dim];
        }
    }
    ring
}

#[cfg(test)]
mod tests {
    use super::{triangulate_features, triangulate_rings};
    use scene::{FeatureGeometry, LayerFeature};
    use std::borrow::Cow;

    #[test]
    fn square_with_closing_point_gives_two_triangles() {
        let ring = vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let (coords, indices) = triangulate_rings(&[ring], 2).unwrap();
        assert_eq!(coords.len(), 8);
        assert_eq!(indices.len(), 6);
        assert!(indices.iter().all(|i| *i < 4));
    }

    #[test]
    fn hole_adds_triangles() {
        let outer = vec![0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0];
        let hole = vec![4.0, 4.0, 6.0, 4.0, 6.0, 6.0, 4.0, 6.0];
        let (coords, indices) = triangulate_rings(&[outer, hole], 2).unwrap();
        assert_eq!(coords.len(), 16);
        assert_eq!(indices.len(), 8 * 3);
    }

    #[test]
    fn features_with_indices_are_borrowed() {
        let plain = vec![LayerFeature::new(FeatureGeometry::with_triangles(
            vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            vec![0, 1, 2],
        ))];
        assert!(matches!(triangulate_features(&plain, 2).unwrap(), Cow::Borrowed(_)));

        let polygon = vec![LayerFeature::new(FeatureGeometry {
            rings: Some(vec![vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]]),
            ..FeatureGeometry::default()
        })];
        let out = triangulate_features(&polygon, 2).unwrap();
        assert_eq!(out[0].geometry.indices.as_ref().map(Vec::len), Some(3));
        assert!(out[0].geometry.rings.is_none());
    }

    #[test]
    fn rejects_ragged_rings() {
        assert!(triangulate_rings(&[vec![0.0, 0.0, 1.0]], 2).is_err());
    }
}
