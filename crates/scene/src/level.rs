//! Granularity of per-layer arrays and the aggregations between them.
//!
//! A coordinate-level array has one entry per vertex; an object-level array has
//! one entry per mesh component. Conversions go through `coords_per_comp`.

use foundation::{EngineError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelType {
    #[serde(rename = "COORDINATES")]
    Coordinates,
    #[serde(rename = "OBJECTS")]
    Objects,
    #[serde(rename = "COORDINATES3D")]
    Coordinates3d,
}

impl LevelType {
    pub fn as_str(self) -> &'static str {
        match self {
            LevelType::Coordinates => "COORDINATES",
            LevelType::Objects => "OBJECTS",
            LevelType::Coordinates3d => "COORDINATES3D",
        }
    }
}

impl std::fmt::Display for LevelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Aggregation {
    Max,
    Min,
    Avg,
    Sum,
    Count,
    None,
    /// Keep the first value.
    Discard,
}

/// Reduce `values` with `agg`.
///
/// An empty group yields 0. `NONE` is not a terminal aggregation and is rejected.
pub fn aggregate(values: &[f64], agg: Aggregation) -> Result<f64> {
    let sum = || values.iter().sum::<f64>();
    let value = match agg {
        Aggregation::None => {
            return Err(EngineError::config(
                "NONE aggregation cannot resolve multiple values into one",
            ));
        }
        _ if values.is_empty() => 0.0,
        Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregation::Avg => sum() / values.len() as f64,
        Aggregation::Sum => sum(),
        Aggregation::Count => values.len() as f64,
        Aggregation::Discard => values[0],
    };
    Ok(value)
}

/// Start index of every component in a coordinate-level array.
pub fn component_offsets(coords_per_comp: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(coords_per_comp.len());
    let mut acc = 0;
    for n in coords_per_comp {
        offsets.push(acc);
        acc += n;
    }
    offsets
}

/// Split a coordinate-level array into one group per component.
///
/// Missing trailing values shorten the last groups instead of panicking.
pub fn group_by_components<T: Clone>(values: &[T], coords_per_comp: &[usize]) -> Vec<Vec<T>> {
    let mut groups = Vec::with_capacity(coords_per_comp.len());
    let mut read = 0;
    for n in coords_per_comp {
        let end = (read + n).min(values.len());
        let start = read.min(end);
        groups.push(values[start..end].to_vec());
        read += n;
    }
    groups
}

/// Repeat each object value over every coordinate of its component.
pub fn broadcast_per_component(per_object: &[f64], coords_per_comp: &[usize]) -> Vec<f64> {
    let mut out = Vec::with_capacity(coords_per_comp.iter().sum());
    for (value, n) in per_object.iter().zip(coords_per_comp) {
        out.extend(std::iter::repeat_n(*value, *n));
    }
    out
}

/// Collapse highlight groups: an element is highlighted only when every flag in
/// its group is.
pub fn all_highlighted(groups: &[Vec<bool>]) -> Vec<bool> {
    groups.iter().map(|g| g.iter().all(|v| *v)).collect()
}

#[cfg(test)]
mod tests {
    use super::{
        Aggregation, LevelType, aggregate, all_highlighted, broadcast_per_component,
        component_offsets, group_by_components,
    };

    #[test]
    fn aggregations() {
        let v = [3.0, 1.0, 5.0, 3.0];
        assert_eq!(aggregate(&v, Aggregation::Max).unwrap(), 5.0);
        assert_eq!(aggregate(&v, Aggregation::Min).unwrap(), 1.0);
        assert_eq!(aggregate(&v, Aggregation::Avg).unwrap(), 3.0);
        assert_eq!(aggregate(&v, Aggregation::Sum).unwrap(), 12.0);
        assert_eq!(aggregate(&v, Aggregation::Count).unwrap(), 4.0);
        assert_eq!(aggregate(&v, Aggregation::Discard).unwrap(), 3.0);
        assert_eq!(aggregate(&[], Aggregation::Max).unwrap(), 0.0);
    }

    #[test]
    fn none_aggregation_is_rejected() {
        let err = aggregate(&[1.0], Aggregation::None).unwrap_err();
        assert!(err.to_string().contains("NONE"));
    }

    #[test]
    fn partial_highlight_is_not_highlighted() {
        let groups = vec![vec![true, true, false], vec![true, true]];
        assert_eq!(all_highlighted(&groups), vec![false, true]);
    }

    #[test]
    fn grouping_and_broadcast() {
        let per_comp = [3, 2];
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let groups = group_by_components(&values, &per_comp);
        assert_eq!(groups, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0]]);
        assert_eq!(component_offsets(&per_comp), vec![0, 3]);
        assert_eq!(
            broadcast_per_component(&[7.0, 9.0], &per_comp),
            vec![7.0, 7.0, 7.0, 9.0, 9.0]
        );
        let short = group_by_components(&values[..4], &per_comp);
        assert_eq!(short[1], vec![4.0]);
    }

    #[test]
    fn level_names_on_the_wire() {
        let l: LevelType = serde_json::from_str("\"COORDINATES3D\"").unwrap();
        assert_eq!(l, LevelType::Coordinates3d);
        let a: Aggregation = serde_json::from_str("\"DISCARD\"").unwrap();
        assert_eq!(a, Aggregation::Discard);
    }
}
