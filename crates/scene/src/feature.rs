use serde::{Deserialize, Serialize};

/// Geometry of one feature as handed over by the data loader.
///
/// `coordinates` is flat with a stride equal to the owning layer's dimension.
/// Every other field is optional; building layers carry the section extras.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureGeometry {
    pub coordinates: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normals: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<u32>>,
    /// Cell id of every triangle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heights: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_heights: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oriented_envelope: Option<Vec<Vec<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_footprint: Option<Vec<Vec<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_per_section: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discard_func_interval: Option<[f64; 2]>,
    /// Polygon outer ring followed by holes, each flat with the layer stride.
    /// Only used when `indices` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rings: Option<Vec<Vec<f64>>>,
}

impl FeatureGeometry {
    pub fn with_coordinates(coordinates: Vec<f64>) -> Self {
        Self {
            coordinates,
            ..Self::default()
        }
    }

    pub fn with_triangles(coordinates: Vec<f64>, indices: Vec<u32>) -> Self {
        Self {
            coordinates,
            indices: Some(indices),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerFeature {
    pub geometry: FeatureGeometry,
}

impl LayerFeature {
    pub fn new(geometry: FeatureGeometry) -> Self {
        Self { geometry }
    }
}
