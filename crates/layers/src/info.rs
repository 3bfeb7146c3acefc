use gpu::RenderStyle;
use scene::LayerFeature;
use serde::{Deserialize, Serialize};

use crate::link::JoinedJson;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayerType {
    PointsLayer,
    #[serde(rename = "LINES_2D_LAYER")]
    Lines2dLayer,
    #[serde(rename = "LINES_3D_LAYER")]
    Lines3dLayer,
    #[serde(rename = "TRIANGLES_2D_LAYER")]
    Triangles2dLayer,
    #[serde(rename = "TRIANGLES_3D_LAYER")]
    Triangles3dLayer,
    PolygonsLayer,
    BuildingsLayer,
    HeatmapLayer,
    /// Any tag this engine does not know; batch loads skip it.
    #[serde(other)]
    Unknown,
}

impl LayerType {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerType::PointsLayer => "POINTS_LAYER",
            LayerType::Lines2dLayer => "LINES_2D_LAYER",
            LayerType::Lines3dLayer => "LINES_3D_LAYER",
            LayerType::Triangles2dLayer => "TRIANGLES_2D_LAYER",
            LayerType::Triangles3dLayer => "TRIANGLES_3D_LAYER",
            LayerType::PolygonsLayer => "POLYGONS_LAYER",
            LayerType::BuildingsLayer => "BUILDINGS_LAYER",
            LayerType::HeatmapLayer => "HEATMAP_LAYER",
            LayerType::Unknown => "UNKNOWN",
        }
    }

    /// Coordinate stride of the layer's mesh.
    pub fn dimension(self) -> usize {
        match self {
            LayerType::Lines2dLayer | LayerType::Triangles2dLayer | LayerType::PolygonsLayer => 2,
            _ => 3,
        }
    }
}

impl std::fmt::Display for LayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_color_map() -> String {
    "interpolateReds".to_string()
}

fn default_true() -> bool {
    true
}

/// Layer description as shipped next to its features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    #[serde(default)]
    pub style_key: String,
    #[serde(default = "default_color_map")]
    pub color_map: String,
    #[serde(default)]
    pub reverse_color_map: bool,
    #[serde(default)]
    pub render_style: Vec<RenderStyle>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub selectable: bool,
}

impl LayerInfo {
    pub fn new(id: impl Into<String>, layer_type: LayerType, render_style: Vec<RenderStyle>) -> Self {
        Self {
            id: id.into(),
            layer_type,
            style_key: String::new(),
            color_map: default_color_map(),
            reverse_color_map: false,
            render_style,
            visible: true,
            selectable: false,
        }
    }
}

/// One layer of a scene: its description, features and optional joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerPayload {
    #[serde(flatten)]
    pub info: LayerInfo,
    #[serde(default)]
    pub data: Vec<LayerFeature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined: Option<JoinedJson>,
}

#[cfg(test)]
mod tests {
    use super::{LayerInfo, LayerPayload, LayerType};
    use gpu::RenderStyle;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_layer_info_with_defaults() {
        let info: LayerInfo = serde_json::from_str(
            r#"{"id": "roads", "type": "LINES_2D_LAYER", "styleKey": "roads",
                "renderStyle": ["FLAT_COLOR"]}"#,
        )
        .unwrap();
        assert_eq!(info.layer_type, LayerType::Lines2dLayer);
        assert_eq!(info.render_style, vec![RenderStyle::FlatColor]);
        assert_eq!(info.color_map, "interpolateReds");
        assert!(info.visible);
        assert!(!info.selectable);
        assert_eq!(info.layer_type.dimension(), 2);
    }

    #[test]
    fn unknown_type_is_kept_for_skipping() {
        let payload: LayerPayload =
            serde_json::from_str(r#"{"id": "x", "type": "VOXEL_LAYER"}"#).unwrap();
        assert_eq!(payload.info.layer_type, LayerType::Unknown);
        assert!(payload.data.is_empty());
        assert!(payload.joined.is_none());
    }
}
