use std::path::Path;

use foundation::math::LatLng;
use foundation::{EngineError, Result};
use layers::{Knot, LayerPayload, MapStyle};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
#[serde(remote = "LatLng")]
struct LatLngDef {
    lat: f64,
    lng: f64,
}

/// Initial camera. `eye` and `look_at` are relative to the projected origin;
/// their z components are meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraConfig {
    #[serde(with = "LatLngDef")]
    pub origin: LatLng,
    pub eye: [f64; 3],
    pub look_at: [f64; 3],
    #[serde(default = "default_up")]
    pub up: [f64; 3],
}

fn default_up() -> [f64; 3] {
    [0.0, 1.0, 0.0]
}

fn default_viewport() -> [u32; 2] {
    [800, 800]
}

/// A whole scene: camera, theme, viewport, layers and the knots coloring them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub camera: CameraConfig,
    #[serde(default)]
    pub style: MapStyle,
    #[serde(default = "default_viewport")]
    pub viewport: [u32; 2],
    #[serde(default)]
    pub layers: Vec<LayerPayload>,
    #[serde(default)]
    pub knots: Vec<Knot>,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::config(format!("invalid scene: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::config(format!("reading {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;
    use layers::LayerType;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_minimal_scene() {
        let config = EngineConfig::from_json(
            r#"{
                "camera": {"origin": {"lat": 40.7, "lng": -73.9}, "eye": [0, 0, 1500], "lookAt": [0, 10, 0]},
                "layers": [{"id": "water", "type": "TRIANGLES_2D_LAYER", "styleKey": "water",
                            "renderStyle": ["FLAT_COLOR"], "data": []}]
            }"#,
        )
        .unwrap();
        assert_eq!(config.camera.up, [0.0, 1.0, 0.0]);
        assert_eq!(config.viewport, [800, 800]);
        assert_eq!(config.layers[0].info.layer_type, LayerType::Triangles2dLayer);
        assert_eq!(config.style.hex("water"), Some("#BED2D7"));
        assert!(config.knots.is_empty());
    }

    #[test]
    fn malformed_scene_is_a_config_error() {
        let err = EngineConfig::from_json(r#"{"layers": []}"#).unwrap_err();
        assert!(err.to_string().contains("camera"));
    }
}
