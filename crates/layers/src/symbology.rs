use std::collections::BTreeMap;

use foundation::Result;
use gpu::colormap::parse_hex_rgb;
use serde::{Deserialize, Serialize};
use tracing::warn;

const NOT_FOUND: &str = "#FFFFFF";
const HIGHLIGHT: &str = "#FFDD00";

/// Theme colors keyed by a layer's style key (`land`, `water`, `sky`, ...).
///
/// Serialized as a flat `{ "key": "#rrggbb" }` object. Keys missing from a
/// custom style resolve to the not-found color, not to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapStyle {
    colors: BTreeMap<String, String>,
}

impl Default for MapStyle {
    fn default() -> Self {
        let colors = [
            ("land", "#DFDFDF"),
            ("roads", "#d9b504"),
            ("parks", "#C3D0B2"),
            ("water", "#BED2D7"),
            ("sky", "#ffffff"),
            ("building", "#DFDFDF"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { colors }
    }
}

impl MapStyle {
    /// Build a custom style, rejecting malformed colors up front.
    pub fn custom(colors: BTreeMap<String, String>) -> Result<Self> {
        for hex in colors.values() {
            parse_hex_rgb(hex)?;
        }
        Ok(Self { colors })
    }

    pub fn hex(&self, key: &str) -> Option<&str> {
        self.colors.get(key).map(String::as_str)
    }

    /// Linear RGB for `key`, or the not-found color.
    pub fn color(&self, key: &str) -> [f32; 3] {
        let hex = self.hex(key).unwrap_or(NOT_FOUND);
        parse_hex_rgb(hex).unwrap_or_else(|e| {
            warn!(key, hex, error = %e, "style color is malformed");
            [1.0, 1.0, 1.0]
        })
    }

    pub fn sky(&self) -> [f32; 4] {
        let [r, g, b] = self.color("sky");
        [r, g, b, 1.0]
    }

    pub fn highlight(&self) -> [f32; 3] {
        parse_hex_rgb(HIGHLIGHT).unwrap_or([1.0, 0.86, 0.0])
    }
}

#[cfg(test)]
mod tests {
    use super::MapStyle;

    fn assert_close(a: [f32; 3], b: [f32; 3]) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-6, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn default_colors_and_fallback() {
        let style = MapStyle::default();
        assert_close(style.color("water"), [190.0 / 255.0, 210.0 / 255.0, 215.0 / 255.0]);
        assert_close(style.color("nope"), [1.0, 1.0, 1.0]);
        assert_eq!(style.sky(), [1.0, 1.0, 1.0, 1.0]);
        assert_close(style.highlight(), [1.0, 221.0 / 255.0, 0.0]);
    }

    #[test]
    fn custom_style_from_json() {
        let style: MapStyle = serde_json::from_str(r##"{"land": "#000000"}"##).unwrap();
        assert_close(style.color("land"), [0.0, 0.0, 0.0]);
        assert_close(style.color("water"), [1.0, 1.0, 1.0]);

        let bad = [("land".to_string(), "green".to_string())].into_iter().collect();
        assert!(MapStyle::custom(bad).is_err());
    }
}
