//! Sequential color scales sampled into a 256x1 lookup texture.

use foundation::math::finite_extent;
use foundation::{EngineError, Result};

pub const COLOR_MAP_RES: usize = 256;

const REDS: &[&str] = &[
    "#fff5f0", "#fee0d2", "#fcbba1", "#fc9272", "#fb6a4a", "#ef3b2c", "#cb181d", "#a50f15",
    "#67000d",
];
const BLUES: &[&str] = &[
    "#f7fbff", "#deebf7", "#c6dbef", "#9ecae1", "#6baed6", "#4292c6", "#2171b5", "#08519c",
    "#08306b",
];
const GREENS: &[&str] = &[
    "#f7fcf5", "#e5f5e0", "#c7e9c0", "#a1d99b", "#74c476", "#41ab5d", "#238b45", "#006d2c",
    "#00441b",
];
const GREYS: &[&str] = &[
    "#ffffff", "#f0f0f0", "#d9d9d9", "#bdbdbd", "#969696", "#737373", "#525252", "#252525",
    "#000000",
];
const ORANGES: &[&str] = &[
    "#fff5eb", "#fee6ce", "#fdd0a2", "#fdae6b", "#fd8d3c", "#f16913", "#d94801", "#a63603",
    "#7f2704",
];
const PURPLES: &[&str] = &[
    "#fcfbfd", "#efedf5", "#dadaeb", "#bcbddc", "#9e9ac8", "#807dba", "#6a51a3", "#54278f",
    "#3f007d",
];
const VIRIDIS: &[&str] = &[
    "#440154", "#482878", "#3e4989", "#31688e", "#26828e", "#1f9e89", "#35b779", "#6ece58",
    "#b5de2b", "#fde725",
];

/// Parse `#rrggbb` (or `rrggbb`) into normalized RGB.
pub fn parse_hex_rgb(hex: &str) -> Result<[f32; 3]> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(EngineError::config(format!("invalid hex color {hex:?}")));
    }
    let mut rgb = [0.0; 3];
    for (i, out) in rgb.iter_mut().enumerate() {
        let byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
            .map_err(|_| EngineError::config(format!("invalid hex color {hex:?}")))?;
        *out = byte as f32 / 255.0;
    }
    Ok(rgb)
}

fn stops(name: &str) -> Option<&'static [&'static str]> {
    let scheme = name.strip_prefix("interpolate").unwrap_or(name);
    Some(match scheme {
        "Reds" => REDS,
        "Blues" => BLUES,
        "Greens" => GREENS,
        "Greys" => GREYS,
        "Oranges" => ORANGES,
        "Purples" => PURPLES,
        "Viridis" => VIRIDIS,
        _ => return None,
    })
}

/// Color of `t` in `[0, 1]` on the named scale. A hex string is a constant scale.
pub fn color_at(name: &str, t: f64) -> Result<[f32; 3]> {
    let Some(stops) = stops(name) else {
        if name.starts_with('#') {
            return parse_hex_rgb(name);
        }
        return Err(EngineError::config(format!("color scale {name} does not exist")));
    };

    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let segments = stops.len() - 1;
    let pos = t * segments as f64;
    let i = (pos.floor() as usize).min(segments - 1);
    let f = (pos - i as f64) as f32;

    let a = parse_hex_rgb(stops[i])?;
    let b = parse_hex_rgb(stops[i + 1])?;
    Ok([
        a[0] + (b[0] - a[0]) * f,
        a[1] + (b[1] - a[1]) * f,
        a[2] + (b[2] - a[2]) * f,
    ])
}

/// `COLOR_MAP_RES` RGBA texels, alpha 1.
pub fn color_map_texels(name: &str, reverse: bool) -> Result<Vec<f32>> {
    let mut texels = Vec::with_capacity(COLOR_MAP_RES * 4);
    for i in 0..COLOR_MAP_RES {
        let mut t = i as f64 / (COLOR_MAP_RES - 1) as f64;
        if reverse {
            t = 1.0 - t;
        }
        let [r, g, b] = color_at(name, t)?;
        texels.extend_from_slice(&[r, g, b, 1.0]);
    }
    Ok(texels)
}

/// Normalized value of a coordinate without data. Color-map shaders draw it
/// in a neutral grey instead of looking it up in the scale.
pub const NO_DATA: f32 = -1.0;

/// Min-max normalize into `[0, 1]`. A constant array maps to 0 and
/// non-finite values map to [`NO_DATA`].
pub fn normalize_min_max(values: &[f64]) -> Vec<f32> {
    let (min, max) = finite_extent(values.iter().copied()).unwrap_or((0.0, 0.0));
    normalize_in(values, min, max)
}

/// Normalize against an explicit extent, clamped into `[0, 1]`.
pub fn normalize_in(values: &[f64], min: f64, max: f64) -> Vec<f32> {
    let range = max - min;
    values
        .iter()
        .map(|v| {
            if !v.is_finite() {
                NO_DATA
            } else if range > 0.0 {
                ((v - min) / range).clamp(0.0, 1.0) as f32
            } else {
                0.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        COLOR_MAP_RES, NO_DATA, color_at, color_map_texels, normalize_min_max, parse_hex_rgb,
    };

    fn assert_close(a: f32, b: f32, eps: f32) {
        assert!((a - b).abs() <= eps, "expected {a} ~= {b}");
    }

    #[test]
    fn parses_hex() {
        assert_eq!(parse_hex_rgb("#FF0000").unwrap(), [1.0, 0.0, 0.0]);
        assert_eq!(parse_hex_rgb("00ff00").unwrap(), [0.0, 1.0, 0.0]);
        assert!(parse_hex_rgb("#12345").is_err());
        assert!(parse_hex_rgb("#zzzzzz").is_err());
    }

    #[test]
    fn scale_endpoints_and_reverse() {
        let texels = color_map_texels("interpolateGreys", false).unwrap();
        assert_eq!(texels.len(), COLOR_MAP_RES * 4);
        assert_eq!(&texels[..4], &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(&texels[texels.len() - 4..], &[0.0, 0.0, 0.0, 1.0]);

        let reversed = color_map_texels("Greys", true).unwrap();
        assert_eq!(&reversed[..4], &[0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn interpolates_between_stops() {
        let mid = color_at("interpolateGreys", 0.5).unwrap();
        // 0.5 lands exactly on the fifth stop, #969696.
        assert_close(mid[0], 150.0 / 255.0, 1e-6);
    }

    #[test]
    fn hex_is_a_constant_scale_and_unknown_fails() {
        assert_eq!(color_at("#0000ff", 0.3).unwrap(), [0.0, 0.0, 1.0]);
        assert!(color_at("interpolateNope", 0.3).is_err());
    }

    #[test]
    fn min_max_normalization() {
        assert_eq!(normalize_min_max(&[2.0, 4.0, 3.0]), vec![0.0, 1.0, 0.5]);
        assert_eq!(normalize_min_max(&[5.0, 5.0]), vec![0.0, 0.0]);
        assert!(normalize_min_max(&[]).is_empty());
        assert_eq!(normalize_min_max(&[f64::NAN, 1.0, 3.0]), vec![NO_DATA, 0.0, 1.0]);
        assert_eq!(normalize_min_max(&[f64::NAN; 2]), vec![NO_DATA; 2]);
    }
}
