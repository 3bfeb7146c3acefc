//! Object id encoding for the offscreen picking pass and the per-layer pick
//! state machine.
//!
//! Ids are written as RGBA8 little-endian. A pixel where nothing was drawn
//! keeps the clear value, all bytes 255, which decodes to "no object".

/// Read-back value of a pixel no object covered.
pub const NO_OBJECT: [u8; 4] = [255, 255, 255, 255];

pub fn encode_object_id(id: u32) -> [u8; 4] {
    id.to_le_bytes()
}

/// Same bytes as `encode_object_id`, normalized for a float vertex attribute.
pub fn encode_object_id_unorm(id: u32) -> [f32; 4] {
    encode_object_id(id).map(|b| b as f32 / 255.0)
}

pub fn decode_object_id(bytes: [u8; 4]) -> Option<u32> {
    if bytes == NO_OBJECT {
        return None;
    }
    Some(
        bytes[0] as u32
            | (bytes[1] as u32) << 8
            | (bytes[2] as u32) << 16
            | (bytes[3] as u32) << 24,
    )
}

/// Decode every pixel of an RGBA8 read-back, skipping sentinels.
pub fn decode_pixels(pixels: &[u8]) -> impl Iterator<Item = u32> + '_ {
    pixels
        .chunks_exact(4)
        .filter_map(|px| decode_object_id([px[0], px[1], px[2], px[3]]))
}

/// Pixel rectangle in device pixels, bottom-left origin.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PickRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PickRect {
    pub fn pixel(x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            width: 1,
            height: 1,
        }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Convert a CSS-pixel pointer position to a device pixel with y flipped.
pub fn to_device_pixel(
    x: f64,
    y: f64,
    client_size: (f64, f64),
    device_size: (u32, u32),
) -> (u32, u32) {
    let (cw, ch) = client_size;
    let (w, h) = (device_size.0 as f64, device_size.1 as f64);
    let px = if cw > 0.0 { x * w / cw } else { 0.0 };
    let py = if ch > 0.0 { h - y * h / ch - 1.0 } else { 0.0 };
    (
        px.clamp(0.0, (w - 1.0).max(0.0)) as u32,
        py.clamp(0.0, (h - 1.0).max(0.0)) as u32,
    )
}

/// Rectangle spanned by a drag from `anchor` to the pointer, both in CSS pixels.
/// A zero-width or zero-height drag still reads one pixel row or column.
pub fn brushing_rect(
    pointer: (f64, f64),
    anchor: (f64, f64),
    client_size: (f64, f64),
    device_size: (u32, u32),
) -> PickRect {
    let (x0, y0) = to_device_pixel(pointer.0, pointer.1, client_size, device_size);
    let (x1, y1) = to_device_pixel(anchor.0, anchor.1, client_size, device_size);
    PickRect {
        x: x0.min(x1),
        y: y0.min(y1),
        width: x0.abs_diff(x1).max(1),
        height: y0.abs_diff(y1).max(1),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PickState {
    #[default]
    Idle,
    ObjectPending {
        x: u32,
        y: u32,
    },
    RegionPending {
        rect: PickRect,
    },
    Resolved(PickOutcome),
}

/// What a picking pass found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    Object(Option<u32>),
    Region(Vec<u32>),
}

impl PickState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::ObjectPending { .. } | Self::RegionPending { .. })
    }

    /// Hand the resolved outcome to the caller and go back to idle.
    pub fn take_resolved(&mut self) -> Option<PickOutcome> {
        match std::mem::take(self) {
            Self::Resolved(outcome) => Some(outcome),
            other => {
                *self = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        NO_OBJECT, PickOutcome, PickRect, PickState, brushing_rect, decode_object_id,
        decode_pixels, encode_object_id, encode_object_id_unorm, to_device_pixel,
    };

    #[test]
    fn id_round_trips_through_bytes() {
        let bytes = encode_object_id(12345);
        assert_eq!(bytes, [57, 48, 0, 0]);
        assert_eq!(decode_object_id(bytes), Some(12345));
        assert_eq!(decode_object_id(NO_OBJECT), None);
        assert_eq!(encode_object_id_unorm(255), [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn decode_pixels_skips_sentinel() {
        let mut px = vec![];
        px.extend(encode_object_id(4));
        px.extend(NO_OBJECT);
        px.extend(encode_object_id(9));
        assert_eq!(decode_pixels(&px).collect::<Vec<_>>(), vec![4, 9]);
    }

    #[test]
    fn device_pixel_flips_y() {
        assert_eq!(to_device_pixel(0.0, 0.0, (100.0, 100.0), (200, 200)), (0, 199));
        assert_eq!(to_device_pixel(50.0, 99.5, (100.0, 100.0), (200, 200)), (100, 0));
    }

    #[test]
    fn brushing_rect_orders_corners_and_has_area() {
        let r = brushing_rect((10.0, 10.0), (4.0, 40.0), (100.0, 100.0), (100, 100));
        assert_eq!(
            r,
            PickRect {
                x: 4,
                y: 59,
                width: 6,
                height: 30
            }
        );
        let flat = brushing_rect((5.0, 5.0), (5.0, 5.0), (100.0, 100.0), (100, 100));
        assert_eq!(flat.area(), 1);
    }

    #[test]
    fn take_resolved_returns_to_idle() {
        let mut s = PickState::ObjectPending { x: 1, y: 2 };
        assert!(s.is_pending());
        assert_eq!(s.take_resolved(), None);
        assert!(s.is_pending());

        s = PickState::Resolved(PickOutcome::Object(Some(3)));
        assert_eq!(s.take_resolved(), Some(PickOutcome::Object(Some(3))));
        assert_eq!(s, PickState::Idle);
    }
}
