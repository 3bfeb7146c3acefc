//! Stencil and raster presets used to composite overlapping layers.
//!
//! Every layer writes its z-order into the stencil where it draws; a later
//! layer only covers pixels whose stencil value is at most its own z-order.

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
}

/// `compare` tests the reference against the stored value, as in GL's
/// `stencilFunc(compare, reference, read_mask)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub compare: CompareFunction,
    pub reference: u32,
    pub read_mask: u32,
    pub fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
}

impl StencilState {
    pub fn layer_order(z_order: u32) -> Self {
        Self {
            compare: CompareFunction::GreaterEqual,
            reference: z_order,
            read_mask: 0xFF,
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass: StencilOp::Replace,
        }
    }

    pub fn outline() -> Self {
        Self::always_replace(1)
    }

    pub fn footprint() -> Self {
        Self::always_replace(2)
    }

    /// Abstract surfaces draw everywhere except over footprint pixels.
    pub fn abstract_surface() -> Self {
        Self {
            compare: CompareFunction::NotEqual,
            reference: 2,
            read_mask: 0xFF,
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass: StencilOp::Keep,
        }
    }

    fn always_replace(reference: u32) -> Self {
        Self {
            compare: CompareFunction::Always,
            reference,
            read_mask: 0xFF,
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass: StencilOp::Replace,
        }
    }

    pub fn test(&self, stored: u32) -> bool {
        let r = self.reference & self.read_mask;
        let s = stored & self.read_mask;
        match self.compare {
            CompareFunction::Never => false,
            CompareFunction::Less => r < s,
            CompareFunction::Equal => r == s,
            CompareFunction::NotEqual => r != s,
            CompareFunction::LessEqual => r <= s,
            CompareFunction::GreaterEqual => r >= s,
            CompareFunction::Always => true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub depth_test: bool,
    pub depth_compare: CompareFunction,
    pub cull_back: bool,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_compare: CompareFunction::LessEqual,
            cull_back: true,
        }
    }
}

impl RasterState {
    pub fn no_cull() -> Self {
        Self {
            cull_back: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CompareFunction, RasterState, StencilOp, StencilState};

    #[test]
    fn higher_layers_cover_lower_ones() {
        let s = StencilState::layer_order(3);
        assert!(s.test(0));
        assert!(s.test(3));
        assert!(!s.test(4));
        assert_eq!(s.pass, StencilOp::Replace);
    }

    #[test]
    fn abstract_surfaces_skip_footprint_pixels() {
        let s = StencilState::abstract_surface();
        let passed: Vec<bool> = (0..4).map(|stored| s.test(stored)).collect();
        assert_eq!(passed, vec![true, true, false, true]);
        assert_eq!(s.pass, StencilOp::Keep);
        assert!(StencilState::footprint().test(200));
        assert_eq!(StencilState::outline().reference, 1);
    }

    #[test]
    fn outline_raster_disables_culling() {
        assert!(RasterState::default().cull_back);
        assert!(!RasterState::no_cull().cull_back);
        assert_eq!(RasterState::no_cull().depth_compare, CompareFunction::LessEqual);
    }
}
