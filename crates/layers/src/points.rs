use foundation::Result;
use gpu::{Primitive, RenderDevice, RenderStyle};
use scene::LevelType;

use crate::info::LayerInfo;
use crate::layer::{Layer, LayerCore, function_by_coordinate, load_shaders, vertices_by_coordinate};

/// Point cloud colored per point.
#[derive(Debug, Clone)]
pub struct PointsLayer {
    core: LayerCore,
}

impl PointsLayer {
    pub fn new<D: RenderDevice + ?Sized>(
        device: &mut D,
        info: LayerInfo,
        z_order: u32,
        centroid: [f64; 3],
    ) -> Result<Self> {
        let shaders = load_shaders(device, &info, "points", |style| {
            matches!(style, RenderStyle::ColorPoints | RenderStyle::FlatColor)
        })?;
        Ok(Self {
            core: LayerCore::new(info, z_order, centroid, shaders),
        })
    }
}

impl Layer for PointsLayer {
    fn core(&self) -> &LayerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayerCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        "points"
    }

    fn primitive(&self) -> Primitive {
        Primitive::Points
    }

    fn function_value_index_of_id(&self, _id: usize, _level: LevelType) -> Result<Option<usize>> {
        Err(self.unsupported("function index lookup"))
    }

    fn coords_by_level(&self, level: LevelType) -> Result<Vec<Vec<[f64; 3]>>> {
        match level {
            LevelType::Coordinates3d => Ok(vertices_by_coordinate(&self.core.mesh)),
            other => Err(self.unsupported(&format!("{other} level"))),
        }
    }

    fn function_by_level(&self, level: LevelType, knot: &str) -> Result<Vec<Vec<f64>>> {
        match level {
            LevelType::Coordinates3d => function_by_coordinate(&self.core.mesh, knot),
            other => Err(self.unsupported(&format!("{other} level"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PointsLayer;
    use crate::info::{LayerInfo, LayerType};
    use crate::layer::Layer;
    use gpu::recording::RecordingDevice;
    use gpu::{FrameUniforms, Primitive, RenderStyle};
    use pretty_assertions::assert_eq;
    use scene::{FeatureGeometry, LayerFeature, LevelType};

    #[test]
    fn draws_every_point_with_colors() {
        let mut device = RecordingDevice::new(8, 8);
        let info = LayerInfo::new("lidar", LayerType::PointsLayer, vec![RenderStyle::ColorPoints]);
        let mut layer = PointsLayer::new(&mut device, info, 1, [0.0; 3]).unwrap();
        layer
            .update_features(&[LayerFeature::new(FeatureGeometry::with_coordinates(vec![
                0.0, 0.0, 1.0, 2.0, 0.0, 1.0, 4.0, 0.0, 3.0,
            ]))])
            .unwrap();
        layer.direct_add_mesh_function(vec![1.0, 2.0, 3.0], "height").unwrap();
        layer.update_function("height").unwrap();
        layer.render(&mut device, &FrameUniforms::default()).unwrap();

        let draws: Vec<_> = device.draws().iter().map(|d| (d.primitive, d.count)).collect();
        assert_eq!(draws, vec![(Primitive::Points, 3)]);
        assert_eq!(layer.coords_by_level(LevelType::Coordinates3d).unwrap()[2], vec![[4.0, 0.0, 3.0]]);
        assert!(layer.coords_by_level(LevelType::Objects).unwrap_err().is_unsupported());
        assert!(layer.function_value_index_of_id(0, LevelType::Coordinates3d).unwrap_err().is_unsupported());
    }

    #[test]
    fn only_point_styles() {
        let mut device = RecordingDevice::new(8, 8);
        let info = LayerInfo::new("lidar", LayerType::PointsLayer, vec![RenderStyle::SmoothColor]);
        assert!(PointsLayer::new(&mut device, info, 1, [0.0; 3]).is_err());
    }
}
