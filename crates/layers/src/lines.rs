use foundation::Result;
use gpu::{Primitive, RenderDevice, RenderStyle};
use scene::LevelType;

use crate::info::LayerInfo;
use crate::layer::{
    Layer, LayerCore, function_by_coordinate, function_by_object, load_shaders,
    object_first_coordinate, vertices_by_coordinate, vertices_by_object,
};

/// Polylines drawn as one line strip per component.
#[derive(Debug, Clone)]
pub struct LinesLayer {
    core: LayerCore,
}

impl LinesLayer {
    pub fn new<D: RenderDevice + ?Sized>(
        device: &mut D,
        info: LayerInfo,
        z_order: u32,
        centroid: [f64; 3],
    ) -> Result<Self> {
        let shaders = load_shaders(device, &info, "lines", |style| {
            matches!(
                style,
                RenderStyle::FlatColor
                    | RenderStyle::SmoothColor
                    | RenderStyle::Outline
                    | RenderStyle::FlatColorPoints
            )
        })?;
        Ok(Self {
            core: LayerCore::new(info, z_order, centroid, shaders),
        })
    }
}

impl Layer for LinesLayer {
    fn core(&self) -> &LayerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayerCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        "lines"
    }

    fn primitive(&self) -> Primitive {
        Primitive::LineStrip
    }

    fn function_value_index_of_id(&self, id: usize, level: LevelType) -> Result<Option<usize>> {
        match level {
            LevelType::Coordinates => Ok(Some(id)),
            LevelType::Objects => Ok(object_first_coordinate(&self.core.mesh, id)),
            LevelType::Coordinates3d => Err(self.unsupported("COORDINATES3D level")),
        }
    }

    fn coords_by_level(&self, level: LevelType) -> Result<Vec<Vec<[f64; 3]>>> {
        match level {
            LevelType::Coordinates => Ok(vertices_by_coordinate(&self.core.mesh)),
            LevelType::Objects => Ok(vertices_by_object(&self.core.mesh)),
            LevelType::Coordinates3d => Err(self.unsupported("COORDINATES3D level")),
        }
    }

    fn function_by_level(&self, level: LevelType, knot: &str) -> Result<Vec<Vec<f64>>> {
        match level {
            LevelType::Coordinates => function_by_coordinate(&self.core.mesh, knot),
            LevelType::Objects => function_by_object(&self.core.mesh, knot),
            LevelType::Coordinates3d => Err(self.unsupported("COORDINATES3D level")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LinesLayer;
    use crate::info::{LayerInfo, LayerType};
    use crate::layer::Layer;
    use gpu::recording::RecordingDevice;
    use gpu::{Primitive, RenderStyle};
    use pretty_assertions::assert_eq;
    use scene::{Aggregation, FeatureGeometry, LayerFeature, LevelType};

    fn line(n: usize, y: f64) -> LayerFeature {
        LayerFeature::new(FeatureGeometry::with_coordinates(
            (0..n).flat_map(|i| [i as f64, y]).collect(),
        ))
    }

    fn roads(device: &mut RecordingDevice) -> LinesLayer {
        let info = LayerInfo::new("roads", LayerType::Lines2dLayer, vec![RenderStyle::FlatColor]);
        let mut layer = LinesLayer::new(device, info, 1, [0.0; 3]).unwrap();
        layer.update_features(&[line(3, 0.0), line(2, 5.0)]).unwrap();
        layer
    }

    #[test]
    fn object_level_groups_follow_components() {
        let mut device = RecordingDevice::new(8, 8);
        let mut layer = roads(&mut device);

        let coords = layer.coords_by_level(LevelType::Objects).unwrap();
        assert_eq!(coords.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 2]);
        assert_eq!(coords[1][0], [0.0, 5.0, 0.0]);

        layer
            .direct_add_mesh_function(vec![7.0, 7.0, 7.0, 2.0, 2.0], "noise")
            .unwrap();
        let functions = layer.function_by_level(LevelType::Objects, "noise").unwrap();
        assert_eq!(functions, vec![vec![7.0, 7.0, 7.0], vec![2.0, 2.0]]);
        assert_eq!(layer.function_value_index_of_id(1, LevelType::Objects).unwrap(), Some(3));
        assert_eq!(layer.function_value_index_of_id(4, LevelType::Objects).unwrap(), None);
    }

    #[test]
    fn three_dimensional_level_is_unsupported() {
        let mut device = RecordingDevice::new(8, 8);
        let layer = roads(&mut device);

        let err = layer.coords_by_level(LevelType::Coordinates3d).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(err.to_string(), "COORDINATES3D level is not supported for lines layers");
        assert!(layer.function_by_level(LevelType::Coordinates3d, "k").unwrap_err().is_unsupported());
        assert!(layer.highlights_by_level(LevelType::Objects).unwrap_err().is_unsupported());
        assert!(layer.selected_filtering().unwrap_err().is_unsupported());
        assert!(
            layer
                .inner_agg(Some(vec![1.0]), LevelType::Coordinates, LevelType::Objects, Aggregation::Avg)
                .unwrap_err()
                .is_unsupported()
        );
    }

    #[test]
    fn renders_one_strip_per_component() {
        let mut device = RecordingDevice::new(8, 8);
        let mut layer = roads(&mut device);
        let picks = layer.render(&mut device, &gpu::FrameUniforms::default()).unwrap();
        assert!(picks.is_empty());

        let draws: Vec<_> = device.draws().iter().map(|d| (d.primitive, d.first, d.count)).collect();
        assert_eq!(
            draws,
            vec![(Primitive::LineStrip, 0, 3), (Primitive::LineStrip, 3, 2)]
        );
    }

    #[test]
    fn rejects_color_map_styles() {
        let mut device = RecordingDevice::new(8, 8);
        let info = LayerInfo::new("roads", LayerType::Lines2dLayer, vec![RenderStyle::SmoothColorMap]);
        let err = LinesLayer::new(&mut device, info, 1, [0.0; 3]).unwrap_err();
        assert!(err.to_string().contains("SMOOTH_COLOR_MAP"));
    }
}
