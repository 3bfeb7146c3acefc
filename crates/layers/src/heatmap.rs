use foundation::Result;
use gpu::{Primitive, RenderDevice, RenderStyle};
use scene::LevelType;

use crate::info::LayerInfo;
use crate::layer::{Layer, LayerCore, function_by_coordinate, load_shaders, per_face_average, vertices_by_coordinate};

/// Scalar field over a triangulated grid. Only addressable per 3D coordinate.
#[derive(Debug, Clone)]
pub struct HeatmapLayer {
    core: LayerCore,
}

impl HeatmapLayer {
    pub fn new<D: RenderDevice + ?Sized>(
        device: &mut D,
        info: LayerInfo,
        z_order: u32,
        centroid: [f64; 3],
    ) -> Result<Self> {
        let shaders = load_shaders(device, &info, "heatmap", |style| {
            !matches!(
                style,
                RenderStyle::SmoothColorMapTex
                    | RenderStyle::Picking
                    | RenderStyle::AbstractSurfaces
                    | RenderStyle::ColorPoints
                    | RenderStyle::FlatColorPoints
            )
        })?;
        Ok(Self {
            core: LayerCore::new(info, z_order, centroid, shaders),
        })
    }
}

impl Layer for HeatmapLayer {
    fn core(&self) -> &LayerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayerCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        "heatmap"
    }

    fn primitive(&self) -> Primitive {
        Primitive::Triangles
    }

    fn distribute_function_values(&self, values: Option<Vec<f64>>) -> Option<Vec<f64>> {
        values.map(|v| per_face_average(&self.core.mesh, &v))
    }

    fn function_value_index_of_id(&self, id: usize, level: LevelType) -> Result<Option<usize>> {
        match level {
            LevelType::Coordinates3d => Ok(Some(id)),
            other => Err(self.unsupported(&format!("{other} level"))),
        }
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
    use super::HeatmapLayer;
    use crate::info::{LayerInfo, LayerType};
    use crate::layer::Layer;
    use gpu::RenderStyle;
    use gpu::recording::RecordingDevice;
    use pretty_assertions::assert_eq;
    use scene::{FeatureGeometry, LayerFeature, LevelType};

    fn grid(device: &mut RecordingDevice) -> HeatmapLayer {
        let info = LayerInfo::new("noise", LayerType::HeatmapLayer, vec![RenderStyle::SmoothColorMap]);
        let mut layer = HeatmapLayer::new(device, info, 1, [0.0; 3]).unwrap();
        layer
            .update_features(&[LayerFeature::new(FeatureGeometry::with_triangles(
                vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
                vec![0, 1, 2, 0, 2, 3],
            ))])
            .unwrap();
        layer
    }

    #[test]
    fn only_the_3d_level_is_available() {
        let mut device = RecordingDevice::new(8, 8);
        let mut layer = grid(&mut device);

        assert_eq!(layer.coords_by_level(LevelType::Coordinates3d).unwrap().len(), 4);
        assert!(layer.coords_by_level(LevelType::Objects).unwrap_err().is_unsupported());
        assert!(layer.function_value_index_of_id(0, LevelType::Coordinates).unwrap_err().is_unsupported());
        assert!(layer.highlights_by_level(LevelType::Coordinates3d).unwrap_err().is_unsupported());
        assert!(layer.set_highlight_elements(&[0], LevelType::Coordinates3d, true).is_err());

        // without cell ids every triangle is its own cell
        layer.direct_add_mesh_function(vec![3.0, 3.0, 0.0, 0.0], "noise").unwrap();
        let values = layer.function_by_level(LevelType::Coordinates3d, "noise").unwrap();
        assert_eq!(values, vec![vec![1.0], vec![2.0], vec![1.0], vec![1.0]]);
    }

    #[test]
    fn rejects_picking() {
        let mut device = RecordingDevice::new(8, 8);
        let info = LayerInfo::new(
            "noise",
            LayerType::HeatmapLayer,
            vec![RenderStyle::SmoothColorMap, RenderStyle::Picking],
        );
        assert!(HeatmapLayer::new(&mut device, info, 1, [0.0; 3]).is_err());
    }
}
