use foundation::bounds::Aabb2;
use foundation::{EngineError, Result};
use gpu::{ClearRequest, FrameUniforms, Primitive, RenderDevice, RenderStyle};
use scene::picking::PickOutcome;
use scene::{Aggregation, LevelType};
use tracing::debug;

use crate::info::LayerInfo;
use crate::layer::{
    Layer, LayerCore, PassOrder, aggregate_per_object, element_coordinates, function_by_coordinate,
    function_by_object, highlights_from, load_shaders, object_first_coordinate, per_face_average,
    vertices_by_coordinate, vertices_by_object,
};

/// Extruded buildings. Each component is one building whose triangles carry
/// the id of the facade cell they belong to; the 2D footprint of every
/// section is kept for the COORDINATES level.
#[derive(Debug, Clone)]
pub struct BuildingsLayer {
    core: LayerCore,
}

impl BuildingsLayer {
    pub fn new<D: RenderDevice + ?Sized>(
        device: &mut D,
        info: LayerInfo,
        z_order: u32,
        centroid: [f64; 3],
    ) -> Result<Self> {
        let shaders = load_shaders(device, &info, "buildings", |style| {
            !matches!(style, RenderStyle::ColorPoints | RenderStyle::FlatColorPoints)
        })?;
        Ok(Self {
            core: LayerCore::new(info, z_order, centroid, shaders),
        })
    }

    /// Vertices of the first section footprint of every building, z = 0.
    fn footprint_coordinates(&self) -> Vec<Vec<[f64; 3]>> {
        let mut out = Vec::new();
        for footprints in self.core.mesh.section_footprints() {
            let Some(first) = footprints.first() else {
                continue;
            };
            out.extend(first.chunks_exact(2).map(|p| vec![[p[0], p[1], 0.0]]));
        }
        out
    }

    fn group_sizes(&self, level: LevelType) -> Result<Vec<usize>> {
        match level {
            LevelType::Coordinates => Err(self.unsupported("highlight at COORDINATES")),
            LevelType::Coordinates3d => Ok(vec![1; self.core.mesh.total_number_of_coords()]),
            LevelType::Objects => Ok(self.core.mesh.coords_per_comp()),
        }
    }
}

impl Layer for BuildingsLayer {
    fn core(&self) -> &LayerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayerCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        "buildings"
    }

    fn primitive(&self) -> Primitive {
        Primitive::Triangles
    }

    fn distribute_function_values(&self, values: Option<Vec<f64>>) -> Option<Vec<f64>> {
        values.map(|v| per_face_average(&self.core.mesh, &v))
    }

    fn inner_agg(
        &self,
        values: Option<Vec<f64>>,
        start: LevelType,
        end: LevelType,
        aggregation: Aggregation,
    ) -> Result<Option<Vec<f64>>> {
        if end != LevelType::Objects || start == LevelType::Objects {
            return Err(EngineError::config(format!(
                "buildings layers only aggregate to OBJECTS, got {start} to {end}"
            )));
        }
        if start == LevelType::Coordinates {
            return Err(self.unsupported("aggregation from COORDINATES (building footprints)"));
        }
        let Some(values) = values else {
            return Ok(None);
        };
        aggregate_per_object(&self.core.mesh, &values, aggregation).map(Some)
    }

    fn function_value_index_of_id(&self, id: usize, level: LevelType) -> Result<Option<usize>> {
        match level {
            LevelType::Coordinates => Err(self.unsupported("function values at COORDINATES")),
            LevelType::Objects => Ok(object_first_coordinate(&self.core.mesh, id)),
            LevelType::Coordinates3d => Ok(Some(id)),
        }
    }

    fn coords_by_level(&self, level: LevelType) -> Result<Vec<Vec<[f64; 3]>>> {
        Ok(match level {
            LevelType::Coordinates => self.footprint_coordinates(),
            LevelType::Coordinates3d => vertices_by_coordinate(&self.core.mesh),
            LevelType::Objects => vertices_by_object(&self.core.mesh),
        })
    }

    fn function_by_level(&self, level: LevelType, knot: &str) -> Result<Vec<Vec<f64>>> {
        match level {
            LevelType::Coordinates => Err(self.unsupported("function values at COORDINATES")),
            LevelType::Coordinates3d => function_by_coordinate(&self.core.mesh, knot),
            LevelType::Objects => function_by_object(&self.core.mesh, knot),
        }
    }

    fn highlights_by_level(&self, level: LevelType) -> Result<Vec<bool>> {
        let sizes = self.group_sizes(level)?;
        let flags = match self.core.auxiliary() {
            Some(aux) => aux.color_or_picked().to_vec(),
            None => vec![0.0; self.core.mesh.total_number_of_coords()],
        };
        Ok(highlights_from(&flags, &sizes))
    }

    fn set_highlight_elements(&mut self, elements: &[usize], level: LevelType, value: bool) -> Result<()> {
        let coordinates = element_coordinates(&self.group_sizes(level)?, elements)?;
        match self.core.auxiliary_mut() {
            Some(aux) => aux.set_highlight_elements(&coordinates, value),
            None => debug!(layer = %self.core.info.id, "no color map to highlight"),
        }
        Ok(())
    }

    fn selected_filtering(&self) -> Result<Option<Aabb2>> {
        Ok(self.core.filter_selection_bbox())
    }

    fn render(&mut self, device: &mut dyn RenderDevice, frame: &FrameUniforms) -> Result<Vec<PickOutcome>> {
        device.clear(ClearRequest::stencil(0));
        self.core
            .render_shaders(device, frame, Primitive::Triangles, PassOrder::SurfacesFirstNoOutline)
    }
}

#[cfg(test)]
mod tests {
    use super::BuildingsLayer;
    use crate::info::{LayerInfo, LayerType};
    use crate::layer::Layer;
    use gpu::recording::{Command, RecordingDevice};
    use gpu::{ClearRequest, FrameUniforms, RenderStyle};
    use pretty_assertions::assert_eq;
    use scene::{Aggregation, FeatureGeometry, LayerFeature, LevelType};

    fn assert_close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-9, "{a:?} vs {b:?}");
        }
    }

    /// A wall of two cells: cell 0 is a quad split in two triangles, cell 1
    /// a single triangle.
    fn building(x: f64) -> LayerFeature {
        LayerFeature::new(FeatureGeometry {
            ids: Some(vec![0, 0, 1]),
            section_footprint: Some(vec![vec![x, 0.0, x + 1.0, 0.0, x + 1.0, 1.0]]),
            ..FeatureGeometry::with_triangles(
                vec![
                    x, 0.0, 0.0, x + 1.0, 0.0, 0.0, x, 0.0, 1.0, x + 1.0, 0.0, 1.0, //
                    x, 0.0, 2.0, x + 1.0, 0.0, 2.0, x, 0.0, 3.0,
                ],
                vec![0, 1, 2, 1, 3, 2, 4, 5, 6],
            )
        })
    }

    fn layer(device: &mut RecordingDevice, styles: Vec<RenderStyle>) -> BuildingsLayer {
        let info = LayerInfo::new("buildings", LayerType::BuildingsLayer, styles);
        let mut layer = BuildingsLayer::new(device, info, 3, [0.0; 3]).unwrap();
        layer.update_features(&[building(0.0)]).unwrap();
        layer
    }

    #[test]
    fn function_values_average_per_cell() {
        let mut device = RecordingDevice::new(8, 8);
        let mut layer = layer(&mut device, vec![RenderStyle::SmoothColorMap, RenderStyle::Picking]);

        layer
            .direct_add_mesh_function(vec![3.0, 0.0, 0.0, 6.0, 9.0, 0.0, 0.0], "shadow")
            .unwrap();
        let values = layer.function_by_level(LevelType::Coordinates3d, "shadow").unwrap();
        let flat: Vec<f64> = values.into_iter().flatten().collect();
        assert_close(&flat, &[1.5, 1.5, 1.5, 1.5, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn coordinates_level_reads_footprints() {
        let mut device = RecordingDevice::new(8, 8);
        let layer = layer(&mut device, vec![RenderStyle::SmoothColor]);

        let coords = layer.coords_by_level(LevelType::Coordinates).unwrap();
        assert_eq!(coords, vec![vec![[0.0, 0.0, 0.0]], vec![[1.0, 0.0, 0.0]], vec![[1.0, 1.0, 0.0]]]);
        assert!(layer.function_by_level(LevelType::Coordinates, "k").unwrap_err().is_unsupported());
        assert!(layer.highlights_by_level(LevelType::Coordinates).unwrap_err().is_unsupported());
        assert_eq!(layer.function_value_index_of_id(0, LevelType::Objects).unwrap(), Some(0));
        assert_eq!(layer.function_value_index_of_id(5, LevelType::Coordinates3d).unwrap(), Some(5));
    }

    #[test]
    fn inner_aggregation_starts_in_3d() {
        let mut device = RecordingDevice::new(8, 8);
        let layer = layer(&mut device, vec![RenderStyle::SmoothColor]);

        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let out = layer
            .inner_agg(Some(values.clone()), LevelType::Coordinates3d, LevelType::Objects, Aggregation::Sum)
            .unwrap();
        assert_eq!(out, Some(vec![28.0; 7]));
        assert!(
            layer
                .inner_agg(Some(values), LevelType::Coordinates, LevelType::Objects, Aggregation::Sum)
                .is_err()
        );
    }

    #[test]
    fn render_clears_stencil_and_skips_outline() {
        let mut device = RecordingDevice::new(8, 8);
        let mut layer = layer(&mut device, vec![RenderStyle::SmoothColor, RenderStyle::Outline]);
        layer.render(&mut device, &FrameUniforms::default()).unwrap();

        let first_clear = device.commands().iter().find_map(|c| match c {
            Command::Clear(r) => Some(*r),
            _ => None,
        });
        assert_eq!(first_clear, Some(ClearRequest::stencil(0)));
        let labels: Vec<_> = device.draws().iter().map(|d| d.label).collect();
        assert_eq!(labels, vec![Some("smooth-color")]);
    }

    #[test]
    fn picking_without_color_map_is_rejected() {
        let mut device = RecordingDevice::new(8, 8);
        let info = LayerInfo::new(
            "buildings",
            LayerType::BuildingsLayer,
            vec![RenderStyle::SmoothColor, RenderStyle::Picking],
        );
        let err = BuildingsLayer::new(&mut device, info, 1, [0.0; 3]).unwrap_err();
        assert!(err.to_string().contains("PICKING"));
    }
}
