use foundation::bounds::Aabb2;
use foundation::{EngineError, Result};
use gpu::{FrameUniforms, Primitive, RenderDevice, RenderStyle};
use scene::picking::PickOutcome;
use scene::{Aggregation, LayerFeature, LevelType};
use tracing::debug;

use crate::info::LayerInfo;
use crate::layer::{
    Layer, LayerCore, PassOrder, aggregate_per_object, element_coordinates, function_by_coordinate,
    function_by_object, highlights_from, load_shaders, object_first_coordinate,
    vertices_by_coordinate, vertices_by_object,
};
use crate::vector::triangulate_features;

/// Triangulated surfaces (zip codes, parks, water). Polygon layers share this
/// type and triangulate their rings on load.
#[derive(Debug, Clone)]
pub struct TrianglesLayer {
    core: LayerCore,
    polygons: bool,
}

impl TrianglesLayer {
    pub fn new<D: RenderDevice + ?Sized>(
        device: &mut D,
        info: LayerInfo,
        z_order: u32,
        centroid: [f64; 3],
        polygons: bool,
    ) -> Result<Self> {
        let kind = if polygons { "polygons" } else { "triangles" };
        let shaders = load_shaders(device, &info, kind, |style| {
            !matches!(style, RenderStyle::ColorPoints | RenderStyle::FlatColorPoints)
        })?;
        Ok(Self {
            core: LayerCore::new(info, z_order, centroid, shaders),
            polygons,
        })
    }

    fn dimension(&self) -> usize {
        self.core.mesh.dimension()
    }

    /// Reject the coordinate level that does not match the layer's dimension.
    fn check_level(&self, level: LevelType, what: &str) -> Result<()> {
        let expected = match level {
            LevelType::Coordinates => 2,
            LevelType::Coordinates3d => 3,
            LevelType::Objects => return Ok(()),
        };
        if self.dimension() != expected {
            return Err(EngineError::config(format!(
                "{what} at {level} needs a {expected}D {} layer, {} is {}D",
                self.kind(),
                self.core.info.id,
                self.dimension()
            )));
        }
        Ok(())
    }

    fn group_sizes(&self, level: LevelType) -> Result<Vec<usize>> {
        self.check_level(level, "grouping")?;
        Ok(match level {
            LevelType::Objects => self.core.mesh.coords_per_comp(),
            _ => vec![1; self.core.mesh.total_number_of_coords()],
        })
    }
}

impl Layer for TrianglesLayer {
    fn core(&self) -> &LayerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayerCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        if self.polygons { "polygons" } else { "triangles" }
    }

    fn primitive(&self) -> Primitive {
        Primitive::Triangles
    }

    fn update_features(&mut self, features: &[LayerFeature]) -> Result<()> {
        if self.polygons {
            let features = triangulate_features(features, self.dimension())?;
            return self.core.load_geometry(&features);
        }
        self.core.load_geometry(features)
    }

    fn inner_agg(
        &self,
        values: Option<Vec<f64>>,
        start: LevelType,
        end: LevelType,
        aggregation: Aggregation,
    ) -> Result<Option<Vec<f64>>> {
        self.check_level(start, "aggregation")?;
        if end != LevelType::Objects || start == LevelType::Objects {
            return Err(EngineError::config(format!(
                "{} layers only aggregate from coordinates to OBJECTS, got {start} to {end}",
                self.kind()
            )));
        }
        let Some(values) = values else {
            return Ok(None);
        };
        aggregate_per_object(&self.core.mesh, &values, aggregation).map(Some)
    }

    fn function_value_index_of_id(&self, id: usize, level: LevelType) -> Result<Option<usize>> {
        self.check_level(level, "function index")?;
        match level {
            LevelType::Objects => Ok(object_first_coordinate(&self.core.mesh, id)),
            _ => Ok(Some(id)),
        }
    }

    fn coords_by_level(&self, level: LevelType) -> Result<Vec<Vec<[f64; 3]>>> {
        self.check_level(level, "coordinates")?;
        Ok(match level {
            LevelType::Objects => vertices_by_object(&self.core.mesh),
            _ => vertices_by_coordinate(&self.core.mesh),
        })
    }

    fn function_by_level(&self, level: LevelType, knot: &str) -> Result<Vec<Vec<f64>>> {
        self.check_level(level, "function values")?;
        match level {
            LevelType::Objects => function_by_object(&self.core.mesh, knot),
            _ => function_by_coordinate(&self.core.mesh, knot),
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
        self.core
            .render_shaders(device, frame, Primitive::Triangles, PassOrder::SurfacesFirst)
    }
}

#[cfg(test)]
mod tests {
    use super::TrianglesLayer;
    use crate::info::{LayerInfo, LayerType};
    use crate::layer::{Layer, ScreenSize};
    use gpu::recording::RecordingDevice;
    use gpu::shaders::{Surface, SurfaceKind, abstract_surface::SurfaceImage};
    use gpu::{FrameUniforms, RenderStyle};
    use pretty_assertions::assert_eq;
    use scene::picking::{PickOutcome, PickRect, PickState};
    use scene::{Aggregation, FeatureGeometry, LayerFeature, LevelType};

    fn square(x: f64) -> LayerFeature {
        LayerFeature::new(FeatureGeometry::with_triangles(
            vec![x, 0.0, x + 1.0, 0.0, x + 1.0, 1.0, x, 1.0],
            vec![0, 1, 2, 0, 2, 3],
        ))
    }

    fn zips(device: &mut RecordingDevice, styles: Vec<RenderStyle>) -> TrianglesLayer {
        let mut info = LayerInfo::new("zip", LayerType::Triangles2dLayer, styles);
        info.selectable = true;
        let mut layer = TrianglesLayer::new(device, info, 1, [0.0; 3], false).unwrap();
        layer.update_features(&[square(0.0), square(10.0)]).unwrap();
        layer
    }

    #[test]
    fn inner_aggregation_reaches_objects_only() {
        let mut device = RecordingDevice::new(8, 8);
        let layer = zips(&mut device, vec![RenderStyle::FlatColor]);

        let values = vec![1.0, 2.0, 3.0, 6.0, 0.0, 0.0, 0.0, 4.0];
        let out = layer
            .inner_agg(Some(values.clone()), LevelType::Coordinates, LevelType::Objects, Aggregation::Max)
            .unwrap();
        assert_eq!(out, Some(vec![6.0, 6.0, 6.0, 6.0, 4.0, 4.0, 4.0, 4.0]));

        assert!(
            layer
                .inner_agg(Some(values.clone()), LevelType::Objects, LevelType::Objects, Aggregation::Max)
                .is_err()
        );
        assert!(
            layer
                .inner_agg(Some(values.clone()), LevelType::Coordinates3d, LevelType::Objects, Aggregation::Max)
                .is_err()
        );
        assert!(
            layer
                .inner_agg(Some(values), LevelType::Coordinates, LevelType::Objects, Aggregation::None)
                .is_err()
        );
        assert_eq!(
            layer
                .inner_agg(None, LevelType::Coordinates, LevelType::Objects, Aggregation::Sum)
                .unwrap(),
            None
        );
    }

    #[test]
    fn highlight_elements_need_every_coordinate() {
        let mut device = RecordingDevice::new(8, 8);
        let mut layer = zips(&mut device, vec![RenderStyle::FlatColorMap, RenderStyle::Picking]);

        layer.set_highlight_elements(&[1], LevelType::Objects, true).unwrap();
        assert_eq!(layer.highlights_by_level(LevelType::Objects).unwrap(), vec![false, true]);

        layer.set_highlight_elements(&[5], LevelType::Coordinates, false).unwrap();
        assert_eq!(layer.highlights_by_level(LevelType::Objects).unwrap(), vec![false, false]);
        assert!(layer.coords_by_level(LevelType::Coordinates3d).is_err());
    }

    #[test]
    fn picks_are_forwarded_to_the_color_map() {
        let mut device = RecordingDevice::new(8, 8);
        let mut layer = zips(&mut device, vec![RenderStyle::SmoothColorMap, RenderStyle::Picking]);
        let frame = FrameUniforms::default();

        // pointer (2, 1) in an 8x8 canvas is device pixel (2, 6)
        device.paint_id(2, 6, 1);
        assert!(layer.pick_object(2.0, 1.0, ScreenSize::square(8)));
        let picks = layer.render(&mut device, &frame).unwrap();
        assert_eq!(picks, vec![PickOutcome::Object(Some(1))]);
        assert_eq!(layer.last_picked_element(), Some(1));
        assert_eq!(layer.highlights_by_level(LevelType::Objects).unwrap(), vec![false, true]);

        layer.clear_picking();
        assert_eq!(layer.last_picked_element(), None);
        assert_eq!(layer.highlights_by_level(LevelType::Objects).unwrap(), vec![false, false]);
    }

    #[test]
    fn brushing_then_filter_selection() {
        let mut device = RecordingDevice::new(8, 8);
        let mut layer = zips(&mut device, vec![RenderStyle::FlatColorMap, RenderStyle::Picking]);
        let frame = FrameUniforms::default();
        let screen = ScreenSize::square(8);

        device.paint_rect(PickRect { x: 0, y: 0, width: 8, height: 8 }, 0);
        assert!(layer.pick_region((0.0, 0.0), (8.0, 8.0), screen));
        let picks = layer.render(&mut device, &frame).unwrap();
        assert_eq!(picks, vec![PickOutcome::Region(vec![0])]);
        assert_eq!(layer.apply_brushing(), vec![0]);

        assert!(layer.pick_filter((0.0, 0.0), (8.0, 8.0), screen));
        layer.render(&mut device, &frame).unwrap();
        let bbox = layer.selected_filtering().unwrap().unwrap();
        assert_eq!(bbox.to_array(), [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn non_selectable_layers_ignore_picks() {
        let mut device = RecordingDevice::new(8, 8);
        let mut info = LayerInfo::new("zip", LayerType::Triangles2dLayer, vec![RenderStyle::FlatColorMap, RenderStyle::Picking]);
        info.selectable = false;
        let mut layer = TrianglesLayer::new(&mut device, info, 1, [0.0; 3], false).unwrap();
        layer.update_features(&[square(0.0), square(10.0)]).unwrap();
        let screen = ScreenSize::square(8);

        assert!(!layer.pick_object(2.0, 1.0, screen));
        assert!(!layer.pick_region((0.0, 0.0), (8.0, 8.0), screen));
        assert!(!layer.pick_filter((0.0, 0.0), (8.0, 8.0), screen));
        let state = layer.core().picking().map(|p| p.state().clone());
        assert_eq!(state, Some(PickState::Idle));

        let picks = layer.render(&mut device, &FrameUniforms::default()).unwrap();
        assert!(picks.is_empty());
        assert_eq!(layer.last_picked_element(), None);
    }

    #[test]
    fn picking_must_follow_a_color_map() {
        let mut device = RecordingDevice::new(8, 8);
        let info = LayerInfo::new("zip", LayerType::Triangles2dLayer, vec![RenderStyle::FlatColor, RenderStyle::Picking]);
        assert!(TrianglesLayer::new(&mut device, info, 1, [0.0; 3], false).is_err());
    }

    #[test]
    fn polygons_are_triangulated_on_load() {
        let mut device = RecordingDevice::new(8, 8);
        let info = LayerInfo::new("parks", LayerType::PolygonsLayer, vec![RenderStyle::FlatColor]);
        let mut layer = TrianglesLayer::new(&mut device, info, 2, [0.0; 3], true).unwrap();
        let ring = FeatureGeometry {
            rings: Some(vec![vec![0.0, 0.0, 4.0, 0.0, 4.0, 4.0, 0.0, 4.0, 0.0, 0.0]]),
            ..FeatureGeometry::default()
        };
        layer.update_features(&[LayerFeature::new(ring)]).unwrap();
        assert_eq!(layer.mesh().indices().len(), 6);
        assert_eq!(layer.mesh().total_number_of_coords(), 4);
        assert_eq!(layer.kind(), "polygons");
    }

    #[test]
    fn surfaces_need_the_style() {
        let mut device = RecordingDevice::new(8, 8);
        let image = SurfaceImage {
            width: 1,
            height: 1,
            rgba: vec![0.0; 4],
        };
        let surface = || {
            Surface::new(
                3,
                SurfaceKind::Abstract,
                image.clone(),
                vec![0.0; 12],
                vec![0, 1, 2, 0, 2, 3],
                vec![0.0; 8],
            )
            .unwrap()
        };

        let mut plain = zips(&mut device, vec![RenderStyle::FlatColor]);
        assert!(plain.add_surface(surface()).is_err());

        let mut layer = zips(&mut device, vec![RenderStyle::FlatColor, RenderStyle::AbstractSurfaces]);
        layer.add_surface(surface()).unwrap();
        assert!(layer.update_surface(surface()).unwrap());
        layer.render(&mut device, &FrameUniforms::default()).unwrap();
        let labels: Vec<_> = device.draws().iter().map(|d| d.label).collect();
        assert_eq!(labels, vec![Some("abstract-surface"), Some("flat-color")]);
    }
}
