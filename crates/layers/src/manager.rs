//! Owns the loaded layers and resolves knots through their join metadata.

use foundation::bounds::Aabb2;
use foundation::{EngineError, Result};
use gpu::RenderDevice;
use scene::level::{aggregate, broadcast_per_component};
use scene::{Aggregation, LayerFeature, LevelType};
use tracing::{debug, error, info};

use crate::buildings::BuildingsLayer;
use crate::heatmap::HeatmapLayer;
use crate::info::{LayerInfo, LayerPayload, LayerType};
use crate::layer::Layer;
use crate::lines::LinesLayer;
use crate::link::{JoinedJson, JoinedObjects, Knot, LinkDescription, Predicate};
use crate::points::PointsLayer;
use crate::symbology::MapStyle;
use crate::triangles::TrianglesLayer;

/// Every layer variant the engine can build.
#[derive(Debug, Clone)]
pub enum MapLayer {
    Points(PointsLayer),
    Lines(LinesLayer),
    Triangles(TrianglesLayer),
    Buildings(BuildingsLayer),
    Heatmap(HeatmapLayer),
}

impl MapLayer {
    /// Build the variant for `info.layer_type`. `None` for unknown types.
    pub fn build<D: RenderDevice + ?Sized>(
        device: &mut D,
        info: LayerInfo,
        z_order: u32,
        centroid: [f64; 3],
    ) -> Result<Option<Self>> {
        let layer = match info.layer_type {
            LayerType::PointsLayer => Self::Points(PointsLayer::new(device, info, z_order, centroid)?),
            LayerType::Lines2dLayer | LayerType::Lines3dLayer => {
                Self::Lines(LinesLayer::new(device, info, z_order, centroid)?)
            }
            LayerType::Triangles2dLayer | LayerType::Triangles3dLayer => {
                Self::Triangles(TrianglesLayer::new(device, info, z_order, centroid, false)?)
            }
            LayerType::PolygonsLayer => {
                Self::Triangles(TrianglesLayer::new(device, info, z_order, centroid, true)?)
            }
            LayerType::BuildingsLayer => {
                Self::Buildings(BuildingsLayer::new(device, info, z_order, centroid)?)
            }
            LayerType::HeatmapLayer => Self::Heatmap(HeatmapLayer::new(device, info, z_order, centroid)?),
            LayerType::Unknown => return Ok(None),
        };
        Ok(Some(layer))
    }

    pub fn as_layer(&self) -> &dyn Layer {
        match self {
            Self::Points(l) => l,
            Self::Lines(l) => l,
            Self::Triangles(l) => l,
            Self::Buildings(l) => l,
            Self::Heatmap(l) => l,
        }
    }

    pub fn as_layer_mut(&mut self) -> &mut dyn Layer {
        match self {
            Self::Points(l) => l,
            Self::Lines(l) => l,
            Self::Triangles(l) => l,
            Self::Buildings(l) => l,
            Self::Heatmap(l) => l,
        }
    }
}

#[derive(Debug, Default)]
pub struct LayerManager {
    layers: Vec<MapLayer>,
    filter_bbox: Option<Aabb2>,
}

impl LayerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layers in insertion order, which is also ascending z-order.
    pub fn layers(&self) -> &[MapLayer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [MapLayer] {
        &mut self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn clear(&mut self) {
        self.layers.clear();
        self.filter_bbox = None;
    }

    /// Build a layer from `info` and `features` and add it on top.
    ///
    /// Nothing is added unless geometry and shaders load. Unknown layer types
    /// are logged and yield `None`.
    pub fn create_layer<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        info: LayerInfo,
        centroid: [f64; 3],
        features: &[LayerFeature],
    ) -> Result<Option<&mut MapLayer>> {
        self.insert(device, info, centroid, features, None, None)
    }

    /// Load a batch of payloads in order, applying joins and theme colors.
    /// Returns how many layers were added.
    pub fn init_layers<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        payloads: Vec<LayerPayload>,
        centroid: [f64; 3],
        style: &MapStyle,
    ) -> Result<usize> {
        let before = self.layers.len();
        for payload in payloads {
            self.insert(device, payload.info, centroid, &payload.data, payload.joined, Some(style))?;
        }
        Ok(self.layers.len() - before)
    }

    fn insert<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        info: LayerInfo,
        centroid: [f64; 3],
        features: &[LayerFeature],
        joined: Option<JoinedJson>,
        style: Option<&MapStyle>,
    ) -> Result<Option<&mut MapLayer>> {
        let z_order = self.layers.len() as u32 + 1;
        let (id, layer_type) = (info.id.clone(), info.layer_type);
        let Some(mut layer) = MapLayer::build(device, info, z_order, centroid)? else {
            error!(layer = %id, "unknown layer type, skipping");
            return Ok(None);
        };

        let target = layer.as_layer_mut();
        if let Some(joined) = joined {
            target.set_joined(joined);
        }
        target.update_features(features)?;
        if let Some(style) = style {
            target.update_style(style);
        }
        if let Some(bbox) = self.filter_bbox {
            target.set_filtered(Some(bbox));
        }

        info!(layer = %id, %layer_type, z_order, features = features.len(), "layer created");
        self.layers.push(layer);
        Ok(self.layers.last_mut())
    }

    pub fn search_by_layer_id(&self, id: &str) -> Option<&MapLayer> {
        self.layers.iter().find(|l| l.as_layer().id() == id)
    }

    pub fn search_by_layer_id_mut(&mut self, id: &str) -> Option<&mut MapLayer> {
        self.layers.iter_mut().find(|l| l.as_layer().id() == id)
    }

    fn require(&self, id: &str) -> Result<&dyn Layer> {
        self.search_by_layer_id(id)
            .map(MapLayer::as_layer)
            .ok_or_else(|| EngineError::UnknownLayer(id.to_string()))
    }

    pub fn joined_objects(&self, layer: &str, link: &LinkDescription) -> Option<&JoinedObjects> {
        self.search_by_layer_id(layer)?.as_layer().joined_objects(link)
    }

    pub fn filter_bbox(&self) -> Option<Aabb2> {
        self.filter_bbox
    }

    /// Filter every layer to the objects touching `bbox`. Color maps
    /// renormalize over what stays visible.
    pub fn set_filter_bbox(&mut self, bbox: Option<Aabb2>) {
        self.filter_bbox = bbox;
        for layer in &mut self.layers {
            layer.as_layer_mut().set_filtered(bbox);
        }
        debug!(?bbox, "filter updated");
    }

    /// Resolve `knot` and recolor its target layer with the result.
    pub fn load_knot(&mut self, knot: &Knot) -> Result<()> {
        let target = knot
            .target_layer()
            .ok_or_else(|| EngineError::config(format!("knot {} has an empty link scheme", knot.id)))?
            .to_string();
        let values = self.get_abstract_data_from_link(&knot.link_scheme, &knot.aggregation_scheme)?;

        let layer = self
            .search_by_layer_id_mut(&target)
            .ok_or_else(|| EngineError::UnknownLayer(target.clone()))?
            .as_layer_mut();
        layer.add_mesh_function(values, &knot.id)?;
        if let Some(map) = &knot.color_map {
            let reverse = layer.info().reverse_color_map;
            layer.set_color_map(map, reverse)?;
        }
        layer.update_function(&knot.id)?;
        info!(knot = %knot.id, layer = %target, "knot loaded");
        Ok(())
    }

    /// Walk `links` from the abstract source to the last physical layer,
    /// aggregating at every hop. The result has one value per coordinate of
    /// the last link's layer, or `None` when no link carried data.
    pub fn get_abstract_data_from_link(
        &self,
        links: &[LinkDescription],
        aggregations: &[Aggregation],
    ) -> Result<Option<Vec<f64>>> {
        let Some(first) = links.first() else {
            return Err(EngineError::config("a link scheme needs at least one link"));
        };
        if aggregations.len() != links.len() {
            return Err(EngineError::config(format!(
                "{} aggregations for {} links: every link needs one (or NONE)",
                aggregations.len(),
                links.len()
            )));
        }
        if !first.is_abstract {
            return Err(EngineError::config(
                "the first link must join an abstract layer to a physical one",
            ));
        }

        let mut values: Option<Vec<f64>> = None;
        for (link, aggregation) in links.iter().zip(aggregations) {
            let this = self.require(&link.this_layer)?;
            values = if link.is_abstract {
                self.abstract_values(this, link)?.or(values)
            } else {
                self.physical_values(this, link, *aggregation, values)?
            };
        }
        Ok(values)
    }

    fn abstract_values(&self, this: &dyn Layer, link: &LinkDescription) -> Result<Option<Vec<f64>>> {
        let objects = joined_or_err(this, link)?;
        let Some(other) = &objects.other_values else {
            return Ok(None);
        };
        Ok(Some(match link.this_level {
            Some(LevelType::Objects) => broadcast_per_component(other, &this.mesh().coords_per_comp()),
            _ => other.clone(),
        }))
    }

    fn physical_values(
        &self,
        this: &dyn Layer,
        link: &LinkDescription,
        aggregation: Aggregation,
        values: Option<Vec<f64>>,
    ) -> Result<Option<Vec<f64>>> {
        let (Some(this_level), Some(other_level)) = (link.this_level, link.other_level) else {
            return Ok(values);
        };
        let Some(current) = values else {
            return Ok(None);
        };

        if link.predicate == Predicate::Inneragg {
            return this.inner_agg(Some(current), other_level, this_level, aggregation);
        }
        if link.other_layer.as_deref() == Some(link.this_layer.as_str()) {
            return Err(EngineError::config(
                "only the INNERAGG predicate can join a layer with itself",
            ));
        }

        let objects = joined_or_err(this, link)?;
        let (Some(other_ids), Some(other_id)) = (&objects.other_ids, &link.other_layer) else {
            return Ok(Some(current));
        };
        let other = self.require(other_id)?;

        let mut aggregated = Vec::with_capacity(other_ids.len());
        for ids in other_ids {
            let ids = match ids {
                Some(ids) if !ids.is_empty() => ids,
                // unmatched elements read as 0
                _ => {
                    aggregated.push(0.0);
                    continue;
                }
            };
            if aggregation == Aggregation::None {
                return Err(EngineError::config(
                    "NONE aggregation cannot be used when linking two physical layers",
                ));
            }
            let mut joined = Vec::with_capacity(ids.len());
            for id in ids {
                let value = other
                    .function_value_index_of_id(*id as usize, other_level)?
                    .and_then(|index| current.get(index).copied())
                    .ok_or_else(|| {
                        EngineError::config(format!(
                            "no function value for element {id} of layer {other_id} at {other_level}"
                        ))
                    })?;
                joined.push(value);
            }
            aggregated.push(aggregate(&joined, aggregation)?);
        }

        debug!(
            from = %other_id,
            to = %link.this_layer,
            predicate = ?link.predicate,
            elements = aggregated.len(),
            "physical join aggregated"
        );
        Ok(Some(match this_level {
            LevelType::Objects => broadcast_per_component(&aggregated, &this.mesh().coords_per_comp()),
            _ => aggregated,
        }))
    }
}

fn joined_or_err<'a>(layer: &'a dyn Layer, link: &LinkDescription) -> Result<&'a JoinedObjects> {
    layer.joined_objects(link).ok_or_else(|| {
        EngineError::config(format!(
            "joined objects for {:?} not found in layer {}",
            link.predicate,
            layer.id()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::{LayerManager, MapLayer};
    use crate::info::{LayerInfo, LayerPayload, LayerType};
    use crate::link::{JoinedJson, JoinedLayer, JoinedObjects, Knot, LinkDescription, Predicate};
    use crate::symbology::MapStyle;
    use foundation::EngineError;
    use foundation::bounds::Aabb2;
    use gpu::RenderStyle;
    use gpu::recording::RecordingDevice;
    use pretty_assertions::assert_eq;
    use scene::{Aggregation, FeatureGeometry, LayerFeature, LevelType};

    fn triangle(x: f64) -> LayerFeature {
        LayerFeature::new(FeatureGeometry::with_triangles(
            vec![x, 0.0, x + 1.0, 0.0, x, 1.0],
            vec![0, 1, 2],
        ))
    }

    fn segment(y: f64) -> LayerFeature {
        LayerFeature::new(FeatureGeometry::with_coordinates(vec![0.0, y, 1.0, y]))
    }

    fn abstract_link(this_level: LevelType) -> LinkDescription {
        LinkDescription {
            this_layer: "zip".into(),
            other_layer: Some("census".into()),
            predicate: Predicate::Inneragg,
            this_level: Some(this_level),
            other_level: Some(LevelType::Objects),
            is_abstract: true,
        }
    }

    fn physical_link() -> LinkDescription {
        LinkDescription {
            this_layer: "roads".into(),
            other_layer: Some("zip".into()),
            predicate: Predicate::Intersects,
            this_level: Some(LevelType::Objects),
            other_level: Some(LevelType::Objects),
            is_abstract: false,
        }
    }

    fn joined_for(link: &LinkDescription, objects: JoinedObjects) -> JoinedJson {
        JoinedJson {
            joined_layers: vec![JoinedLayer {
                predicate: link.predicate,
                layer_id: link.other_layer.clone().unwrap_or_default(),
                this_level: link.this_level.unwrap(),
                other_level: link.other_level.unwrap(),
                is_abstract: link.is_abstract,
            }],
            joined_objects: vec![objects],
        }
    }

    /// "zip": two triangles carrying census values per object or per
    /// coordinate; "roads": three segments joined to zip.
    fn city(device: &mut RecordingDevice, census: JoinedJson) -> LayerManager {
        let roads_joined = joined_for(
            &physical_link(),
            JoinedObjects {
                joined_layer_index: 0,
                other_values: None,
                other_ids: Some(vec![Some(vec![0, 1]), None, Some(vec![1])]),
            },
        );
        let payloads = vec![
            LayerPayload {
                info: LayerInfo::new("zip", LayerType::Triangles2dLayer, vec![RenderStyle::SmoothColorMap]),
                data: vec![triangle(0.0), triangle(5.0)],
                joined: Some(census),
            },
            LayerPayload {
                info: LayerInfo::new("roads", LayerType::Lines2dLayer, vec![RenderStyle::FlatColor]),
                data: vec![segment(0.0), segment(1.0), segment(2.0)],
                joined: Some(roads_joined),
            },
        ];
        let mut manager = LayerManager::new();
        let added = manager
            .init_layers(device, payloads, [0.0; 3], &MapStyle::default())
            .unwrap();
        assert_eq!(added, 2);
        manager
    }

    fn object_census() -> JoinedJson {
        joined_for(
            &abstract_link(LevelType::Objects),
            JoinedObjects {
                joined_layer_index: 0,
                other_values: Some(vec![10.0, 20.0]),
                other_ids: None,
            },
        )
    }

    #[test]
    fn z_order_follows_insertion_and_unknown_types_are_skipped() {
        let mut device = RecordingDevice::new(8, 8);
        let mut manager = city(&mut device, object_census());
        let skipped = manager
            .create_layer(
                &mut device,
                LayerInfo::new("voxels", LayerType::Unknown, vec![]),
                [0.0; 3],
                &[],
            )
            .unwrap();
        assert!(skipped.is_none());

        let z: Vec<_> = manager.layers().iter().map(|l| l.as_layer().z_order()).collect();
        assert_eq!(z, vec![1, 2]);
        assert!(matches!(manager.search_by_layer_id("roads"), Some(MapLayer::Lines(_))));
        assert!(manager.search_by_layer_id("voxels").is_none());
    }

    #[test]
    fn failed_construction_adds_nothing() {
        let mut device = RecordingDevice::new(8, 8);
        let mut manager = LayerManager::new();
        let info = LayerInfo::new("roads", LayerType::Lines2dLayer, vec![RenderStyle::Picking]);
        assert!(manager.create_layer(&mut device, info, [0.0; 3], &[segment(0.0)]).is_err());
        assert!(manager.is_empty());
    }

    #[test]
    fn link_scheme_validation() {
        let mut device = RecordingDevice::new(8, 8);
        let manager = city(&mut device, object_census());

        let err = manager.get_abstract_data_from_link(&[], &[]).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let links = vec![abstract_link(LevelType::Objects)];
        assert!(manager.get_abstract_data_from_link(&links, &[]).is_err());

        let err = manager
            .get_abstract_data_from_link(&[physical_link()], &[Aggregation::Avg])
            .unwrap_err();
        assert!(err.to_string().contains("first link"));

        let mut missing = abstract_link(LevelType::Objects);
        missing.this_layer = "parks".into();
        let err = manager
            .get_abstract_data_from_link(&[missing], &[Aggregation::None])
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownLayer(id) if id == "parks"));

        let mut same = physical_link();
        same.other_layer = Some("roads".into());
        let err = manager
            .get_abstract_data_from_link(&[abstract_link(LevelType::Objects), same], &[Aggregation::None, Aggregation::Avg])
            .unwrap_err();
        assert!(err.to_string().contains("INNERAGG"));
    }

    #[test]
    fn abstract_values_spread_over_objects() {
        let mut device = RecordingDevice::new(8, 8);
        let manager = city(&mut device, object_census());
        let values = manager
            .get_abstract_data_from_link(&[abstract_link(LevelType::Objects)], &[Aggregation::None])
            .unwrap();
        assert_eq!(values, Some(vec![10.0, 10.0, 10.0, 20.0, 20.0, 20.0]));
    }

    #[test]
    fn physical_join_aggregates_and_null_joins_read_zero() {
        let mut device = RecordingDevice::new(8, 8);
        let manager = city(&mut device, object_census());
        let links = vec![abstract_link(LevelType::Objects), physical_link()];

        let values = manager
            .get_abstract_data_from_link(&links, &[Aggregation::None, Aggregation::Avg])
            .unwrap();
        assert_eq!(values, Some(vec![15.0, 15.0, 0.0, 0.0, 20.0, 20.0]));

        let err = manager
            .get_abstract_data_from_link(&links, &[Aggregation::None, Aggregation::None])
            .unwrap_err();
        assert!(err.to_string().contains("NONE"));
    }

    #[test]
    fn inner_aggregation_inside_one_layer() {
        let mut device = RecordingDevice::new(8, 8);
        let census = joined_for(
            &abstract_link(LevelType::Coordinates),
            JoinedObjects {
                joined_layer_index: 0,
                other_values: Some(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
                other_ids: None,
            },
        );
        let manager = city(&mut device, census);
        let inner = LinkDescription {
            this_layer: "zip".into(),
            other_layer: Some("zip".into()),
            predicate: Predicate::Inneragg,
            this_level: Some(LevelType::Objects),
            other_level: Some(LevelType::Coordinates),
            is_abstract: false,
        };
        let values = manager
            .get_abstract_data_from_link(
                &[abstract_link(LevelType::Coordinates), inner],
                &[Aggregation::None, Aggregation::Max],
            )
            .unwrap();
        assert_eq!(values, Some(vec![3.0, 3.0, 3.0, 6.0, 6.0, 6.0]));
    }

    #[test]
    fn knot_recolors_its_target_layer() {
        let mut device = RecordingDevice::new(8, 8);
        let mut manager = city(&mut device, object_census());
        let knot = Knot {
            id: "population".into(),
            link_scheme: vec![abstract_link(LevelType::Objects)],
            aggregation_scheme: vec![Aggregation::None],
            color_map: Some("interpolateBlues".into()),
        };
        manager.load_knot(&knot).unwrap();

        let zip = manager.search_by_layer_id("zip").unwrap().as_layer();
        assert_eq!(zip.info().color_map, "interpolateBlues");
        assert_eq!(
            zip.function_by_level(LevelType::Objects, "population").unwrap(),
            vec![vec![10.0; 3], vec![20.0; 3]]
        );
    }

    #[test]
    fn filter_reaches_every_mesh() {
        let mut device = RecordingDevice::new(8, 8);
        let mut manager = city(&mut device, object_census());
        manager.set_filter_bbox(Some(Aabb2::from_array([4.0, -1.0, 7.0, 2.0])));

        let zip = manager.search_by_layer_id("zip").unwrap().as_layer();
        assert_eq!(zip.mesh().filtered(), &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let roads = manager.search_by_layer_id("roads").unwrap().as_layer();
        assert_eq!(roads.mesh().filtered(), &[0.0; 6]);

        manager.set_filter_bbox(None);
        let zip = manager.search_by_layer_id("zip").unwrap().as_layer();
        assert_eq!(zip.mesh().filtered(), &[1.0; 6]);
    }
}
