//! The shared layer protocol.
//!
//! Every layer variant owns a [`LayerCore`] (description, mesh, shader stack,
//! join metadata) and implements [`Layer`]. The provided methods cover what all
//! variants do the same way; the required ones carry the per-geometry level
//! semantics, which differ enough that no generic default is offered.

use foundation::bounds::Aabb2;
use foundation::{EngineError, Result};
use gpu::shaders::{AbstractSurface, ColorMap, ColorMapMode, ColorPoints, FlatColor, Outline, Picking, SmoothColor, Surface};
use gpu::{Auxiliary, FrameUniforms, PassContext, Primitive, RenderDevice, RenderStyle, Shader};
use scene::level::{aggregate, broadcast_per_component, component_offsets, group_by_components};
use scene::picking::{PickOutcome, brushing_rect, to_device_pixel};
use scene::{Aggregation, LayerFeature, LevelType, Mesh};
use tracing::{debug, warn};

use crate::info::LayerInfo;
use crate::link::{JoinedJson, JoinedObjects, LinkDescription};
use crate::symbology::MapStyle;

/// Canvas size in CSS pixels next to the drawing buffer size in device pixels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScreenSize {
    pub client: (f64, f64),
    pub device: (u32, u32),
}

impl ScreenSize {
    /// Same size in CSS and device pixels.
    pub fn square(side: u32) -> Self {
        Self {
            client: (side as f64, side as f64),
            device: (side, side),
        }
    }
}

/// Order in which a layer walks its shader stack.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum PassOrder {
    AsDeclared,
    /// Abstract surfaces first so their stencil marks are in place.
    SurfacesFirst,
    /// Surfaces first and outline skipped.
    SurfacesFirstNoOutline,
}

#[derive(Debug, Clone)]
pub struct LayerCore {
    pub(crate) info: LayerInfo,
    pub(crate) z_order: u32,
    pub(crate) centroid: [f64; 3],
    pub(crate) mesh: Mesh,
    pub(crate) shaders: Vec<Shader>,
    pub(crate) joined: JoinedJson,
}

impl LayerCore {
    pub(crate) fn new(info: LayerInfo, z_order: u32, centroid: [f64; 3], shaders: Vec<Shader>) -> Self {
        let mesh = Mesh::new(info.layer_type.dimension());
        Self {
            info,
            z_order,
            centroid,
            mesh,
            shaders,
            joined: JoinedJson::default(),
        }
    }

    pub(crate) fn load_geometry(&mut self, features: &[LayerFeature]) -> Result<()> {
        self.mesh.load(features, false, self.centroid)?;
        for shader in &mut self.shaders {
            shader.update_geometry(&self.mesh);
        }
        Ok(())
    }

    pub(crate) fn picking(&self) -> Option<&Picking> {
        self.shaders.iter().find_map(Shader::as_picking)
    }

    pub(crate) fn picking_mut(&mut self) -> Option<&mut Picking> {
        self.shaders.iter_mut().find_map(Shader::as_picking_mut)
    }

    /// Auxiliary shader fed by the picking pass: the last one declared before
    /// the picking style, or the first one when the layer has no picking.
    fn auxiliary_index(&self) -> Option<usize> {
        let picking = self.shaders.iter().position(|s| s.as_picking().is_some());
        let candidates = &self.shaders[..picking.unwrap_or(self.shaders.len())];
        match picking {
            Some(_) => candidates.iter().rposition(|s| s.as_auxiliary().is_some()),
            None => candidates.iter().position(|s| s.as_auxiliary().is_some()),
        }
    }

    /// Bounds of the last filter brushing, `None` while nothing is selected.
    pub(crate) fn filter_selection_bbox(&self) -> Option<Aabb2> {
        let picking = self.picking()?;
        if picking.selected_filtered().is_empty() {
            return None;
        }
        Some(picking.bbox_filtered(&self.mesh))
    }

    pub(crate) fn auxiliary(&self) -> Option<&dyn Auxiliary> {
        let i = self.auxiliary_index()?;
        self.shaders[i].as_auxiliary()
    }

    pub(crate) fn auxiliary_mut(&mut self) -> Option<&mut dyn Auxiliary> {
        let i = self.auxiliary_index()?;
        self.shaders[i].as_auxiliary_mut()
    }

    fn abstract_surface_mut(&mut self) -> Result<&mut AbstractSurface> {
        let id = &self.info.id;
        self.shaders
            .iter_mut()
            .find_map(Shader::as_abstract_surface_mut)
            .ok_or_else(|| EngineError::config(format!("layer {id} has no ABSTRACT_SURFACES style")))
    }

    pub(crate) fn render_shaders(
        &mut self,
        device: &mut dyn RenderDevice,
        frame: &FrameUniforms,
        primitive: Primitive,
        order: PassOrder,
    ) -> Result<Vec<PickOutcome>> {
        let ctx = PassContext {
            frame,
            centroid: [self.centroid[0], self.centroid[1]],
            z_order: self.z_order,
            primitive,
            mesh: &self.mesh,
        };

        let is_surface = |s: &Shader| s.style() == RenderStyle::AbstractSurfaces;
        let mut sequence: Vec<usize> = Vec::with_capacity(self.shaders.len());
        match order {
            PassOrder::AsDeclared => sequence.extend(0..self.shaders.len()),
            PassOrder::SurfacesFirst | PassOrder::SurfacesFirstNoOutline => {
                sequence.extend((0..self.shaders.len()).filter(|i| is_surface(&self.shaders[*i])));
                sequence.extend((0..self.shaders.len()).filter(|i| {
                    let s = &self.shaders[*i];
                    !is_surface(s)
                        && !(order == PassOrder::SurfacesFirstNoOutline && s.style() == RenderStyle::Outline)
                }));
            }
        }

        let mut picks = Vec::new();
        for i in sequence {
            let output = self.shaders[i].render_pass(device, &ctx)?;
            picks.extend(output.pick);
        }

        if !picks.is_empty() {
            if let Some(aux_index) = self.auxiliary_index() {
                if let Some(aux) = self.shaders[aux_index].as_auxiliary_mut() {
                    for pick in &picks {
                        forward_pick(aux, pick);
                    }
                }
            }
        }
        Ok(picks)
    }
}

fn forward_pick(aux: &mut dyn Auxiliary, pick: &PickOutcome) {
    match pick {
        PickOutcome::Object(Some(object)) => aux.set_picked_object(*object as usize),
        PickOutcome::Object(None) => {}
        PickOutcome::Region(ids) => aux.set_picked_ids(ids),
    }
}

/// Build the shader stack declared by `info.render_style`.
///
/// `supports` filters the styles a variant accepts. A PICKING style always
/// attaches to the color-map style declared right before it.
pub(crate) fn load_shaders<D: RenderDevice + ?Sized>(
    device: &mut D,
    info: &LayerInfo,
    kind: &'static str,
    supports: impl Fn(RenderStyle) -> bool,
) -> Result<Vec<Shader>> {
    let mut shaders: Vec<Shader> = Vec::with_capacity(info.render_style.len());
    for style in &info.render_style {
        if !supports(*style) {
            return Err(EngineError::config(format!(
                "{style} is not supported for {kind} layers"
            )));
        }
        let (map, reverse) = (info.color_map.as_str(), info.reverse_color_map);
        let shader = match style {
            RenderStyle::FlatColor => Shader::FlatColor(FlatColor::new(device, kind == "points")?),
            RenderStyle::FlatColorPoints => Shader::FlatColor(FlatColor::new(device, true)?),
            RenderStyle::SmoothColor => Shader::SmoothColor(SmoothColor::new(device)?),
            RenderStyle::FlatColorMap => {
                Shader::ColorMap(ColorMap::new(device, ColorMapMode::Flat, map, reverse)?)
            }
            RenderStyle::SmoothColorMap => {
                Shader::ColorMap(ColorMap::new(device, ColorMapMode::Smooth, map, reverse)?)
            }
            RenderStyle::SmoothColorMapTex => {
                Shader::ColorMap(ColorMap::new(device, ColorMapMode::SmoothTextured, map, reverse)?)
            }
            RenderStyle::Picking => {
                if shaders.last().and_then(Shader::as_auxiliary).is_none() {
                    return Err(EngineError::config(format!(
                        "layer {}: PICKING needs a color map style right before it",
                        info.id
                    )));
                }
                Shader::Picking(Picking::new(device)?)
            }
            RenderStyle::AbstractSurfaces => Shader::AbstractSurface(AbstractSurface::new(device)?),
            RenderStyle::Outline => Shader::Outline(Outline::new(device)?),
            RenderStyle::ColorPoints => Shader::ColorPoints(ColorPoints::new(device, map, reverse)?),
        };
        shaders.push(shader);
    }
    Ok(shaders)
}

/// Every vertex widened to `[x, y, z]`, z = 0 for 2D meshes.
pub(crate) fn vertices(mesh: &Mesh) -> Vec<[f64; 3]> {
    let dim = mesh.dimension().max(2);
    mesh.coordinates()
        .chunks_exact(dim)
        .map(|c| [c[0], c[1], c.get(2).copied().unwrap_or(0.0)])
        .collect()
}

pub(crate) fn vertices_by_object(mesh: &Mesh) -> Vec<Vec<[f64; 3]>> {
    group_by_components(&vertices(mesh), &mesh.coords_per_comp())
}

pub(crate) fn vertices_by_coordinate(mesh: &Mesh) -> Vec<Vec<[f64; 3]>> {
    vertices(mesh).into_iter().map(|v| vec![v]).collect()
}

/// First timestep of `knot`, empty when the knot was attached without data.
pub(crate) fn first_timestep(mesh: &Mesh, knot: &str) -> Result<Vec<f64>> {
    Ok(mesh.function(knot)?.into_iter().next().unwrap_or_default())
}

pub(crate) fn function_by_object(mesh: &Mesh, knot: &str) -> Result<Vec<Vec<f64>>> {
    Ok(group_by_components(&first_timestep(mesh, knot)?, &mesh.coords_per_comp()))
}

pub(crate) fn function_by_coordinate(mesh: &Mesh, knot: &str) -> Result<Vec<Vec<f64>>> {
    Ok(first_timestep(mesh, knot)?.into_iter().map(|v| vec![v]).collect())
}

/// Index of the coordinate that represents object `id`.
pub(crate) fn object_first_coordinate(mesh: &Mesh, id: usize) -> Option<usize> {
    component_offsets(&mesh.coords_per_comp()).get(id).copied()
}

/// Aggregate coordinate values per object and write the result back to every
/// coordinate of that object.
pub(crate) fn aggregate_per_object(mesh: &Mesh, values: &[f64], agg: Aggregation) -> Result<Vec<f64>> {
    if agg == Aggregation::None {
        return Err(EngineError::config(
            "NONE aggregation cannot be used with the INNERAGG predicate",
        ));
    }
    let per_comp = mesh.coords_per_comp();
    let mut per_object = Vec::with_capacity(per_comp.len());
    for group in group_by_components(values, &per_comp) {
        per_object.push(aggregate(&group, agg)?);
    }
    Ok(broadcast_per_component(&per_object, &per_comp))
}

/// Per-face average: each triangle takes the mean of its vertices, each cell
/// the mean of its triangles, and every vertex of a triangle the value of
/// its cell. Vertices outside any triangle end at 0.
pub(crate) fn per_face_average(mesh: &Mesh, values: &[f64]) -> Vec<f64> {
    let indices = mesh.indices();
    let ids = mesh.ids();
    let n_tri = indices.len() / 3;

    let tri_avg: Vec<f64> = indices
        .chunks_exact(3)
        .map(|t| t.iter().map(|v| values.get(*v as usize).copied().unwrap_or(0.0)).sum::<f64>() / 3.0)
        .collect();

    let cell_of = |t: usize| ids.get(t).copied().unwrap_or(t as u32);
    let mut cells: std::collections::HashMap<u32, (f64, usize)> = std::collections::HashMap::new();
    for (t, avg) in tri_avg.iter().enumerate() {
        let entry = cells.entry(cell_of(t)).or_insert((0.0, 0));
        entry.0 += avg;
        entry.1 += 1;
    }

    let mut out = vec![0.0; mesh.total_number_of_coords()];
    for t in 0..n_tri {
        let (sum, count) = cells[&cell_of(t)];
        let value = sum / count as f64;
        for v in &indices[t * 3..t * 3 + 3] {
            if let Some(slot) = out.get_mut(*v as usize) {
                *slot = value;
            }
        }
    }
    out
}

/// Coordinate indices covered by `elements`, where element `i` spans
/// `group_sizes[i]` consecutive coordinates.
pub(crate) fn element_coordinates(group_sizes: &[usize], elements: &[usize]) -> Result<Vec<usize>> {
    let offsets = component_offsets(group_sizes);
    let mut out = Vec::new();
    for e in elements {
        let (Some(start), Some(n)) = (offsets.get(*e), group_sizes.get(*e)) else {
            return Err(EngineError::config(format!(
                "element {e} out of range for {} elements",
                group_sizes.len()
            )));
        };
        out.extend(*start..start + n);
    }
    Ok(out)
}

/// Flags read back from the auxiliary shader, grouped the way `groups`
/// partitions the coordinates and collapsed by conjunction.
pub(crate) fn highlights_from(flags: &[f32], group_sizes: &[usize]) -> Vec<bool> {
    let flags: Vec<bool> = flags.iter().map(|v| *v != 0.0).collect();
    scene::level::all_highlighted(&group_by_components(&flags, group_sizes))
}

pub trait Layer {
    fn core(&self) -> &LayerCore;
    fn core_mut(&mut self) -> &mut LayerCore;

    /// Short name used in error messages ("lines", "buildings", ...).
    fn kind(&self) -> &'static str;

    fn primitive(&self) -> Primitive;

    /// Expand values to one per coordinate following the layer's semantics.
    /// Runs last, after joins and aggregations.
    fn distribute_function_values(&self, values: Option<Vec<f64>>) -> Option<Vec<f64>> {
        values
    }

    /// Aggregate coordinate values (all equal inside a `start` element) to the
    /// coarser `end` level, still one value per coordinate.
    fn inner_agg(
        &self,
        _values: Option<Vec<f64>>,
        _start: LevelType,
        _end: LevelType,
        _aggregation: Aggregation,
    ) -> Result<Option<Vec<f64>>> {
        Err(self.unsupported("inner aggregation"))
    }

    /// Index of the coordinate value that represents element `id` of `level`.
    fn function_value_index_of_id(&self, id: usize, level: LevelType) -> Result<Option<usize>>;

    /// One group of `[x, y, z]` per element of `level`.
    fn coords_by_level(&self, level: LevelType) -> Result<Vec<Vec<[f64; 3]>>>;

    fn function_by_level(&self, level: LevelType, knot: &str) -> Result<Vec<Vec<f64>>>;

    /// One flag per element of `level`; set only when all its coordinates are.
    fn highlights_by_level(&self, _level: LevelType) -> Result<Vec<bool>> {
        Err(self.unsupported("highlight"))
    }

    fn set_highlight_elements(&mut self, _elements: &[usize], _level: LevelType, _value: bool) -> Result<()> {
        Err(self.unsupported("highlight"))
    }

    /// Bounds of the objects chosen by the last filter brushing.
    fn selected_filtering(&self) -> Result<Option<Aabb2>> {
        Err(self.unsupported("filtering"))
    }

    fn render(&mut self, device: &mut dyn RenderDevice, frame: &FrameUniforms) -> Result<Vec<PickOutcome>> {
        let primitive = self.primitive();
        self.core_mut()
            .render_shaders(device, frame, primitive, PassOrder::AsDeclared)
    }

    fn unsupported(&self, operation: &str) -> EngineError {
        EngineError::unsupported(operation, self.kind())
    }

    fn id(&self) -> &str {
        &self.core().info.id
    }

    fn info(&self) -> &LayerInfo {
        &self.core().info
    }

    fn z_order(&self) -> u32 {
        self.core().z_order
    }

    fn mesh(&self) -> &Mesh {
        &self.core().mesh
    }

    fn shaders(&self) -> &[Shader] {
        &self.core().shaders
    }

    fn is_visible(&self) -> bool {
        self.core().info.visible
    }

    fn set_visible(&mut self, visible: bool) {
        self.core_mut().info.visible = visible;
    }

    fn set_joined(&mut self, joined: JoinedJson) {
        self.core_mut().joined = joined;
    }

    fn joined_objects(&self, link: &LinkDescription) -> Option<&JoinedObjects> {
        self.core().joined.objects_for(link)
    }

    /// Rebuild the mesh and hand the new geometry to every shader.
    fn update_features(&mut self, features: &[LayerFeature]) -> Result<()> {
        self.core_mut().load_geometry(features)
    }

    /// Distribute then attach `values` as `knot`. `None` attaches the knot
    /// without data.
    fn add_mesh_function(&mut self, values: Option<Vec<f64>>, knot: &str) -> Result<()> {
        let distributed = self.distribute_function_values(values);
        self.core_mut().mesh.load_function_data(distributed.as_deref(), knot)
    }

    /// Load values computed outside the link machinery.
    fn direct_add_mesh_function(&mut self, values: Vec<f64>, knot: &str) -> Result<()> {
        self.add_mesh_function(Some(values), knot)
    }

    /// Recolor every shader from `knot`.
    fn update_function(&mut self, knot: &str) -> Result<()> {
        let core = self.core_mut();
        for shader in &mut core.shaders {
            shader.update_function(&core.mesh, knot)?;
        }
        debug!(layer = %core.info.id, knot, "function updated");
        Ok(())
    }

    fn set_color_map(&mut self, name: &str, reverse: bool) -> Result<()> {
        let core = self.core_mut();
        for shader in &mut core.shaders {
            if let Shader::ColorMap(s) = shader {
                s.set_color_map(name, reverse)?;
            }
        }
        core.info.color_map = name.to_string();
        core.info.reverse_color_map = reverse;
        Ok(())
    }

    fn update_style(&mut self, style: &MapStyle) {
        let core = self.core_mut();
        let color = style.color(&core.info.style_key);
        let highlight = style.highlight();
        for shader in &mut core.shaders {
            match shader {
                Shader::ColorMap(s) => s.set_highlight_color(highlight),
                other => other.update_color(color),
            }
        }
    }

    /// Keep only the objects touching `bbox`; `None` keeps everything.
    fn set_filtered(&mut self, bbox: Option<Aabb2>) {
        let core = self.core_mut();
        core.mesh.set_filtered(bbox);
        let filtered = core.mesh.filtered().to_vec();
        for shader in &mut core.shaders {
            shader.set_filtered(&filtered);
        }
    }

    fn mark_resized(&mut self) {
        for shader in &mut self.core_mut().shaders {
            shader.mark_resized();
        }
    }

    /// Queue an object pick under the CSS-pixel pointer. Returns whether the
    /// layer is selectable and has a picking pass to serve it.
    fn pick_object(&mut self, x: f64, y: f64, screen: ScreenSize) -> bool {
        if !self.info().selectable {
            return false;
        }
        let Some(picking) = self.core_mut().picking_mut() else {
            return false;
        };
        let (px, py) = to_device_pixel(x, y, screen.client, screen.device);
        picking.request_object(px, py);
        true
    }

    /// Queue a brushing pick over the rectangle between the pointer and `anchor`.
    fn pick_region(&mut self, pointer: (f64, f64), anchor: (f64, f64), screen: ScreenSize) -> bool {
        if !self.info().selectable {
            return false;
        }
        let Some(picking) = self.core_mut().picking_mut() else {
            return false;
        };
        picking.request_region(brushing_rect(pointer, anchor, screen.client, screen.device));
        true
    }

    /// Queue a filter selection over the rectangle between the pointer and `anchor`.
    fn pick_filter(&mut self, pointer: (f64, f64), anchor: (f64, f64), screen: ScreenSize) -> bool {
        if !self.info().selectable {
            return false;
        }
        let Some(picking) = self.core_mut().picking_mut() else {
            return false;
        };
        picking.request_filter(brushing_rect(pointer, anchor, screen.client, screen.device));
        true
    }

    /// Fold the current brushing selection into the highlight.
    fn apply_brushing(&mut self) -> Vec<u32> {
        let core = self.core_mut();
        let Some(picked) = core.picking_mut().map(Picking::apply_brushing) else {
            return Vec::new();
        };
        if let Some(aux) = core.auxiliary_mut() {
            aux.set_picked_ids(&picked);
        }
        picked
    }

    fn clear_picking(&mut self) {
        let core = self.core_mut();
        if let Some(picking) = core.picking_mut() {
            picking.clear_picking();
        }
        if let Some(aux) = core.auxiliary_mut() {
            aux.clear_picking();
        }
    }

    fn reset_filter_selection(&mut self) {
        if let Some(picking) = self.core_mut().picking_mut() {
            picking.reset_filter_selection();
        }
    }

    fn last_picked_element(&self) -> Option<usize> {
        self.core().auxiliary()?.current_picked_element()
    }

    fn add_surface(&mut self, surface: Surface) -> Result<()> {
        self.core_mut().abstract_surface_mut()?.add_surface(surface);
        Ok(())
    }

    /// Replace the surface with the same code and kind. Returns whether one
    /// was replaced.
    fn update_surface(&mut self, surface: Surface) -> Result<bool> {
        let code = surface.code;
        let replaced = self.core_mut().abstract_surface_mut()?.update_surface(surface);
        if !replaced {
            warn!(layer = %self.id(), code, "no surface to update");
        }
        Ok(replaced)
    }

    fn clear_surfaces(&mut self) -> Result<()> {
        self.core_mut().abstract_surface_mut()?.clear_surfaces();
        Ok(())
    }
}
