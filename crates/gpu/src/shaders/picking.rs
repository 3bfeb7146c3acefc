//! Offscreen id pass.
//!
//! Every coordinate carries its pick id as a normalized RGBA attribute. The
//! pass only draws while a request is pending; the read-back then maps ids
//! back to components and drops anything filtered out.

use std::collections::{BTreeSet, HashMap};

use foundation::{Aabb2, Result};
use scene::mesh::Mesh;
use scene::picking::{
    PickOutcome, PickRect, PickState, decode_object_id, decode_pixels, encode_object_id_unorm,
};
use scene::selection::SelectionSet;
use tracing::debug;

use super::{Geometry, PassContext, PassOutput, create_program, pick_ids, wgsl};
use crate::device::{ClearRequest, ProgramDesc, ProgramId, RenderDevice, VertexAttribute};
use crate::state::{GpuBuffer, OffscreenTarget, ResourceState};
use crate::stencil::RasterState;

pub const PICKING_DESC: ProgramDesc = ProgramDesc {
    label: "picking",
    source: wgsl::PICKING,
    attributes: &[
        VertexAttribute {
            name: "position",
            location: 0,
            components: 3,
        },
        VertexAttribute {
            name: "id",
            location: 1,
            components: 4,
        },
    ],
    textured: false,
};

/// Clear value of the id target; reads back as `NO_OBJECT`.
const SENTINEL: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

#[derive(Debug, Clone)]
pub struct Picking {
    program: ProgramId,
    geometry: Geometry,
    ids: GpuBuffer<f32>,
    target: OffscreenTarget,
    pick_ids: Vec<u32>,
    component_of: HashMap<u32, usize>,
    first_coord: Vec<usize>,
    filtered: Vec<f32>,
    state: PickState,
    filter_request: Option<PickRect>,
    current: SelectionSet,
    picked: SelectionSet,
    selected_filtered: Vec<usize>,
}

impl Picking {
    pub fn new<D: RenderDevice + ?Sized>(device: &mut D) -> Result<Self> {
        Ok(Self {
            program: create_program(device, &PICKING_DESC)?,
            geometry: Geometry::new(),
            ids: GpuBuffer::vertex("pick-ids"),
            target: OffscreenTarget::new("picking"),
            pick_ids: Vec::new(),
            component_of: HashMap::new(),
            first_coord: Vec::new(),
            filtered: Vec::new(),
            state: PickState::Idle,
            filter_request: None,
            current: SelectionSet::new(),
            picked: SelectionSet::new(),
            selected_filtered: Vec::new(),
        })
    }

    pub fn update_geometry(&mut self, mesh: &Mesh) {
        self.geometry.update(mesh);
        self.pick_ids = pick_ids(mesh);
        self.ids.set(
            self.pick_ids
                .iter()
                .flat_map(|id| encode_object_id_unorm(*id))
                .collect(),
        );

        self.component_of.clear();
        let mut coord = 0;
        for (comp, n) in self.geometry.coords_per_comp.iter().enumerate() {
            for id in &self.pick_ids[coord..coord + n] {
                self.component_of.entry(*id).or_insert(comp);
            }
            coord += n;
        }
        self.first_coord = mesh.component_offsets();
        self.filtered = vec![1.0; mesh.total_number_of_coords()];
        self.current.clear();
        self.picked.clear();
        self.selected_filtered.clear();
    }

    /// An empty slice includes everything.
    pub fn set_filtered(&mut self, filtered: &[f32]) {
        let n = self.pick_ids.len();
        self.filtered = if filtered.is_empty() {
            vec![1.0; n]
        } else {
            let mut f = filtered.to_vec();
            f.resize(n, 1.0);
            f
        };
    }

    pub fn mark_resized(&mut self) {
        self.target.mark_resized();
    }

    pub fn target_state(&self) -> ResourceState {
        self.target.state()
    }

    pub fn state(&self) -> &PickState {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state.is_pending() || self.filter_request.is_some()
    }

    /// Pick the object under device pixel `(x, y)` on the next pass.
    pub fn request_object(&mut self, x: u32, y: u32) {
        self.state = PickState::ObjectPending { x, y };
    }

    pub fn request_region(&mut self, rect: PickRect) {
        self.state = PickState::RegionPending {
            rect: normalize_rect(rect),
        };
    }

    /// Select the objects inside `rect` for filtering on the next pass.
    pub fn request_filter(&mut self, rect: PickRect) {
        self.filter_request = Some(normalize_rect(rect));
    }

    /// Move the current brushing selection into the persistent one and
    /// return every picked id.
    pub fn apply_brushing(&mut self) -> Vec<u32> {
        self.picked.union_in_place(&self.current);
        self.current.clear();
        self.picked.to_vec()
    }

    pub fn clear_picking(&mut self) {
        self.current.clear();
        self.picked.clear();
        self.state = PickState::Idle;
    }

    pub fn reset_filter_selection(&mut self) {
        self.selected_filtered.clear();
        self.filter_request = None;
    }

    /// Components chosen by the last filter brushing, ascending.
    pub fn selected_filtered(&self) -> &[usize] {
        &self.selected_filtered
    }

    /// Bounds of the selected components in mesh space; all zero when
    /// nothing is selected.
    pub fn bbox_filtered(&self, mesh: &Mesh) -> Aabb2 {
        let components = mesh.components();
        let points = self
            .selected_filtered
            .iter()
            .filter_map(|c| components.get(*c))
            .flat_map(|comp| {
                let dim = comp.dimension.max(2);
                comp.coordinates
                    .chunks_exact(dim)
                    .map(|p| [p[0], p[1]])
                    .collect::<Vec<_>>()
            });
        Aabb2::from_points(points).unwrap_or(Aabb2::from_array([0.0; 4]))
    }

    fn is_filtered_in(&self, component: usize) -> bool {
        self.first_coord
            .get(component)
            .and_then(|c| self.filtered.get(*c))
            .is_none_or(|f| *f > 0.5)
    }

    pub fn render_pass<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        ctx: &PassContext<'_>,
    ) -> Result<PassOutput> {
        if !self.is_pending() || self.geometry.n_vertex() == 0 {
            return Ok(PassOutput::default());
        }

        let fresh = self.target.state() != ResourceState::Clean;
        let target = self.target.sync(device)?;
        device.bind_render_target(Some(target));
        if fresh {
            device.clear(ClearRequest::all(SENTINEL));
        }

        let resolved = self
            .draw_ids(device, ctx)
            .and_then(|()| self.read_back(device));

        // The target goes back to the sentinel and is unbound even when the
        // pass failed; later layers draw to the default target.
        device.clear(ClearRequest::all(SENTINEL));
        device.bind_render_target(None);

        Ok(PassOutput { pick: resolved? })
    }

    fn draw_ids<D: RenderDevice + ?Sized>(&mut self, device: &mut D, ctx: &PassContext<'_>) -> Result<()> {
        device.use_program(self.program);
        device.set_raster_state(RasterState::default());
        device.set_stencil(None);
        device.set_uniforms(&ctx.uniforms());
        self.geometry.bind(device)?;
        let ids = self.ids.sync(device)?;
        device.bind_vertex_buffer(1, ids);
        self.geometry.draw(device, ctx.primitive)
    }

    fn read_back<D: RenderDevice + ?Sized>(&mut self, device: &mut D) -> Result<Option<PickOutcome>> {
        if let Some(rect) = self.filter_request.take() {
            let pixels = device.read_pixels(rect)?;
            let components: BTreeSet<usize> = decode_pixels(&pixels)
                .filter_map(|id| self.component_of.get(&id).copied())
                .collect();
            self.selected_filtered = components.into_iter().collect();
            debug!(selected = self.selected_filtered.len(), "filter brushing resolved");
        }

        match std::mem::take(&mut self.state) {
            PickState::ObjectPending { x, y } => {
                let pixels = device.read_pixels(PickRect::pixel(x, y))?;
                let id = match pixels.get(..4) {
                    Some(px) => decode_object_id([px[0], px[1], px[2], px[3]]),
                    None => None,
                };
                let component = id.and_then(|id| self.component_of.get(&id).copied());
                let honored = component.filter(|c| self.is_filtered_in(*c));
                if component.is_some() && honored.is_none() {
                    debug!(?component, "picked object is filtered out");
                }
                debug!(?honored, "object pick resolved");
                self.state = PickState::Resolved(PickOutcome::Object(honored.map(|c| c as u32)));
            }
            PickState::RegionPending { rect } => {
                let pixels = device.read_pixels(rect)?;
                self.current.clear();
                for id in decode_pixels(&pixels) {
                    let in_filter = self
                        .component_of
                        .get(&id)
                        .is_some_and(|c| self.is_filtered_in(*c));
                    if in_filter {
                        self.current.insert(id);
                    }
                }
                let mut highlighted = self.picked.clone();
                highlighted.union_in_place(&self.current);
                debug!(
                    pixels = rect.area(),
                    ids = self.current.len(),
                    "region pick resolved"
                );
                self.state = PickState::Resolved(PickOutcome::Region(highlighted.to_vec()));
            }
            other => self.state = other,
        }
        Ok(self.state.take_resolved())
    }
}

fn normalize_rect(rect: PickRect) -> PickRect {
    PickRect {
        width: rect.width.max(1),
        height: rect.height.max(1),
        ..rect
    }
}

#[cfg(test)]
mod tests {
    use super::Picking;
    use crate::device::{ClearRequest, Primitive};
    use crate::recording::{Command, RecordingDevice};
    use crate::shaders::PassContext;
    use crate::state::ResourceState;
    use crate::uniforms::FrameUniforms;
    use foundation::Aabb2;
    use pretty_assertions::assert_eq;
    use scene::feature::{FeatureGeometry, LayerFeature};
    use scene::mesh::Mesh;
    use scene::picking::{PickOutcome, PickRect};

    fn tri(x: f64) -> LayerFeature {
        LayerFeature::new(FeatureGeometry::with_triangles(
            vec![x, 0.0, 0.0, x + 1.0, 0.0, 0.0, x, 1.0, 0.0],
            vec![0, 1, 2],
        ))
    }

    fn mesh() -> Mesh {
        let mut mesh = Mesh::new(3);
        mesh.load(&[tri(0.0), tri(5.0), tri(10.0)], false, [0.0; 3])
            .unwrap();
        mesh
    }

    fn run(device: &mut RecordingDevice, picking: &mut Picking, mesh: &Mesh) -> Option<PickOutcome> {
        let frame = FrameUniforms::default();
        let ctx = PassContext {
            frame: &frame,
            centroid: [0.0, 0.0],
            z_order: 1,
            primitive: Primitive::Triangles,
            mesh,
        };
        picking.render_pass(device, &ctx).unwrap().pick
    }

    fn setup() -> (RecordingDevice, Picking, Mesh) {
        let mesh = mesh();
        let mut device = RecordingDevice::new(32, 32);
        let mut picking = Picking::new(&mut device).unwrap();
        picking.update_geometry(&mesh);
        (device, picking, mesh)
    }

    #[test]
    fn idle_pass_draws_nothing() {
        let (mut device, mut picking, mesh) = setup();
        assert_eq!(run(&mut device, &mut picking, &mesh), None);
        assert!(device.draws().is_empty());
    }

    #[test]
    fn object_pick_resolves_component_and_unbinds() {
        let (mut device, mut picking, mesh) = setup();
        device.paint_id(4, 4, 1);
        picking.request_object(4, 4);
        assert_eq!(
            run(&mut device, &mut picking, &mesh),
            Some(PickOutcome::Object(Some(1)))
        );
        assert!(!picking.is_pending());

        let tail: Vec<&Command> = device.commands().iter().rev().take(2).collect();
        assert_eq!(tail[0], &Command::BindTarget(None));
        assert_eq!(tail[1], &Command::Clear(ClearRequest::all([1.0; 4])));
        assert!(device.draws().iter().all(|d| d.target.is_some()));
    }

    #[test]
    fn empty_pixel_resolves_to_none() {
        let (mut device, mut picking, mesh) = setup();
        picking.request_object(0, 0);
        assert_eq!(
            run(&mut device, &mut picking, &mesh),
            Some(PickOutcome::Object(None))
        );
    }

    #[test]
    fn filtered_out_objects_are_ignored() {
        let (mut device, mut picking, mesh) = setup();
        picking.set_filtered(&[1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        device.paint_id(2, 2, 1);
        picking.request_object(2, 2);
        assert_eq!(
            run(&mut device, &mut picking, &mesh),
            Some(PickOutcome::Object(None))
        );

        device.paint_rect(PickRect { x: 0, y: 0, width: 2, height: 1 }, 2);
        picking.request_region(PickRect { x: 0, y: 0, width: 4, height: 4 });
        assert_eq!(
            run(&mut device, &mut picking, &mesh),
            Some(PickOutcome::Region(vec![2]))
        );
    }

    #[test]
    fn region_dedups_and_brushing_accumulates() {
        let (mut device, mut picking, mesh) = setup();
        device.paint_rect(PickRect { x: 0, y: 0, width: 3, height: 3 }, 0);
        device.paint_id(3, 0, 2);
        picking.request_region(PickRect { x: 0, y: 0, width: 4, height: 0 });
        assert_eq!(
            run(&mut device, &mut picking, &mesh),
            Some(PickOutcome::Region(vec![0, 2]))
        );
        assert_eq!(picking.apply_brushing(), vec![0, 2]);

        device.clear_pixels();
        device.paint_id(0, 0, 1);
        picking.request_region(PickRect::pixel(0, 0));
        assert_eq!(
            run(&mut device, &mut picking, &mesh),
            Some(PickOutcome::Region(vec![0, 1, 2]))
        );
        picking.clear_picking();
        assert_eq!(picking.apply_brushing(), Vec::<u32>::new());
    }

    #[test]
    fn filter_selection_and_bbox() {
        let (mut device, mut picking, mesh) = setup();
        assert_eq!(picking.bbox_filtered(&mesh), Aabb2::from_array([0.0; 4]));

        device.paint_id(1, 1, 0);
        device.paint_id(2, 1, 2);
        picking.request_filter(PickRect { x: 0, y: 0, width: 4, height: 4 });
        assert_eq!(run(&mut device, &mut picking, &mesh), None);
        assert_eq!(picking.selected_filtered(), &[0, 2]);
        assert_eq!(
            picking.bbox_filtered(&mesh).to_array(),
            [0.0, 0.0, 11.0, 1.0]
        );
        picking.reset_filter_selection();
        assert!(picking.selected_filtered().is_empty());
    }

    #[test]
    fn resize_recreates_target() {
        let (mut device, mut picking, mesh) = setup();
        picking.request_object(0, 0);
        run(&mut device, &mut picking, &mesh);
        assert_eq!(picking.target_state(), ResourceState::Clean);

        picking.mark_resized();
        assert_eq!(picking.target_state(), ResourceState::NeedsRecreate);
        picking.request_object(0, 0);
        run(&mut device, &mut picking, &mesh);
        assert_eq!(device.count(|c| matches!(c, Command::CreateTarget { .. })), 1);
        assert_eq!(device.count(|c| matches!(c, Command::ResizeTarget { .. })), 1);
    }
}
