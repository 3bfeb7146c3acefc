//! Render programs and the GPU copies of mesh data they draw.
//!
//! A layer owns an ordered list of [`Shader`]s. Each one derives its own
//! buffers from the layer's mesh and issues one pass per frame.

pub mod abstract_surface;
pub mod color_map;
pub mod color_points;
pub mod flat_color;
pub mod outline;
pub mod picking;
pub mod smooth_color;
pub mod wgsl;

use std::fmt;

use foundation::Result;
use foundation::math::narrow_f32;
use scene::mesh::Mesh;
use scene::picking::PickOutcome;
use serde::{Deserialize, Serialize};

use crate::device::{Primitive, ProgramDesc, ProgramId, RenderDevice};
use crate::state::GpuBuffer;
use crate::uniforms::{FrameUniforms, UniformBlock};

pub use abstract_surface::{AbstractSurface, Surface, SurfaceKind};
pub use color_map::{ColorMap, ColorMapMode};
pub use color_points::ColorPoints;
pub use flat_color::FlatColor;
pub use outline::Outline;
pub use picking::Picking;
pub use smooth_color::SmoothColor;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenderStyle {
    FlatColor,
    FlatColorMap,
    FlatColorPoints,
    SmoothColor,
    SmoothColorMap,
    SmoothColorMapTex,
    Picking,
    AbstractSurfaces,
    Outline,
    ColorPoints,
}

impl RenderStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderStyle::FlatColor => "FLAT_COLOR",
            RenderStyle::FlatColorMap => "FLAT_COLOR_MAP",
            RenderStyle::FlatColorPoints => "FLAT_COLOR_POINTS",
            RenderStyle::SmoothColor => "SMOOTH_COLOR",
            RenderStyle::SmoothColorMap => "SMOOTH_COLOR_MAP",
            RenderStyle::SmoothColorMapTex => "SMOOTH_COLOR_MAP_TEX",
            RenderStyle::Picking => "PICKING",
            RenderStyle::AbstractSurfaces => "ABSTRACT_SURFACES",
            RenderStyle::Outline => "OUTLINE",
            RenderStyle::ColorPoints => "COLOR_POINTS",
        }
    }
}

impl fmt::Display for RenderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a pass needs besides its own buffers.
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub frame: &'a FrameUniforms,
    /// Value subtracted from the layer's coordinates on load.
    pub centroid: [f64; 2],
    pub z_order: u32,
    pub primitive: Primitive,
    pub mesh: &'a Mesh,
}

impl PassContext<'_> {
    pub fn uniforms(&self) -> UniformBlock {
        UniformBlock::new(self.frame, self.centroid).with_z_order(self.z_order)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOutput {
    pub pick: Option<PickOutcome>,
}

/// Per-object highlight state fed by a picking pass.
///
/// Picked values are 1 (highlighted) or 0 per coordinate.
pub trait Auxiliary {
    /// Toggle every coordinate of `object`.
    fn set_picked_object(&mut self, object: usize);
    /// Highlight exactly the coordinates whose pick id is in `ids`.
    fn set_picked_ids(&mut self, ids: &[u32]);
    fn set_highlight_elements(&mut self, coordinates: &[usize], value: bool);
    fn clear_picking(&mut self);
    fn color_or_picked(&self) -> &[f32];
    fn current_picked_element(&self) -> Option<usize>;
}

/// Id written by the picking pass for every coordinate: its cell id when the
/// mesh carries cells, otherwise the index of its component.
pub fn pick_ids(mesh: &Mesh) -> Vec<u32> {
    let has_cells = mesh.ids_length() > 0;
    let mut out = Vec::with_capacity(mesh.total_number_of_coords());
    for (comp, cells) in mesh.ids_coordinates().into_iter().enumerate() {
        for cell in cells {
            out.push(match cell {
                Some(id) if has_cells => id,
                _ => comp as u32,
            });
        }
    }
    out
}

/// Coordinates widened to 3 floats per vertex.
pub(crate) fn positions(mesh: &Mesh) -> Vec<f32> {
    let dim = mesh.dimension().max(1);
    let mut out = Vec::with_capacity(mesh.total_number_of_coords() * 3);
    for c in mesh.coordinates().chunks_exact(dim) {
        out.push(c[0] as f32);
        out.push(c.get(1).copied().unwrap_or(0.0) as f32);
        out.push(c.get(2).copied().unwrap_or(0.0) as f32);
    }
    out
}

pub(crate) fn normals(mesh: &Mesh) -> Vec<f32> {
    let mut out = narrow_f32(mesh.normals());
    out.resize(mesh.total_number_of_coords() * 3, 0.0);
    out
}

/// Positions, indices and per-component counts shared by every program.
#[derive(Debug, Clone)]
pub(crate) struct Geometry {
    pub coords: GpuBuffer<f32>,
    pub indices: GpuBuffer<u32>,
    pub coords_per_comp: Vec<usize>,
}

impl Geometry {
    pub fn new() -> Self {
        Self {
            coords: GpuBuffer::vertex("coords"),
            indices: GpuBuffer::index("indices"),
            coords_per_comp: Vec::new(),
        }
    }

    pub fn update(&mut self, mesh: &Mesh) {
        self.coords.set(positions(mesh));
        self.indices.set(mesh.indices().to_vec());
        self.coords_per_comp = mesh.coords_per_comp();
    }

    pub fn n_vertex(&self) -> usize {
        self.coords.len() / 3
    }

    pub fn bind<D: RenderDevice + ?Sized>(&mut self, device: &mut D) -> Result<()> {
        let coords = self.coords.sync(device)?;
        device.bind_vertex_buffer(0, coords);
        if !self.indices.is_empty() {
            let indices = self.indices.sync(device)?;
            device.bind_index_buffer(indices);
        }
        Ok(())
    }

    /// Triangles use the index buffer, line strips are drawn one component at
    /// a time and points draw every vertex.
    pub fn draw<D: RenderDevice + ?Sized>(&self, device: &mut D, primitive: Primitive) -> Result<()> {
        match primitive {
            Primitive::Triangles => {
                if !self.indices.is_empty() {
                    device.draw_indexed(primitive, 0, self.indices.len() as u32)?;
                }
            }
            Primitive::LineStrip => {
                let mut first = 0u32;
                for n in &self.coords_per_comp {
                    if *n > 1 {
                        device.draw_arrays(primitive, first, *n as u32)?;
                    }
                    first += *n as u32;
                }
            }
            Primitive::Points => {
                if self.n_vertex() > 0 {
                    device.draw_arrays(primitive, 0, self.n_vertex() as u32)?;
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn create_program<D: RenderDevice + ?Sized>(
    device: &mut D,
    desc: &ProgramDesc,
) -> Result<ProgramId> {
    device.create_program(desc).inspect_err(|e| {
        tracing::error!(program = desc.label, error = %e, source = desc.source, "program creation failed");
    })
}

/// Closed set of programs a layer can stack.
#[derive(Debug, Clone)]
pub enum Shader {
    FlatColor(FlatColor),
    SmoothColor(SmoothColor),
    ColorMap(ColorMap),
    Outline(Outline),
    AbstractSurface(AbstractSurface),
    Picking(Picking),
    ColorPoints(ColorPoints),
}

impl Shader {
    pub fn style(&self) -> RenderStyle {
        match self {
            Shader::FlatColor(s) if s.is_points() => RenderStyle::FlatColorPoints,
            Shader::FlatColor(_) => RenderStyle::FlatColor,
            Shader::SmoothColor(_) => RenderStyle::SmoothColor,
            Shader::ColorMap(s) => match s.mode() {
                ColorMapMode::Flat => RenderStyle::FlatColorMap,
                ColorMapMode::Smooth => RenderStyle::SmoothColorMap,
                ColorMapMode::SmoothTextured => RenderStyle::SmoothColorMapTex,
            },
            Shader::Outline(_) => RenderStyle::Outline,
            Shader::AbstractSurface(_) => RenderStyle::AbstractSurfaces,
            Shader::Picking(_) => RenderStyle::Picking,
            Shader::ColorPoints(_) => RenderStyle::ColorPoints,
        }
    }

    pub fn update_geometry(&mut self, mesh: &Mesh) {
        match self {
            Shader::FlatColor(s) => s.update_geometry(mesh),
            Shader::SmoothColor(s) => s.update_geometry(mesh),
            Shader::ColorMap(s) => s.update_geometry(mesh),
            Shader::Outline(s) => s.update_geometry(mesh),
            Shader::AbstractSurface(_) => {}
            Shader::Picking(s) => s.update_geometry(mesh),
            Shader::ColorPoints(s) => s.update_geometry(mesh),
        }
    }

    /// Recolor from `knot`; programs without a color map ignore it.
    pub fn update_function(&mut self, mesh: &Mesh, knot: &str) -> Result<()> {
        match self {
            Shader::ColorMap(s) => s.update_function(mesh, knot),
            Shader::ColorPoints(s) => s.update_function(mesh, knot),
            _ => Ok(()),
        }
    }

    pub fn update_color(&mut self, rgb: [f32; 3]) {
        match self {
            Shader::FlatColor(s) => s.set_color(rgb),
            Shader::SmoothColor(s) => s.set_color(rgb),
            _ => {}
        }
    }

    pub fn set_filtered(&mut self, filtered: &[f32]) {
        match self {
            Shader::ColorMap(s) => s.set_filtered(filtered),
            Shader::Outline(s) => s.set_filtered(filtered),
            Shader::Picking(s) => s.set_filtered(filtered),
            _ => {}
        }
    }

    pub fn mark_resized(&mut self) {
        if let Shader::Picking(s) = self {
            s.mark_resized();
        }
    }

    pub fn as_auxiliary_mut(&mut self) -> Option<&mut dyn Auxiliary> {
        match self {
            Shader::ColorMap(s) => Some(s as &mut dyn Auxiliary),
            _ => None,
        }
    }

    pub fn as_auxiliary(&self) -> Option<&dyn Auxiliary> {
        match self {
            Shader::ColorMap(s) => Some(s as &dyn Auxiliary),
            _ => None,
        }
    }

    pub fn as_picking(&self) -> Option<&Picking> {
        match self {
            Shader::Picking(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_picking_mut(&mut self) -> Option<&mut Picking> {
        match self {
            Shader::Picking(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_abstract_surface_mut(&mut self) -> Option<&mut AbstractSurface> {
        match self {
            Shader::AbstractSurface(s) => Some(s),
            _ => None,
        }
    }

    pub fn render_pass<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        ctx: &PassContext<'_>,
    ) -> Result<PassOutput> {
        if let Shader::Picking(s) = self {
            return s.render_pass(device, ctx);
        }
        device.bind_render_target(None);
        match self {
            Shader::FlatColor(s) => s.render_pass(device, ctx)?,
            Shader::SmoothColor(s) => s.render_pass(device, ctx)?,
            Shader::ColorMap(s) => s.render_pass(device, ctx)?,
            Shader::Outline(s) => s.render_pass(device, ctx)?,
            Shader::AbstractSurface(s) => s.render_pass(device, ctx)?,
            Shader::Picking(_) => {}
            Shader::ColorPoints(s) => s.render_pass(device, ctx)?,
        }
        Ok(PassOutput::default())
    }
}

#[cfg(test)]
mod tests {
    use super::{FlatColor, Geometry, PassContext, Picking, Shader, pick_ids, positions};
    use crate::device::{Primitive, RenderDevice};
    use crate::uniforms::FrameUniforms;
    use crate::recording::{Command, RecordingDevice};
    use scene::feature::{FeatureGeometry, LayerFeature};
    use scene::mesh::Mesh;

    fn line(n: usize) -> LayerFeature {
        LayerFeature::new(FeatureGeometry::with_coordinates(
            (0..n).flat_map(|i| [i as f64, 0.0]).collect(),
        ))
    }

    #[test]
    fn line_strips_draw_per_component() {
        let mut mesh = Mesh::new(2);
        mesh.load(&[line(3), line(2)], false, [0.0; 3]).unwrap();

        let mut device = RecordingDevice::new(8, 8);
        let program = device
            .create_program(&crate::device::ProgramDesc {
                label: "lines",
                source: "",
                attributes: &[],
                textured: false,
            })
            .unwrap();
        device.use_program(program);

        let mut geometry = Geometry::new();
        geometry.update(&mesh);
        geometry.bind(&mut device).unwrap();
        geometry.draw(&mut device, Primitive::LineStrip).unwrap();

        let draws: Vec<(u32, u32)> = device.draws().iter().map(|d| (d.first, d.count)).collect();
        assert_eq!(draws, vec![(0, 3), (3, 2)]);
        assert_eq!(device.count(|c| matches!(c, Command::BindIndexBuffer(_))), 0);
        assert_eq!(positions(&mesh).len(), 15);
    }

    #[test]
    fn failed_pick_pass_releases_offscreen_target() {
        let mut mesh = Mesh::new(2);
        mesh.load(&[line(3)], false, [0.0; 3]).unwrap();
        let mut device = RecordingDevice::new(8, 8);

        let mut picking = Picking::new(&mut device).unwrap();
        picking.update_geometry(&mesh);
        picking.request_object(1, 1);
        let mut flat = FlatColor::new(&mut device, false).unwrap();
        flat.update_geometry(&mesh);
        let mut shaders = [Shader::Picking(picking), Shader::FlatColor(flat)];

        let frame = FrameUniforms::default();
        let ctx = PassContext {
            frame: &frame,
            centroid: [0.0, 0.0],
            z_order: 1,
            primitive: Primitive::LineStrip,
            mesh: &mesh,
        };
        device.fail_uploads(true);
        assert!(shaders[0].render_pass(&mut device, &ctx).is_err());
        assert_eq!(device.commands().last(), Some(&Command::BindTarget(None)));

        device.fail_uploads(false);
        shaders[1].render_pass(&mut device, &ctx).unwrap();
        let draws = device.draws();
        assert!(!draws.is_empty());
        assert!(draws.iter().all(|d| d.target.is_none()));
    }

    #[test]
    fn pick_ids_fall_back_to_component_index() {
        let mut mesh = Mesh::new(2);
        mesh.load(&[line(2), line(3)], false, [0.0; 3]).unwrap();
        assert_eq!(pick_ids(&mesh), vec![0, 0, 1, 1, 1]);
    }
}
