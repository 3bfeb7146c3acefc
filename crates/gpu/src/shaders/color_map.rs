use std::collections::HashSet;

use foundation::Result;
use foundation::math::{finite_extent, narrow_f32};
use scene::mesh::Mesh;
use tracing::debug;

use super::{Auxiliary, Geometry, PassContext, create_program, normals, pick_ids, wgsl};
use crate::colormap::{color_at, normalize_in, normalize_min_max, parse_hex_rgb};
use crate::device::{Primitive, ProgramDesc, ProgramId, RenderDevice, VertexAttribute};
use crate::state::{ColorMapTexture, GpuBuffer};
use crate::stencil::{RasterState, StencilState};

const POSITION: VertexAttribute = VertexAttribute {
    name: "position",
    location: 0,
    components: 3,
};
const NORMAL: VertexAttribute = VertexAttribute {
    name: "normal",
    location: 1,
    components: 3,
};
const FUNCTION: VertexAttribute = VertexAttribute {
    name: "function",
    location: 2,
    components: 1,
};
const PICKED: VertexAttribute = VertexAttribute {
    name: "color_or_picked",
    location: 3,
    components: 1,
};
const FILTERED: VertexAttribute = VertexAttribute {
    name: "filtered",
    location: 4,
    components: 1,
};
const DISCARD: VertexAttribute = VertexAttribute {
    name: "discard_interval",
    location: 5,
    components: 2,
};
const UV: VertexAttribute = VertexAttribute {
    name: "uv",
    location: 6,
    components: 2,
};

pub const FLAT_COLOR_MAP_DESC: ProgramDesc = ProgramDesc {
    label: "flat-color-map",
    source: wgsl::FLAT_COLOR_MAP,
    attributes: &[POSITION, FUNCTION, PICKED, FILTERED, DISCARD],
    textured: true,
};

pub const SMOOTH_COLOR_MAP_DESC: ProgramDesc = ProgramDesc {
    label: "smooth-color-map",
    source: wgsl::SMOOTH_COLOR_MAP,
    attributes: &[POSITION, NORMAL, FUNCTION, PICKED, FILTERED, DISCARD],
    textured: true,
};

pub const SMOOTH_COLOR_MAP_TEX_DESC: ProgramDesc = ProgramDesc {
    label: "smooth-color-map-tex",
    source: wgsl::SMOOTH_COLOR_MAP_TEX,
    attributes: &[POSITION, NORMAL, FUNCTION, PICKED, FILTERED, DISCARD, UV],
    textured: true,
};

const DEFAULT_HIGHLIGHT: &str = "#FFDD00";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ColorMapMode {
    Flat,
    Smooth,
    SmoothTextured,
}

impl ColorMapMode {
    fn desc(self) -> &'static ProgramDesc {
        match self {
            ColorMapMode::Flat => &FLAT_COLOR_MAP_DESC,
            ColorMapMode::Smooth => &SMOOTH_COLOR_MAP_DESC,
            ColorMapMode::SmoothTextured => &SMOOTH_COLOR_MAP_TEX_DESC,
        }
    }
}

/// Function values through a color scale, plus the per-object highlight state
/// a picking pass writes into.
#[derive(Debug, Clone)]
pub struct ColorMap {
    program: ProgramId,
    mode: ColorMapMode,
    geometry: Geometry,
    normals: GpuBuffer<f32>,
    function: GpuBuffer<f32>,
    color_or_picked: GpuBuffer<f32>,
    filtered: GpuBuffer<f32>,
    discard: GpuBuffer<f32>,
    uv: GpuBuffer<f32>,
    texture: ColorMapTexture,
    highlight: [f32; 3],
    raw_function: Vec<f64>,
    pick_ids: Vec<u32>,
    current_picked: Option<usize>,
}

impl ColorMap {
    pub fn new<D: RenderDevice + ?Sized>(
        device: &mut D,
        mode: ColorMapMode,
        color_map: &str,
        reverse: bool,
    ) -> Result<Self> {
        color_at(color_map, 0.0)?;
        Ok(Self {
            program: create_program(device, mode.desc())?,
            mode,
            geometry: Geometry::new(),
            normals: GpuBuffer::vertex("normals"),
            function: GpuBuffer::vertex("function"),
            color_or_picked: GpuBuffer::vertex("color-or-picked"),
            filtered: GpuBuffer::vertex("filtered"),
            discard: GpuBuffer::vertex("discard-interval"),
            uv: GpuBuffer::vertex("uv"),
            texture: ColorMapTexture::new(color_map, reverse),
            highlight: parse_hex_rgb(DEFAULT_HIGHLIGHT)?,
            raw_function: Vec::new(),
            pick_ids: Vec::new(),
            current_picked: None,
        })
    }

    pub fn mode(&self) -> ColorMapMode {
        self.mode
    }

    pub fn set_highlight_color(&mut self, rgb: [f32; 3]) {
        self.highlight = rgb;
    }

    pub fn set_color_map(&mut self, name: &str, reverse: bool) -> Result<()> {
        color_at(name, 0.0)?;
        self.texture.set_scale(name, reverse);
        Ok(())
    }

    /// Normalized values currently bound to the function attribute.
    pub fn function_values(&self) -> &[f32] {
        self.function.data()
    }

    pub fn update_geometry(&mut self, mesh: &Mesh) {
        let n = mesh.total_number_of_coords();
        self.geometry.update(mesh);
        self.normals.set(normals(mesh));
        self.color_or_picked.set(vec![0.0; n]);
        self.filtered.set(vec![1.0; n]);
        self.discard
            .set(narrow_f32(&mesh.discard_func_interval()));
        let mut uv = narrow_f32(&mesh.uv());
        uv.resize(n * 2, 0.0);
        self.uv.set(uv);
        self.raw_function = vec![0.0; n];
        self.function.set(vec![0.0; n]);
        self.pick_ids = pick_ids(mesh);
        self.current_picked = None;
    }

    /// Bind the first timestep of `knot`. Coordinates the knot has no data
    /// for are drawn in the no-data color.
    pub fn update_function(&mut self, mesh: &Mesh, knot: &str) -> Result<()> {
        let timesteps = mesh.function(knot)?;
        let n = mesh.total_number_of_coords();
        let mut values = timesteps.into_iter().next().unwrap_or_default();
        values.resize(n, f64::NAN);
        self.raw_function = values;
        self.renormalize();
        debug!(knot, values = n, "color map function updated");
        Ok(())
    }

    /// Min-max normalize over the coordinates currently filtered in.
    fn renormalize(&mut self) {
        let filtered = self.filtered.data();
        let visible: Vec<f64> = self
            .raw_function
            .iter()
            .zip(filtered)
            .filter(|(_, f)| **f > 0.5)
            .map(|(v, _)| *v)
            .collect();

        if visible.is_empty() || visible.len() == self.raw_function.len() {
            self.function.set(normalize_min_max(&self.raw_function));
            return;
        }

        let (min, max) = finite_extent(visible.iter().copied()).unwrap_or((0.0, 0.0));
        self.function.set(normalize_in(&self.raw_function, min, max));
    }

    /// An empty slice includes everything.
    pub fn set_filtered(&mut self, filtered: &[f32]) {
        let n = self.geometry.n_vertex();
        if filtered.is_empty() {
            self.filtered.set(vec![1.0; n]);
        } else {
            let mut f = filtered.to_vec();
            f.resize(n, 1.0);
            self.filtered.set(f);
        }
        self.renormalize();
    }

    pub fn render_pass<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        ctx: &PassContext<'_>,
    ) -> Result<()> {
        device.use_program(self.program);
        device.set_raster_state(RasterState::default());
        device.set_stencil(match ctx.primitive {
            Primitive::Points => None,
            _ => Some(StencilState::layer_order(ctx.z_order)),
        });
        device.set_uniforms(&ctx.uniforms().with_color(self.highlight));

        self.geometry.bind(device)?;
        if self.mode != ColorMapMode::Flat {
            let normals = self.normals.sync(device)?;
            device.bind_vertex_buffer(NORMAL.location, normals);
        }
        let function = self.function.sync(device)?;
        device.bind_vertex_buffer(FUNCTION.location, function);
        let picked = self.color_or_picked.sync(device)?;
        device.bind_vertex_buffer(PICKED.location, picked);
        let filtered = self.filtered.sync(device)?;
        device.bind_vertex_buffer(FILTERED.location, filtered);
        let discard = self.discard.sync(device)?;
        device.bind_vertex_buffer(DISCARD.location, discard);
        if self.mode == ColorMapMode::SmoothTextured {
            let uv = self.uv.sync(device)?;
            device.bind_vertex_buffer(UV.location, uv);
        }
        let texture = self.texture.sync(device)?;
        device.bind_texture(texture);

        self.geometry.draw(device, ctx.primitive)
    }
}

impl Auxiliary for ColorMap {
    fn set_picked_object(&mut self, object: usize) {
        let Some(count) = self.geometry.coords_per_comp.get(object).copied() else {
            return;
        };
        let start: usize = self.geometry.coords_per_comp[..object].iter().sum();
        for v in &mut self.color_or_picked.data_mut()[start..start + count] {
            *v = if *v == 1.0 { 0.0 } else { 1.0 };
        }
        self.current_picked = Some(object);
    }

    fn set_picked_ids(&mut self, ids: &[u32]) {
        let ids: HashSet<u32> = ids.iter().copied().collect();
        let picked: Vec<f32> = self
            .pick_ids
            .iter()
            .map(|id| if ids.contains(id) { 1.0 } else { 0.0 })
            .collect();
        self.color_or_picked.set(picked);
    }

    fn set_highlight_elements(&mut self, coordinates: &[usize], value: bool) {
        let flag = if value { 1.0 } else { 0.0 };
        let data = self.color_or_picked.data_mut();
        for i in coordinates {
            if let Some(v) = data.get_mut(*i) {
                *v = flag;
            }
        }
    }

    fn clear_picking(&mut self) {
        for v in self.color_or_picked.data_mut().iter_mut() {
            *v = 0.0;
        }
        self.current_picked = None;
    }

    fn color_or_picked(&self) -> &[f32] {
        self.color_or_picked.data()
    }

    fn current_picked_element(&self) -> Option<usize> {
        self.current_picked
    }
}
