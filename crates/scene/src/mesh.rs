//! Layer geometry as a list of half-edge components.
//!
//! Every feature becomes one component. Vertex indices inside a component are
//! local; the flat accessors on [`Mesh`] globalize them by the running vertex
//! count. Flat arrays are rebuilt eagerly on `load` so shaders can borrow them.

use std::collections::HashMap;

use foundation::bounds::Aabb2;
use foundation::{EngineError, Result};
use tracing::debug;

use crate::feature::{FeatureGeometry, LayerFeature};
use crate::level::component_offsets;

/// Scalar values attached to a mesh component by a knot, one array per timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct KnotFunction {
    pub knot: String,
    pub timesteps: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshComponent {
    pub dimension: usize,
    pub coordinates: Vec<f64>,
    /// Always 3 values per vertex.
    pub normals: Vec<f64>,
    pub functions: Vec<KnotFunction>,
    pub ids: Vec<u32>,
    pub heights: Vec<f64>,
    pub min_heights: Vec<f64>,
    pub oriented_envelope: Vec<Vec<f64>>,
    pub section_footprint: Vec<Vec<f64>>,
    pub uv: Vec<f64>,
    pub width: Vec<f64>,
    pub points_per_section: Vec<u32>,
    pub discard_func_interval: [f64; 2],

    pub v_table: Vec<u32>,
    pub o_table: Vec<Option<usize>>,
    pub vert_he: Vec<Option<usize>>,
}

impl MeshComponent {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            coordinates: Vec::new(),
            normals: Vec::new(),
            functions: Vec::new(),
            ids: Vec::new(),
            heights: Vec::new(),
            min_heights: Vec::new(),
            oriented_envelope: Vec::new(),
            section_footprint: Vec::new(),
            uv: Vec::new(),
            width: Vec::new(),
            points_per_section: Vec::new(),
            discard_func_interval: [-1.0, -1.0],
            v_table: Vec::new(),
            o_table: Vec::new(),
            vert_he: Vec::new(),
        }
    }

    pub fn n_vertex(&self) -> usize {
        self.coordinates.len() / self.dimension
    }

    pub fn n_half_edge(&self) -> usize {
        self.v_table.len()
    }

    pub fn n_triangle(&self) -> usize {
        self.v_table.len() / 3
    }

    pub fn trig(he: usize) -> usize {
        he / 3
    }

    pub fn next(he: usize) -> usize {
        3 * (he / 3) + (he + 1) % 3
    }

    pub fn prev(he: usize) -> usize {
        3 * (he / 3) + (he + 2) % 3
    }

    /// Vertex position, with z = 0 for 2D components.
    pub fn vertex(&self, v: usize) -> [f64; 3] {
        let d = self.dimension;
        let c = &self.coordinates[v * d..v * d + d];
        [c[0], c[1], if d > 2 { c[2] } else { 0.0 }]
    }

    fn function(&self, knot: &str) -> Option<&KnotFunction> {
        self.functions.iter().find(|f| f.knot == knot)
    }

    fn set_function(&mut self, knot: &str, timesteps: Vec<Vec<f64>>) {
        match self.functions.iter_mut().find(|f| f.knot == knot) {
            Some(f) => f.timesteps = timesteps,
            None => self.functions.push(KnotFunction {
                knot: knot.to_string(),
                timesteps,
            }),
        }
    }

    fn build_opposites(&mut self) {
        let len = self.n_half_edge();
        self.o_table = vec![None; len];
        let mut edges: HashMap<(u32, u32), usize> = HashMap::new();

        for he in 0..len {
            let a = self.v_table[he];
            let b = self.v_table[Self::next(he)];
            let key = (a.min(b), a.max(b));
            match edges.remove(&key) {
                Some(op) => {
                    self.o_table[op] = Some(he);
                    self.o_table[he] = Some(op);
                }
                None => {
                    edges.insert(key, he);
                }
            }
        }
    }

    fn build_vertex_he(&mut self) {
        self.vert_he = vec![None; self.n_vertex()];
        for (he, v) in self.v_table.iter().enumerate() {
            let slot = &mut self.vert_he[*v as usize];
            // Prefer boundary half-edges so a vertex walk can start at the border.
            let keep = matches!(slot, Some(cur) if self.o_table[*cur].is_none());
            if !keep {
                *slot = Some(he);
            }
        }
    }

    /// Walks the triangles reachable from the first one and flips any neighbor
    /// whose winding disagrees across the shared edge.
    fn fix_orientation(&mut self) {
        if self.n_triangle() == 0 {
            return;
        }
        let mut visited = vec![false; self.n_triangle()];
        visited[0] = true;
        let mut stack = vec![0usize, 1, 2];

        while let Some(he) = stack.pop() {
            let Some(op) = self.o_table[he] else {
                continue;
            };
            let trig = Self::trig(op);
            if visited[trig] {
                continue;
            }

            let v1 = self.v_table[he];
            let v2 = self.v_table[Self::next(he)];
            let v3 = self.v_table[op];
            let v4 = self.v_table[Self::next(op)];

            if !(v1 == v4 && v2 == v3) {
                let no = Self::next(op);
                let po = Self::prev(op);

                self.v_table.swap(no, op);

                let o_no = self.o_table[no];
                let o_po = self.o_table[po];
                self.o_table[no] = o_po;
                self.o_table[po] = o_no;
                if let Some(x) = o_po {
                    self.o_table[x] = Some(no);
                }
                if let Some(x) = o_no {
                    self.o_table[x] = Some(po);
                }
            }

            visited[trig] = true;
            stack.extend([op, Self::next(op), Self::prev(op)]);
        }
    }

    fn compute_normals(&mut self) {
        let n = self.n_vertex();
        let mut normals = vec![0.0; n * 3];

        for che in (0..self.n_half_edge()).step_by(3) {
            let a = self.v_table[che] as usize;
            let b = self.v_table[Self::next(che)] as usize;
            let c = self.v_table[Self::prev(che)] as usize;
            let (va, vb, vc) = (self.vertex(a), self.vertex(b), self.vertex(c));

            let ab = [vb[0] - va[0], vb[1] - va[1], vb[2] - va[2]];
            let ac = [vc[0] - va[0], vc[1] - va[1], vc[2] - va[2]];
            let cross = [
                ab[1] * ac[2] - ab[2] * ac[1],
                ab[2] * ac[0] - ab[0] * ac[2],
                ab[0] * ac[1] - ab[1] * ac[0],
            ];

            for v in [a, b, c] {
                for i in 0..3 {
                    normals[v * 3 + i] += cross[i];
                }
            }
        }

        for nrm in normals.chunks_exact_mut(3) {
            let size = (nrm[0] * nrm[0] + nrm[1] * nrm[1] + nrm[2] * nrm[2]).sqrt();
            if size > 0.0 {
                for x in nrm.iter_mut() {
                    *x /= size;
                }
            }
        }
        self.normals = normals;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    dimension: usize,
    components: Vec<MeshComponent>,
    all_coordinates: Vec<f64>,
    all_normals: Vec<f64>,
    all_indices: Vec<u32>,
    all_ids: Vec<u32>,
    filtered: Vec<f32>,
}

impl Mesh {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn components(&self) -> &[MeshComponent] {
        &self.components
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Rebuild the mesh from `features`, moving x and y by `-centroid`.
    ///
    /// Normals are computed when any feature lacks them or `update_normals` is set.
    pub fn load(
        &mut self,
        features: &[LayerFeature],
        update_normals: bool,
        centroid: [f64; 3],
    ) -> Result<()> {
        if self.dimension < 2 {
            return Err(EngineError::config(format!(
                "mesh dimension must be 2 or 3, got {}",
                self.dimension
            )));
        }

        let mut components = Vec::with_capacity(features.len());
        let mut compute_normals = update_normals;
        for (i, feature) in features.iter().enumerate() {
            let geometry = &feature.geometry;
            compute_normals |= geometry.normals.is_none();
            components.push(self.build_component(i, geometry, centroid)?);
        }

        for comp in &mut components {
            comp.build_opposites();
            comp.build_vertex_he();
            comp.fix_orientation();
            if compute_normals {
                comp.compute_normals();
            }
        }

        self.components = components;
        self.rebuild_flat_arrays();
        self.filtered = vec![1.0; self.total_number_of_coords()];

        debug!(
            components = self.components.len(),
            vertices = self.total_number_of_coords(),
            computed_normals = compute_normals,
            "mesh loaded"
        );
        Ok(())
    }

    fn build_component(
        &self,
        index: usize,
        geometry: &FeatureGeometry,
        centroid: [f64; 3],
    ) -> Result<MeshComponent> {
        let dim = self.dimension;
        if geometry.coordinates.len() % dim != 0 {
            return Err(EngineError::config(format!(
                "feature {index}: {} coordinates are not a multiple of dimension {dim}",
                geometry.coordinates.len()
            )));
        }

        let mut comp = MeshComponent::new(dim);
        comp.coordinates = geometry
            .coordinates
            .iter()
            .enumerate()
            .map(|(i, v)| match i % dim {
                0 => v - centroid[0],
                1 => v - centroid[1],
                _ => *v,
            })
            .collect();

        let n_vertex = comp.n_vertex() as u32;
        if let Some(indices) = &geometry.indices {
            if indices.len() % 3 != 0 {
                return Err(EngineError::config(format!(
                    "feature {index}: index count {} is not a multiple of 3",
                    indices.len()
                )));
            }
            if let Some(bad) = indices.iter().find(|v| **v >= n_vertex) {
                return Err(EngineError::config(format!(
                    "feature {index}: index {bad} out of range for {n_vertex} vertices"
                )));
            }
            comp.v_table = indices.clone();
        }
        if let Some(normals) = &geometry.normals {
            comp.normals = normals.clone();
        }
        if let Some(ids) = &geometry.ids {
            comp.ids = ids.clone();
        }
        if let Some(v) = &geometry.heights {
            comp.heights = v.clone();
        }
        if let Some(v) = &geometry.min_heights {
            comp.min_heights = v.clone();
        }
        if let Some(v) = &geometry.uv {
            comp.uv = v.clone();
        }
        if let Some(v) = &geometry.width {
            comp.width = v.clone();
        }
        if let Some(v) = &geometry.points_per_section {
            comp.points_per_section = v.clone();
        }
        if let Some(interval) = geometry.discard_func_interval {
            comp.discard_func_interval = interval;
        }
        if let Some(envelopes) = &geometry.oriented_envelope {
            comp.oriented_envelope = envelopes.iter().map(|e| recenter_2d(e, centroid)).collect();
        }
        if let Some(footprints) = &geometry.section_footprint {
            comp.section_footprint = footprints.iter().map(|f| recenter_2d(f, centroid)).collect();
        }
        Ok(comp)
    }

    fn rebuild_flat_arrays(&mut self) {
        self.all_coordinates = self
            .components
            .iter()
            .flat_map(|c| c.coordinates.iter().copied())
            .collect();
        self.all_normals = self
            .components
            .iter()
            .flat_map(|c| c.normals.iter().copied())
            .collect();

        self.all_indices.clear();
        self.all_ids.clear();
        let mut nv = 0u32;
        for comp in &self.components {
            self.all_indices.extend(comp.v_table.iter().map(|v| v + nv));
            self.all_ids.extend(comp.ids.iter().map(|v| v + nv));
            nv += comp.n_vertex() as u32;
        }
    }

    /// Attach (or replace) a knot's values. `None` attaches the knot with no
    /// data so renderers fall back to their neutral color.
    pub fn load_function_data(&mut self, values: Option<&[f64]>, knot: &str) -> Result<()> {
        let Some(values) = values else {
            for comp in &mut self.components {
                comp.set_function(knot, Vec::new());
            }
            return Ok(());
        };

        let total = self.total_number_of_coords();
        if values.len() != total {
            return Err(EngineError::config(format!(
                "knot {knot} has {} values for {total} coordinates",
                values.len()
            )));
        }

        let mut read = 0;
        for comp in &mut self.components {
            let n = comp.n_vertex();
            comp.set_function(knot, vec![values[read..read + n].to_vec()]);
            read += n;
        }
        Ok(())
    }

    /// Knot values per timestep, flattened across components.
    pub fn function(&self, knot: &str) -> Result<Vec<Vec<f64>>> {
        let Some(first) = self.components.first() else {
            return Ok(Vec::new());
        };
        let steps = first
            .function(knot)
            .ok_or_else(|| EngineError::UnknownKnot(knot.to_string()))?
            .timesteps
            .len();

        let mut out = Vec::with_capacity(steps);
        for step in 0..steps {
            let mut flat = Vec::with_capacity(self.total_number_of_coords());
            for comp in &self.components {
                let f = comp
                    .function(knot)
                    .ok_or_else(|| EngineError::UnknownKnot(knot.to_string()))?;
                if let Some(values) = f.timesteps.get(step) {
                    flat.extend_from_slice(values);
                }
            }
            out.push(flat);
        }
        Ok(out)
    }

    pub fn attached_knots(&self) -> Vec<String> {
        self.components
            .first()
            .map(|c| c.functions.iter().map(|f| f.knot.clone()).collect())
            .unwrap_or_default()
    }

    pub fn coordinates(&self) -> &[f64] {
        &self.all_coordinates
    }

    pub fn normals(&self) -> &[f64] {
        &self.all_normals
    }

    pub fn indices(&self) -> &[u32] {
        &self.all_indices
    }

    /// Cell id of each triangle, offset by the vertex count of earlier components.
    pub fn ids(&self) -> &[u32] {
        &self.all_ids
    }

    pub fn heights(&self) -> Vec<&[f64]> {
        self.components.iter().map(|c| c.heights.as_slice()).collect()
    }

    pub fn min_heights(&self) -> Vec<&[f64]> {
        self.components.iter().map(|c| c.min_heights.as_slice()).collect()
    }

    pub fn oriented_envelopes(&self) -> Vec<&[Vec<f64>]> {
        self.components
            .iter()
            .map(|c| c.oriented_envelope.as_slice())
            .collect()
    }

    pub fn section_footprints(&self) -> Vec<&[Vec<f64>]> {
        self.components
            .iter()
            .map(|c| c.section_footprint.as_slice())
            .collect()
    }

    pub fn uv(&self) -> Vec<f64> {
        self.components.iter().flat_map(|c| c.uv.iter().copied()).collect()
    }

    pub fn width(&self) -> Vec<f64> {
        self.components.iter().flat_map(|c| c.width.iter().copied()).collect()
    }

    /// Two values per coordinate: the discard interval of its component.
    pub fn discard_func_interval(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.total_number_of_coords() * 2);
        for comp in &self.components {
            for _ in 0..comp.n_vertex() {
                out.extend_from_slice(&comp.discard_func_interval);
            }
        }
        out
    }

    pub fn ids_length(&self) -> usize {
        self.components.iter().map(|c| c.ids.len()).sum()
    }

    /// Cell id of every coordinate, grouped per component. Coordinates that no
    /// triangle references have no cell.
    pub fn ids_coordinates(&self) -> Vec<Vec<Option<u32>>> {
        let mut cells = vec![None; self.total_number_of_coords()];
        for (i, v) in self.all_indices.iter().enumerate() {
            if let (Some(slot), Some(id)) = (cells.get_mut(*v as usize), self.all_ids.get(i / 3)) {
                *slot = Some(*id);
            }
        }
        crate::level::group_by_components(&cells, &self.coords_per_comp())
    }

    pub fn coords_per_comp(&self) -> Vec<usize> {
        self.components.iter().map(|c| c.n_vertex()).collect()
    }

    pub fn component_offsets(&self) -> Vec<usize> {
        component_offsets(&self.coords_per_comp())
    }

    pub fn num_ids_per_comp(&self) -> Vec<usize> {
        self.components.iter().map(|c| c.ids.len()).collect()
    }

    pub fn total_number_of_coords(&self) -> usize {
        self.components.iter().map(|c| c.n_vertex()).sum()
    }

    /// Per-coordinate inclusion flags (1 in, 0 out).
    pub fn filtered(&self) -> &[f32] {
        &self.filtered
    }

    /// Keep the components that have at least one vertex inside `bbox`.
    /// `None` includes everything.
    pub fn set_filtered(&mut self, bbox: Option<Aabb2>) {
        let Some(bbox) = bbox else {
            self.filtered = vec![1.0; self.total_number_of_coords()];
            return;
        };

        let mut filtered = Vec::with_capacity(self.total_number_of_coords());
        for comp in &self.components {
            let d = comp.dimension;
            let inside = comp
                .coordinates
                .chunks_exact(d)
                .any(|c| bbox.contains(c[0], c[1]));
            let flag = if inside { 1.0 } else { 0.0 };
            filtered.extend(std::iter::repeat_n(flag, comp.n_vertex()));
        }
        self.filtered = filtered;
    }
}

fn recenter_2d(flat: &[f64], centroid: [f64; 3]) -> Vec<f64> {
    flat.iter()
        .enumerate()
        .map(|(i, v)| if i % 2 == 0 { v - centroid[0] } else { v - centroid[1] })
        .collect()
}
