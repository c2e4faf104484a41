//! Charts (islands): independently parametrized groups of faces.

use std::collections::HashMap;

use crate::utils::{angle3, dist3, signed_area_2d, tri_area_3d};
use crate::ParamKey;

/// Relative area under which a hole filling triangle is dropped.
const FILL_AREA_EPS: f64 = 1e-12;

/// A parametrization vertex: one side of a 3d vertex inside a chart.
#[derive(Clone, Debug)]
pub(crate) struct ChartVertex {
    pub key: ParamKey,
    pub co: [f64; 3],
    /// Current uv, aspect corrected.
    pub uv: [f64; 2],
    /// Uv at construction time, aspect corrected.
    pub snapshot: [f64; 2],
    pub pinned: bool,
    pub selected: bool,
    pub weight: f64,
    /// Lies on a boundary loop of the chart, before hole filling.
    pub on_boundary: bool,
}

/// A connected group of faces, cut from the rest of the mesh by seams or boundaries.
///
/// Real faces come first in the face list, virtual faces added by hole filling come after them.
#[derive(Clone, Debug)]
pub struct Chart {
    pub(crate) verts: Vec<ChartVertex>,
    pub(crate) faces: Vec<[usize; 3]>,
    pub(crate) n_real: usize,
    pub(crate) boundary_loops: Vec<Vec<usize>>,
    pub(crate) holes_filled: bool,
    pub(crate) modified: bool,
}

impl Chart {
    pub(crate) fn new(verts: Vec<ChartVertex>, faces: Vec<[usize; 3]>) -> Self {
        let mut chart = Chart {
            n_real: faces.len(),
            verts,
            faces,
            boundary_loops: Vec::new(),
            holes_filled: false,
            modified: false,
        };
        let half_edges = boundary_half_edges(&chart.faces);
        for &(a, b) in &half_edges {
            chart.verts[a].on_boundary = true;
            chart.verts[b].on_boundary = true;
        }
        chart.boundary_loops = chain_loops(&half_edges);
        chart
    }

    /// Number of parametrization vertices.
    pub fn vertex_count(&self) -> usize {
        self.verts.len()
    }

    /// Number of triangles coming from the input mesh.
    pub fn face_count(&self) -> usize {
        self.n_real
    }

    /// Number of virtual triangles added by hole filling.
    pub fn virtual_face_count(&self) -> usize {
        self.faces.len() - self.n_real
    }

    /// Number of boundary loops of the chart, filled holes included.
    pub fn boundary_loop_count(&self) -> usize {
        self.boundary_loops.len()
    }

    /// External keys of the chart vertices.
    pub fn vertex_keys(&self) -> impl Iterator<Item = ParamKey> + '_ {
        self.verts.iter().map(|v| v.key)
    }

    /// Current (aspect corrected) uvs of the chart vertices.
    pub fn uvs(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        self.verts.iter().map(|v| v.uv)
    }

    /// Number of pinned vertices.
    pub fn pin_count(&self) -> usize {
        self.verts.iter().filter(|v| v.pinned).count()
    }

    /// Wether a solver or post-process changed the uvs of this chart.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn real_faces(&self) -> &[[usize; 3]] {
        &self.faces[..self.n_real]
    }

    pub(crate) fn positions(&self) -> Vec<[f64; 3]> {
        self.verts.iter().map(|v| v.co).collect()
    }

    pub(crate) fn uv_vec(&self) -> Vec<[f64; 2]> {
        self.verts.iter().map(|v| v.uv).collect()
    }

    pub(crate) fn set_uvs(&mut self, uvs: &[[f64; 2]]) {
        for (v, uv) in self.verts.iter_mut().zip(uvs) {
            v.uv = *uv;
        }
        self.modified = true;
    }

    pub(crate) fn map_uvs(&mut self, f: impl Fn([f64; 2]) -> [f64; 2]) {
        for v in self.verts.iter_mut() {
            v.uv = f(v.uv);
        }
        self.modified = true;
    }

    /// Surface area of the real faces.
    pub fn area_3d(&self) -> f64 {
        self.real_faces()
            .iter()
            .map(|f| tri_area_3d(self.verts[f[0]].co, self.verts[f[1]].co, self.verts[f[2]].co))
            .sum()
    }

    /// Uv area of the real faces, folded parts counted positively.
    pub fn area_uv(&self) -> f64 {
        self.real_faces()
            .iter()
            .map(|f| signed_area_2d(self.verts[f[0]].uv, self.verts[f[1]].uv, self.verts[f[2]].uv).abs())
            .sum()
    }

    /// Uv bounding box `(min, max)` of the chart vertices.
    pub fn uv_bounds(&self) -> ([f64; 2], [f64; 2]) {
        let mut min = [f64::INFINITY; 2];
        let mut max = [f64::NEG_INFINITY; 2];
        for v in &self.verts {
            for i in 0..2 {
                min[i] = min[i].min(v.uv[i]);
                max[i] = max[i].max(v.uv[i]);
            }
        }
        (min, max)
    }

    fn loop_length(&self, l: &[usize]) -> f64 {
        (0..l.len())
            .map(|i| dist3(self.verts[l[i]].co, self.verts[l[(i + 1) % l.len()]].co))
            .sum()
    }

    /// Index of the boundary loop with the largest 3d perimeter.
    pub(crate) fn longest_boundary(&self) -> Option<usize> {
        let mut best = None;
        let mut best_len = f64::NEG_INFINITY;
        for (i, l) in self.boundary_loops.iter().enumerate() {
            let len = self.loop_length(l);
            if len > best_len {
                best_len = len;
                best = Some(i);
            }
        }
        best
    }

    /// Close every boundary loop but the longest one with virtual triangles.
    pub(crate) fn fill_holes(&mut self) {
        if self.holes_filled {
            return;
        }
        self.holes_filled = true;
        let Some(outer) = self.longest_boundary() else {
            return;
        };
        let loops = std::mem::take(&mut self.boundary_loops);
        for (i, l) in loops.iter().enumerate() {
            if i != outer {
                self.fill_loop(l);
            }
        }
        self.boundary_loops = loops;
        log::trace!(
            "filled {} holes with {} virtual faces",
            self.boundary_loops.len() - 1,
            self.virtual_face_count()
        );
    }

    /// Ear clipping of one loop, cutting the sharpest 3d corner first.
    fn fill_loop(&mut self, l: &[usize]) {
        if l.len() < 3 {
            return;
        }
        let scale = self.loop_length(l).powi(2);
        let mut ring = l.to_vec();
        while ring.len() > 3 {
            let n = ring.len();
            let mut best = 0;
            let mut best_angle = f64::INFINITY;
            for i in 0..n {
                let prev = self.verts[ring[(i + n - 1) % n]].co;
                let cur = self.verts[ring[i]].co;
                let next = self.verts[ring[(i + 1) % n]].co;
                let angle = angle3(prev, cur, next);
                if angle < best_angle {
                    best_angle = angle;
                    best = i;
                }
            }
            let prev = ring[(best + n - 1) % n];
            let next = ring[(best + 1) % n];
            self.push_virtual([prev, next, ring[best]], scale);
            ring.remove(best);
        }
        self.push_virtual([ring[0], ring[2], ring[1]], scale);
    }

    fn push_virtual(&mut self, f: [usize; 3], scale: f64) {
        let area = tri_area_3d(self.verts[f[0]].co, self.verts[f[1]].co, self.verts[f[2]].co);
        if area > FILL_AREA_EPS * scale {
            self.faces.push(f);
        }
    }
}

/// Half-edges of `faces` that have no opposite half-edge, in face order.
pub(crate) fn boundary_half_edges(faces: &[[usize; 3]]) -> Vec<(usize, usize)> {
    let mut count: HashMap<(usize, usize), usize> = HashMap::with_capacity(3 * faces.len());
    for f in faces {
        for i in 0..3 {
            *count.entry((f[i], f[(i + 1) % 3])).or_insert(0) += 1;
        }
    }
    let mut res = Vec::new();
    for f in faces {
        for i in 0..3 {
            let (a, b) = (f[i], f[(i + 1) % 3]);
            if !count.contains_key(&(b, a)) {
                res.push((a, b));
            }
        }
    }
    res
}

/// Chain boundary half-edges into closed loops. Open chains are dropped.
pub(crate) fn chain_loops(half_edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
    let mut outgoing: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, &(a, _)) in half_edges.iter().enumerate() {
        outgoing.entry(a).or_default().push(i);
    }
    let mut used = vec![false; half_edges.len()];
    let mut loops = Vec::new();
    for start in 0..half_edges.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let (first, mut cur) = half_edges[start];
        let mut l = vec![first];
        let mut closed = false;
        while l.len() <= half_edges.len() {
            if cur == first {
                closed = true;
                break;
            }
            l.push(cur);
            let next = outgoing
                .get(&cur)
                .and_then(|list| list.iter().copied().find(|&h| !used[h]));
            match next {
                Some(h) => {
                    used[h] = true;
                    cur = half_edges[h].1;
                }
                None => break,
            }
        }
        if closed && l.len() >= 3 {
            loops.push(l);
        }
    }
    loops
}
