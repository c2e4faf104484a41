//! Conversion from host mesh faces to the parametrization graph.
//!
//! Faces are added one at a time with [`Construction::add_face`], seams are marked with
//! [`Construction::set_edge_seam`] and [`Construction::end`] splits the result into charts.

use std::collections::{HashMap, HashSet};

use crate::chart::{Chart, ChartVertex};
use crate::error::{ParamError, Result};
use crate::handle::{CornerLink, ParamHandle};
use crate::options::ConstructOptions;
use crate::utils::{corner_angles, cross3, dot3, norm3, sub3, tri_area_3d};
use crate::ParamKey;

/// Triangles with an area below this fraction of their longest squared edge are degenerate.
const AREA_EPS: f64 = 1e-10;
/// Corner uvs closer than this are considered connected in implicit mode.
const UV_CONNECT_LIMIT: f64 = 1e-5;

/// One source face as seen by the parametrizer. All slices hold one entry per corner.
#[derive(Clone, Copy, Debug)]
pub struct FaceInput<'a> {
    /// External key of the face, given back on flush.
    pub key: ParamKey,
    /// External vertex keys, in winding order.
    pub vertex_keys: &'a [ParamKey],
    /// 3d positions of the corners.
    pub positions: &'a [[f64; 3]],
    /// Current uv of every corner.
    pub uvs: &'a [[f64; 2]],
    /// Optional vertex weights in `[0, 1]`, `1` when absent.
    pub weights: Option<&'a [f64]>,
    /// Pinned corners.
    pub pinned: &'a [bool],
    /// Selected corners.
    pub selected: &'a [bool],
    /// Face normal, computed from the corners when absent.
    pub normal: Option<[f64; 3]>,
}

#[derive(Clone, Debug)]
struct Corner {
    vert: usize,
    uv: [f64; 2],
    weight: f64,
    pinned: bool,
    selected: bool,
}

#[derive(Clone, Debug)]
struct SourceFace {
    key: ParamKey,
    first: usize,
    len: usize,
    /// Triangles over the corners of this face, as global corner indices.
    tris: Vec<[usize; 3]>,
}

/// Builder of a [`ParamHandle`].
#[derive(Debug)]
pub struct Construction {
    vert_ids: HashMap<ParamKey, usize>,
    vert_keys: Vec<ParamKey>,
    vert_co: Vec<[f64; 3]>,
    corners: Vec<Corner>,
    faces: Vec<SourceFace>,
    seams: HashSet<(ParamKey, ParamKey)>,
    aspect: [f64; 2],
    skipped: usize,
}

impl Default for Construction {
    fn default() -> Self {
        Self {
            vert_ids: HashMap::new(),
            vert_keys: Vec::new(),
            vert_co: Vec::new(),
            corners: Vec::new(),
            faces: Vec::new(),
            seams: HashSet::new(),
            aspect: [1., 1.],
            skipped: 0,
        }
    }
}

fn edge_key(a: ParamKey, b: ParamKey) -> (ParamKey, ParamKey) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

impl Construction {
    /// Start the construction of a new handle.
    pub fn begin() -> Self {
        Self::default()
    }

    /// Image aspect ratio the uvs are expressed in. Uvs are scaled by `(aspx, aspy)` when loaded
    /// and scaled back on flush, so that solving happens in an isotropic space.
    pub fn set_aspect_ratio(&mut self, aspx: f64, aspy: f64) {
        if aspx > 0. && aspy > 0. && aspx.is_finite() && aspy.is_finite() {
            self.aspect = [aspx, aspy];
        } else {
            log::warn!("ignoring invalid aspect ratio ({aspx}, {aspy})");
        }
    }

    /// Number of faces rejected so far.
    pub fn skipped_faces(&self) -> usize {
        self.skipped
    }

    /// Mark the edge between vertex keys `a` and `b` as a seam.
    pub fn set_edge_seam(&mut self, a: ParamKey, b: ParamKey) {
        self.seams.insert(edge_key(a, b));
    }

    /// Add one polygon. Returns the number of triangles it was split into.
    ///
    /// Rejected faces are counted and left out of the graph, they never abort the construction.
    pub fn add_face(&mut self, face: &FaceInput) -> Result<usize> {
        match self.try_add_face(face) {
            Ok(n) => Ok(n),
            Err(err) => {
                self.skipped += 1;
                log::debug!("skipping face: {err}");
                Err(err)
            }
        }
    }

    fn try_add_face(&mut self, face: &FaceInput) -> Result<usize> {
        let n = face.vertex_keys.len();
        if n < 3 {
            return Err(ParamError::TooFewCorners {
                face: face.key,
                corners: n,
            });
        }
        if face.positions.len() != n
            || face.uvs.len() != n
            || face.pinned.len() != n
            || face.selected.len() != n
            || face.weights.is_some_and(|w| w.len() != n)
        {
            return Err(ParamError::MismatchedCornerData { face: face.key });
        }
        for i in 0..n {
            if face.vertex_keys[i + 1..].contains(&face.vertex_keys[i]) {
                return Err(ParamError::RepeatedVertex {
                    face: face.key,
                    vertex: face.vertex_keys[i],
                });
            }
        }
        // a key keeps the position of the first face that named it
        let co: Vec<[f64; 3]> = (0..n)
            .map(|i| match self.vert_ids.get(&face.vertex_keys[i]) {
                Some(&id) => {
                    let known = self.vert_co[id];
                    if known != face.positions[i] {
                        log::debug!(
                            "face {}: vertex {} given at {:?}, keeping {:?}",
                            face.key,
                            face.vertex_keys[i],
                            face.positions[i],
                            known
                        );
                    }
                    known
                }
                None => face.positions[i],
            })
            .collect();
        let local = split_polygon(&co, face.normal);
        // every corner must belong to a kept triangle, or it would be a vertex without equations
        let mut covered = vec![false; n];
        for t in &local {
            for &c in t {
                covered[c] = true;
            }
        }
        if local.is_empty() || covered.contains(&false) {
            return Err(ParamError::ZeroArea { face: face.key });
        }

        let first = self.corners.len();
        for i in 0..n {
            let key = face.vertex_keys[i];
            let vert = match self.vert_ids.get(&key) {
                Some(&id) => id,
                None => {
                    let id = self.vert_keys.len();
                    self.vert_ids.insert(key, id);
                    self.vert_keys.push(key);
                    self.vert_co.push(co[i]);
                    id
                }
            };
            self.corners.push(Corner {
                vert,
                uv: face.uvs[i],
                weight: face.weights.map_or(1., |w| w[i].clamp(0., 1.)),
                pinned: face.pinned[i],
                selected: face.selected[i],
            });
        }
        let tris: Vec<[usize; 3]> = local
            .iter()
            .map(|t| [first + t[0], first + t[1], first + t[2]])
            .collect();
        let count = tris.len();
        self.faces.push(SourceFace {
            key: face.key,
            first,
            len: n,
            tris,
        });
        Ok(count)
    }

    /// Finish the construction: split the graph into charts and optionally fill holes.
    pub fn end(self, options: ConstructOptions) -> ParamHandle {
        let nf = self.faces.len();
        let mut face_sets = DisjointSets::new(nf);
        let mut corner_sets = DisjointSets::new(self.corners.len());

        // polygon edges only, diagonals from polygon splitting stay inside their face
        let mut edges: HashMap<(usize, usize), Vec<(usize, usize, usize)>> = HashMap::new();
        for (fi, face) in self.faces.iter().enumerate() {
            for i in 0..face.len {
                let a = face.first + i;
                let b = face.first + (i + 1) % face.len;
                let (va, vb) = (self.corners[a].vert, self.corners[b].vert);
                let key = if va < vb { (va, vb) } else { (vb, va) };
                edges.entry(key).or_default().push((fi, a, b));
            }
        }

        let mut cuts = 0;
        for refs in edges.values() {
            let [(f1, a1, b1), (f2, a2, b2)] = refs[..] else {
                continue;
            };
            // the second face must walk the edge in the opposite direction
            if f1 == f2 || self.corners[a1].vert != self.corners[b2].vert {
                continue;
            }
            let cut = if options.implicit {
                !uv_close(self.corners[a1].uv, self.corners[b2].uv)
                    || !uv_close(self.corners[b1].uv, self.corners[a2].uv)
            } else {
                let ka = self.vert_keys[self.corners[a1].vert];
                let kb = self.vert_keys[self.corners[b1].vert];
                self.seams.contains(&edge_key(ka, kb))
            };
            if cut {
                cuts += 1;
                continue;
            }
            face_sets.union(f1, f2);
            corner_sets.union(a1, b2);
            corner_sets.union(b1, a2);
        }

        // charts, in the order of their first face
        let mut chart_of_root: HashMap<usize, usize> = HashMap::new();
        let mut chart_faces: Vec<Vec<usize>> = Vec::new();
        for fi in 0..nf {
            let root = face_sets.find(fi);
            let ci = *chart_of_root.entry(root).or_insert_with(|| {
                chart_faces.push(Vec::new());
                chart_faces.len() - 1
            });
            chart_faces[ci].push(fi);
        }

        let mut charts = Vec::with_capacity(chart_faces.len());
        let mut links = Vec::with_capacity(self.corners.len());
        for (ci, faces) in chart_faces.iter().enumerate() {
            let mut local_of_root: HashMap<usize, usize> = HashMap::new();
            let mut acc: Vec<VertexAccumulator> = Vec::new();
            let mut tris = Vec::new();
            for &fi in faces {
                let face = &self.faces[fi];
                let mut local = Vec::with_capacity(face.len);
                for c in face.first..face.first + face.len {
                    let root = corner_sets.find(c);
                    let corner = &self.corners[c];
                    let lv = *local_of_root.entry(root).or_insert_with(|| {
                        acc.push(VertexAccumulator::new(
                            self.vert_keys[corner.vert],
                            self.vert_co[corner.vert],
                        ));
                        acc.len() - 1
                    });
                    acc[lv].add(corner);
                    local.push(lv);
                    links.push(CornerLink {
                        face: face.key,
                        corner: c - face.first,
                        chart: ci,
                        vert: lv,
                        uv: corner.uv,
                    });
                }
                for t in &face.tris {
                    tris.push([
                        local[t[0] - face.first],
                        local[t[1] - face.first],
                        local[t[2] - face.first],
                    ]);
                }
            }
            let verts = acc
                .into_iter()
                .map(|a| a.finish(self.aspect))
                .collect();
            let mut chart = Chart::new(verts, tris);
            if options.fill_holes {
                chart.fill_holes();
            }
            charts.push(chart);
        }

        log::info!(
            "built {} charts from {} faces ({} skipped, {} cut edges)",
            charts.len(),
            nf,
            self.skipped,
            cuts
        );
        ParamHandle::new(charts, links, self.aspect, self.skipped)
    }
}

fn uv_close(a: [f64; 2], b: [f64; 2]) -> bool {
    (a[0] - b[0]).abs() < UV_CONNECT_LIMIT && (a[1] - b[1]).abs() < UV_CONNECT_LIMIT
}

struct VertexAccumulator {
    key: ParamKey,
    co: [f64; 3],
    uv_sum: [f64; 2],
    count: usize,
    pin_uv_sum: [f64; 2],
    pins: usize,
    weight_sum: f64,
    selected: bool,
}

impl VertexAccumulator {
    fn new(key: ParamKey, co: [f64; 3]) -> Self {
        Self {
            key,
            co,
            uv_sum: [0.; 2],
            count: 0,
            pin_uv_sum: [0.; 2],
            pins: 0,
            weight_sum: 0.,
            selected: false,
        }
    }

    fn add(&mut self, corner: &Corner) {
        self.uv_sum[0] += corner.uv[0];
        self.uv_sum[1] += corner.uv[1];
        self.count += 1;
        if corner.pinned {
            self.pin_uv_sum[0] += corner.uv[0];
            self.pin_uv_sum[1] += corner.uv[1];
            self.pins += 1;
        }
        self.weight_sum += corner.weight;
        self.selected |= corner.selected;
    }

    fn finish(self, aspect: [f64; 2]) -> ChartVertex {
        let (sum, n) = if self.pins > 0 {
            (self.pin_uv_sum, self.pins)
        } else {
            (self.uv_sum, self.count)
        };
        let uv = [
            sum[0] / n as f64 * aspect[0],
            sum[1] / n as f64 * aspect[1],
        ];
        ChartVertex {
            key: self.key,
            co: self.co,
            uv,
            snapshot: uv,
            pinned: self.pins > 0,
            selected: self.selected,
            weight: self.weight_sum / self.count as f64,
            on_boundary: false,
        }
    }
}

/// Union-find over `0..n`, with path halving.
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // keep the smallest index as root so chart order follows face order
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

fn is_degenerate(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> bool {
    let longest = norm3(sub3(b, a))
        .max(norm3(sub3(c, b)))
        .max(norm3(sub3(a, c)));
    !(tri_area_3d(a, b, c) > AREA_EPS * longest * longest)
}

/// Split a polygon into non degenerate triangles over its local corner indices.
fn split_polygon(co: &[[f64; 3]], normal: Option<[f64; 3]>) -> Vec<[usize; 3]> {
    let tris = match co.len() {
        3 => vec![[0, 1, 2]],
        4 => split_quad(co),
        _ => ear_clip(co, normal),
    };
    tris.into_iter()
        .filter(|t| !is_degenerate(co[t[0]], co[t[1]], co[t[2]]))
        .collect()
}

/// Pick the quad diagonal giving the largest minimal corner angle.
fn split_quad(co: &[[f64; 3]]) -> Vec<[usize; 3]> {
    let min_angle = |t: [[usize; 3]; 2]| {
        t.iter()
            .flat_map(|t| corner_angles(co[t[0]], co[t[1]], co[t[2]]))
            .fold(f64::INFINITY, f64::min)
    };
    let split_02 = [[0, 1, 2], [0, 2, 3]];
    let split_13 = [[0, 1, 3], [1, 2, 3]];
    if min_angle(split_13) > min_angle(split_02) {
        split_13.to_vec()
    } else {
        split_02.to_vec()
    }
}

/// Newell normal of a polygon.
fn newell_normal(co: &[[f64; 3]]) -> [f64; 3] {
    let mut n = [0.; 3];
    for i in 0..co.len() {
        let a = co[i];
        let b = co[(i + 1) % co.len()];
        n[0] += (a[1] - b[1]) * (a[2] + b[2]);
        n[1] += (a[2] - b[2]) * (a[0] + b[0]);
        n[2] += (a[0] - b[0]) * (a[1] + b[1]);
    }
    n
}

/// Ear clipping of a polygon projected on its plane.
fn ear_clip(co: &[[f64; 3]], normal: Option<[f64; 3]>) -> Vec<[usize; 3]> {
    let n = normal
        .filter(|n| norm3(*n) > 0.)
        .unwrap_or_else(|| newell_normal(co));
    let len = norm3(n);
    if !(len > 0.) {
        return Vec::new();
    }
    let n = [n[0] / len, n[1] / len, n[2] / len];
    // any axis not parallel to the normal
    let helper = if n[0].abs() < 0.9 { [1., 0., 0.] } else { [0., 1., 0.] };
    let ex = cross3(helper, n);
    let ex_len = norm3(ex);
    let ex = [ex[0] / ex_len, ex[1] / ex_len, ex[2] / ex_len];
    let ey = cross3(n, ex);
    let p: Vec<[f64; 2]> = co.iter().map(|c| [dot3(*c, ex), dot3(*c, ey)]).collect();

    let cross2 = |a: [f64; 2], b: [f64; 2], c: [f64; 2]| {
        (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
    };
    let inside = |q: [f64; 2], a: [f64; 2], b: [f64; 2], c: [f64; 2]| {
        cross2(a, b, q) > 0. && cross2(b, c, q) > 0. && cross2(c, a, q) > 0.
    };

    let mut ring: Vec<usize> = (0..co.len()).collect();
    let mut res = Vec::with_capacity(co.len() - 2);
    while ring.len() > 3 {
        let m = ring.len();
        let mut ear = None;
        let mut fallback = 0;
        let mut fallback_cross = f64::NEG_INFINITY;
        for i in 0..m {
            let (a, b, c) = (ring[(i + m - 1) % m], ring[i], ring[(i + 1) % m]);
            let cr = cross2(p[a], p[b], p[c]);
            if cr > fallback_cross {
                fallback_cross = cr;
                fallback = i;
            }
            if cr <= 0. {
                continue;
            }
            let blocked = ring
                .iter()
                .any(|&q| q != a && q != b && q != c && inside(p[q], p[a], p[b], p[c]));
            if !blocked {
                ear = Some(i);
                break;
            }
        }
        let i = ear.unwrap_or(fallback);
        res.push([ring[(i + m - 1) % m], ring[i], ring[(i + 1) % m]]);
        ring.remove(i);
    }
    res.push([ring[0], ring[1], ring[2]]);
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(c: &mut Construction, key: ParamKey, keys: &[ParamKey], co: &[[f64; 3]]) -> Result<usize> {
        let n = keys.len();
        let uvs = vec![[0., 0.]; n];
        let flags = vec![false; n];
        c.add_face(&FaceInput {
            key,
            vertex_keys: keys,
            positions: co,
            uvs: &uvs,
            weights: None,
            pinned: &flags,
            selected: &flags,
            normal: None,
        })
    }

    #[test]
    fn rejects_bad_faces() {
        let mut c = Construction::begin();
        let co = [[0., 0., 0.], [1., 0., 0.], [0., 1., 0.]];
        assert!(matches!(
            add(&mut c, 0, &[0, 1], &co[..2]),
            Err(ParamError::TooFewCorners { .. })
        ));
        assert!(matches!(
            add(&mut c, 1, &[0, 1, 1], &co),
            Err(ParamError::RepeatedVertex { vertex: 1, .. })
        ));
        let flat = [[0., 0., 0.], [1., 0., 0.], [2., 0., 0.]];
        assert!(matches!(
            add(&mut c, 2, &[0, 1, 2], &flat),
            Err(ParamError::ZeroArea { .. })
        ));
        assert_eq!(add(&mut c, 3, &[0, 1, 2], &co), Ok(1));
        assert_eq!(c.skipped_faces(), 3);
    }

    #[test]
    fn splits_ngons() {
        let hexagon: Vec<[f64; 3]> = (0..6)
            .map(|i| {
                let a = std::f64::consts::PI * i as f64 / 3.;
                [a.cos(), a.sin(), 0.]
            })
            .collect();
        let tris = split_polygon(&hexagon, None);
        assert_eq!(tris.len(), 4);
        let area: f64 = tris
            .iter()
            .map(|t| tri_area_3d(hexagon[t[0]], hexagon[t[1]], hexagon[t[2]]))
            .sum();
        assert!((area - 1.5 * 3f64.sqrt()).abs() < 1e-9);

        // concave "L" shape
        let l = [
            [0., 0., 0.],
            [2., 0., 0.],
            [2., 1., 0.],
            [1., 1., 0.],
            [1., 2., 0.],
            [0., 2., 0.],
        ];
        let tris = split_polygon(&l, Some([0., 0., 1.]));
        let area: f64 = tris
            .iter()
            .map(|t| tri_area_3d(l[t[0]], l[t[1]], l[t[2]]))
            .sum();
        assert!((area - 3.).abs() < 1e-9);
    }

    #[test]
    fn quad_split_avoids_collinear_corner() {
        let co = [[0., 0., 0.], [1., 0., 0.], [2., 0., 0.], [1., 1., 0.]];
        let tris = split_polygon(&co, None);
        assert_eq!(tris, vec![[0, 1, 3], [1, 2, 3]]);
    }

    #[test]
    fn quad_with_coincident_corners_is_rejected() {
        let mut c = Construction::begin();
        let co = [[0., 0., 0.], [1., 0., 0.], [1., 0., 0.], [0., 1., 0.]];
        assert_eq!(
            add(&mut c, 7, &[0, 1, 2, 3], &co),
            Err(ParamError::ZeroArea { face: 7 })
        );
        // nothing registered for the rejected face
        assert!(c.vert_ids.is_empty());
        assert!(c.corners.is_empty());
    }

    #[test]
    fn known_vertices_keep_their_first_position() {
        let co = [[0., 0., 0.], [1., 0., 0.], [0., 1., 0.], [1., 1., 0.]];
        let mut c = Construction::begin();
        add(&mut c, 0, &[0, 1, 2], &[co[0], co[1], co[2]]).unwrap();
        // vertex 2 given on top of vertex 1: flat with these positions, valid with the known ones
        assert_eq!(add(&mut c, 1, &[1, 3, 2], &[co[1], co[3], co[1]]), Ok(1));
        let handle = c.end(ConstructOptions::default());
        let chart = &handle.charts()[0];
        let v2 = chart.verts.iter().find(|v| v.key == 2).unwrap();
        assert_eq!(v2.co, co[2]);
    }

    #[test]
    fn seams_split_charts() {
        // two triangles sharing the edge 1-2
        let co = [[0., 0., 0.], [1., 0., 0.], [0., 1., 0.], [1., 1., 0.]];
        let build = |seam: bool| {
            let mut c = Construction::begin();
            add(&mut c, 0, &[0, 1, 2], &[co[0], co[1], co[2]]).unwrap();
            add(&mut c, 1, &[1, 3, 2], &[co[1], co[3], co[2]]).unwrap();
            if seam {
                c.set_edge_seam(2, 1);
            }
            c.end(ConstructOptions::default())
        };
        let joined = build(false);
        assert_eq!(joined.charts().len(), 1);
        assert_eq!(joined.charts()[0].vertex_count(), 4);
        let split = build(true);
        assert_eq!(split.charts().len(), 2);
        assert_eq!(split.charts()[0].vertex_count(), 3);
        assert_eq!(split.charts()[1].vertex_count(), 3);
    }

    #[test]
    fn implicit_mode_follows_uv_islands() {
        let co = [[0., 0., 0.], [1., 0., 0.], [0., 1., 0.], [1., 1., 0.]];
        let flags = [false; 3];
        let mut c = Construction::begin();
        c.add_face(&FaceInput {
            key: 0,
            vertex_keys: &[0, 1, 2],
            positions: &[co[0], co[1], co[2]],
            uvs: &[[0., 0.], [1., 0.], [0., 1.]],
            weights: None,
            pinned: &flags,
            selected: &flags,
            normal: None,
        })
        .unwrap();
        // uvs of the shared edge do not match: separate island
        c.add_face(&FaceInput {
            key: 1,
            vertex_keys: &[1, 3, 2],
            positions: &[co[1], co[3], co[2]],
            uvs: &[[3., 0.], [3., 1.], [2., 1.]],
            weights: None,
            pinned: &flags,
            selected: &flags,
            normal: None,
        })
        .unwrap();
        c.set_edge_seam(0, 1);
        let handle = c.end(ConstructOptions {
            fill_holes: false,
            implicit: true,
        });
        assert_eq!(handle.charts().len(), 2);
    }

    #[test]
    fn pinned_corners_drive_vertex_uv() {
        let co = [[0., 0., 0.], [1., 0., 0.], [0., 1., 0.], [1., 1., 0.]];
        let mut c = Construction::begin();
        c.set_aspect_ratio(2., 1.);
        c.add_face(&FaceInput {
            key: 0,
            vertex_keys: &[0, 1, 2],
            positions: &[co[0], co[1], co[2]],
            uvs: &[[0., 0.], [0.5, 0.], [0., 0.5]],
            weights: Some(&[1., 0., 0.]),
            pinned: &[false, true, false],
            selected: &[false; 3],
            normal: None,
        })
        .unwrap();
        c.add_face(&FaceInput {
            key: 1,
            vertex_keys: &[1, 3, 2],
            positions: &[co[1], co[3], co[2]],
            uvs: &[[0.25, 0.], [0.5, 0.5], [0., 0.5]],
            weights: Some(&[1., 0., 0.]),
            pinned: &[false; 3],
            selected: &[true, false, false],
            normal: None,
        })
        .unwrap();
        let handle = c.end(ConstructOptions::default());
        let chart = &handle.charts()[0];
        let v1 = chart.verts.iter().find(|v| v.key == 1).unwrap();
        assert!(v1.pinned && v1.selected);
        assert_eq!(v1.uv, [1., 0.]);
        assert!((v1.weight - 0.5).abs() < 1e-12);
    }
}
