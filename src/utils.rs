use faer::linalg::solvers::Solve;
use faer::reborrow::ReborrowMut;
use faer::sparse::{SparseColMat, Triplet};
use faer::{ColMut, Index, Mat, MatMut, Row};
use pulp::Arch;
use rayon::prelude::*;
use std::f64::consts::PI;

pub(crate) fn sub3(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn dot3(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn cross3(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn norm3(a: [f64; 3]) -> f64 {
    dot3(a, a).sqrt()
}

pub(crate) fn dist3(a: [f64; 3], b: [f64; 3]) -> f64 {
    norm3(sub3(a, b))
}

/// Area of the 3d triangle `(a, b, c)`.
pub(crate) fn tri_area_3d(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> f64 {
    0.5 * norm3(cross3(sub3(b, a), sub3(c, a)))
}

/// Signed area of the 2d triangle `(a, b, c)`, positive when counter-clockwise.
pub(crate) fn signed_area_2d(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    0.5 * ((b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]))
}

/// Unsigned angle at `b` between `a - b` and `c - b`.
pub(crate) fn angle3(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> f64 {
    let u = sub3(a, b);
    let v = sub3(c, b);
    let cr = norm3(cross3(u, v));
    cr.atan2(dot3(u, v))
}

/// Interior angles of the 3d triangle `(a, b, c)`, in corner order.
pub(crate) fn corner_angles(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> [f64; 3] {
    [angle3(c, a, b), angle3(a, b, c), angle3(b, c, a)]
}

/// 3d areas of triangles `f` over vertices `v`.
pub(crate) fn face_areas(f: &[[usize; 3]], v: &[[f64; 3]]) -> Vec<f64> {
    let arch = Arch::new();
    arch.dispatch(|| {
        let mut areas = Vec::new();
        f.par_iter()
            .map(|row| tri_area_3d(v[row[0]], v[row[1]], v[row[2]]))
            .collect_into_vec(&mut areas);
        areas
    })
}

/// Signed uv areas of triangles `f` over parameters `p`.
pub(crate) fn uv_areas(f: &[[usize; 3]], p: &[[f64; 2]]) -> Vec<f64> {
    let arch = Arch::new();
    arch.dispatch(|| {
        let mut areas = Vec::new();
        f.par_iter()
            .map(|row| signed_area_2d(p[row[0]], p[row[1]], p[row[2]]))
            .collect_into_vec(&mut areas);
        areas
    })
}

/// Returns whether all triangles of `f` have a non degenerate uv area of the same sign.
pub(crate) fn is_embedding(f: &[[usize; 3]], p: &[[f64; 2]]) -> bool {
    let areas = uv_areas(f, p);
    let total: f64 = areas.iter().map(|a| a.abs()).sum();
    if !(total > 0.) || !total.is_finite() {
        return false;
    }
    let eps = 1e-12 * total;
    areas.iter().all(|&a| a > eps) || areas.iter().all(|&a| a < -eps)
}

/// Apply constraints on matrix `l` and right hand side column vector `rhs`.
/// Constraints are given by a list of indices `c_indices` and the values `c_values` :
/// in the result, the values at index `c_index[i]` will equal `c_value[i]`.
///
/// Every constrained index must have a stored diagonal entry.
pub(crate) fn apply_constraints<I: Index>(
    l: &mut SparseColMat<I, f64>,
    mut rhs: ColMut<f64>,
    c_indices: &[usize],
    c_values: &[f64],
) {
    let mut constrained = vec![false; rhs.nrows()];
    for &i in c_indices {
        constrained[i] = true;
    }
    {
        let (sym, v) = l.parts_mut();
        let indices = sym.row_idx();
        indices
            .par_iter()
            .zip(v.par_iter_mut())
            .for_each(|(i, value)| {
                if constrained[i.zx()] {
                    *value = 0.;
                }
            });
    }
    for (index, &c_value) in c_indices.iter().zip(c_values) {
        let (sym, v) = l.parts_mut();
        let indices = sym.row_idx_of_col_raw(*index);
        let range = sym.col_range(*index);
        for (value, i) in v[range].iter_mut().zip(indices) {
            if i.zx() != *index {
                rhs[i.zx()] -= *value * c_value;
                *value = 0.;
            } else {
                rhs[i.zx()] = c_value;
                *value = 1.;
            }
        }
    }
}

/// Same as [`apply_constraints`] but with a matrix for rhs and rows for constraints values.
pub(crate) fn apply_constraints_mat<I: Index>(
    l: &mut SparseColMat<I, f64>,
    mut rhs: MatMut<f64>,
    c_indices: &[usize],
    c_values: &[Row<f64>],
) {
    let mut constrained = vec![false; rhs.nrows()];
    for &i in c_indices {
        constrained[i] = true;
    }
    {
        let (sym, v) = l.parts_mut();
        let indices = sym.row_idx();
        indices
            .par_iter()
            .zip(v.par_iter_mut())
            .for_each(|(i, value)| {
                if constrained[i.zx()] {
                    *value = 0.;
                }
            });
    }
    for (index, c_value) in c_indices.iter().zip(c_values) {
        let (sym, v) = l.parts_mut();
        let indices = sym.row_idx_of_col_raw(*index);
        let range = sym.col_range(*index);
        for (value, i) in v[range].iter_mut().zip(indices) {
            if i.zx() != *index {
                rhs.rb_mut()
                    .row_mut(i.zx())
                    .iter_mut()
                    .zip(c_value.iter())
                    .for_each(|(v, c)| *v -= *value * c);
                *value = 0.;
            } else {
                rhs.rb_mut()
                    .row_mut(i.zx())
                    .iter_mut()
                    .zip(c_value.iter())
                    .for_each(|(v, c)| *v = *c);
                *value = 1.;
            }
        }
    }
}

/// Largest step in `(0, 1]` along `delta` before the triangle `face` degenerates, scaled by 0.9.
fn max_flip_free_step(src: &[[f64; 2]], delta: &[[f64; 2]], face: &[usize; 3], t: f64) -> f64 {
    let v1 = src[face[0]];
    let v1p = delta[face[0]];
    let v2 = src[face[1]];
    let v2p = delta[face[1]];
    let v3 = src[face[2]];
    let v3p = delta[face[2]];
    let x1 = v2[0] - v1[0];
    let y1 = v2[1] - v1[1];
    let x1p = v2p[0] - v1p[0];
    let y1p = v2p[1] - v1p[1];
    let x2 = v3[0] - v1[0];
    let y2 = v3[1] - v1[1];
    let x2p = v3p[0] - v1p[0];
    let y2p = v3p[1] - v1p[1];
    // det(t) = a t^2 + b t + c
    let c = x1 * y2 - y1 * x2;
    let b = x1p * y2 + x1 * y2p - y1p * x2 - y1 * x2p;
    let a = x1p * y2p - y1p * x2p;
    let mut t = t;
    let mut consider = |root: f64| {
        if root > 0. && root < t {
            t = root * 0.9;
        }
    };
    if a.abs() <= 1e-14 * (b.abs() + c.abs()) {
        if b != 0. {
            consider(-c / b);
        }
        return t;
    }
    let delta = b.powi(2) - 4. * a * c;
    if delta < 0. {
        return t;
    }
    consider((-b - delta.sqrt()) / (2. * a));
    consider((-b + delta.sqrt()) / (2. * a));
    t
}

/// Move the vertices from `src` by at most `delta_dst` while avoiding triangle flips and also
/// minimizing the energy evaluted by `e`. Returns the energy of the accepted state.
pub(crate) fn flip_avoiding_line_search<F: Fn(&[[f64; 2]]) -> f64>(
    src: &mut [[f64; 2]],
    delta_dst: &[[f64; 2]],
    f: &[[usize; 3]],
    e: F,
) -> f64 {
    let start_e = e(src);
    let t = f
        .iter()
        .fold(1., |t, face| max_flip_free_step(src, delta_dst, face, t));
    let mut t = t;
    for _ in 0..10 {
        let mut temp_res = src.to_owned();
        for (src_row, t_row) in temp_res.iter_mut().zip(delta_dst) {
            src_row[0] += t * t_row[0];
            src_row[1] += t * t_row[1];
        }
        let cur_e = e(&temp_res);
        if cur_e < start_e {
            src.copy_from_slice(&temp_res);
            return cur_e;
        }
        t *= 0.5;
    }
    start_e
}

/// Place the points of a closed polygon with edge lengths `lengths` on the unit circle,
/// spacing them proportionally to the lengths. Point `i` starts edge `i`.
pub(crate) fn map_to_circle(lengths: &[f64]) -> Vec<[f64; 2]> {
    let total: f64 = lengths.iter().sum();
    let len = lengths.len();
    let mut acc = 0.;
    lengths
        .iter()
        .enumerate()
        .map(|(i, l)| {
            let frac = if total > 0. {
                acc / total
            } else {
                i as f64 / len as f64
            };
            acc += l;
            let angle = 2. * PI * frac;
            [angle.cos(), angle.sin()]
        })
        .collect()
}

/// Uniform graph laplacian of triangles `f`, each triangle edge adding a unit weight.
fn uniform_laplacian(f: &[[usize; 3]], nv: usize) -> Option<SparseColMat<usize, f64>> {
    let mut triplets = Vec::with_capacity(12 * f.len());
    for face in f {
        for j in 0..3 {
            let a = face[j];
            let b = face[(j + 1) % 3];
            triplets.push(Triplet::new(a, b, -1.));
            triplets.push(Triplet::new(b, a, -1.));
            triplets.push(Triplet::new(a, a, 1.));
            triplets.push(Triplet::new(b, b, 1.));
        }
    }
    SparseColMat::try_new_from_triplets(nv, nv, &triplets).ok()
}

/// Compute Tutte parameterization with border `b` mapped to a circle enclosing the same area as
/// the surface.
///
/// Arguments :
/// * `v` : surface vertices
/// * `f` : surface face indices
/// * `b` : choosen boundary loop, ordered along the boundary half-edges
///
/// Returns `None` if the system could not be solved.
pub(crate) fn compute_tutte_parameterization(
    v: &[[f64; 3]],
    f: &[[usize; 3]],
    b: &[usize],
) -> Option<Vec<[f64; 2]>> {
    if b.len() < 3 {
        return None;
    }
    let tot_area: f64 = face_areas(f, v).iter().sum();
    let mut lap = uniform_laplacian(f, v.len())?;
    let mut rhs = Mat::<f64>::zeros(v.len(), 2);

    let lengths: Vec<f64> = (0..b.len())
        .map(|i| dist3(v[b[i]], v[b[(i + 1) % b.len()]]))
        .collect();
    let radius = tot_area.sqrt() / PI.sqrt();
    let rows: Vec<_> = map_to_circle(&lengths)
        .into_iter()
        .map(|row| Row::from_fn(2, |i| row[i] * radius))
        .collect();

    apply_constraints_mat(&mut lap, rhs.as_mut(), b, &rows);
    let llt = lap.sp_cholesky(faer::Side::Lower).ok()?;
    llt.solve_in_place(rhs.as_mut());

    let res: Vec<[f64; 2]> = rhs.row_iter().map(|row| [row[0], row[1]]).collect();
    if res.iter().all(|p| p[0].is_finite() && p[1].is_finite()) {
        Some(res)
    } else {
        None
    }
}
