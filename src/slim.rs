//! Scalable locally injective maps.
//!
//! Each iteration alternates a local step, finding per face the closest rotation (or orthogonal
//! matrix) to its jacobian together with a symmetric Dirichlet reweighting, and a global step
//! solving the weighted least squares fit of every jacobian to its target. The solution of the
//! global step is reached through a flip avoiding line search, so that an injective map stays
//! injective.

use faer::linalg::solvers::Solve;
use faer::sparse::{SparseColMat, Triplet};
use faer::ColMut;
use rayon::prelude::*;

use crate::chart::{Chart, ChartVertex};
use crate::error::{ParamError, Result};
use crate::handle::SolveStats;
use crate::lscm;
use crate::options::{ReflectionMode, SlimOptions};
use crate::utils::{
    apply_constraints, compute_tutte_parameterization, face_areas, flip_avoiding_line_search,
    is_embedding, uv_areas,
};

/// Singular values are clamped to this when computing weights.
const MIN_SINGULAR_VALUE: f64 = 1e-4;

struct SVD2d {
    u: [f64; 4],
    v: [f64; 4],
    s: [f64; 2],
}

/// Closed form SVD of the row major matrix `m`, such that `m = u diag(s) v`.
///
/// `u` is a rotation, `v` is a rotation or a reflection depending on the sign of `det(m)`.
fn svd_2x2(m: &[f64; 4]) -> SVD2d {
    let e = 0.5 * (m[0] + m[3]);
    let f = 0.5 * (m[0] - m[3]);
    let g = 0.5 * (m[2] + m[1]);
    let h = 0.5 * (m[2] - m[1]);
    let q = (e.powi(2) + h.powi(2)).sqrt();
    let r = (f.powi(2) + g.powi(2)).sqrt();
    let sx = q + r;
    let sy = q - r;
    let a1 = g.atan2(f);
    let a2 = h.atan2(e);
    let theta = 0.5 * (a2 - a1);
    let (sin_t, cos_t) = theta.sin_cos();
    let phi = 0.5 * (a2 + a1);
    let (sin_p, cos_p) = phi.sin_cos();
    let s = [sx, sy.abs()];
    let u = [cos_p, -sin_p, sin_p, cos_p];
    let v = if sy >= 0. {
        [cos_t, -sin_t, sin_t, cos_t]
    } else {
        [cos_t, -sin_t, -sin_t, -cos_t]
    };
    SVD2d { s, u, v }
}

fn mul_2d(a: &[f64; 4], b: &[f64; 4]) -> [f64; 4] {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
    ]
}

fn det_2d(m: &[f64; 4]) -> f64 {
    m[0] * m[3] - m[1] * m[2]
}

fn inv_2d(m: &[f64; 4]) -> [f64; 4] {
    let det = det_2d(m);
    [m[3] / det, -m[1] / det, -m[2] / det, m[0] / det]
}

/// Inverse of the edge matrix of the 3d triangle laid flat in its own plane.
fn rest_frame(v1: [f64; 3], v2: [f64; 3], v3: [f64; 3]) -> [f64; 4] {
    let e1 = [v2[0] - v1[0], v2[1] - v1[1], v2[2] - v1[2]];
    let e2 = [v3[0] - v1[0], v3[1] - v1[1], v3[2] - v1[2]];
    let l1 = (e1[0].powi(2) + e1[1].powi(2) + e1[2].powi(2)).sqrt();
    let l2 = (e2[0].powi(2) + e2[1].powi(2) + e2[2].powi(2)).sqrt();
    let cos = (e1[0] * e2[0] + e1[1] * e2[1] + e1[2] * e2[2]) / l1 / l2;
    let sin = (1. - cos.powi(2)).max(0.).sqrt();
    inv_2d(&[l1, l2 * cos, 0., l2 * sin])
}

/// Jacobian of the map from the rest frame `m2` to the uv edges `m1`.
fn jacobian(m1: &[f64; 4], m2: &[f64; 4]) -> [f64; 4] {
    mul_2d(m1, m2)
}

fn uv_edges(p: &[[f64; 2]], face: &[usize; 3]) -> [f64; 4] {
    let v1 = p[face[0]];
    let v2 = p[face[1]];
    let v3 = p[face[2]];
    [v2[0] - v1[0], v3[0] - v1[0], v2[1] - v1[1], v3[1] - v1[1]]
}

/// Per face symmetric Dirichlet energy, `0` for isometric faces.
fn symmetric_dirichlet(f: &[[usize; 3]], rest: &[[f64; 4]], p: &[[f64; 2]]) -> Vec<f64> {
    let mut res = Vec::new();
    f.par_iter()
        .zip(rest)
        .map(|(face, m2)| {
            let j = jacobian(&uv_edges(p, face), m2);
            let j_norm = j[0] * j[0] + j[1] * j[1] + j[2] * j[2] + j[3] * j[3];
            let j_inv_norm = j_norm / det_2d(&j).powi(2);
            0.25 * (j_norm + j_inv_norm) - 1.
        })
        .collect_into_vec(&mut res);
    res
}

/// Weight of a singular value in the quadratic proxy of the symmetric Dirichlet energy.
fn singular_weight(s: f64) -> f64 {
    let s = s.max(MIN_SINGULAR_VALUE);
    if (s - 1.).abs() < 1e-8 {
        2.
    } else {
        ((s - s.powi(-3)) / (s - 1.)).sqrt()
    }
}

/// Local step result of one face: weight matrix `w` and weighted target `w r`.
#[derive(Clone, Copy, Debug)]
struct LocalTarget {
    w: [f64; 4],
    wr: [f64; 4],
}

fn local_target(j: &[f64; 4], mode: ReflectionMode) -> LocalTarget {
    let SVD2d { u, v, s } = svd_2x2(j);
    let mut r = mul_2d(&u, &v);
    if mode == ReflectionMode::Disallow && det_2d(&r) < 0. {
        let u_flipped = [u[0], -u[1], u[2], -u[3]];
        r = mul_2d(&u_flipped, &v);
    }
    let (w1, w2) = (singular_weight(s[0]), singular_weight(s[1]));
    // u diag(w) u^t
    let w = [
        w1 * u[0] * u[0] + w2 * u[1] * u[1],
        w1 * u[0] * u[2] + w2 * u[1] * u[3],
        w1 * u[2] * u[0] + w2 * u[3] * u[1],
        w1 * u[2] * u[2] + w2 * u[3] * u[3],
    ];
    LocalTarget {
        w,
        wr: mul_2d(&w, &r),
    }
}

fn is_constrained(v: &ChartVertex, options: &SlimOptions) -> bool {
    v.pinned || (options.fixed_boundary && v.on_boundary) || (options.pin_unselected && !v.selected)
}

/// Starting point of the solver, flip free over the real faces when possible.
fn initial_uvs(chart_index: usize, chart: &Chart, options: &SlimOptions) -> Result<Vec<[f64; 2]>> {
    let current = chart.uv_vec();
    if options.skip_initialization && is_embedding(chart.real_faces(), &current) {
        log::trace!("chart {chart_index}: starting from current uvs");
        return Ok(current);
    }
    let constrained: Vec<usize> = (0..chart.verts.len())
        .filter(|&i| is_constrained(&chart.verts[i], options))
        .collect();
    let conformal = || -> Result<Vec<[f64; 2]>> {
        let mut copy = chart.clone();
        lscm::solve_chart(chart_index, &mut copy, |v| is_constrained(v, options))?;
        Ok(copy.uv_vec())
    };
    if constrained.len() >= 2 {
        if let Ok(uv) = conformal() {
            if is_embedding(chart.real_faces(), &uv) {
                return Ok(uv);
            }
        }
    }
    let tutte = chart
        .longest_boundary()
        .and_then(|b| {
            compute_tutte_parameterization(&chart.positions(), &chart.faces, &chart.boundary_loops[b])
        });
    match tutte {
        Some(mut uv) => {
            if let [single] = constrained[..] {
                let target = chart.verts[single].uv;
                let off = [target[0] - uv[single][0], target[1] - uv[single][1]];
                for p in uv.iter_mut() {
                    p[0] += off[0];
                    p[1] += off[1];
                }
            }
            Ok(uv)
        }
        None => {
            log::debug!("chart {chart_index}: no tutte embedding, initializing with lscm");
            conformal()
        }
    }
}

/// SLIM state of one chart.
pub(crate) struct SlimChart {
    faces: Vec<[usize; 3]>,
    rest: Vec<[f64; 4]>,
    areas: Vec<f64>,
    /// Unblended solver state
    uv: Vec<[f64; 2]>,
    c_indices: Vec<usize>,
    c_values: Vec<f64>,
    reflection_mode: ReflectionMode,
}

impl SlimChart {
    pub(crate) fn new(chart_index: usize, chart: &Chart, options: &SlimOptions) -> Result<Self> {
        let uv = initial_uvs(chart_index, chart, options)?;
        let faces = chart.faces.clone();
        let positions = chart.positions();
        let areas_3d = face_areas(&faces, &positions);
        let total_3d: f64 = areas_3d.iter().sum();
        let total_uv: f64 = uv_areas(&faces, &uv).iter().map(|a| a.abs()).sum();
        if !(total_3d > 0.) || !(total_uv > 0.) {
            return Err(ParamError::DegenerateChart { chart: chart_index });
        }
        let base_scale = options.relative_scale * (total_uv / total_3d).sqrt();

        let mut rest = Vec::with_capacity(faces.len());
        let mut areas = Vec::with_capacity(faces.len());
        for (face, area) in faces.iter().zip(&areas_3d) {
            let mut scale = base_scale;
            if options.weighted {
                let w: f64 = face.iter().map(|&v| chart.verts[v].weight).sum::<f64>() / 3.;
                scale *= 2f64.powf(options.weight_influence * w);
            }
            let frame = rest_frame(positions[face[0]], positions[face[1]], positions[face[2]]);
            rest.push(frame.map(|x| x / scale));
            areas.push(area * scale * scale);
        }

        let mut c_indices = Vec::new();
        let mut c_values = Vec::new();
        for (i, v) in chart.verts.iter().enumerate() {
            if is_constrained(v, options) {
                c_indices.extend([2 * i, 2 * i + 1]);
                c_values.extend(v.uv);
            }
        }
        if c_indices.is_empty() {
            c_indices.extend([0, 1]);
            c_values.extend(uv[0]);
        }

        Ok(SlimChart {
            faces,
            rest,
            areas,
            uv,
            c_indices,
            c_values,
            reflection_mode: options.reflection_mode,
        })
    }

    fn local_step(&self) -> Vec<LocalTarget> {
        let mut res = Vec::new();
        self.faces
            .par_iter()
            .zip(&self.rest)
            .map(|(face, m2)| local_target(&jacobian(&uv_edges(&self.uv, face), m2), self.reflection_mode))
            .collect_into_vec(&mut res);
        res
    }

    /// Weighted least squares fit of the jacobians to their targets.
    fn global_step(&self, chart_index: usize, targets: &[LocalTarget]) -> Result<Vec<[f64; 2]>> {
        let n = 2 * self.uv.len();
        let mut triplets = Vec::with_capacity(144 * self.faces.len());
        let mut rhs = vec![0.; n];
        for ((face, m2), (t, &area)) in self
            .faces
            .iter()
            .zip(&self.rest)
            .zip(targets.iter().zip(&self.areas))
        {
            // derivative of jacobian column c with respect to the corner coordinates
            let g = [
                [-(m2[0] + m2[2]), m2[0], m2[2]],
                [-(m2[1] + m2[3]), m2[1], m2[3]],
            ];
            for i in 0..2 {
                for c in 0..2 {
                    let mut row = [(0, 0.); 6];
                    for k in 0..3 {
                        for r in 0..2 {
                            row[2 * k + r] = (2 * face[k] + r, t.w[2 * i + r] * g[c][k]);
                        }
                    }
                    let target = t.wr[2 * i + c];
                    for &(p, vp) in &row {
                        rhs[p] += area * vp * target;
                        for &(q, vq) in &row {
                            triplets.push(Triplet::new(p, q, area * vp * vq));
                        }
                    }
                }
            }
        }
        let mut hess = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|_| ParamError::SingularSystem { chart: chart_index })?;
        apply_constraints(
            &mut hess,
            ColMut::from_slice_mut(&mut rhs),
            &self.c_indices,
            &self.c_values,
        );
        let llt = hess
            .sp_cholesky(faer::Side::Lower)
            .map_err(|_| ParamError::SingularSystem { chart: chart_index })?;
        let mut sol = ColMut::from_slice_mut(&mut rhs);
        llt.solve_in_place(sol.as_mat_mut());
        let res: Vec<[f64; 2]> = rhs.chunks_exact(2).map(|c| [c[0], c[1]]).collect();
        if res.iter().all(|p| p[0].is_finite() && p[1].is_finite()) {
            Ok(res)
        } else {
            Err(ParamError::SingularSystem { chart: chart_index })
        }
    }

    /// One local/global iteration. Returns the energy of the new state.
    pub(crate) fn iterate(&mut self, chart_index: usize) -> Result<f64> {
        let targets = self.local_step();
        let target_uv = self.global_step(chart_index, &targets)?;
        let delta: Vec<[f64; 2]> = target_uv
            .iter()
            .zip(&self.uv)
            .map(|(t, p)| [t[0] - p[0], t[1] - p[1]])
            .collect();
        let (faces, rest, areas) = (&self.faces, &self.rest, &self.areas);
        let e = flip_avoiding_line_search(&mut self.uv, &delta, faces, |p| {
            total_energy(faces, rest, areas, p)
        });
        Ok(e)
    }

    /// Solver uvs blended toward the snapshot of `chart`.
    pub(crate) fn blended(&self, chart: &Chart, blend: f64) -> Vec<[f64; 2]> {
        let blend = blend.clamp(0., 1.);
        self.uv
            .iter()
            .zip(&chart.verts)
            .map(|(p, v)| {
                [
                    (1. - blend) * p[0] + blend * v.snapshot[0],
                    (1. - blend) * p[1] + blend * v.snapshot[1],
                ]
            })
            .collect()
    }
}

fn total_energy(f: &[[usize; 3]], rest: &[[f64; 4]], areas: &[f64], p: &[[f64; 2]]) -> f64 {
    symmetric_dirichlet(f, rest, p)
        .iter()
        .zip(areas)
        .map(|(e, a)| e * a)
        .sum()
}

/// SLIM solver state of a handle, one entry per chart.
pub(crate) struct SlimSolver {
    charts: Vec<Option<SlimChart>>,
}

impl SlimSolver {
    /// Initialize every chart. Holes are always filled first.
    pub(crate) fn begin(charts: &mut [Chart], options: &SlimOptions) -> Self {
        let charts = charts
            .iter_mut()
            .enumerate()
            .map(|(ci, chart)| {
                chart.fill_holes();
                match SlimChart::new(ci, chart, options) {
                    Ok(slim) => {
                        chart.set_uvs(&slim.uv);
                        Some(slim)
                    }
                    Err(err) => {
                        log::warn!("{err}, chart left unchanged");
                        None
                    }
                }
            })
            .collect();
        SlimSolver { charts }
    }

    /// Charts that could be initialized.
    pub(crate) fn stats(&self) -> SolveStats {
        let solved = self.charts.iter().flatten().count();
        SolveStats {
            solved,
            failed: self.charts.len() - solved,
        }
    }

    /// Run one iteration on every chart and publish the solver state blended toward the
    /// snapshot uvs.
    pub(crate) fn iterate(&mut self, charts: &mut [Chart], blend: f64) -> SolveStats {
        let mut stats = SolveStats::default();
        for (ci, (slim, chart)) in self.charts.iter_mut().zip(charts.iter_mut()).enumerate() {
            let Some(slim) = slim else {
                stats.failed += 1;
                continue;
            };
            match slim.iterate(ci) {
                Ok(e) => {
                    log::trace!("chart {ci}: slim energy {e:e}");
                    chart.set_uvs(&slim.blended(chart, blend));
                    stats.solved += 1;
                }
                Err(err) => {
                    log::debug!("{err}");
                    stats.failed += 1;
                }
            }
        }
        stats
    }
}
