//! Angle based flattening.
//!
//! Finds corner angles `a` close to the 3d ones `b`, minimizing `sum((a - b)^2 / b^2)`, such that
//! they describe a planar triangulation:
//! * angles of a triangle sum to `pi`,
//! * angles around an interior vertex sum to `2 pi`,
//! * around an interior vertex, `prod(sin(next)) = prod(sin(prev))` (wheel condition).
//!
//! The constraints are linearized at each step and the projection solved through the reduced
//! system `J W^-1 J^t`.

use std::f64::consts::PI;

use faer::linalg::solvers::Solve;
use faer::sparse::{SparseColMat, Triplet};
use faer::Col;

use crate::chart::{boundary_half_edges, Chart};
use crate::error::{ParamError, Result};
use crate::utils::corner_angles;

const MAX_ITERATIONS: usize = 20;
const TOLERANCE: f64 = 1e-5;
const MIN_ANGLE: f64 = PI / 180.;
const MAX_ANGLE: f64 = PI - MIN_ANGLE;

/// Constraint rows touching one corner, with their derivative.
type CornerRows = [(Option<usize>, f64); 4];

struct AngleSystem {
    faces: Vec<[usize; 3]>,
    /// Constraint rows of the angle sum and wheel condition of every vertex, `None` on the boundary
    vertex_rows: Vec<Option<(usize, usize)>>,
    n_rows: usize,
}

impl AngleSystem {
    fn new(chart: &Chart) -> Self {
        let faces = chart.faces.clone();
        let mut interior = vec![true; chart.verts.len()];
        for (a, b) in boundary_half_edges(&faces) {
            interior[a] = false;
            interior[b] = false;
        }
        let mut n_rows = faces.len();
        let vertex_rows = interior
            .iter()
            .map(|&inner| {
                inner.then(|| {
                    n_rows += 2;
                    (n_rows - 2, n_rows - 1)
                })
            })
            .collect();
        AngleSystem {
            faces,
            vertex_rows,
            n_rows,
        }
    }

    fn interior_count(&self) -> usize {
        self.vertex_rows.iter().flatten().count()
    }

    /// Constraint values at `alpha`.
    fn residual(&self, alpha: &[[f64; 3]]) -> Vec<f64> {
        let mut c = vec![0.; self.n_rows];
        for (fi, (face, a)) in self.faces.iter().zip(alpha).enumerate() {
            c[fi] = a[0] + a[1] + a[2] - PI;
            for k in 0..3 {
                if let Some((sum, wheel)) = self.vertex_rows[face[k]] {
                    c[sum] += a[k];
                    c[wheel] += a[(k + 1) % 3].sin().ln() - a[(k + 2) % 3].sin().ln();
                }
            }
        }
        for &(sum, _) in self.vertex_rows.iter().flatten() {
            c[sum] -= 2. * PI;
        }
        c
    }

    /// Rows of the jacobian touching corner `k` of face `fi`.
    fn corner_rows(&self, fi: usize, k: usize, alpha: f64) -> CornerRows {
        let face = self.faces[fi];
        let cot = alpha.cos() / alpha.sin();
        let own = self.vertex_rows[face[k]].map(|r| r.0);
        // this corner is the next one of the vertex before it and the previous one of the vertex
        // after it
        let as_next = self.vertex_rows[face[(k + 2) % 3]].map(|r| r.1);
        let as_prev = self.vertex_rows[face[(k + 1) % 3]].map(|r| r.1);
        [
            (Some(fi), 1.),
            (own, 1.),
            (as_next, cot),
            (as_prev, -cot),
        ]
    }
}

/// Target corner angles of every face of `chart`, virtual faces included.
pub(crate) fn compute_angles(chart_index: usize, chart: &Chart) -> Result<Vec<[f64; 3]>> {
    let system = AngleSystem::new(chart);
    if system.interior_count() == chart.verts.len() {
        // closed surfaces can not be flattened without a cut
        return Err(ParamError::DegenerateChart { chart: chart_index });
    }

    let mut beta: Vec<[f64; 3]> = system
        .faces
        .iter()
        .map(|f| {
            let [a, b, c] = f.map(|v| chart.verts[v].co);
            corner_angles(a, b, c)
        })
        .collect();
    let mut sums = vec![0.; chart.verts.len()];
    for (face, b) in system.faces.iter().zip(&beta) {
        for k in 0..3 {
            sums[face[k]] += b[k];
        }
    }
    for (face, b) in system.faces.iter().zip(beta.iter_mut()) {
        for k in 0..3 {
            if system.vertex_rows[face[k]].is_some() && sums[face[k]] > 0. {
                b[k] *= 2. * PI / sums[face[k]];
            }
            b[k] = b[k].clamp(MIN_ANGLE, MAX_ANGLE);
        }
    }
    let inv_weights: Vec<[f64; 3]> = beta.iter().map(|b| b.map(|a| a * a)).collect();

    let mut alpha = beta.clone();
    for it in 0..MAX_ITERATIONS {
        let c = system.residual(&alpha);
        let err = c.iter().fold(0f64, |m, x| m.max(x.abs()));
        log::trace!("abf iteration {it}: constraint error {err:e}");
        if err < TOLERANCE {
            log::debug!("abf converged in {it} iterations");
            return Ok(alpha);
        }
        if !err.is_finite() {
            break;
        }

        // rhs = J (alpha - beta) - C(alpha)
        let mut rhs = Col::<f64>::zeros(system.n_rows);
        for (i, value) in c.iter().enumerate() {
            rhs[i] = -value;
        }
        let mut triplets = Vec::with_capacity(16 * 3 * system.faces.len());
        let mut rows = Vec::with_capacity(3 * system.faces.len());
        for fi in 0..system.faces.len() {
            for k in 0..3 {
                let entries = system.corner_rows(fi, k, alpha[fi][k]);
                let diff = alpha[fi][k] - beta[fi][k];
                let inv_w = inv_weights[fi][k];
                for &(r, dr) in &entries {
                    let Some(r) = r else { continue };
                    rhs[r] += dr * diff;
                    for &(s, ds) in &entries {
                        if let Some(s) = s {
                            triplets.push(Triplet::new(r, s, dr * ds * inv_w));
                        }
                    }
                }
                rows.push(entries);
            }
        }
        let mat = SparseColMat::<usize, f64>::try_new_from_triplets(
            system.n_rows,
            system.n_rows,
            &triplets,
        )
        .map_err(|_| ParamError::SingularSystem { chart: chart_index })?;
        let llt = mat
            .sp_cholesky(faer::Side::Lower)
            .map_err(|_| ParamError::SingularSystem { chart: chart_index })?;
        llt.solve_in_place(rhs.as_mat_mut());

        // alpha = beta + W^-1 J^t lambda
        for (fi, a) in alpha.iter_mut().enumerate() {
            for k in 0..3 {
                let step: f64 = rows[3 * fi + k]
                    .iter()
                    .filter_map(|&(r, d)| r.map(|r| d * rhs[r]))
                    .sum();
                a[k] = (beta[fi][k] + inv_weights[fi][k] * step).clamp(MIN_ANGLE, MAX_ANGLE);
            }
        }
    }

    let c = system.residual(&alpha);
    let err = c.iter().fold(0f64, |m, x| m.max(x.abs()));
    if err < TOLERANCE {
        Ok(alpha)
    } else {
        Err(ParamError::NotConverged {
            chart: chart_index,
            iterations: MAX_ITERATIONS,
        })
    }
}
