//! Least squares conformal maps.
//!
//! Every triangle `(p1, p2, p3)` with corner angles `(a1, a2, a3)` contributes the two equations of
//! `p3 - p1 = sin(a2) / sin(a3) * R(a1) (p2 - p1)`. Unknowns are interleaved, `2 * i` holds the
//! `u` of vertex `i` and `2 * i + 1` its `v`. The normal equations are reduced to the free
//! unknowns and factored once, so that pins can move between solves without refactoring.

use faer::linalg::solvers::Solve;
use faer::sparse::linalg::solvers::Llt;
use faer::sparse::{SparseColMat, Triplet};
use faer::Col;

use crate::abf;
use crate::chart::{Chart, ChartVertex};
use crate::error::{ParamError, Result};
use crate::handle::SolveStats;
use crate::utils::corner_angles;

#[derive(Clone, Copy, Debug)]
struct Pin {
    vert: usize,
    /// Fixed position of a synthesized pin, `None` to read the vertex uv at solve time
    uv: Option<[f64; 2]>,
}

/// Factored conformal system of one chart.
pub(crate) struct ConformalSystem {
    /// `None` when every unknown is pinned
    llt: Option<Llt<usize, f64>>,
    /// Row of every unknown in the reduced system, `None` for pinned unknowns
    free_row: Vec<Option<usize>>,
    n_free: usize,
    /// Entries `(free row, pinned unknown, value)` of the eliminated block
    coupling: Vec<(usize, usize, f64)>,
    pins: Vec<Pin>,
    /// The only real pin, the solution is translated onto it
    translate_to: Option<usize>,
}

/// Extreme vertices along the dominant axis of the chart bounding box, pinned at their projection
/// on the two largest axes.
fn synthesize_pins(chart: &Chart) -> Option<[Pin; 2]> {
    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    let mut min_v = [0; 3];
    let mut max_v = [0; 3];
    for (i, v) in chart.verts.iter().enumerate() {
        for k in 0..3 {
            if v.co[k] < min[k] {
                min[k] = v.co[k];
                min_v[k] = i;
            }
            if v.co[k] > max[k] {
                max[k] = v.co[k];
                max_v[k] = i;
            }
        }
    }
    let extent = [max[0] - min[0], max[1] - min[1], max[2] - min[2]];
    let mut axes = [0, 1, 2];
    axes.sort_by(|&a, &b| extent[b].total_cmp(&extent[a]));
    let (du, dv) = (axes[0], axes[1]);
    let (a, b) = (min_v[du], max_v[du]);
    if a == b || !(extent[du] > 0.) {
        return None;
    }
    let pin = |vert: usize| {
        let co = chart.verts[vert].co;
        Pin {
            vert,
            uv: Some([co[du], co[dv]]),
        }
    };
    Some([pin(a), pin(b)])
}

/// Vertices matching `is_pinned`, completed by synthesized pins when fewer than two are found.
fn collect_pins(
    chart: &Chart,
    is_pinned: impl Fn(&ChartVertex) -> bool,
) -> Option<(Vec<Pin>, Option<usize>)> {
    let pins: Vec<Pin> = chart
        .verts
        .iter()
        .enumerate()
        .filter(|(_, v)| is_pinned(v))
        .map(|(vert, _)| Pin { vert, uv: None })
        .collect();
    match pins.len() {
        0 => Some((synthesize_pins(chart)?.to_vec(), None)),
        1 => Some((synthesize_pins(chart)?.to_vec(), Some(pins[0].vert))),
        _ => Some((pins, None)),
    }
}

/// Coefficients of the two equations of one triangle, as `(vertex corner, unknown offset, value)`.
fn triangle_rows(angles: [f64; 3]) -> [[(usize, usize, f64); 6]; 2] {
    let [a1, a2, a3] = angles;
    let sin3 = a3.sin();
    let ratio = if sin3 == 0. { 1. } else { a2.sin() / sin3 };
    let cosine = a1.cos() * ratio;
    let sine = a1.sin() * ratio;
    [
        [
            (0, 0, cosine - 1.),
            (0, 1, -sine),
            (1, 0, -cosine),
            (1, 1, sine),
            (2, 0, 1.),
            (2, 1, 0.),
        ],
        [
            (0, 0, sine),
            (0, 1, cosine - 1.),
            (1, 0, -sine),
            (1, 1, -cosine),
            (2, 0, 0.),
            (2, 1, 1.),
        ],
    ]
}

/// Rotate a triangle so that its last corner has the largest sine, which keeps the ratio finite.
fn stable_order(f: [usize; 3], a: [f64; 3]) -> ([usize; 3], [f64; 3]) {
    let s = [a[0].sin(), a[1].sin(), a[2].sin()];
    if s[0] >= s[1] && s[0] >= s[2] {
        ([f[1], f[2], f[0]], [a[1], a[2], a[0]])
    } else if s[1] >= s[2] {
        ([f[2], f[0], f[1]], [a[2], a[0], a[1]])
    } else {
        (f, a)
    }
}

impl ConformalSystem {
    /// Assemble and factor the system of `chart`, pinning its pinned vertices and its boundary
    /// when `fixed_boundary` is set.
    ///
    /// `angles` holds per-face corner angles, the geometric ones are used when `None`.
    pub(crate) fn new(
        chart_index: usize,
        chart: &Chart,
        fixed_boundary: bool,
        angles: Option<&[[f64; 3]]>,
    ) -> Result<Self> {
        Self::with_pins(
            chart_index,
            chart,
            |v| v.pinned || (fixed_boundary && v.on_boundary),
            angles,
        )
    }

    /// Same as [`ConformalSystem::new`] with the pinned vertices selected by `is_pinned`.
    pub(crate) fn with_pins(
        chart_index: usize,
        chart: &Chart,
        is_pinned: impl Fn(&ChartVertex) -> bool,
        angles: Option<&[[f64; 3]]>,
    ) -> Result<Self> {
        let (pins, translate_to) = collect_pins(chart, is_pinned)
            .ok_or(ParamError::DegenerateChart { chart: chart_index })?;
        let n = 2 * chart.verts.len();
        let mut pinned = vec![false; n];
        for pin in &pins {
            pinned[2 * pin.vert] = true;
            pinned[2 * pin.vert + 1] = true;
        }
        let mut free_row = vec![None; n];
        let mut n_free = 0;
        for (i, row) in free_row.iter_mut().enumerate() {
            if !pinned[i] {
                *row = Some(n_free);
                n_free += 1;
            }
        }

        let mut triplets = Vec::with_capacity(72 * chart.faces.len());
        let mut coupling = Vec::new();
        for (fi, face) in chart.faces.iter().enumerate() {
            let a = match angles {
                Some(angles) => angles[fi],
                None => {
                    let [p1, p2, p3] = face.map(|v| chart.verts[v].co);
                    corner_angles(p1, p2, p3)
                }
            };
            let (face, a) = stable_order(*face, a);
            for row in triangle_rows(a) {
                for &(ci, oi, vi) in &row {
                    let i = 2 * face[ci] + oi;
                    let Some(ri) = free_row[i] else {
                        continue;
                    };
                    for &(cj, oj, vj) in &row {
                        let j = 2 * face[cj] + oj;
                        let value = vi * vj;
                        if value == 0. {
                            continue;
                        }
                        match free_row[j] {
                            Some(rj) => triplets.push(Triplet::new(ri, rj, value)),
                            None => coupling.push((ri, j, value)),
                        }
                    }
                }
            }
        }

        let llt = if n_free > 0 {
            let mat = SparseColMat::<usize, f64>::try_new_from_triplets(n_free, n_free, &triplets)
                .map_err(|_| ParamError::SingularSystem { chart: chart_index })?;
            let llt = mat
                .sp_cholesky(faer::Side::Lower)
                .map_err(|_| ParamError::SingularSystem { chart: chart_index })?;
            Some(llt)
        } else {
            None
        };

        Ok(ConformalSystem {
            llt,
            free_row,
            n_free,
            coupling,
            pins,
            translate_to,
        })
    }

    /// Solve with the current pin positions and write the result in `chart`.
    pub(crate) fn solve(&self, chart_index: usize, chart: &mut Chart) -> Result<()> {
        let n = self.free_row.len();
        let mut values = vec![0.; n];
        for pin in &self.pins {
            let uv = pin.uv.unwrap_or(chart.verts[pin.vert].uv);
            values[2 * pin.vert] = uv[0];
            values[2 * pin.vert + 1] = uv[1];
        }
        let mut rhs = Col::<f64>::zeros(self.n_free);
        for &(row, unknown, value) in &self.coupling {
            rhs[row] -= value * values[unknown];
        }
        if let Some(llt) = &self.llt {
            llt.solve_in_place(rhs.as_mat_mut());
        }
        for (i, row) in self.free_row.iter().enumerate() {
            if let Some(row) = row {
                values[i] = rhs[*row];
            }
        }

        let mut uvs: Vec<[f64; 2]> = values.chunks_exact(2).map(|c| [c[0], c[1]]).collect();
        if let Some(v) = self.translate_to {
            let target = chart.verts[v].uv;
            let off = [target[0] - uvs[v][0], target[1] - uvs[v][1]];
            for uv in uvs.iter_mut() {
                uv[0] += off[0];
                uv[1] += off[1];
            }
        }
        if !uvs.iter().all(|uv| uv[0].is_finite() && uv[1].is_finite()) {
            return Err(ParamError::SingularSystem { chart: chart_index });
        }
        chart.set_uvs(&uvs);
        Ok(())
    }
}

/// Conformal solver state of a handle, one system per chart.
pub(crate) struct ConformalSolver {
    systems: Vec<Option<ConformalSystem>>,
}

impl ConformalSolver {
    pub(crate) fn begin(charts: &[Chart], fixed_boundary: bool, use_abf: bool) -> Self {
        let systems = charts
            .iter()
            .enumerate()
            .map(|(ci, chart)| {
                let angles = if use_abf {
                    match abf::compute_angles(ci, chart) {
                        Ok(angles) => Some(angles),
                        Err(err) => {
                            log::warn!("chart {ci}: {err}, using geometric angles");
                            None
                        }
                    }
                } else {
                    None
                };
                match ConformalSystem::new(ci, chart, fixed_boundary, angles.as_deref()) {
                    Ok(system) => Some(system),
                    Err(err) => {
                        log::warn!("{err}, chart left unchanged");
                        None
                    }
                }
            })
            .collect();
        ConformalSolver { systems }
    }

    pub(crate) fn solve(&self, charts: &mut [Chart]) -> SolveStats {
        let mut stats = SolveStats::default();
        for (ci, (system, chart)) in self.systems.iter().zip(charts.iter_mut()).enumerate() {
            let res = match system {
                Some(system) => system.solve(ci, chart),
                None => Err(ParamError::SingularSystem { chart: ci }),
            };
            match res {
                Ok(()) => stats.solved += 1,
                Err(err) => {
                    log::debug!("{err}");
                    stats.failed += 1;
                }
            }
        }
        log::debug!("lscm: {} charts solved, {} failed", stats.solved, stats.failed);
        stats
    }
}

/// One shot conformal solve of a single chart, used to initialize other solvers.
pub(crate) fn solve_chart(
    chart_index: usize,
    chart: &mut Chart,
    is_pinned: impl Fn(&ChartVertex) -> bool,
) -> Result<()> {
    ConformalSystem::with_pins(chart_index, chart, is_pinned, None)?.solve(chart_index, chart)
}
