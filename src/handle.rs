//! The parametrization handle: charts of one mesh snapshot and the solver running on them.

use crate::chart::Chart;
use crate::error::{ParamError, Result};
use crate::lscm::ConformalSolver;
use crate::options::{SlimOptions, UnwrapMethod, UnwrapOptions};
use crate::pack;
use crate::slim::SlimSolver;
use crate::ParamKey;

/// Receiver of flushed uvs, addressed by face key and corner index inside the face.
pub trait UvTarget {
    fn set_uv(&mut self, face: ParamKey, corner: usize, uv: [f64; 2]);
}

impl<F: FnMut(ParamKey, usize, [f64; 2])> UvTarget for F {
    fn set_uv(&mut self, face: ParamKey, corner: usize, uv: [f64; 2]) {
        self(face, corner, uv)
    }
}

/// Outcome of a solve over every chart of a handle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolveStats {
    /// Charts that received new uvs
    pub solved: usize,
    /// Charts left unchanged
    pub failed: usize,
}

/// Link from a source face corner to its chart vertex.
#[derive(Clone, Debug)]
pub(crate) struct CornerLink {
    pub face: ParamKey,
    pub corner: usize,
    pub chart: usize,
    pub vert: usize,
    /// Uv stored in the source mesh at construction
    pub uv: [f64; 2],
}

enum SolverState {
    Conformal(ConformalSolver),
    Slim(SlimSolver),
}

impl SolverState {
    fn name(&self) -> &'static str {
        match self {
            SolverState::Conformal(_) => "conformal",
            SolverState::Slim(_) => "slim",
        }
    }
}

/// Owner of every chart built from one mesh.
///
/// Created by [`Construction::end`](crate::Construction::end). At most one solver is active at a
/// time, started by `lscm_begin` or `slim_begin` and stopped by the matching `end`. Uvs are given
/// back to the host with [`ParamHandle::flush`].
pub struct ParamHandle {
    charts: Vec<Chart>,
    links: Vec<CornerLink>,
    aspect: [f64; 2],
    skipped_faces: usize,
    state: Option<SolverState>,
}

impl ParamHandle {
    pub(crate) fn new(
        charts: Vec<Chart>,
        links: Vec<CornerLink>,
        aspect: [f64; 2],
        skipped_faces: usize,
    ) -> Self {
        ParamHandle {
            charts,
            links,
            aspect,
            skipped_faces,
            state: None,
        }
    }

    pub fn charts(&self) -> &[Chart] {
        &self.charts
    }

    /// Number of source faces left out at construction.
    pub fn skipped_faces(&self) -> usize {
        self.skipped_faces
    }

    /// Whether a solver is currently active.
    pub fn is_solving(&self) -> bool {
        self.state.is_some()
    }

    fn start(&mut self, state: SolverState) -> Result<()> {
        if self.state.is_some() {
            return Err(ParamError::SolverActive);
        }
        log::debug!("starting {} solver on {} charts", state.name(), self.charts.len());
        self.state = Some(state);
        Ok(())
    }

    fn stop(&mut self, expected: &'static str) -> Result<()> {
        match self.state.as_ref().map(SolverState::name) {
            None => Err(ParamError::NoSolver),
            Some(name) if name != expected => Err(ParamError::WrongSolver { expected }),
            Some(_) => {
                self.state = None;
                Ok(())
            }
        }
    }

    /// Factor the conformal system of every chart.
    ///
    /// With `fixed_boundary`, boundary vertices keep their current uv. With `use_abf`, corner
    /// angles are first optimized by angle based flattening.
    pub fn lscm_begin(&mut self, fixed_boundary: bool, use_abf: bool) -> Result<()> {
        if self.state.is_some() {
            return Err(ParamError::SolverActive);
        }
        let solver = ConformalSolver::begin(&self.charts, fixed_boundary, use_abf);
        self.start(SolverState::Conformal(solver))
    }

    /// Solve every chart with the current pin positions. Can be called repeatedly.
    pub fn lscm_solve(&mut self) -> Result<SolveStats> {
        match &self.state {
            Some(SolverState::Conformal(solver)) => Ok(solver.solve(&mut self.charts)),
            Some(_) => Err(ParamError::WrongSolver {
                expected: "conformal",
            }),
            None => Err(ParamError::NoSolver),
        }
    }

    pub fn lscm_end(&mut self) -> Result<()> {
        self.stop("conformal")
    }

    /// Initialize the SLIM solver of every chart, filling holes first.
    pub fn slim_begin(&mut self, options: &SlimOptions) -> Result<()> {
        if self.state.is_some() {
            return Err(ParamError::SolverActive);
        }
        let solver = SlimSolver::begin(&mut self.charts, options);
        self.start(SolverState::Slim(solver))
    }

    /// One SLIM iteration, publishing uvs blended toward the construction snapshot by `blend`.
    pub fn slim_stretch_iteration(&mut self, blend: f64) -> Result<SolveStats> {
        match &mut self.state {
            Some(SolverState::Slim(solver)) => Ok(solver.iterate(&mut self.charts, blend)),
            Some(_) => Err(ParamError::WrongSolver { expected: "slim" }),
            None => Err(ParamError::NoSolver),
        }
    }

    /// One SLIM iteration without blending.
    pub fn slim_solve_iteration(&mut self) -> Result<SolveStats> {
        self.slim_stretch_iteration(0.)
    }

    pub fn slim_end(&mut self) -> Result<()> {
        self.stop("slim")
    }

    /// Run `options.iterations` SLIM iterations between a begin and an end.
    pub fn slim_solve(&mut self, options: &SlimOptions) -> Result<SolveStats> {
        self.slim_begin(options)?;
        let mut stats = match &self.state {
            Some(SolverState::Slim(solver)) => solver.stats(),
            _ => SolveStats::default(),
        };
        for _ in 0..options.iterations {
            stats = self.slim_solve_iteration()?;
        }
        self.slim_end()?;
        Ok(stats)
    }

    /// Scale charts so that their uv area is proportional to their 3d area.
    pub fn average(&mut self) {
        pack::average(&mut self.charts);
    }

    /// Lay every chart inside the unit square, `margin` apart.
    pub fn pack(&mut self, margin: f64, allow_rotation: bool) {
        pack::pack(&mut self.charts, margin, allow_rotation, self.aspect);
    }

    /// Solve with the chosen method, then average and pack.
    pub fn unwrap(&mut self, options: &UnwrapOptions) -> Result<SolveStats> {
        let stats = match options.method {
            UnwrapMethod::AngleBased | UnwrapMethod::Conformal => {
                self.lscm_begin(
                    options.fixed_boundary,
                    options.method == UnwrapMethod::AngleBased,
                )?;
                let stats = self.lscm_solve()?;
                self.lscm_end()?;
                stats
            }
            UnwrapMethod::MinimumStretch => {
                let mut slim = options.slim.clone();
                slim.fixed_boundary |= options.fixed_boundary;
                self.slim_solve(&slim)?
            }
        };
        if options.average {
            self.average();
        }
        if options.pack {
            self.pack(options.margin, options.allow_rotation);
        }
        log::info!(
            "unwrapped {} charts, {} failed",
            stats.solved,
            stats.failed
        );
        Ok(stats)
    }

    /// Write the uvs of every modified chart to `target`, one call per source corner.
    pub fn flush(&self, target: &mut impl UvTarget) {
        for link in &self.links {
            let chart = &self.charts[link.chart];
            if !chart.modified {
                continue;
            }
            let uv = chart.verts[link.vert].uv;
            target.set_uv(
                link.face,
                link.corner,
                [uv[0] / self.aspect[0], uv[1] / self.aspect[1]],
            );
        }
    }

    /// Write back the uvs every corner had at construction.
    pub fn flush_restore(&self, target: &mut impl UvTarget) {
        for link in &self.links {
            target.set_uv(link.face, link.corner, link.uv);
        }
    }

    /// Refresh the uvs of pinned vertices from the host, typically between two live solves.
    ///
    /// `uv_of` gives the current uv of a corner, or `None` to keep the stored one. A vertex with
    /// several corners takes their average.
    pub fn reload_pinned_uvs(&mut self, uv_of: impl Fn(ParamKey, usize) -> Option<[f64; 2]>) {
        let mut sums: Vec<Vec<([f64; 2], usize)>> = self
            .charts
            .iter()
            .map(|c| vec![([0.; 2], 0); c.verts.len()])
            .collect();
        for link in &self.links {
            if !self.charts[link.chart].verts[link.vert].pinned {
                continue;
            }
            if let Some(uv) = uv_of(link.face, link.corner) {
                let (sum, n) = &mut sums[link.chart][link.vert];
                sum[0] += uv[0] * self.aspect[0];
                sum[1] += uv[1] * self.aspect[1];
                *n += 1;
            }
        }
        for (chart, sums) in self.charts.iter_mut().zip(sums) {
            for (v, (sum, n)) in chart.verts.iter_mut().zip(sums) {
                if n > 0 {
                    v.uv = [sum[0] / n as f64, sum[1] / n as f64];
                }
            }
        }
    }
}
