//! Interactive sessions owning a handle between several host updates.

use crate::error::Result;
use crate::handle::{ParamHandle, SolveStats, UvTarget};
use crate::options::SlimOptions;
use crate::ParamKey;

/// Step applied by [`MinimizeStretch::blend_up`] and [`MinimizeStretch::blend_down`].
pub const BLEND_STEP: f64 = 0.1;

/// Conformal unwrap re-solved every time the host moves a pin.
pub struct LiveUnwrap {
    handle: ParamHandle,
}

impl LiveUnwrap {
    /// Factor the conformal systems of `handle` and solve them once.
    pub fn begin(mut handle: ParamHandle, fixed_boundary: bool, use_abf: bool) -> Result<Self> {
        handle.lscm_begin(fixed_boundary, use_abf)?;
        handle.lscm_solve()?;
        Ok(LiveUnwrap { handle })
    }

    pub fn handle(&self) -> &ParamHandle {
        &self.handle
    }

    /// Reload pinned uvs through `uv_of`, solve again and flush the result.
    pub fn re_solve(
        &mut self,
        uv_of: impl Fn(ParamKey, usize) -> Option<[f64; 2]>,
        target: &mut impl UvTarget,
    ) -> Result<SolveStats> {
        self.handle.reload_pinned_uvs(uv_of);
        let stats = self.handle.lscm_solve()?;
        self.handle.flush(target);
        Ok(stats)
    }

    /// Stop the session. With `cancel`, the uvs from before the session are written back.
    pub fn end(mut self, cancel: bool, target: &mut impl UvTarget) -> Result<()> {
        if cancel {
            self.handle.flush_restore(target);
        } else {
            self.handle.flush(target);
        }
        self.handle.lscm_end()
    }
}

/// Iterative stretch minimization of an existing layout, blended toward the original uvs.
pub struct MinimizeStretch {
    handle: ParamHandle,
    blend: f64,
    iterations: usize,
}

impl MinimizeStretch {
    /// Start SLIM on `handle`, reusing the current uvs as the starting point when possible.
    pub fn begin(mut handle: ParamHandle, options: &SlimOptions) -> Result<Self> {
        let options = options.clone().with_skip_initialization(true);
        handle.slim_begin(&options)?;
        Ok(MinimizeStretch {
            handle,
            blend: 0.,
            iterations: 0,
        })
    }

    pub fn handle(&self) -> &ParamHandle {
        &self.handle
    }

    pub fn blend(&self) -> f64 {
        self.blend
    }

    /// Iterations ran so far.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Run one iteration and flush it.
    pub fn iterate(&mut self, target: &mut impl UvTarget) -> Result<SolveStats> {
        let stats = self.handle.slim_stretch_iteration(self.blend)?;
        self.iterations += 1;
        self.handle.flush(target);
        Ok(stats)
    }

    /// Set the blend factor, clamped to `[0, 1]`, and iterate with it.
    pub fn set_blend(&mut self, blend: f64, target: &mut impl UvTarget) -> Result<SolveStats> {
        self.blend = blend.clamp(0., 1.);
        self.iterate(target)
    }

    pub fn blend_up(&mut self, target: &mut impl UvTarget) -> Result<SolveStats> {
        self.set_blend(self.blend + BLEND_STEP, target)
    }

    pub fn blend_down(&mut self, target: &mut impl UvTarget) -> Result<SolveStats> {
        self.set_blend(self.blend - BLEND_STEP, target)
    }

    /// Stop the session. With `cancel`, the uvs from before the session are written back.
    pub fn end(mut self, cancel: bool, target: &mut impl UvTarget) -> Result<()> {
        if cancel {
            self.handle.flush_restore(target);
        } else {
            self.handle.flush(target);
        }
        log::debug!("stretch minimization ended after {} iterations", self.iterations);
        self.handle.slim_end()
    }
}
