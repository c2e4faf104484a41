//! User settings for construction and solvers.

/// Settings of [`Construction::end`](crate::Construction::end).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstructOptions {
    /// Close every boundary loop but the outer one with virtual faces
    pub fill_holes: bool,
    /// Ignore seams and split charts where the stored corner uvs are discontinuous
    pub implicit: bool,
}

impl Default for ConstructOptions {
    fn default() -> Self {
        ConstructOptions {
            fill_holes: true,
            implicit: false,
        }
    }
}

impl ConstructOptions {
    pub fn with_fill_holes(mut self, fill_holes: bool) -> Self {
        self.fill_holes = fill_holes;
        self
    }

    pub fn with_implicit(mut self, implicit: bool) -> Self {
        self.implicit = implicit;
        self
    }
}

/// Handling of mirrored triangles by the SLIM local step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReflectionMode {
    /// Target the closest orthogonal matrix, mirrored triangles are kept
    #[default]
    Allow,
    /// Target the closest rotation, pulling mirrored triangles back
    Disallow,
}

/// User values for the SLIM solver
#[derive(Clone, Debug, PartialEq)]
pub struct SlimOptions {
    /// Scale the rest shape of faces by the vertex weights
    pub weighted: bool,
    /// Exponent applied to the weights when `weighted` is set
    pub weight_influence: f64,
    /// Size of the rest shapes relative to the initial uv area
    pub relative_scale: f64,
    /// Number of iterations ran by [`ParamHandle::slim_solve`](crate::ParamHandle::slim_solve)
    pub iterations: usize,
    /// Keep boundary vertices at their current uv
    pub fixed_boundary: bool,
    pub reflection_mode: ReflectionMode,
    /// Start from the current uvs when they form a valid embedding
    pub skip_initialization: bool,
    /// Keep unselected vertices at their current uv
    pub pin_unselected: bool,
}

impl Default for SlimOptions {
    fn default() -> Self {
        SlimOptions {
            weighted: false,
            weight_influence: 1.,
            relative_scale: 1.,
            iterations: 10,
            fixed_boundary: false,
            reflection_mode: ReflectionMode::Allow,
            skip_initialization: false,
            pin_unselected: false,
        }
    }
}

impl SlimOptions {
    pub fn with_weights(mut self, influence: f64) -> Self {
        self.weighted = true;
        self.weight_influence = influence;
        self
    }

    pub fn with_relative_scale(mut self, relative_scale: f64) -> Self {
        self.relative_scale = relative_scale;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_fixed_boundary(mut self, fixed_boundary: bool) -> Self {
        self.fixed_boundary = fixed_boundary;
        self
    }

    pub fn with_reflection_mode(mut self, reflection_mode: ReflectionMode) -> Self {
        self.reflection_mode = reflection_mode;
        self
    }

    pub fn with_skip_initialization(mut self, skip_initialization: bool) -> Self {
        self.skip_initialization = skip_initialization;
        self
    }

    pub fn with_pin_unselected(mut self, pin_unselected: bool) -> Self {
        self.pin_unselected = pin_unselected;
        self
    }
}

/// Parametrization method used by [`ParamHandle::unwrap`](crate::ParamHandle::unwrap).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnwrapMethod {
    /// LSCM on angles optimized by ABF
    AngleBased,
    /// Plain LSCM
    Conformal,
    /// SLIM
    #[default]
    MinimumStretch,
}

/// Settings of a full unwrap: solve, average and pack.
#[derive(Clone, Debug, PartialEq)]
pub struct UnwrapOptions {
    pub method: UnwrapMethod,
    /// Keep boundary vertices at their current uv
    pub fixed_boundary: bool,
    /// Solver settings when `method` is [`UnwrapMethod::MinimumStretch`]
    pub slim: SlimOptions,
    /// Rescale charts so that their uv areas match their 3d areas
    pub average: bool,
    /// Pack charts inside the unit square
    pub pack: bool,
    /// Space between packed charts, in uv units
    pub margin: f64,
    /// Rotate charts to their tightest bounding box while packing
    pub allow_rotation: bool,
}

impl Default for UnwrapOptions {
    fn default() -> Self {
        UnwrapOptions {
            method: UnwrapMethod::default(),
            fixed_boundary: false,
            slim: SlimOptions::default(),
            average: true,
            pack: true,
            margin: 0.001,
            allow_rotation: false,
        }
    }
}

impl UnwrapOptions {
    pub fn with_method(mut self, method: UnwrapMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_fixed_boundary(mut self, fixed_boundary: bool) -> Self {
        self.fixed_boundary = fixed_boundary;
        self
    }

    pub fn with_slim(mut self, slim: SlimOptions) -> Self {
        self.slim = slim;
        self
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_rotation(mut self, allow_rotation: bool) -> Self {
        self.allow_rotation = allow_rotation;
        self
    }

    /// Skip the average and pack steps, keeping the raw solver output.
    pub fn solve_only(mut self) -> Self {
        self.average = false;
        self.pack = false;
        self
    }
}
