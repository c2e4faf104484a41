//! UV parametrization of polygon meshes.
//!
//! A mesh is split into charts along seams, then every chart is flattened with either a
//! conformal solver (LSCM, optionally on angles from ABF) or the iterative SLIM solver, which
//! minimizes the symmetric Dirichlet energy while avoiding flipped triangles. Charts can then be
//! rescaled relative to each other and packed in the unit square.
//!
//! Faces are fed one at a time, uvs are written back per face corner:
//! ```
//! use uvparam_rs::{ConstructOptions, Construction, FaceInput, UnwrapOptions};
//!
//! let co = [[0., 0., 0.], [1., 0., 0.], [1., 1., 0.], [0., 1., 0.]];
//! let mut construction = Construction::begin();
//! construction
//!     .add_face(&FaceInput {
//!         key: 0,
//!         vertex_keys: &[0, 1, 2, 3],
//!         positions: &co,
//!         uvs: &[[0.; 2]; 4],
//!         weights: None,
//!         pinned: &[false; 4],
//!         selected: &[true; 4],
//!         normal: None,
//!     })
//!     .unwrap();
//! let mut handle = construction.end(ConstructOptions::default());
//! handle.unwrap(&UnwrapOptions::default()).unwrap();
//! handle.flush(&mut |face: u64, corner: usize, uv: [f64; 2]| {
//!     // store `uv` on corner `corner` of face `face`
//! });
//! ```
mod abf;
mod chart;
mod construct;
pub mod error;
mod handle;
mod lscm;
pub mod options;
mod pack;
pub mod session;
mod slim;
mod utils;

/// Key identifying host vertices and faces.
pub type ParamKey = u64;

pub use chart::Chart;
pub use construct::{Construction, FaceInput};
pub use error::{ParamError, Result};
pub use handle::{ParamHandle, SolveStats, UvTarget};
pub use options::{ConstructOptions, ReflectionMode, SlimOptions, UnwrapMethod, UnwrapOptions};
