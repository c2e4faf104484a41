//! Error and status types.

use thiserror::Error;

use crate::ParamKey;

/// Result type alias using [`ParamError`].
pub type Result<T> = std::result::Result<T, ParamError>;

/// Errors reported by the parametrizer.
///
/// None of these are fatal for a whole solve: rejected faces are simply left
/// out of the graph and failing charts keep their previous UVs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    /// A face was given with fewer than three corners.
    #[error("face {face} has {corners} corners, at least 3 are needed")]
    TooFewCorners {
        /// External face key.
        face: ParamKey,
        /// Number of corners given.
        corners: usize,
    },

    /// The per-corner arrays of a face do not all have the same length.
    #[error("face {face}: per-corner data has mismatched lengths")]
    MismatchedCornerData {
        /// External face key.
        face: ParamKey,
    },

    /// A face references the same vertex twice.
    #[error("face {face} references vertex {vertex} more than once")]
    RepeatedVertex {
        /// External face key.
        face: ParamKey,
        /// The repeated vertex key.
        vertex: ParamKey,
    },

    /// A face has (close to) zero area.
    #[error("face {face} has zero area")]
    ZeroArea {
        /// External face key.
        face: ParamKey,
    },

    /// A solver operation was called without a matching `begin`.
    #[error("no solver has been started on this handle")]
    NoSolver,

    /// A solver was started while another one is still active.
    #[error("a solver is already active on this handle")]
    SolverActive,

    /// The active solver is not the one the operation belongs to.
    #[error("operation requires the {expected} solver")]
    WrongSolver {
        /// Name of the solver the operation needs.
        expected: &'static str,
    },

    /// The sparse system of a chart could not be factored.
    #[error("chart {chart}: linear system is singular")]
    SingularSystem {
        /// Chart index inside the handle.
        chart: usize,
    },

    /// An iterative solve stopped before reaching its tolerance.
    #[error("chart {chart}: no convergence after {iterations} iterations")]
    NotConverged {
        /// Chart index inside the handle.
        chart: usize,
        /// Iterations ran.
        iterations: usize,
    },

    /// A chart has too few usable vertices to be parametrized.
    #[error("chart {chart} is degenerate")]
    DegenerateChart {
        /// Chart index inside the handle.
        chart: usize,
    },
}
