//! Structural failures of the wedge-to-grid expansion.

use thiserror::Error;

/// An enumerated type for the unrecoverable failure kinds of the expansion pipeline.
///
/// Floating-point noise never surfaces as an error: it is absorbed by round-off snapping. Every
/// variant here invalidates the whole run.
#[derive(Debug, Clone, Error)]
pub enum HkSymError {
    /// A symmetry matrix is neither a proper rotation nor an inversion times a proper rotation.
    #[error(
        "Symmetry operation {index} cannot be decomposed into a proper rotation, with or without \
        inversion: {matrix:?}."
    )]
    Decomposition {
        /// The index of the offending symmetry operation.
        index: usize,

        /// The offending matrix in the Cartesian basis.
        matrix: [[f64; 3]; 3],
    },

    /// The symmetry images of the wedge do not cover the full grid.
    #[error(
        "Incomplete coverage: only {covered} of {total} grid points are generated from the wedge. \
        Missing k-points: {missing:?}."
    )]
    IncompleteCoverage {
        /// The number of grid points reached.
        covered: usize,

        /// The number of grid points.
        total: usize,

        /// The fractional coordinates of the grid points not reached.
        missing: Vec<[f64; 3]>,
    },

    /// A transformed k-point has no counterpart on the grid.
    #[error("Unmatched point: {point:?} (image under symmetry operation {operation}) is not on the grid.")]
    UnmatchedPoint {
        /// The fractional coordinates of the transformed point.
        point: [f64; 3],

        /// The index of the symmetry operation producing the point.
        operation: usize,
    },

    /// The input data set is self-inconsistent.
    #[error("Inconsistent input: {0}")]
    InconsistentInput(String),
}
