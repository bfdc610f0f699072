//! The error type shared by every fallible operation on a complex.

use crate::gmsh::GmshError;

/// Error in constructing a complex or computing one of its operators.
///
/// Errors are surfaced at the point of detection
/// and nothing is cached for the attribute that failed,
/// so a failed computation is attempted again on the next access.
#[derive(thiserror::Error, Debug)]
pub enum DecError {
    /// An attribute name that doesn't correspond to
    /// any lazily computable field of a skeleton.
    #[error("unknown skeleton attribute `{0}`")]
    UnknownAttribute(String),
    /// A skeleton dimension higher than the dimension of the complex was requested.
    #[error("dimension {dim} is out of range for a complex of dimension {complex_dim}")]
    DimensionOutOfRange {
        /// The requested dimension.
        dim: usize,
        /// Dimension of the complex.
        complex_dim: usize,
    },
    /// A simplex whose Gram matrix (or circumcenter system) is singular.
    #[error("degenerate {dim}-simplex with vertices {vertices:?}")]
    DegenerateSimplex {
        /// Dimension of the simplex.
        dim: usize,
        /// Unstitched vertex indices of the simplex.
        vertices: Vec<usize>,
    },
    /// Malformed input given to the complex builder.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Applying the exterior derivative twice didn't give zero.
    #[error("exterior derivative applied twice starting from dimension {dim} is nonzero")]
    ChainComplexViolation {
        /// Dimension of the cochains the first exterior derivative was applied to.
        dim: usize,
    },
    /// Failure in loading a mesh file.
    #[error(transparent)]
    Gmsh(#[from] GmshError),
}
