//! Discrete exterior calculus on simplicial complexes of any dimension.
//!
//! A [`SimplicialComplex`] is built from a list of vertices
//! and a list of top-dimensional simplices,
//! optionally with a [`MetricField`] and a set of [`Stitches`]
//! that identify vertices for periodic domains.
//! All lower-dimensional skeleta and every operator on them
//! (exterior derivatives, Hodge stars, codifferentials, Laplacians, sharp)
//! are computed lazily on first access and cached for the lifetime of the complex.
//!
//! ```
//! use dec_skeleta::{na, SimplicialComplex};
//!
//! let complex = SimplicialComplex::new(
//!     vec![
//!         na::dvector![0.0, 0.0],
//!         na::dvector![1.0, 0.0],
//!         na::dvector![0.0, 1.0],
//!     ],
//!     vec![vec![0, 1, 2]],
//! )?;
//! assert_eq!(complex.num_simplices(1)?, 3);
//! let laplacian = complex.laplace_beltrami(0)?;
//! assert_eq!(laplacian.nrows(), 3);
//! # Ok::<(), dec_skeleta::DecError>(())
//! ```

#![warn(missing_docs)]

pub mod error;
#[doc(inline)]
pub use error::DecError;

pub mod simplex;
#[doc(inline)]
pub use simplex::{StitchedSimplex, UnstitchedSimplex};

pub mod stitch;
#[doc(inline)]
pub use stitch::Stitches;

pub mod geometry;
#[doc(inline)]
pub use geometry::{DecScalar, Point};

pub mod metric;
#[doc(inline)]
pub use metric::{ConstantMetric, Euclidean, FnMetric, MetricField};

pub mod simplicial_complex;
#[doc(inline)]
pub use simplicial_complex::{Attribute, ComplexBuilder, DualCell, SimplicialComplex};

pub mod cochain;
#[doc(inline)]
pub use cochain::Cochain;

pub mod operator;

pub mod gmsh;
#[doc(inline)]
pub use gmsh::GmshError;

// re-exports of the linear algebra crates operators are expressed in

pub use nalgebra as na;
pub use nalgebra_sparse as nas;
