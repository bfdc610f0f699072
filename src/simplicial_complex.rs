//! The core data structure of DEC, the simplicial complex,
//! and its per-dimension skeleta.
//!
//! A complex is built once from its top-dimensional simplices.
//! Every lower-dimensional skeleton starts out empty
//! and is filled in on first access by walking up to the skeleton above it,
//! so asking for e.g. the Hodge star on vertices
//! transparently computes everything it depends on.
//! Nothing is ever computed twice.

use nalgebra as na;
use nalgebra_sparse as nas;
use once_cell::sync::OnceCell;

use std::sync::Arc;

mod skeleton;
use skeleton::{top_topology, Skeleton, Unstitched};

mod volumes;
pub use volumes::DualCell;

use crate::{
    cochain::Cochain,
    geometry::{DecScalar, Point},
    metric::{self, Euclidean, MetricField},
    simplex::UnstitchedSimplex,
    stitch::Stitches,
    DecError,
};

/// Largest magnitude an entry of `d ∘ d` may have
/// for the complex to pass [`SimplicialComplex::verify_chain_complex`].
const CHAIN_COMPLEX_TOLERANCE: f64 = 1e-12;

/// A DEC complex where the primal cells are all simplices
/// (points, line segments, triangles, tetrahedra etc).
///
/// Dimensions are runtime values; the scalar type `T` is `f64`
/// for real metrics and [`na::Complex<f64>`] for complex-valued ones.
pub struct SimplicialComplex<T: DecScalar = f64> {
    vertices: Vec<Point<T>>,
    metric: Arc<dyn MetricField<T>>,
    stitches: Stitches,
    subdivisions: usize,
    complex_dimension: usize,
    embedding_dimension: usize,
    /// one per dimension, index = dimension
    skeleta: Vec<Skeleton<T>>,
    /// per top-dimensional simplex, per vertex
    barycentric_gradients: OnceCell<Vec<Vec<Point<T>>>>,
}

/// Builder for a [`SimplicialComplex`] with a non-default
/// metric, vertex identification or sampling refinement.
///
/// ```
/// # use dec_skeleta::{SimplicialComplex, Stitches, na};
/// // a periodic chain of three unit segments
/// let vertices = (0..4).map(|x| na::DVector::from_element(1, x as f64)).collect();
/// let mesh = SimplicialComplex::<f64>::builder(vertices, vec![vec![0, 1], vec![1, 2], vec![2, 3]])
///     .stitches([(3, 0)].into_iter().collect::<Stitches>())
///     .build()?;
/// assert_eq!(mesh.num_simplices(0)?, 3);
/// # Ok::<(), dec_skeleta::DecError>(())
/// ```
pub struct ComplexBuilder<T: DecScalar> {
    vertices: Vec<na::DVector<f64>>,
    simplices: Vec<Vec<usize>>,
    metric: Arc<dyn MetricField<T>>,
    stitches: Stitches,
    subdivisions: usize,
}

impl<T: DecScalar> ComplexBuilder<T> {
    /// Use the given metric field instead of the Euclidean one.
    pub fn metric(mut self, metric: impl MetricField<T> + 'static) -> Self {
        self.metric = Arc::new(metric);
        self
    }

    /// Identify vertices with each other.
    pub fn stitches(mut self, stitches: Stitches) -> Self {
        self.stitches = stitches;
        self
    }

    /// Set the refinement factor used when sampling the metric field.
    /// Must be at least 1.
    pub fn subdivisions(mut self, subdivisions: usize) -> Self {
        self.subdivisions = subdivisions;
        self
    }

    /// Validate the input and construct the complex.
    ///
    /// Only the topology of the top-dimensional simplices is built here;
    /// everything else is computed on demand.
    pub fn build(self) -> Result<SimplicialComplex<T>, DecError> {
        let Self {
            vertices,
            mut simplices,
            metric,
            stitches,
            subdivisions,
        } = self;

        let simplex_size = match simplices.first() {
            Some(first) if !first.is_empty() => first.len(),
            Some(_) => return Err(DecError::InvalidInput("simplex with no vertices".into())),
            None => return Err(DecError::InvalidInput("no simplices given".into())),
        };
        if let Some(ragged) = simplices.iter().position(|s| s.len() != simplex_size) {
            return Err(DecError::InvalidInput(format!(
                "simplex {ragged} has {} vertices, expected {simplex_size}",
                simplices[ragged].len()
            )));
        }
        let vertex_count = vertices.len();
        if let Some(&v) = simplices.iter().flatten().find(|&&v| v >= vertex_count) {
            return Err(DecError::InvalidInput(format!(
                "vertex index {v} is out of range for {vertex_count} vertices"
            )));
        }
        let embedding_dimension = vertices.first().map_or(0, |v| v.len());
        if vertices.iter().any(|v| v.len() != embedding_dimension) {
            return Err(DecError::InvalidInput(
                "vertices have inconsistent coordinate counts".into(),
            ));
        }
        if let Some(metric_dim) = metric.dim() {
            if metric_dim != embedding_dimension {
                return Err(DecError::InvalidInput(format!(
                    "metric of dimension {metric_dim} given for embedding dimension {embedding_dimension}"
                )));
            }
        }
        if subdivisions == 0 {
            return Err(DecError::InvalidInput("subdivisions must be at least 1".into()));
        }
        if let Some((from, to)) = stitches
            .iter()
            .find(|&(from, to)| from >= vertex_count || to >= vertex_count)
        {
            return Err(DecError::InvalidInput(format!(
                "identification {from} -> {to} refers to a vertex out of range for {vertex_count} vertices"
            )));
        }

        // catch misshapen tensors up front rather than on first use
        let first_points: Vec<Point<T>> = simplices[0]
            .iter()
            .map(|&v| vertices[v].map(T::from_real))
            .collect();
        metric::check_shape(&metric.sample(&first_points, subdivisions)?, embedding_dimension)?;

        // row order is canonicalized so the result doesn't depend on input order,
        // vertex order within a row determines orientation and is kept
        simplices.sort();
        let complex_dimension = simplex_size - 1;

        let stitched_rows: Vec<Vec<usize>> = simplices.iter().map(|s| stitches.stitch(s)).collect();
        let topology = top_topology(stitched_rows)?;
        let unstitched = Unstitched::new(
            simplices.into_iter().map(UnstitchedSimplex::new).collect(),
            &stitches,
            &topology.index,
        )?;

        let mut skeleta: Vec<Skeleton<T>> = (0..complex_dimension).map(Skeleton::new).collect();
        skeleta.push(Skeleton::top(complex_dimension, topology, unstitched));

        let vertices: Vec<Point<T>> = vertices.iter().map(|v| v.map(T::from_real)).collect();

        tracing::debug!(
            complex_dimension,
            embedding_dimension,
            vertex_count,
            identified_vertices = stitches.len(),
            "built simplicial complex"
        );

        Ok(SimplicialComplex {
            vertices,
            metric,
            stitches,
            subdivisions,
            complex_dimension,
            embedding_dimension,
            skeleta,
            barycentric_gradients: OnceCell::new(),
        })
    }
}

impl SimplicialComplex<f64> {
    /// Construct a real-valued complex with the Euclidean metric
    /// from raw vertices and top-dimensional simplices.
    ///
    /// Every simplex is a list of vertex indices,
    /// and all of them must have the same length.
    /// The vertex order within a simplex determines its orientation.
    pub fn new(
        vertices: Vec<na::DVector<f64>>,
        simplices: Vec<Vec<usize>>,
    ) -> Result<Self, DecError> {
        Self::builder(vertices, simplices).build()
    }
}

impl<T: DecScalar> SimplicialComplex<T> {
    /// Start building a complex with the Euclidean metric,
    /// no vertex identification and one subdivision.
    pub fn builder(vertices: Vec<na::DVector<f64>>, simplices: Vec<Vec<usize>>) -> ComplexBuilder<T> {
        ComplexBuilder {
            vertices,
            simplices,
            metric: Arc::new(Euclidean),
            stitches: Stitches::new(),
            subdivisions: 1,
        }
    }

    pub(crate) fn skeleton(&self, dim: usize) -> Result<&Skeleton<T>, DecError> {
        self.skeleta.get(dim).ok_or(DecError::DimensionOutOfRange {
            dim,
            complex_dim: self.complex_dimension,
        })
    }

    /// Dimension of the highest-dimensional simplices.
    #[inline]
    pub fn complex_dimension(&self) -> usize {
        self.complex_dimension
    }

    /// Dimension of the space the vertices live in.
    #[inline]
    pub fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }

    /// Raw vertex coordinates, indexed by unstitched vertex index.
    #[inline]
    pub fn vertices(&self) -> &[Point<T>] {
        &self.vertices
    }

    /// The vertex identification map.
    #[inline]
    pub fn stitches(&self) -> &Stitches {
        &self.stitches
    }

    /// Refinement factor for metric sampling.
    #[inline]
    pub fn subdivisions(&self) -> usize {
        self.subdivisions
    }

    /// Create a new cochain with a value of zero
    /// for each `dim`-simplex in the complex.
    pub fn new_zero_cochain(&self, dim: usize) -> Result<Cochain<T>, DecError> {
        Ok(Cochain::zeros(dim, self.num_simplices(dim)?))
    }

    /// Apply the exterior derivative to a cochain.
    pub fn d(&self, cochain: &Cochain<T>) -> Result<Cochain<T>, DecError> {
        let op = self.exterior_derivative(cochain.dim)?;
        if op.ncols() != cochain.values.len() {
            return Err(DecError::InvalidInput(format!(
                "{}-cochain has {} values, expected {}",
                cochain.dim,
                cochain.values.len(),
                op.ncols()
            )));
        }
        Ok(Cochain::from_values(cochain.dim + 1, op * &cochain.values))
    }

    /// Force topology, unstitched aggregation and circumcenters
    /// of every skeleton from the top dimension down to `dim`, in that order.
    ///
    /// Accessors do this implicitly as needed,
    /// but this can be used to front-load the work.
    pub fn ensure_upto(&self, dim: usize) -> Result<(), DecError> {
        self.skeleton(dim)?;
        for d in (dim..=self.complex_dimension).rev() {
            self.topology(d)?;
            self.unstitched_data(d)?;
            self.circumcenters(d)?;
        }
        Ok(())
    }

    /// Compute a single attribute of the `dim`-skeleton
    /// (and everything it depends on) if it hasn't been computed yet.
    pub fn compute(&self, dim: usize, attribute: Attribute) -> Result<(), DecError> {
        match attribute {
            Attribute::NumSimplices | Attribute::Simplices | Attribute::SimplexToIndex => {
                self.topology(dim).map(drop)
            }
            Attribute::ExteriorDerivative => self.exterior_derivative(dim).map(drop),
            Attribute::Boundary => self.boundary(dim).map(drop),
            Attribute::Interior => self.interior(dim).map(drop),
            Attribute::Unstitched => self.unstitched_data(dim).map(drop),
            Attribute::Points => self.points(dim).map(drop),
            Attribute::Metrics => self.metrics(dim).map(drop),
            Attribute::PrimalVolumes => self.primal_volumes(dim).map(drop),
            Attribute::Circumcenters => self.circumcenters(dim).map(drop),
            Attribute::DualVolumes => self.dual_volumes(dim).map(drop),
            Attribute::Star => self.star(dim).map(drop),
            Attribute::InverseStar => self.inverse_star(dim).map(drop),
            Attribute::Codifferential => self.codifferential(dim).map(drop),
            Attribute::LaplaceBeltrami => self.laplace_beltrami(dim).map(drop),
            Attribute::LaplaceDeRham => self.laplace_derham(dim).map(drop),
            Attribute::Sharp => self.sharp(dim).map(drop),
        }
    }

    /// Compute an attribute given by name, see [`Attribute`] for the accepted names.
    pub fn compute_named(&self, dim: usize, attribute: &str) -> Result<(), DecError> {
        self.compute(dim, attribute.parse()?)
    }

    /// Check that applying the exterior derivative twice gives zero
    /// for every pair of consecutive dimensions.
    pub fn verify_chain_complex(&self) -> Result<(), DecError> {
        for dim in 0..self.complex_dimension {
            let first = self.exterior_derivative(dim)?;
            let second = self.exterior_derivative(dim + 1)?;
            let composed: nas::CsrMatrix<T> = second * first;
            if composed
                .values()
                .iter()
                .any(|v| v.modulus() > CHAIN_COMPLEX_TOLERANCE)
            {
                return Err(DecError::ChainComplexViolation { dim });
            }
        }
        Ok(())
    }
}

impl<T: DecScalar> std::fmt::Debug for SimplicialComplex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let computed: Vec<(usize, Option<usize>)> = self
            .skeleta
            .iter()
            .map(|s| (s.dim, s.topology.get().map(|t| t.simplices.len())))
            .collect();
        f.debug_struct("SimplicialComplex")
            .field("complex_dimension", &self.complex_dimension)
            .field("embedding_dimension", &self.embedding_dimension)
            .field("vertex_count", &self.vertices.len())
            .field("stitches", &self.stitches)
            .field("subdivisions", &self.subdivisions)
            .field("simplex_counts", &computed)
            .finish()
    }
}

//
// attribute names
//

/// Every lazily computed attribute of a skeleton.
///
/// Parses from (and displays as) the snake_case name of the accessor,
/// e.g. `"laplace_derham"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// [`SimplicialComplex::num_simplices`]
    NumSimplices,
    /// [`SimplicialComplex::simplices`]
    Simplices,
    /// [`SimplicialComplex::simplex_to_index`]
    SimplexToIndex,
    /// [`SimplicialComplex::exterior_derivative`]
    ExteriorDerivative,
    /// [`SimplicialComplex::boundary`]
    Boundary,
    /// [`SimplicialComplex::interior`]
    Interior,
    /// [`SimplicialComplex::unstitched`]
    Unstitched,
    /// [`SimplicialComplex::points`]
    Points,
    /// [`SimplicialComplex::metrics`]
    Metrics,
    /// [`SimplicialComplex::primal_volumes`]
    PrimalVolumes,
    /// [`SimplicialComplex::circumcenters`]
    Circumcenters,
    /// [`SimplicialComplex::dual_volumes`]
    DualVolumes,
    /// [`SimplicialComplex::star`]
    Star,
    /// [`SimplicialComplex::inverse_star`]
    InverseStar,
    /// [`SimplicialComplex::codifferential`]
    Codifferential,
    /// [`SimplicialComplex::laplace_beltrami`]
    LaplaceBeltrami,
    /// [`SimplicialComplex::laplace_derham`]
    LaplaceDeRham,
    /// [`SimplicialComplex::sharp`]
    Sharp,
}

impl Attribute {
    /// All attributes, in dependency-agnostic declaration order.
    pub const ALL: [Attribute; 18] = [
        Attribute::NumSimplices,
        Attribute::Simplices,
        Attribute::SimplexToIndex,
        Attribute::ExteriorDerivative,
        Attribute::Boundary,
        Attribute::Interior,
        Attribute::Unstitched,
        Attribute::Points,
        Attribute::Metrics,
        Attribute::PrimalVolumes,
        Attribute::Circumcenters,
        Attribute::DualVolumes,
        Attribute::Star,
        Attribute::InverseStar,
        Attribute::Codifferential,
        Attribute::LaplaceBeltrami,
        Attribute::LaplaceDeRham,
        Attribute::Sharp,
    ];

    /// The snake_case name of the attribute.
    pub fn name(self) -> &'static str {
        match self {
            Attribute::NumSimplices => "num_simplices",
            Attribute::Simplices => "simplices",
            Attribute::SimplexToIndex => "simplex_to_index",
            Attribute::ExteriorDerivative => "exterior_derivative",
            Attribute::Boundary => "boundary",
            Attribute::Interior => "interior",
            Attribute::Unstitched => "unstitched",
            Attribute::Points => "points",
            Attribute::Metrics => "metrics",
            Attribute::PrimalVolumes => "primal_volumes",
            Attribute::Circumcenters => "circumcenters",
            Attribute::DualVolumes => "dual_volumes",
            Attribute::Star => "star",
            Attribute::InverseStar => "inverse_star",
            Attribute::Codifferential => "codifferential",
            Attribute::LaplaceBeltrami => "laplace_beltrami",
            Attribute::LaplaceDeRham => "laplace_derham",
            Attribute::Sharp => "sharp",
        }
    }
}

impl std::str::FromStr for Attribute {
    type Err = DecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::ALL
            .into_iter()
            .find(|attr| attr.name() == s)
            .ok_or_else(|| DecError::UnknownAttribute(s.to_string()))
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

//
// test meshes
//

fn points_2d(coords: &[(f64, f64)]) -> Vec<na::DVector<f64>> {
    coords
        .iter()
        .map(|&(x, y)| na::DVector::from_column_slice(&[x, y]))
        .collect()
}

/// A small hexagon-shaped 2D mesh for testing basic functionality.
/// Shaped somewhat like this:
///    ____
///   /\  /\
///  /__\/__\
///  \  /\  /
///   \/__\/
///
/// with vertices and triangles ordered left to right, top to bottom.
///
/// This is public for visibility in doctests, which frequently need an instance of a mesh.
/// It is not meant to be used by users and thus hidden from docs.
#[doc(hidden)]
pub fn tiny_mesh_2d() -> SimplicialComplex<f64> {
    let vertices = points_2d(&[
        (-0.5, 1.0),
        (0.5, 1.0),
        (-1.0, 0.0),
        (0.0, 0.0),
        (1.0, 0.0),
        (-0.5, -1.0),
        (0.5, -1.0),
    ]);
    let simplices = vec![
        vec![0, 2, 3],
        vec![0, 1, 3],
        vec![1, 3, 4],
        vec![2, 3, 5],
        vec![3, 5, 6],
        vec![3, 4, 6],
    ];
    SimplicialComplex::new(vertices, simplices).expect("tiny_mesh_2d is valid")
}

/// A small 3D mesh for testing basic functionality.
/// Four tetrahedra arranged into a diamond shape,
/// split like this down the x,y plane:
///
///    /\
///   /__\
///   \  /
///    \/
///
/// and with a single point both up and down the z-axis.
#[doc(hidden)]
pub fn tiny_mesh_3d() -> SimplicialComplex<f64> {
    let vertices = [
        [0.0, 1.0, 0.0],
        [-0.5, 0.0, 0.0],
        [0.5, 0.0, 0.0],
        [0.0, -1.0, 0.0],
        [0.0, 0.0, -1.0],
        [0.0, 0.0, 1.0],
    ]
    .iter()
    .map(|p| na::DVector::from_column_slice(p))
    .collect();
    let simplices = vec![
        vec![0, 1, 2, 4],
        vec![0, 1, 2, 5],
        vec![1, 2, 3, 4],
        vec![1, 2, 3, 5],
    ];
    SimplicialComplex::new(vertices, simplices).expect("tiny_mesh_3d is valid")
}

/// The right triangle with legs of length 1 along the axes.
#[doc(hidden)]
pub fn single_triangle() -> SimplicialComplex<f64> {
    let vertices = points_2d(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);
    SimplicialComplex::new(vertices, vec![vec![0, 1, 2]]).expect("single_triangle is valid")
}

/// Three unit segments on the x axis with the last vertex identified with the first,
/// forming a closed loop of length 3.
#[doc(hidden)]
pub fn periodic_chain() -> SimplicialComplex<f64> {
    let vertices = (0..4)
        .map(|x| na::DVector::from_element(1, x as f64))
        .collect();
    SimplicialComplex::builder(vertices, vec![vec![0, 1], vec![1, 2], vec![2, 3]])
        .stitches([(3, 0)].into_iter().collect())
        .build()
        .expect("periodic_chain is valid")
}
