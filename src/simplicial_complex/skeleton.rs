//! Per-dimension storage and the topological part of a skeleton:
//! face enumeration, the exterior derivative,
//! boundary classification and unstitched aggregation.

use fixedbitset as fb;
use indexmap::IndexSet;
use nalgebra as na;
use nalgebra_sparse as nas;
use once_cell::sync::OnceCell;
use rayon::prelude::*;

use std::collections::{BTreeSet, HashMap};

use super::SimplicialComplex;
use crate::{
    geometry::{DecScalar, Point},
    metric,
    simplex::{relative_parity, remove_position, StitchedSimplex, UnstitchedSimplex},
    stitch::Stitches,
    DecError,
};

/// All simplices of one dimension in a complex
/// along with every operator defined on them.
///
/// Every field is computed at most once, on first access,
/// through the accessors on [`SimplicialComplex`].
pub(crate) struct Skeleton<T: DecScalar> {
    pub dim: usize,
    pub topology: OnceCell<Topology<T>>,
    pub boundary: OnceCell<fb::FixedBitSet>,
    pub interior: OnceCell<fb::FixedBitSet>,
    pub unstitched: OnceCell<Unstitched>,
    /// embedded points of each unstitched simplex
    pub points: OnceCell<Vec<Vec<Point<T>>>>,
    /// metric tensor sampled for each unstitched simplex
    pub metrics: OnceCell<Vec<na::DMatrix<T>>>,
    /// indexed by stitched index
    pub primal_volumes: OnceCell<na::DVector<T>>,
    /// indexed by unstitched position
    pub circumcenters: OnceCell<Vec<Point<T>>>,
    /// indexed by stitched index
    pub dual_volumes: OnceCell<na::DVector<T>>,
    pub star: OnceCell<nas::CsrMatrix<T>>,
    pub inverse_star: OnceCell<nas::CsrMatrix<T>>,
    pub codifferential: OnceCell<nas::CsrMatrix<T>>,
    pub laplace_beltrami: OnceCell<nas::CsrMatrix<T>>,
    pub laplace_derham: OnceCell<nas::CsrMatrix<T>>,
    pub sharp: OnceCell<nas::CsrMatrix<T>>,
}

impl<T: DecScalar> Skeleton<T> {
    /// An empty shell to be filled on demand.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            topology: OnceCell::new(),
            boundary: OnceCell::new(),
            interior: OnceCell::new(),
            unstitched: OnceCell::new(),
            points: OnceCell::new(),
            metrics: OnceCell::new(),
            primal_volumes: OnceCell::new(),
            circumcenters: OnceCell::new(),
            dual_volumes: OnceCell::new(),
            star: OnceCell::new(),
            inverse_star: OnceCell::new(),
            codifferential: OnceCell::new(),
            laplace_beltrami: OnceCell::new(),
            laplace_derham: OnceCell::new(),
            sharp: OnceCell::new(),
        }
    }

    /// The top-dimensional skeleton, whose simplices are given explicitly.
    pub fn top(dim: usize, topology: Topology<T>, unstitched: Unstitched) -> Self {
        let skeleton = Self::new(dim);
        // freshly created cells, these can't already be set
        let _ = skeleton.topology.set(topology);
        let _ = skeleton.unstitched.set(unstitched);
        skeleton
    }
}

/// The stitched simplices of a skeleton and its exterior derivative.
///
/// These are produced together by enumerating faces of the skeleton above.
pub(crate) struct Topology<T: DecScalar> {
    /// vertex tuple of each stitched simplex,
    /// in the order of its first occurrence as a face
    pub simplices: Vec<Vec<usize>>,
    /// stitched identity -> dense index
    pub index: IndexSet<StitchedSimplex>,
    /// rows are the simplices one dimension up, columns the simplices here
    pub exterior_derivative: nas::CsrMatrix<T>,
}

/// Topology of the top-dimensional skeleton,
/// built directly from the stitched input rows.
pub(crate) fn top_topology<T: DecScalar>(rows: Vec<Vec<usize>>) -> Result<Topology<T>, DecError> {
    let mut index = IndexSet::with_capacity(rows.len());
    for (row_idx, row) in rows.iter().enumerate() {
        let (existing, inserted) = index.insert_full(StitchedSimplex::from_vertices(row.iter().copied()));
        if !inserted {
            return Err(DecError::InvalidInput(format!(
                "simplices {existing} and {row_idx} coincide after vertex identification"
            )));
        }
    }
    let simplex_count = rows.len();
    Ok(Topology {
        simplices: rows,
        index,
        // nothing above the top dimension
        exterior_derivative: nas::CsrMatrix::zeros(0, simplex_count),
    })
}

/// Enumerate the faces of every simplex in `upper`,
/// deduplicating by stitched identity,
/// and assemble the exterior derivative taking cochains on the faces
/// to cochains on `upper`.
pub(crate) fn face_topology<T: DecScalar>(upper: &Topology<T>) -> Topology<T> {
    let row_count = upper.simplices.len();
    let nonzero_count: usize = upper.simplices.iter().map(Vec::len).sum();

    let mut index: IndexSet<StitchedSimplex> = IndexSet::new();
    let mut simplices: Vec<Vec<usize>> = Vec::new();
    let mut rows = Vec::with_capacity(nonzero_count);
    let mut cols = Vec::with_capacity(nonzero_count);
    let mut values = Vec::with_capacity(nonzero_count);

    for (row, upper_simplex) in upper.simplices.iter().enumerate() {
        // every face is obtained by deleting one vertex.
        // orientations alternate between forward and backward in this order,
        // see Discrete Differential Forms for Computational Modeling by Desbrun et al. (2006)
        for exclude_idx in 0..upper_simplex.len() {
            let face = remove_position(upper_simplex, exclude_idx);
            let (col, inserted) =
                index.insert_full(StitchedSimplex::from_vertices(face.iter().copied()));
            if inserted {
                simplices.push(face.clone());
            }

            let deletion_sign: i8 = if exclude_idx % 2 == 0 { 1 } else { -1 };
            // with stitching, a face may be reached with a different vertex order
            // than the one it was registered with
            let sign = deletion_sign * relative_parity(&face, &simplices[col]);

            rows.push(row);
            cols.push(col);
            values.push(T::from_real(sign as f64));
        }
    }

    let coo = nas::CooMatrix::try_from_triplets(row_count, simplices.len(), rows, cols, values)
        .expect("Error in exterior derivative construction. This is a bug in dec-skeleta");
    // conversion sums entries of faces that appear twice in a row after identification
    let exterior_derivative = nas::CsrMatrix::from(&coo);

    Topology {
        simplices,
        index,
        exterior_derivative,
    }
}

/// Faces incident to an odd number of top-dimensional simplices,
/// given the exterior derivative whose rows are the top simplices.
pub(crate) fn odd_incidence_boundary<T: DecScalar>(d: &nas::CsrMatrix<T>) -> fb::FixedBitSet {
    let mut counts = vec![0usize; d.ncols()];
    for (_, col, val) in d.triplet_iter() {
        counts[col] += val.modulus().round() as usize;
    }
    let mut boundary = fb::FixedBitSet::with_capacity(d.ncols());
    for (idx, count) in counts.iter().enumerate() {
        if count % 2 == 1 {
            boundary.insert(idx);
        }
    }
    boundary
}

/// All faces of the simplices in `upper_subset`,
/// given the exterior derivative whose rows are the upper simplices.
pub(crate) fn faces_of_subset<T: DecScalar>(
    d: &nas::CsrMatrix<T>,
    upper_subset: &fb::FixedBitSet,
) -> fb::FixedBitSet {
    let mut faces = fb::FixedBitSet::with_capacity(d.ncols());
    for row in upper_subset.ones() {
        for &col in d.row(row).col_indices() {
            faces.insert(col);
        }
    }
    faces
}

/// Indices in `0..len` not present in `set`.
pub(crate) fn complement(set: &fb::FixedBitSet, len: usize) -> fb::FixedBitSet {
    let mut result = fb::FixedBitSet::with_capacity(len);
    for idx in (0..len).filter(|idx| !set.contains(*idx)) {
        result.insert(idx);
    }
    result
}

/// The unstitched simplices of a skeleton
/// and their mapping into the stitched index space.
pub(crate) struct Unstitched {
    /// order is correlated with the per-simplex geometry arrays
    pub simplices: Vec<UnstitchedSimplex>,
    /// unstitched simplex -> position in `simplices`
    pub positions: HashMap<UnstitchedSimplex, usize>,
    /// position in `simplices` -> stitched index
    pub stitched_indices: Vec<usize>,
}

impl Unstitched {
    pub fn new(
        simplices: Vec<UnstitchedSimplex>,
        stitches: &Stitches,
        index: &IndexSet<StitchedSimplex>,
    ) -> Result<Self, DecError> {
        let positions = simplices
            .iter()
            .enumerate()
            .map(|(pos, s)| (s.clone(), pos))
            .collect();
        let stitched_indices = simplices
            .iter()
            .map(|s| {
                let key = StitchedSimplex::from_vertices(stitches.stitch(s.vertices()));
                index.get_index_of(&key).ok_or_else(|| {
                    DecError::InvalidInput(format!(
                        "simplex {:?} has no counterpart after vertex identification",
                        s.vertices()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            simplices,
            positions,
            stitched_indices,
        })
    }
}

/// Union of the one-vertex-deleted faces of every simplex in `upper`.
///
/// The union is computed as a parallel reduction;
/// the result is sorted so it doesn't depend on the reduction order.
pub(crate) fn aggregate_faces(upper: &[UnstitchedSimplex]) -> Vec<UnstitchedSimplex> {
    upper
        .par_iter()
        .map(|simplex| simplex.faces().map(|(_, face)| face).collect::<BTreeSet<_>>())
        .reduce(BTreeSet::new, |mut acc, faces| {
            acc.extend(faces);
            acc
        })
        .into_iter()
        .collect()
}

//
// accessors
//

impl<T: DecScalar> SimplicialComplex<T> {
    pub(crate) fn topology(&self, dim: usize) -> Result<&Topology<T>, DecError> {
        let skeleton = self.skeleton(dim)?;
        skeleton.topology.get_or_try_init(|| {
            // the top skeleton is initialized at construction,
            // so there is always a skeleton above this one
            let upper = self.topology(dim + 1)?;
            let topology = face_topology(upper);
            tracing::debug!(
                dim,
                simplex_count = topology.simplices.len(),
                "enumerated faces"
            );
            Ok(topology)
        })
    }

    /// Number of stitched `dim`-simplices.
    pub fn num_simplices(&self, dim: usize) -> Result<usize, DecError> {
        Ok(self.topology(dim)?.simplices.len())
    }

    /// Vertex tuples of the stitched `dim`-simplices, by stitched index.
    pub fn simplices(&self, dim: usize) -> Result<&[Vec<usize>], DecError> {
        Ok(&self.topology(dim)?.simplices)
    }

    /// Map from stitched simplex identity to its index.
    /// The position of a simplex in the set is its index.
    pub fn simplex_to_index(&self, dim: usize) -> Result<&IndexSet<StitchedSimplex>, DecError> {
        Ok(&self.topology(dim)?.index)
    }

    /// Find the stitched index of the `dim`-simplex with the given raw vertices,
    /// in any order.
    pub fn find_simplex_index(
        &self,
        dim: usize,
        vertices: &[usize],
    ) -> Result<Option<usize>, DecError> {
        let key = StitchedSimplex::from_vertices(self.stitches.stitch(vertices));
        Ok(self.topology(dim)?.index.get_index_of(&key))
    }

    /// The exterior derivative taking `dim`-cochains to `dim + 1`-cochains,
    /// with one row per `dim + 1`-simplex and one column per `dim`-simplex.
    ///
    /// At the top dimension this is an empty matrix with zero rows.
    pub fn exterior_derivative(&self, dim: usize) -> Result<&nas::CsrMatrix<T>, DecError> {
        Ok(&self.topology(dim)?.exterior_derivative)
    }

    /// Indices of `dim`-simplices on the boundary of the complex.
    ///
    /// The top dimension has no boundary simplices;
    /// one dimension below, the boundary consists of faces
    /// belonging to an odd number of top simplices,
    /// and further down of faces of boundary simplices.
    pub fn boundary(&self, dim: usize) -> Result<&fb::FixedBitSet, DecError> {
        let skeleton = self.skeleton(dim)?;
        skeleton.boundary.get_or_try_init(|| {
            let simplex_count = self.num_simplices(dim)?;
            if dim == self.complex_dimension {
                return Ok(fb::FixedBitSet::with_capacity(simplex_count));
            }
            let d = self.exterior_derivative(dim)?;
            let boundary = if dim + 1 == self.complex_dimension {
                odd_incidence_boundary(d)
            } else {
                faces_of_subset(d, self.boundary(dim + 1)?)
            };
            tracing::debug!(dim, boundary_count = boundary.count_ones(..), "classified boundary");
            Ok(boundary)
        })
    }

    /// Indices of `dim`-simplices not on the boundary of the complex.
    pub fn interior(&self, dim: usize) -> Result<&fb::FixedBitSet, DecError> {
        let skeleton = self.skeleton(dim)?;
        skeleton.interior.get_or_try_init(|| {
            let boundary = self.boundary(dim)?;
            Ok(complement(boundary, self.num_simplices(dim)?))
        })
    }

    pub(crate) fn unstitched_data(&self, dim: usize) -> Result<&Unstitched, DecError> {
        let skeleton = self.skeleton(dim)?;
        skeleton.unstitched.get_or_try_init(|| {
            let upper = self.unstitched_data(dim + 1)?;
            let simplices = aggregate_faces(&upper.simplices);
            let topology = self.topology(dim)?;
            tracing::debug!(
                dim,
                unstitched_count = simplices.len(),
                "aggregated unstitched faces"
            );
            Unstitched::new(simplices, &self.stitches, &topology.index)
        })
    }

    /// The distinct raw vertex tuples of `dim`-simplices before identification.
    /// Per-simplex geometry ([`points`][Self::points], [`metrics`][Self::metrics],
    /// [`circumcenters`][Self::circumcenters]) follows this order.
    pub fn unstitched(&self, dim: usize) -> Result<&[UnstitchedSimplex], DecError> {
        Ok(&self.unstitched_data(dim)?.simplices)
    }

    /// The stitched index of each unstitched `dim`-simplex.
    pub fn unstitched_to_stitched(&self, dim: usize) -> Result<&[usize], DecError> {
        Ok(&self.unstitched_data(dim)?.stitched_indices)
    }

    /// Embedded vertex coordinates of each unstitched `dim`-simplex.
    pub fn points(&self, dim: usize) -> Result<&[Vec<Point<T>>], DecError> {
        let skeleton = self.skeleton(dim)?;
        let points = skeleton.points.get_or_try_init(|| {
            let unstitched = self.unstitched_data(dim)?;
            let points: Vec<Vec<Point<T>>> = unstitched
                .simplices
                .par_iter()
                .map(|s| s.vertices().iter().map(|&v| self.vertices[v].clone()).collect())
                .collect();
            Ok::<_, DecError>(points)
        })?;
        Ok(points)
    }

    /// Metric tensor of each unstitched `dim`-simplex,
    /// sampled from the metric field with the complex's refinement factor.
    pub fn metrics(&self, dim: usize) -> Result<&[na::DMatrix<T>], DecError> {
        let skeleton = self.skeleton(dim)?;
        let metrics = skeleton.metrics.get_or_try_init(|| {
            let points = self.points(dim)?;
            let metrics: Vec<na::DMatrix<T>> = points
                .par_iter()
                .map(|p| {
                    let tensor = self.metric.sample(p, self.subdivisions)?;
                    metric::check_shape(&tensor, self.embedding_dimension)?;
                    Ok(tensor)
                })
                .collect::<Result<_, DecError>>()?;
            Ok::<_, DecError>(metrics)
        })?;
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simplicial_complex::{periodic_chain, single_triangle, tiny_mesh_2d};

    fn stitched(vertices: &[usize]) -> StitchedSimplex {
        StitchedSimplex::from_vertices(vertices.iter().copied())
    }

    #[test]
    fn faces_are_enumerated_in_deletion_order() {
        let mesh = tiny_mesh_2d();

        #[rustfmt::skip]
        let expected_1_simplices: Vec<Vec<usize>> = vec![
            vec![1, 3], vec![0, 3], vec![0, 1],
            vec![2, 3], vec![0, 2],
            vec![3, 4], vec![1, 4],
            vec![3, 5], vec![2, 5],
            vec![4, 6], vec![3, 6],
            vec![5, 6],
        ];
        assert_eq!(mesh.simplices(1).unwrap(), expected_1_simplices.as_slice());

        let expected_vertex_order = [3, 1, 0, 2, 4, 5, 6];
        let vertices: Vec<usize> = mesh.simplices(0).unwrap().iter().map(|v| v[0]).collect();
        assert_eq!(vertices, expected_vertex_order);

        for (idx, simplex) in expected_1_simplices.iter().enumerate() {
            assert_eq!(
                mesh.simplex_to_index(1).unwrap().get_index_of(&stitched(simplex)),
                Some(idx)
            );
        }
    }

    #[test]
    fn exterior_derivative_signs_follow_deletion_order() {
        let mesh = single_triangle();
        let d1 = mesh.exterior_derivative(1).unwrap();
        assert_eq!((d1.nrows(), d1.ncols()), (1, 3));
        let entries: Vec<(usize, usize, f64)> =
            d1.triplet_iter().map(|(r, c, v)| (r, c, *v)).collect();
        // faces [1,2], [0,2], [0,1] get the columns 0, 1, 2
        assert_eq!(entries, vec![(0, 0, 1.0), (0, 1, -1.0), (0, 2, 1.0)]);

        let top_d = mesh.exterior_derivative(2).unwrap();
        assert_eq!((top_d.nrows(), top_d.ncols()), (0, 1));
    }

    #[test]
    fn shared_faces_are_deduplicated() {
        let vertices = vec![
            na::DVector::from_column_slice(&[0.0, 0.0]),
            na::DVector::from_column_slice(&[1.0, 0.0]),
            na::DVector::from_column_slice(&[0.0, 1.0]),
            na::DVector::from_column_slice(&[1.0, 1.0]),
        ];
        let mesh = SimplicialComplex::new(vertices, vec![vec![1, 2, 3], vec![0, 1, 2]]).unwrap();
        assert_eq!(mesh.num_simplices(2).unwrap(), 2);
        assert_eq!(mesh.num_simplices(1).unwrap(), 5);
        assert_eq!(mesh.num_simplices(0).unwrap(), 4);

        // the shared edge has one entry from each triangle
        let shared = mesh.find_simplex_index(1, &[2, 1]).unwrap().unwrap();
        let d1 = mesh.exterior_derivative(1).unwrap();
        let column: Vec<(usize, f64)> = d1
            .triplet_iter()
            .filter(|(_, c, _)| *c == shared)
            .map(|(r, _, v)| (r, v.abs()))
            .collect();
        assert_eq!(column, vec![(0, 1.0), (1, 1.0)]);
        assert_eq!(mesh.boundary(1).unwrap().count_ones(..), 4);
        assert!(mesh.interior(1).unwrap().contains(shared));
    }

    #[test]
    fn boundary_of_hexagon() {
        let mesh = tiny_mesh_2d();

        assert_eq!(mesh.boundary(2).unwrap().count_ones(..), 0);
        assert_eq!(mesh.interior(2).unwrap().count_ones(..), 6);

        // outer edges of the hexagon
        let mut expected: Vec<usize> = [[0, 1], [0, 2], [1, 4], [2, 5], [4, 6], [5, 6]]
            .iter()
            .map(|e| mesh.find_simplex_index(1, e).unwrap().unwrap())
            .collect();
        expected.sort();
        let actual: Vec<usize> = mesh.boundary(1).unwrap().ones().collect();
        assert_eq!(actual, expected);

        // everything except the center vertex
        let center = mesh.find_simplex_index(0, &[3]).unwrap().unwrap();
        let interior: Vec<usize> = mesh.interior(0).unwrap().ones().collect();
        assert_eq!(interior, vec![center]);
        assert_eq!(mesh.boundary(0).unwrap().count_ones(..), 6);
    }

    #[test]
    fn periodic_chain_is_stitched() {
        let mesh = periodic_chain();
        assert_eq!(mesh.num_simplices(1).unwrap(), 3);
        assert_eq!(mesh.num_simplices(0).unwrap(), 3);
        // four raw vertices collapse onto three
        assert_eq!(mesh.unstitched(0).unwrap().len(), 4);
        let to_stitched = mesh.unstitched_to_stitched(0).unwrap();
        assert_eq!(to_stitched[0], to_stitched[3]);

        // a closed loop has no boundary
        assert_eq!(mesh.boundary(0).unwrap().count_ones(..), 0);
        assert_eq!(mesh.interior(0).unwrap().count_ones(..), 3);

        // the wrapping edge goes from vertex 2 back to vertex 0
        let wrap = mesh.find_simplex_index(1, &[2, 3]).unwrap().unwrap();
        let v0 = mesh.find_simplex_index(0, &[0]).unwrap().unwrap();
        let v2 = mesh.find_simplex_index(0, &[2]).unwrap().unwrap();
        let d0 = mesh.exterior_derivative(0).unwrap();
        let row = d0.row(wrap);
        let entry = |col: usize| {
            row.col_indices()
                .iter()
                .position(|&c| c == col)
                .map(|i| row.values()[i])
        };
        assert_eq!(entry(v0), Some(1.0));
        assert_eq!(entry(v2), Some(-1.0));
    }

    #[test]
    fn unstitched_faces_are_a_sorted_union() {
        let upper = vec![
            UnstitchedSimplex::new(vec![0, 1, 2]),
            UnstitchedSimplex::new(vec![1, 2, 3]),
        ];
        let faces: Vec<Vec<usize>> = aggregate_faces(&upper)
            .iter()
            .map(|f| f.vertices().to_vec())
            .collect();
        assert_eq!(
            faces,
            vec![vec![0, 1], vec![0, 2], vec![1, 2], vec![1, 3], vec![2, 3]]
        );
    }
}
