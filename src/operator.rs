//! Operators built from the skeleta of a complex:
//! Hodge stars, codifferentials, Laplacians and the sharp operator.
//!
//! Every operator is an [`nas::CsrMatrix`] mapping cochains
//! (vectors indexed by stitched simplex index) to cochains,
//! computed once and cached on the skeleton it maps from.

use itertools::Itertools;
use nalgebra_sparse as nas;
use rayon::prelude::*;

use crate::{
    geometry::{self, DecScalar, Point},
    simplex::{relative_parity, StitchedSimplex},
    DecError, SimplicialComplex,
};

/// Build a CSR matrix with the given diagonal.
fn diagonal_matrix<T: DecScalar>(diagonal: impl ExactSizeIterator<Item = T>) -> nas::CsrMatrix<T> {
    // nalgebra doesn't have a method to construct CSR directly from a diagonal.
    // construct an identity matrix to get the right sparsity pattern
    // and then replace the entries
    let mut csr = nas::CsrMatrix::identity(diagonal.len());
    for (diag, mat_diag) in diagonal.zip(csr.values_mut()) {
        *mat_diag = diag;
    }
    csr
}

impl<T: DecScalar> SimplicialComplex<T> {
    /// The diagonal Hodge star on `dim`-cochains,
    /// with entries `dual_volume / primal_volume`.
    pub fn star(&self, dim: usize) -> Result<&nas::CsrMatrix<T>, DecError> {
        let skeleton = self.skeleton(dim)?;
        skeleton.star.get_or_try_init(|| {
            let primal = self.primal_volumes(dim)?;
            let dual = self.dual_volumes(dim)?;
            tracing::debug!(dim, size = primal.len(), "computed Hodge star");
            Ok(diagonal_matrix(
                primal.iter().zip(dual.iter()).map(|(&p, &d)| d / p),
            ))
        })
    }

    /// The inverse of the diagonal Hodge star,
    /// with entries `primal_volume / dual_volume`.
    ///
    /// Dual cells of zero volume give infinite entries.
    pub fn inverse_star(&self, dim: usize) -> Result<&nas::CsrMatrix<T>, DecError> {
        let skeleton = self.skeleton(dim)?;
        skeleton.inverse_star.get_or_try_init(|| {
            let star = self.star(dim)?;
            Ok(diagonal_matrix(star.values().iter().map(|&s| T::one() / s)))
        })
    }

    /// The codifferential taking `dim`-cochains to `dim - 1`-cochains,
    /// `(-1)^dim * inverse_star(dim - 1) * exterior_derivative(dim - 1)^T * star(dim)`.
    ///
    /// There is nothing below vertices,
    /// so at dimension 0 this is a zero matrix with a single row.
    pub fn codifferential(&self, dim: usize) -> Result<&nas::CsrMatrix<T>, DecError> {
        let skeleton = self.skeleton(dim)?;
        skeleton.codifferential.get_or_try_init(|| {
            let simplex_count = self.num_simplices(dim)?;
            if dim == 0 {
                return Ok(nas::CsrMatrix::zeros(1, simplex_count));
            }

            let lower_inverse_star = self.inverse_star(dim - 1)?;
            let lower_d = self.exterior_derivative(dim - 1)?;
            let star = self.star(dim)?;

            let adjoint_d: nas::CsrMatrix<T> = lower_inverse_star * &lower_d.transpose();
            let mut codiff: nas::CsrMatrix<T> = &adjoint_d * star;
            if dim % 2 == 1 {
                for val in codiff.values_mut() {
                    *val = -*val;
                }
            }
            tracing::debug!(dim, nnz = codiff.nnz(), "computed codifferential");
            Ok(codiff)
        })
    }

    /// The Laplace-Beltrami operator `codifferential(dim + 1) * exterior_derivative(dim)`
    /// on `dim`-cochains.
    ///
    /// This is a zero matrix at the top dimension.
    pub fn laplace_beltrami(&self, dim: usize) -> Result<&nas::CsrMatrix<T>, DecError> {
        let skeleton = self.skeleton(dim)?;
        skeleton.laplace_beltrami.get_or_try_init(|| {
            let simplex_count = self.num_simplices(dim)?;
            if dim == self.complex_dimension() {
                return Ok(nas::CsrMatrix::zeros(simplex_count, simplex_count));
            }
            let d = self.exterior_derivative(dim)?;
            let upper_codiff = self.codifferential(dim + 1)?;
            let laplacian: nas::CsrMatrix<T> = upper_codiff * d;
            tracing::debug!(dim, nnz = laplacian.nnz(), "computed Laplace-Beltrami operator");
            Ok(laplacian)
        })
    }

    /// The Laplace-de Rham (Hodge) operator on `dim`-cochains,
    /// `laplace_beltrami(dim) + exterior_derivative(dim - 1) * codifferential(dim)`.
    ///
    /// At dimension 0 the second term vanishes and this equals the Laplace-Beltrami operator.
    pub fn laplace_derham(&self, dim: usize) -> Result<&nas::CsrMatrix<T>, DecError> {
        let skeleton = self.skeleton(dim)?;
        skeleton.laplace_derham.get_or_try_init(|| {
            let beltrami = self.laplace_beltrami(dim)?;
            if dim == 0 {
                return Ok(beltrami.clone());
            }
            let lower_d = self.exterior_derivative(dim - 1)?;
            let codiff = self.codifferential(dim)?;
            let second_term: nas::CsrMatrix<T> = lower_d * codiff;
            let laplacian: nas::CsrMatrix<T> = beltrami + &second_term;
            tracing::debug!(dim, nnz = laplacian.nnz(), "computed Laplace-de Rham operator");
            Ok(laplacian)
        })
    }

    /// The sharp operator reconstructing a vector-valued field
    /// from a `dim`-cochain.
    ///
    /// The cochain is interpolated with Whitney forms
    /// and evaluated at the barycenter of every top-dimensional simplex.
    /// The value on each top simplex is a `dim`-form given as
    /// a full antisymmetric tensor with `embedding_dimension^dim` components
    /// (see [`geometry::wedge`]),
    /// so the matrix has `embedding_dimension^dim` rows per top simplex,
    /// stored consecutively in top simplex order.
    ///
    /// At dimension 0 every row averages the values at the vertices of its simplex.
    pub fn sharp(&self, dim: usize) -> Result<&nas::CsrMatrix<T>, DecError> {
        let skeleton = self.skeleton(dim)?;
        skeleton.sharp.get_or_try_init(|| {
            let top_dim = self.complex_dimension();
            let embedding_dim = self.embedding_dimension();
            let components = embedding_dim.pow(dim as u32);

            let top = self.topology(top_dim)?;
            let faces = self.topology(dim)?;
            let gradients = self.barycentric_gradients()?;

            // Whitney form of a face at the barycenter, where every λ = 1 / (n + 1):
            // d! / (n + 1) * Σ_k (-1)^k dλ_0 ∧ .. (skip k) .. ∧ dλ_d
            let weight = T::from_real(geometry::factorial(dim) as f64 / (top_dim + 1) as f64);
            let subsets: Vec<Vec<usize>> = (0..=top_dim).combinations(dim + 1).collect();

            let entries: Vec<Vec<(usize, usize, T)>> = top
                .simplices
                .par_iter()
                .zip(gradients.par_iter())
                .enumerate()
                .map(|(top_idx, (top_simplex, grads))| -> Result<_, DecError> {
                    let mut entries = Vec::new();
                    let mut form = vec![T::zero(); components];
                    for subset in &subsets {
                        let face: Vec<usize> = subset.iter().map(|&pos| top_simplex[pos]).collect();
                        let key = StitchedSimplex::from_vertices(face.iter().copied());
                        let col = faces.index.get_index_of(&key).ok_or_else(|| {
                            DecError::InvalidInput(format!(
                                "face {face:?} of top simplex {top_idx} is missing from the {dim}-skeleton"
                            ))
                        })?;
                        let orientation = relative_parity(&face, &faces.simplices[col]);

                        form.iter_mut().for_each(|c| *c = T::zero());
                        for skip in 0..subset.len() {
                            let wedge_factors: Vec<Point<T>> = subset
                                .iter()
                                .enumerate()
                                .filter(|(k, _)| *k != skip)
                                .map(|(_, &pos)| grads[pos].clone())
                                .collect();
                            let sign = if skip % 2 == 0 { orientation } else { -orientation };
                            let sign = T::from_real(sign as f64);
                            for (acc, val) in
                                form.iter_mut().zip(geometry::wedge(&wedge_factors, embedding_dim))
                            {
                                *acc += val * sign;
                            }
                        }

                        for (component, &val) in form.iter().enumerate() {
                            if val != T::zero() {
                                entries.push((top_idx * components + component, col, val * weight));
                            }
                        }
                    }
                    Ok(entries)
                })
                .collect::<Result<_, DecError>>()?;

            let mut coo =
                nas::CooMatrix::new(top.simplices.len() * components, faces.simplices.len());
            for (row, col, val) in entries.into_iter().flatten() {
                coo.push(row, col, val);
            }
            let sharp = nas::CsrMatrix::from(&coo);
            tracing::debug!(dim, nnz = sharp.nnz(), "computed sharp operator");
            Ok(sharp)
        })
    }
}

//
// tests
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simplicial_complex::{periodic_chain, single_triangle, tiny_mesh_2d, tiny_mesh_3d};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra as na;

    fn diagonal(mat: &nas::CsrMatrix<f64>) -> Vec<f64> {
        (0..mat.nrows())
            .map(|i| mat.get_entry(i, i).map_or(0.0, |e| e.into_value()))
            .collect()
    }

    fn dense(mat: &nas::CsrMatrix<f64>) -> na::DMatrix<f64> {
        na::DMatrix::from(mat)
    }

    /// Values of a per-vertex function as a 0-cochain.
    fn vertex_cochain(
        mesh: &SimplicialComplex,
        f: impl Fn(&na::DVector<f64>) -> f64,
    ) -> na::DVector<f64> {
        let vertices = mesh.simplices(0).unwrap();
        na::DVector::from_iterator(
            vertices.len(),
            vertices.iter().map(|v| f(&mesh.vertices()[v[0]])),
        )
    }

    #[test]
    fn star_of_single_triangle() {
        let mesh = single_triangle();
        assert_eq!(diagonal(mesh.star(2).unwrap()), vec![2.0]);

        let star_0 = diagonal(mesh.star(0).unwrap());
        let vertex_0 = mesh.find_simplex_index(0, &[0]).unwrap().unwrap();
        for (idx, val) in star_0.iter().enumerate() {
            let expected = if idx == vertex_0 { 0.25 } else { 0.125 };
            assert_relative_eq!(*val, expected, epsilon = 1e-12);
        }

        let star_1 = mesh.star(1).unwrap();
        let inv_1 = mesh.inverse_star(1).unwrap();
        // the hypotenuse has a degenerate dual edge
        let hypotenuse = mesh.find_simplex_index(1, &[1, 2]).unwrap().unwrap();
        assert_abs_diff_eq!(diagonal(star_1)[hypotenuse], 0.0, epsilon = 1e-12);
        for (idx, (s, inv)) in diagonal(star_1).iter().zip(diagonal(inv_1)).enumerate() {
            if idx != hypotenuse {
                assert_relative_eq!(s * inv, 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn star_is_positive_on_well_centered_meshes() {
        for mesh in [tiny_mesh_2d(), tiny_mesh_3d()] {
            for dim in 0..=mesh.complex_dimension() {
                let star = mesh.star(dim).unwrap();
                assert_eq!(star.nnz(), mesh.num_simplices(dim).unwrap());
                assert!(star.values().iter().all(|&v| v > 0.0));
            }
        }
    }

    #[test]
    fn codifferential_shapes_and_signs() {
        let mesh = tiny_mesh_2d();
        let n: Vec<usize> = (0..=2).map(|d| mesh.num_simplices(d).unwrap()).collect();

        let codiff_0 = mesh.codifferential(0).unwrap();
        assert_eq!((codiff_0.nrows(), codiff_0.ncols()), (1, n[0]));
        assert_eq!(codiff_0.nnz(), 0);

        let codiff_1 = mesh.codifferential(1).unwrap();
        assert_eq!((codiff_1.nrows(), codiff_1.ncols()), (n[0], n[1]));
        // odd dimension, so star_0 * codiff_1 = -d_0^T * star_1
        let lhs = dense(mesh.star(0).unwrap()) * dense(codiff_1);
        let rhs = -dense(mesh.exterior_derivative(0).unwrap()).transpose()
            * dense(mesh.star(1).unwrap());
        assert_relative_eq!(lhs, rhs, epsilon = 1e-12);

        let codiff_2 = mesh.codifferential(2).unwrap();
        assert_eq!((codiff_2.nrows(), codiff_2.ncols()), (n[1], n[2]));
        let lhs = dense(mesh.star(1).unwrap()) * dense(codiff_2);
        let rhs =
            dense(mesh.exterior_derivative(1).unwrap()).transpose() * dense(mesh.star(2).unwrap());
        assert_relative_eq!(lhs, rhs, epsilon = 1e-12);

        // codifferential applied twice is zero like the exterior derivative
        let twice = dense(codiff_1) * dense(codiff_2);
        assert_abs_diff_eq!(twice, na::DMatrix::zeros(n[0], n[2]), epsilon = 1e-12);
    }

    #[test]
    fn laplacians_of_hexagon() {
        let mesh = tiny_mesh_2d();
        let n0 = mesh.num_simplices(0).unwrap();

        let lb_0 = mesh.laplace_beltrami(0).unwrap();
        assert_eq!((lb_0.nrows(), lb_0.ncols()), (n0, n0));
        assert_eq!(mesh.laplace_derham(0).unwrap(), lb_0);

        // constants are in the kernel
        let ones = na::DVector::from_element(n0, 1.0);
        assert_abs_diff_eq!(lb_0 * &ones, na::DVector::zeros(n0), epsilon = 1e-12);

        // linear functions are harmonic at the interior vertex
        let center = mesh.find_simplex_index(0, &[3]).unwrap().unwrap();
        for coord in 0..2 {
            let linear = vertex_cochain(&mesh, |p| p[coord]);
            let lap = lb_0 * &linear;
            assert_abs_diff_eq!(lap[center], 0.0, epsilon = 1e-12);
        }

        // nothing above the top dimension
        let n2 = mesh.num_simplices(2).unwrap();
        let lb_2 = mesh.laplace_beltrami(2).unwrap();
        assert_eq!((lb_2.nrows(), lb_2.ncols(), lb_2.nnz()), (n2, n2, 0));
        let ld_2 = mesh.laplace_derham(2).unwrap();
        let expected =
            dense(mesh.exterior_derivative(1).unwrap()) * dense(mesh.codifferential(2).unwrap());
        assert_relative_eq!(dense(ld_2), expected, epsilon = 1e-12);

        // both terms contribute in the middle
        let ld_1 = dense(mesh.laplace_derham(1).unwrap());
        let sum = dense(mesh.laplace_beltrami(1).unwrap())
            + dense(mesh.exterior_derivative(0).unwrap()) * dense(mesh.codifferential(1).unwrap());
        assert_relative_eq!(ld_1, sum, epsilon = 1e-12);
    }

    #[test]
    fn periodic_laplacian_is_the_discrete_second_derivative() {
        let mesh = periodic_chain();
        let lb_0 = dense(mesh.laplace_beltrami(0).unwrap());
        // unit spacing on a loop: -(2u_i - u_{i-1} - u_{i+1})
        for row in 0..3 {
            assert_relative_eq!(lb_0[(row, row)], -2.0, epsilon = 1e-12);
            for col in (0..3).filter(|&c| c != row) {
                assert_relative_eq!(lb_0[(row, col)], 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn sharp_of_vertex_values_averages() {
        let mesh = tiny_mesh_2d();
        let sharp_0 = mesh.sharp(0).unwrap();
        assert_eq!((sharp_0.nrows(), sharp_0.ncols()), (6, 7));
        assert_eq!(sharp_0.nnz(), 18);
        assert!(sharp_0.values().iter().all(|&v| (v - 1.0 / 3.0).abs() < 1e-12));

        // each row picks out the vertices of its triangle
        let top = mesh.simplices(2).unwrap();
        for (row, triangle) in top.iter().enumerate() {
            let mut cols: Vec<usize> = sharp_0.row(row).col_indices().to_vec();
            cols.sort();
            let mut expected: Vec<usize> = triangle
                .iter()
                .map(|&v| mesh.find_simplex_index(0, &[v]).unwrap().unwrap())
                .collect();
            expected.sort();
            assert_eq!(cols, expected);
        }
    }

    #[test]
    fn sharp_reproduces_constant_one_forms() {
        for mesh in [tiny_mesh_2d(), tiny_mesh_3d()] {
            let edim = mesh.embedding_dimension();
            let top_count = mesh.num_simplices(mesh.complex_dimension()).unwrap();
            let sharp_1 = mesh.sharp(1).unwrap();
            assert_eq!(sharp_1.nrows(), top_count * edim);

            // integrals of dx_i over the edges are differences of coordinates
            for coord in 0..edim {
                let coords = vertex_cochain(&mesh, |p| p[coord]);
                let one_form = mesh.exterior_derivative(0).unwrap() * &coords;
                let field = sharp_1 * &one_form;
                for top_idx in 0..top_count {
                    for c in 0..edim {
                        let expected = if c == coord { 1.0 } else { 0.0 };
                        assert_abs_diff_eq!(field[top_idx * edim + c], expected, epsilon = 1e-12);
                    }
                }
            }
        }
    }

    #[test]
    fn sharp_of_area_form() {
        let mesh = single_triangle();
        let sharp_2 = mesh.sharp(2).unwrap();
        assert_eq!((sharp_2.nrows(), sharp_2.ncols()), (4, 1));
        let area = na::DVector::from_element(1, 0.5);
        let form = sharp_2 * &area;
        // dx ∧ dy as an antisymmetric tensor
        let expected = na::DVector::from_column_slice(&[0.0, 1.0, -1.0, 0.0]);
        assert_abs_diff_eq!(form, expected, epsilon = 1e-12);
    }

    #[test]
    fn sharp_reproduces_constant_two_forms_in_3d() {
        let mesh = tiny_mesh_3d();
        let top_count = mesh.num_simplices(3).unwrap();
        let sharp_2 = mesh.sharp(2).unwrap();
        assert_eq!(sharp_2.nrows(), top_count * 9);

        for (a, b) in [(0, 1), (0, 2), (1, 2)] {
            // integral of dx_a ∧ dx_b over each triangle is its signed projected area
            let values = mesh.simplices(2).unwrap().iter().map(|tri| {
                let [p, q, r] = [0, 1, 2].map(|i| &mesh.vertices()[tri[i]]);
                let (u, v) = (q - p, r - p);
                0.5 * (u[a] * v[b] - u[b] * v[a])
            });
            let two_form = na::DVector::from_iterator(mesh.num_simplices(2).unwrap(), values);
            let field = sharp_2 * &two_form;
            for top_idx in 0..top_count {
                for i in 0..3 {
                    for j in 0..3 {
                        let expected = if (i, j) == (a, b) {
                            1.0
                        } else if (i, j) == (b, a) {
                            -1.0
                        } else {
                            0.0
                        };
                        assert_abs_diff_eq!(field[top_idx * 9 + i * 3 + j], expected, epsilon = 1e-12);
                    }
                }
            }
        }
    }

    #[test]
    fn operators_are_cached() {
        let mesh = tiny_mesh_2d();
        let first = mesh.laplace_derham(1).unwrap() as *const _;
        let second = mesh.laplace_derham(1).unwrap() as *const _;
        assert_eq!(first, second);
    }
}
