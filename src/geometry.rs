//! Geometric computations on single embedded simplices:
//! Gram-determinant volumes, circumcenters, barycentric gradients
//! and wedge products of covectors.
//!
//! All functions take the points of one simplex
//! together with the metric tensor sampled for that simplex.
//! The metric is applied as the bilinear form `u M v^H`,
//! which reduces to the usual `u M v^T` for real scalars.

use nalgebra as na;

/// Scalar type of every geometric quantity in a complex.
///
/// Implemented for `f64` and [`na::Complex<f64>`];
/// the latter allows complex-valued metric tensors.
pub trait DecScalar: na::ComplexField<RealField = f64> + Copy {}

impl<T> DecScalar for T where T: na::ComplexField<RealField = f64> + Copy {}

/// A point in the embedding space.
pub type Point<T> = na::DVector<T>;

/// Hadamard ratio `|det G| / prod |G_ii|` below which a simplex counts as flat.
///
/// The ratio is invariant under scaling individual edges,
/// so thin but valid simplices aren't mistaken for flat ones.
const DEGENERACY_TOLERANCE: f64 = 1e-13;

/// `n!` as an integer.
#[inline]
pub fn factorial(n: usize) -> usize {
    (1..=n).product()
}

/// Matrix whose rows are the edge vectors `p_i - p_0`, `i = 1..k`.
pub fn edge_matrix<T: DecScalar>(points: &[Point<T>]) -> na::DMatrix<T> {
    let embedding_dim = points.first().map_or(0, |p| p.len());
    let edge_count = points.len().saturating_sub(1);
    na::DMatrix::from_fn(edge_count, embedding_dim, |row, col| {
        points[row + 1][col] - points[0][col]
    })
}

/// The Gram matrix `V M V^H` of the edge vectors of a simplex.
pub fn gram_matrix<T: DecScalar>(points: &[Point<T>], metric: &na::DMatrix<T>) -> na::DMatrix<T> {
    let edges = edge_matrix(points);
    &edges * metric * edges.adjoint()
}

/// `sqrt(det(V M V^H))`, i.e. the volume of the parallelotope
/// spanned by the edges of the simplex.
///
/// A single point has the value 1 by convention,
/// and a numerically degenerate set of points has the value 0.
pub fn gram_determinant_root<T: DecScalar>(points: &[Point<T>], metric: &na::DMatrix<T>) -> T {
    if points.len() <= 1 {
        return T::one();
    }
    let gram = gram_matrix(points, metric);
    let det = gram.determinant();
    // rounding can push the determinant of a flat chain slightly below zero
    if is_flat_gram(&gram, det) {
        return T::zero();
    }
    det.sqrt()
}

/// Compare a Gram determinant against the product of the Gram diagonal,
/// which bounds it from above (Hadamard's inequality).
/// A zero-length edge makes the product vanish and always counts as flat.
fn is_flat_gram<T: DecScalar>(gram: &na::DMatrix<T>, det: T) -> bool {
    let diagonal_product: f64 = gram.diagonal().iter().map(|g| g.modulus()).product();
    diagonal_product == 0.0 || det.modulus() <= DEGENERACY_TOLERANCE * diagonal_product
}

/// Volume of a simplex, `sqrt(det(V M V^H)) / d!`.
pub fn simplex_volume<T: DecScalar>(points: &[Point<T>], metric: &na::DMatrix<T>) -> T {
    let dim = points.len().saturating_sub(1);
    gram_determinant_root(points, metric) / T::from_real(factorial(dim) as f64)
}

/// Whether the Gram matrix of a simplex is numerically singular.
pub fn is_degenerate<T: DecScalar>(points: &[Point<T>], metric: &na::DMatrix<T>) -> bool {
    if points.len() <= 1 {
        return false;
    }
    let gram = gram_matrix(points, metric);
    let det = gram.determinant();
    is_flat_gram(&gram, det)
}

/// Circumcenter of a simplex under the given metric.
///
/// Solves for the barycentric coordinates `l` of the circumcenter
/// from the linear system
/// `[2 P M P^T, 1; 1^T, 0] [l; mu] = [diag(P M P^T); 1]`
/// (see the PyDEC paper, <https://dl.acm.org/doi/pdf/10.1145/2382585.2382588>, section 10.1).
/// Returns `None` if the simplex is degenerate or the system is singular.
pub fn circumcenter<T: DecScalar>(
    points: &[Point<T>],
    metric: &na::DMatrix<T>,
) -> Option<Point<T>> {
    let point_count = points.len();
    if point_count == 1 {
        return Some(points[0].clone());
    }
    if is_degenerate(points, metric) {
        return None;
    }
    let embedding_dim = points.first()?.len();

    let point_mat = na::DMatrix::from_fn(point_count, embedding_dim, |row, col| points[row][col]);
    let inner = &point_mat * metric * point_mat.transpose();

    // dimension is point_count + 1 because there's an extra row
    // for normalizing the barycentric coordinates
    let system_dim = point_count + 1;
    let mut coef_mat = na::DMatrix::zeros(system_dim, system_dim);
    let mut rhs = na::DVector::zeros(system_dim);
    for row in 0..point_count {
        for col in 0..point_count {
            coef_mat[(row, col)] = T::from_real(2.0) * inner[(row, col)];
        }
        coef_mat[(row, point_count)] = T::one();
        coef_mat[(point_count, row)] = T::one();
        rhs[row] = inner[(row, row)];
    }
    rhs[point_count] = T::one();

    let bary = coef_mat.lu().solve(&rhs)?;
    if bary.iter().any(|b| !b.is_finite()) {
        return None;
    }

    let mut center = Point::zeros(embedding_dim);
    for (weight, point) in bary.iter().zip(points) {
        center += point * *weight;
    }
    Some(center)
}

/// Gradients of the barycentric coordinate functions of a simplex,
/// one per vertex.
///
/// The gradients of vertices `1..=d` are the rows of `(V M V^H)^-1 (V M)`,
/// and the gradient of vertex 0 is the negated sum of the others,
/// so that the gradients always sum to zero.
/// Returns `None` if the Gram matrix isn't invertible.
pub fn barycentric_gradients<T: DecScalar>(
    points: &[Point<T>],
    metric: &na::DMatrix<T>,
) -> Option<Vec<Point<T>>> {
    let embedding_dim = points.first()?.len();
    if points.len() == 1 {
        // the only barycentric coordinate of a point is constant
        return Some(vec![Point::zeros(embedding_dim)]);
    }
    if is_degenerate(points, metric) {
        return None;
    }
    let edges = edge_matrix(points);
    let edges_metric = &edges * metric;
    let gram = &edges_metric * edges.adjoint();
    let gram_inv = gram.try_inverse()?;
    let grad_mat = gram_inv * edges_metric;

    let mut grads = Vec::with_capacity(points.len());
    let mut first = Point::zeros(embedding_dim);
    for row in grad_mat.row_iter() {
        first -= row.transpose();
    }
    grads.push(first);
    grads.extend(grad_mat.row_iter().map(|row| row.transpose()));
    Some(grads)
}

/// Wedge product of `k` covectors as a full antisymmetric tensor.
///
/// The result has `embedding_dim^k` components in row-major multi-index order
/// (the last index varies fastest), with the component at `(j_1, ..., j_k)`
/// being `det[v_a[j_b]]`. The empty wedge product is the scalar 1.
pub fn wedge<T: DecScalar>(vectors: &[Point<T>], embedding_dim: usize) -> Vec<T> {
    let k = vectors.len();
    if k == 0 {
        return vec![T::one()];
    }
    let component_count = embedding_dim.pow(k as u32);
    let mut components = Vec::with_capacity(component_count);
    let mut multi_index = vec![0; k];
    for flat in 0..component_count {
        // decompose the flat index into the multi-index, last index fastest
        let mut rem = flat;
        for slot in multi_index.iter_mut().rev() {
            *slot = rem % embedding_dim;
            rem /= embedding_dim;
        }

        let has_repeat = (1..k).any(|i| multi_index[..i].contains(&multi_index[i]));
        if has_repeat {
            components.push(T::zero());
            continue;
        }
        let minor = na::DMatrix::from_fn(k, k, |a, b| vectors[a][multi_index[b]]);
        components.push(minor.determinant());
    }
    components
}
