//! Metric fields sampled per simplex.
//!
//! Every simplex gets a single metric tensor,
//! obtained by sampling a [`MetricField`] over the simplex's points.

use nalgebra as na;

use crate::{
    geometry::{DecScalar, Point},
    DecError,
};

/// A (possibly position-dependent, possibly complex-valued)
/// metric tensor field on the embedding space.
pub trait MetricField<T: DecScalar>: Send + Sync {
    /// Size of the square tensors produced by this field,
    /// or `None` if it adapts to any embedding dimension.
    fn dim(&self) -> Option<usize>;

    /// Produce the metric tensor for the simplex spanned by `points`.
    ///
    /// `subdivisions` is the refinement factor
    /// controlling how densely the simplex is sampled.
    fn sample(&self, points: &[Point<T>], subdivisions: usize) -> Result<na::DMatrix<T>, DecError>;
}

/// Check that a metric tensor is a `dim x dim` matrix.
pub(crate) fn check_shape<T: DecScalar>(tensor: &na::DMatrix<T>, dim: usize) -> Result<(), DecError> {
    if tensor.shape() != (dim, dim) {
        return Err(DecError::InvalidInput(format!(
            "metric tensor of shape {}x{} where {dim}x{dim} was expected",
            tensor.nrows(),
            tensor.ncols()
        )));
    }
    Ok(())
}

/// The standard Euclidean metric, i.e. the identity tensor.
#[derive(Clone, Copy, Debug, Default)]
pub struct Euclidean;

impl<T: DecScalar> MetricField<T> for Euclidean {
    fn dim(&self) -> Option<usize> {
        None
    }

    fn sample(&self, points: &[Point<T>], _subdivisions: usize) -> Result<na::DMatrix<T>, DecError> {
        let dim = points.first().map_or(0, |p| p.len());
        Ok(na::DMatrix::identity(dim, dim))
    }
}

/// A metric with the same tensor everywhere.
#[derive(Clone, Debug)]
pub struct ConstantMetric<T: DecScalar>(pub na::DMatrix<T>);

impl<T: DecScalar> MetricField<T> for ConstantMetric<T> {
    fn dim(&self) -> Option<usize> {
        Some(self.0.nrows())
    }

    fn sample(&self, _points: &[Point<T>], _subdivisions: usize) -> Result<na::DMatrix<T>, DecError> {
        check_shape(&self.0, self.0.nrows())?;
        Ok(self.0.clone())
    }
}

/// A metric defined pointwise by a function.
///
/// The tensor of a simplex is the average of the function
/// over the points of the uniform barycentric lattice
/// with `subdivisions` steps along each edge.
/// With one subdivision, this is the average over the vertices.
pub struct FnMetric<F> {
    dim: usize,
    f: F,
}

impl<F> FnMetric<F> {
    /// Wrap a function producing `dim x dim` tensors.
    ///
    /// Tensors of any other shape make sampling fail with [`DecError::InvalidInput`].
    pub fn new(dim: usize, f: F) -> Self {
        Self { dim, f }
    }
}

impl<F> std::fmt::Debug for FnMetric<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FnMetric {{ dim: {} }}", self.dim)
    }
}

impl<T, F> MetricField<T> for FnMetric<F>
where
    T: DecScalar,
    F: Fn(&Point<T>) -> na::DMatrix<T> + Send + Sync,
{
    fn dim(&self) -> Option<usize> {
        Some(self.dim)
    }

    fn sample(&self, points: &[Point<T>], subdivisions: usize) -> Result<na::DMatrix<T>, DecError> {
        let subdivisions = subdivisions.max(1);
        let lattice = lattice_weights(points.len(), subdivisions);
        let mut sum = na::DMatrix::zeros(self.dim, self.dim);
        let mut sample_point = Point::zeros(points.first().map_or(0, |p| p.len()));
        for weights in &lattice {
            sample_point.fill(T::zero());
            for (&w, p) in weights.iter().zip(points) {
                sample_point += p * T::from_real(w as f64 / subdivisions as f64);
            }
            let tensor = (self.f)(&sample_point);
            check_shape(&tensor, self.dim)?;
            sum += tensor;
        }
        Ok(sum / T::from_real(lattice.len() as f64))
    }
}

/// All ways of writing `total` as an ordered sum of `parts` nonnegative integers,
/// i.e. the barycentric lattice points of a simplex with `parts` vertices
/// scaled by `total`.
fn lattice_weights(parts: usize, total: usize) -> Vec<Vec<usize>> {
    match parts {
        0 => Vec::new(),
        1 => vec![vec![total]],
        _ => (0..=total)
            .flat_map(|first| {
                lattice_weights(parts - 1, total - first)
                    .into_iter()
                    .map(move |mut rest| {
                        rest.insert(0, first);
                        rest
                    })
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lattice_has_binomial_size() {
        // C(s + k, k) points for k + 1 vertices
        assert_eq!(lattice_weights(3, 1).len(), 3);
        assert_eq!(lattice_weights(3, 2).len(), 6);
        assert_eq!(lattice_weights(4, 3).len(), 20);
        assert!(lattice_weights(3, 2).iter().all(|w| w.iter().sum::<usize>() == 2));
    }

    #[test]
    fn fn_metric_averages_over_lattice() {
        // tensor depending linearly on x; the lattice average of a linear function
        // equals its value at the barycenter
        let metric = FnMetric::new(2, |p: &Point<f64>| {
            na::DMatrix::from_diagonal_element(2, 2, 1.0 + p[0])
        });
        let points = vec![
            Point::from_column_slice(&[0.0, 0.0]),
            Point::from_column_slice(&[3.0, 0.0]),
            Point::from_column_slice(&[0.0, 3.0]),
        ];
        for subdivisions in 1..4 {
            let m = metric.sample(&points, subdivisions).unwrap();
            assert_relative_eq!(m[(0, 0)], 2.0, epsilon = 1e-12);
            assert_relative_eq!(m[(0, 1)], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn euclidean_adapts_to_dimension() {
        let points = vec![Point::<f64>::zeros(3)];
        assert_eq!(Euclidean.sample(&points, 1).unwrap(), na::DMatrix::identity(3, 3));
        assert_eq!(MetricField::<f64>::dim(&Euclidean), None);
    }

    #[test]
    fn misshapen_tensors_are_rejected() {
        let points = vec![
            Point::from_column_slice(&[0.0, 0.0]),
            Point::from_column_slice(&[1.0, 0.0]),
        ];
        let rectangular = ConstantMetric(na::DMatrix::<f64>::identity(2, 3));
        assert!(matches!(
            rectangular.sample(&points, 1),
            Err(DecError::InvalidInput(_))
        ));

        // only wrong away from the origin
        let metric = FnMetric::new(2, |p: &Point<f64>| {
            let dim = if p[0] > 0.5 { 3 } else { 2 };
            na::DMatrix::identity(dim, dim)
        });
        assert!(metric.sample(&points[..1], 1).is_ok());
        assert!(matches!(
            metric.sample(&points, 1),
            Err(DecError::InvalidInput(_))
        ));
    }
}
