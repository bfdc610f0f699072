//! Cochains, i.e. values assigned to the simplices of one dimension of a complex.

use nalgebra as na;

use crate::geometry::DecScalar;

/// A vector of values corresponding to
/// the set of `dim`-simplices of a complex, indexed by stitched index.
///
/// Cochains can be constructed using
/// [`SimplicialComplex::new_zero_cochain`][crate::SimplicialComplex::new_zero_cochain]
/// and differentiated with [`SimplicialComplex::d`][crate::SimplicialComplex::d].
#[derive(Clone, PartialEq)]
pub struct Cochain<T: DecScalar> {
    /// Dimension of the simplices the values live on.
    pub dim: usize,
    /// The underlying vector of values, exposed for convenience.
    ///
    /// Changing the length of this vector
    /// will cause a dimension mismatch with operators.
    pub values: na::DVector<T>,
}

impl<T: DecScalar> Cochain<T> {
    // constructors only exposed to crate
    // because cochains are always based on a complex

    #[inline]
    pub(crate) fn from_values(dim: usize, values: na::DVector<T>) -> Self {
        Self { dim, values }
    }

    #[inline]
    pub(crate) fn zeros(dim: usize, len: usize) -> Self {
        Self::from_values(dim, na::DVector::zeros(len))
    }
}

//
// std trait impls for math ops and such
//

impl<T: DecScalar> std::fmt::Debug for Cochain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-cochain, values {:?}", self.dim, self.values.as_slice())
    }
}

impl<T: DecScalar> std::ops::Add for Cochain<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        debug_assert_eq!(self.dim, rhs.dim, "added cochains of different dimensions");
        Cochain::from_values(self.dim, self.values + rhs.values)
    }
}

impl<T: DecScalar> std::ops::AddAssign for Cochain<T> {
    fn add_assign(&mut self, rhs: Self) {
        debug_assert_eq!(self.dim, rhs.dim, "added cochains of different dimensions");
        self.values += rhs.values;
    }
}

impl<T: DecScalar> std::ops::Mul<T> for Cochain<T> {
    type Output = Self;

    fn mul(self, rhs: T) -> Self::Output {
        Cochain::from_values(self.dim, self.values * rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_keeps_dimension() {
        let mut a = Cochain::<f64>::from_values(1, na::DVector::from_vec(vec![1.0, 2.0]));
        let b = Cochain::from_values(1, na::DVector::from_vec(vec![0.5, -1.0]));
        a += b.clone();
        assert_eq!(a.values.as_slice(), &[1.5, 1.0]);
        let c = (a + b) * 2.0;
        assert_eq!(c.dim, 1);
        assert_eq!(c.values.as_slice(), &[4.0, 0.0]);
        assert_eq!(format!("{:?}", Cochain::<f64>::zeros(2, 1)), "2-cochain, values [0.0]");
    }
}
