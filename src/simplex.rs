//! Keys identifying simplices before and after vertex identification.
//!
//! A simplex is known under two different keys:
//! the [`UnstitchedSimplex`] is the ordered tuple of raw input vertex indices
//! and is used to look up geometry,
//! whereas the [`StitchedSimplex`] is the set of canonical vertex indices
//! after identification and is used as the topological identity.
//! Many unstitched simplices can collapse onto the same stitched one.

use itertools::Itertools;

/// An ordered tuple of raw (pre-identification) vertex indices.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnstitchedSimplex(Vec<usize>);

impl UnstitchedSimplex {
    /// Wrap a tuple of raw vertex indices, keeping the given order.
    #[inline]
    pub fn new(vertices: Vec<usize>) -> Self {
        Self(vertices)
    }

    /// The raw vertex indices in their stored order.
    #[inline]
    pub fn vertices(&self) -> &[usize] {
        &self.0
    }

    /// Dimension of the simplex (one less than the number of vertices).
    #[inline]
    pub fn dim(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// Iterate over the faces obtained by deleting one vertex at a time,
    /// in deletion position order, along with the deleted position.
    pub fn faces(&self) -> impl '_ + Iterator<Item = (usize, UnstitchedSimplex)> {
        (0..self.0.len()).map(|j| (j, Self(remove_position(&self.0, j))))
    }
}

/// The set of canonical (post-identification) vertex indices of a simplex.
///
/// Stored sorted and deduplicated so that equality is set equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StitchedSimplex(Vec<usize>);

impl StitchedSimplex {
    /// Build the set from canonical vertex indices in any order.
    pub fn from_vertices(vertices: impl IntoIterator<Item = usize>) -> Self {
        Self(vertices.into_iter().sorted_unstable().dedup().collect())
    }

    /// The vertex set in ascending order.
    #[inline]
    pub fn vertices(&self) -> &[usize] {
        &self.0
    }
}

/// Copy a vertex tuple with the element at `position` deleted.
pub(crate) fn remove_position(vertices: &[usize], position: usize) -> Vec<usize> {
    vertices
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != position)
        .map(|(_, v)| *v)
        .collect()
}

/// Sign of the permutation taking `reference` to `tuple`,
/// when both contain the same vertices.
/// Returns 1 if even, -1 if odd.
///
/// Tuples with repeated vertices (degenerate after identification)
/// have no well-defined orientation and get 1.
pub(crate) fn relative_parity(tuple: &[usize], reference: &[usize]) -> i8 {
    if tuple == reference {
        return 1;
    }
    // map the tuple to positions in the reference
    // and count inversions. we work in low dimensions,
    // so the quadratic loops are fine
    let positions: Option<Vec<usize>> = tuple
        .iter()
        .map(|v| reference.iter().position(|r| r == v))
        .collect();
    let Some(positions) = positions else {
        return 1;
    };
    if positions.iter().duplicates().next().is_some() {
        return 1;
    }

    let inversions = positions
        .iter()
        .tuple_combinations()
        .filter(|(a, b)| a > b)
        .count();

    if inversions % 2 == 0 {
        1
    } else {
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faces_delete_in_position_order() {
        let s = UnstitchedSimplex::new(vec![4, 1, 7]);
        let faces: Vec<(usize, Vec<usize>)> = s
            .faces()
            .map(|(j, f)| (j, f.vertices().to_vec()))
            .collect();
        assert_eq!(faces, vec![(0, vec![1, 7]), (1, vec![4, 7]), (2, vec![4, 1])]);
        assert_eq!(s.dim(), 2);
    }

    #[test]
    fn stitched_simplex_is_a_set() {
        let a = StitchedSimplex::from_vertices([3, 0, 2]);
        let b = StitchedSimplex::from_vertices([2, 3, 0]);
        assert_eq!(a, b);
        assert_eq!(a.vertices(), &[0, 2, 3]);
        assert_eq!(StitchedSimplex::from_vertices([1, 1]).vertices(), &[1]);
    }

    #[test]
    fn parity_of_permutations() {
        assert_eq!(relative_parity(&[0, 1, 2], &[0, 1, 2]), 1);
        assert_eq!(relative_parity(&[1, 0, 2], &[0, 1, 2]), -1);
        assert_eq!(relative_parity(&[1, 2, 0], &[0, 1, 2]), 1);
        assert_eq!(relative_parity(&[2, 9], &[9, 2]), -1);
        assert_eq!(relative_parity(&[5, 5], &[5, 3]), 1);
    }
}
