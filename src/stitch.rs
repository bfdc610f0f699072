//! Vertex identification ("stitching"), e.g. for periodic boundaries.

use std::collections::HashMap;

/// A map identifying vertex indices with other vertex indices.
///
/// Chains are allowed: if `a -> b` and `b -> c`, then `a` resolves to `c`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stitches {
    map: HashMap<usize, usize>,
}

impl Stitches {
    /// An empty identification map (every vertex is its own representative).
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identify vertex `from` with vertex `to`.
    #[inline]
    pub fn insert(&mut self, from: usize, to: usize) {
        self.map.insert(from, to);
    }

    /// Number of identifications in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map contains no identifications.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over the raw `(from, to)` pairs.
    pub fn iter(&self) -> impl '_ + Iterator<Item = (usize, usize)> {
        self.map.iter().map(|(&from, &to)| (from, to))
    }

    /// Follow identification chains from `vertex` to a fixed point
    /// and return the canonical representative.
    ///
    /// A cyclic chain resolves to the smallest index on the cycle.
    pub fn resolve(&self, vertex: usize) -> usize {
        if self.map.is_empty() {
            return vertex;
        }

        let mut chain = vec![vertex];
        let mut current = vertex;
        while let Some(&next) = self.map.get(&current) {
            if next == current {
                break;
            }
            if let Some(cycle_start) = chain.iter().position(|&v| v == next) {
                return chain[cycle_start..].iter().copied().min().unwrap_or(next);
            }
            chain.push(next);
            current = next;
        }
        current
    }

    /// Map every vertex of a simplex to its canonical representative,
    /// keeping the order.
    pub fn stitch(&self, simplex: &[usize]) -> Vec<usize> {
        simplex.iter().map(|&v| self.resolve(v)).collect()
    }
}

impl FromIterator<(usize, usize)> for Stitches {
    fn from_iter<I: IntoIterator<Item = (usize, usize)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

impl From<HashMap<usize, usize>> for Stitches {
    fn from(map: HashMap<usize, usize>) -> Self {
        Self { map }
    }
}
