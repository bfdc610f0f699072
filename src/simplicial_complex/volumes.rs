//! Complex-wide geometry: primal volumes, circumcenters,
//! circumcentric dual cells and their volumes,
//! and barycentric gradients of the top-dimensional simplices.

use nalgebra as na;
use rayon::prelude::*;

use super::{skeleton::Unstitched, SimplicialComplex};
use crate::{
    geometry::{self, DecScalar, Point},
    simplex::UnstitchedSimplex,
    DecError,
};

/// Relative tolerance for primal volumes of identified simplices to count as equal.
const VOLUME_CONSISTENCY_TOLERANCE: f64 = 1e-9;

/// One elementary piece of a circumcentric dual cell:
/// the chain of circumcenters from a top-dimensional simplex
/// down to the primal simplex the cell is dual to.
#[derive(Clone, Debug, PartialEq)]
pub struct DualCell<T: DecScalar> {
    /// Circumcenters, starting from the top-dimensional simplex.
    pub points: Vec<Point<T>>,
    /// Stitched index of the primal simplex this cell is dual to.
    pub index: usize,
}

/// Circumcenters and unstitched keys of every skeleton
/// from some level up to the top, gathered for recursive traversal.
struct DualTraversal<'a, T: DecScalar> {
    level: usize,
    /// indexed by `dim - level`
    skeleta: Vec<(&'a Unstitched, &'a [Point<T>])>,
}

impl<'a, T: DecScalar> DualTraversal<'a, T> {
    /// All dual cells of `simplex` at the traversal level.
    fn cells_of(&self, simplex: &UnstitchedSimplex) -> Result<Vec<DualCell<T>>, DecError> {
        let mut cells = Vec::new();
        let mut chain = Vec::with_capacity(simplex.dim() + 1 - self.level);
        self.traverse(simplex, &mut chain, &mut cells)?;
        Ok(cells)
    }

    fn traverse(
        &self,
        simplex: &UnstitchedSimplex,
        chain: &mut Vec<Point<T>>,
        cells: &mut Vec<DualCell<T>>,
    ) -> Result<(), DecError> {
        let dim = simplex.dim();
        let (unstitched, centers) = self.skeleta[dim - self.level];
        let pos = *unstitched.positions.get(simplex).ok_or_else(|| {
            DecError::InvalidInput(format!(
                "{:?} is not a {dim}-simplex of the complex",
                simplex.vertices()
            ))
        })?;

        chain.push(centers[pos].clone());
        if dim == self.level {
            cells.push(DualCell {
                points: chain.clone(),
                index: unstitched.stitched_indices[pos],
            });
        } else {
            for (_, face) in simplex.faces() {
                self.traverse(&face, chain, cells)?;
            }
        }
        chain.pop();
        Ok(())
    }
}

impl<T: DecScalar> SimplicialComplex<T> {
    /// Unsigned primal volume of each stitched `dim`-simplex.
    ///
    /// Vertices have volume 1.
    pub fn primal_volumes(&self, dim: usize) -> Result<&na::DVector<T>, DecError> {
        let skeleton = self.skeleton(dim)?;
        skeleton.primal_volumes.get_or_try_init(|| {
            let simplex_count = self.num_simplices(dim)?;
            if dim == 0 {
                return Ok(na::DVector::from_element(simplex_count, T::one()));
            }

            let unstitched = self.unstitched_data(dim)?;
            let points = self.points(dim)?;
            let metrics = self.metrics(dim)?;
            let volumes: Vec<T> = points
                .par_iter()
                .zip(metrics.par_iter())
                .zip(unstitched.simplices.par_iter())
                .map(|((points, metric), simplex)| {
                    if geometry::is_degenerate(points, metric) {
                        return Err(DecError::DegenerateSimplex {
                            dim,
                            vertices: simplex.vertices().to_vec(),
                        });
                    }
                    Ok(geometry::simplex_volume(points, metric))
                })
                .collect::<Result<_, _>>()?;

            // every unstitched representative of a stitched simplex
            // should give the same volume. keep the first one and report mismatches
            let mut stitched: Vec<Option<T>> = vec![None; simplex_count];
            for (&idx, vol) in unstitched.stitched_indices.iter().zip(volumes) {
                match stitched[idx] {
                    None => stitched[idx] = Some(vol),
                    Some(existing) => {
                        let scale = existing.modulus().max(vol.modulus());
                        if (existing - vol).modulus() > VOLUME_CONSISTENCY_TOLERANCE * scale {
                            tracing::warn!(
                                dim,
                                index = idx,
                                kept = %existing,
                                discarded = %vol,
                                "identified simplices have different volumes under the metric"
                            );
                        }
                    }
                }
            }
            tracing::debug!(dim, simplex_count, "computed primal volumes");
            Ok(na::DVector::from_iterator(
                simplex_count,
                stitched.into_iter().map(|v| v.unwrap_or_else(T::zero)),
            ))
        })
    }

    /// Circumcenter of each unstitched `dim`-simplex,
    /// in the order of [`unstitched`][Self::unstitched].
    ///
    /// These are kept per unstitched simplex
    /// because identified copies of a simplex may be embedded in different places.
    pub fn circumcenters(&self, dim: usize) -> Result<&[Point<T>], DecError> {
        let skeleton = self.skeleton(dim)?;
        let centers = skeleton.circumcenters.get_or_try_init(|| {
            let unstitched = self.unstitched_data(dim)?;
            let points = self.points(dim)?;
            if dim == 0 {
                return Ok::<_, DecError>(points.iter().map(|p| p[0].clone()).collect());
            }

            let metrics = self.metrics(dim)?;
            let centers: Vec<Point<T>> = points
                .par_iter()
                .zip(metrics.par_iter())
                .zip(unstitched.simplices.par_iter())
                .map(|((points, metric), simplex)| {
                    geometry::circumcenter(points, metric).ok_or_else(|| {
                        DecError::DegenerateSimplex {
                            dim,
                            vertices: simplex.vertices().to_vec(),
                        }
                    })
                })
                .collect::<Result<_, _>>()?;
            tracing::debug!(dim, count = centers.len(), "computed circumcenters");
            Ok(centers)
        })?;
        Ok(centers)
    }

    /// Gather the skeleta needed to traverse dual cells down to `level`.
    /// Everything is forced beforehand so the traversal only reads.
    fn dual_traversal(&self, level: usize) -> Result<DualTraversal<'_, T>, DecError> {
        self.ensure_upto(level)?;
        let skeleta = (level..=self.complex_dimension)
            .map(|dim| Ok((self.unstitched_data(dim)?, self.circumcenters(dim)?)))
            .collect::<Result<Vec<_>, DecError>>()?;
        Ok(DualTraversal { level, skeleta })
    }

    /// The elementary dual cells of an unstitched simplex at level `level`:
    /// for every chain of faces from `simplex` down to a `level`-simplex,
    /// the circumcenters along the chain,
    /// tagged with the stitched index of the `level`-simplex.
    ///
    /// For a `level`-simplex itself this is its own circumcenter.
    pub fn dual_cells(
        &self,
        simplex: &UnstitchedSimplex,
        level: usize,
    ) -> Result<Vec<DualCell<T>>, DecError> {
        let dim = simplex.dim();
        if dim > self.complex_dimension {
            return Err(DecError::DimensionOutOfRange {
                dim,
                complex_dim: self.complex_dimension,
            });
        }
        if level > dim {
            return Err(DecError::InvalidInput(format!(
                "no dual cells at level {level} for a {dim}-simplex"
            )));
        }
        self.dual_traversal(level)?.cells_of(simplex)
    }

    /// Unsigned volume of the circumcentric dual cell of each stitched `dim`-simplex.
    ///
    /// Contributions from every top-dimensional simplex are summed,
    /// so a dual cell spanning several top simplices gets its full volume.
    /// Top-dimensional simplices have dual volume 1.
    pub fn dual_volumes(&self, dim: usize) -> Result<&na::DVector<T>, DecError> {
        let skeleton = self.skeleton(dim)?;
        skeleton.dual_volumes.get_or_try_init(|| {
            let simplex_count = self.num_simplices(dim)?;
            let top_dim = self.complex_dimension;
            if dim == top_dim {
                return Ok(na::DVector::from_element(simplex_count, T::one()));
            }

            // circumcenters of every skeleton from the top down to this one
            // must exist before the traversal
            let traversal = self.dual_traversal(dim)?;
            let top = self.unstitched_data(top_dim)?;
            let top_metrics = self.metrics(top_dim)?;

            // per-top-simplex contributions are gathered in order
            // and summed sequentially so the result doesn't depend on scheduling
            let contributions: Vec<Vec<(usize, T)>> = top
                .simplices
                .par_iter()
                .zip(top_metrics.par_iter())
                .map(|(simplex, metric)| -> Result<_, DecError> {
                    let cells = traversal.cells_of(simplex)?;
                    Ok(cells
                        .into_iter()
                        .map(|cell| (cell.index, geometry::gram_determinant_root(&cell.points, metric)))
                        .collect())
                })
                .collect::<Result<_, DecError>>()?;

            let mut volumes = na::DVector::zeros(simplex_count);
            for (idx, vol) in contributions.into_iter().flatten() {
                volumes[idx] += vol;
            }
            volumes /= T::from_real(geometry::factorial(top_dim - dim) as f64);
            tracing::debug!(dim, simplex_count, "computed dual volumes");
            Ok(volumes)
        })
    }

    /// Gradients of the barycentric coordinate functions
    /// of each top-dimensional simplex, one per vertex in row order.
    pub fn barycentric_gradients(&self) -> Result<&[Vec<Point<T>>], DecError> {
        let grads = self.barycentric_gradients.get_or_try_init(|| {
            let top_dim = self.complex_dimension;
            let unstitched = self.unstitched_data(top_dim)?;
            let points = self.points(top_dim)?;
            let metrics = self.metrics(top_dim)?;
            let grads: Vec<Vec<Point<T>>> = points
                .par_iter()
                .zip(metrics.par_iter())
                .zip(unstitched.simplices.par_iter())
                .map(|((points, metric), simplex)| {
                    geometry::barycentric_gradients(points, metric).ok_or_else(|| {
                        DecError::DegenerateSimplex {
                            dim: top_dim,
                            vertices: simplex.vertices().to_vec(),
                        }
                    })
                })
                .collect::<Result<_, _>>()?;
            tracing::debug!(count = grads.len(), "computed barycentric gradients");
            Ok::<_, DecError>(grads)
        })?;
        Ok(grads)
    }
}
