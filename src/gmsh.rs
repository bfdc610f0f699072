//! Utilities for loading meshes generated with [`gmsh`](https://www.gmsh.info/).
//!
//! Only version 4.1 of the MSH format is supported,
//! as per the [`mshio`] library.

use nalgebra as na;

use crate::{DecError, SimplicialComplex};

/// Error in loading a mesh from a Gmsh .msh file.
#[derive(thiserror::Error, Debug)]
pub enum GmshError {
    /// Error parsing the .msh file.
    ///
    /// (Implementation note: parser error converted to string
    /// to avoid lifetime issues with the byte slices it contains)
    #[error("Parsing the .msh data failed: {0}")]
    ParseError(String),
    /// The given .msh file contains no nodes.
    #[error("Invalid .msh data: no nodes")]
    MissingNodes,
    /// The given .msh file contains no elements of the supported type.
    #[error("Invalid .msh data: no elements of the correct type")]
    MissingElements,
}

/// Load a 2D triangle mesh from a `.msh` file.
///
/// First-order triangle elements in the file are interpreted as the triangles of the mesh.
/// These must be of type `Tri3` (see [`ElementType`][mshio::ElementType]).
/// The `z` coordinate of vertices is dropped to project the mesh to 2D space.
pub fn load_trimesh_2d(bytes: &[u8]) -> Result<SimplicialComplex<f64>, DecError> {
    load_simplices(bytes, mshio::ElementType::Tri3, 2)
}

/// Load a 3D tetrahedral mesh from a `.msh` file.
///
/// First-order tetrahedron elements in the file are interpreted as the tetrahedra of the mesh.
/// These must be of type `Tet4` (see [`ElementType`][mshio::ElementType]).
pub fn load_tetmesh_3d(bytes: &[u8]) -> Result<SimplicialComplex<f64>, DecError> {
    load_simplices(bytes, mshio::ElementType::Tet4, 3)
}

/// Read every node, keeping the first `coord_count` coordinates,
/// and every element of the given type, and build a Euclidean complex from them.
fn load_simplices(
    bytes: &[u8],
    element_type: mshio::ElementType,
    coord_count: usize,
) -> Result<SimplicialComplex<f64>, DecError> {
    let msh = mshio::parse_msh_bytes(bytes).map_err(|e| GmshError::ParseError(format!("{}", e)))?;
    let nodes = msh.data.nodes.ok_or(GmshError::MissingNodes)?;
    let elements = msh.data.elements.ok_or(GmshError::MissingElements)?;

    let vertices: Vec<na::DVector<f64>> = nodes
        .node_blocks
        .iter()
        .flat_map(|block| block.nodes.iter())
        .map(|node| {
            let coords = [node.x, node.y, node.z];
            na::DVector::from_column_slice(&coords[..coord_count])
        })
        .collect();
    if vertices.is_empty() {
        return Err(GmshError::MissingNodes.into());
    }

    let simplices: Vec<Vec<usize>> = elements
        .element_blocks
        .iter()
        .filter(|block| block.element_type == element_type)
        .flat_map(|block| block.elements.iter())
        .map(|el| {
            el.nodes
                .iter()
                // gmsh tags start at 1, subtract 1 to get the index in the array.
                // (this assumes tags are sequential and in order)
                .map(|node_tag| {
                    (*node_tag as usize).checked_sub(1).ok_or_else(|| {
                        GmshError::ParseError(format!("element {} refers to node tag 0", el.element_tag))
                    })
                })
                .collect::<Result<Vec<usize>, GmshError>>()
        })
        .collect::<Result<_, _>>()?;
    if simplices.is_empty() {
        return Err(GmshError::MissingElements.into());
    }

    tracing::debug!(
        vertex_count = vertices.len(),
        simplex_count = simplices.len(),
        ?element_type,
        "loaded gmsh mesh"
    );
    SimplicialComplex::new(vertices, simplices)
}
