// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::mesh::halfedge::TraversalError;

/// Errors returned at the public boundary of the geodesic engine.
#[derive(Debug, Clone, Copy)]
pub enum GeodesicError {
    /// A barycentric triple did not sum to one (within tolerance) or had a
    /// negative coordinate, or referenced a face that does not exist.
    InvalidFaceLocation,
    /// A face of the input mesh does not have exactly three halfedges.
    NonTriangulatedMesh,
    /// The queried vertex or face has no occupier: it lies in a connected
    /// component the construction's sources never reached.
    Unreachable,
    /// A kernel intersection required by a tree invariant did not occur.
    /// Surfaces only when the cone tree itself is internally inconsistent.
    DegeneratePropagation,
    /// The kernel could not construct a required offset point (e.g. two
    /// coincident unfolding circles).
    NumericOverflow,
    /// A traversal over the underlying mesh failed; see the wrapped error.
    Traversal(TraversalError),
}

impl std::fmt::Display for GeodesicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeodesicError::InvalidFaceLocation => {
                write!(f, "barycentric location is invalid for its face")
            }
            GeodesicError::NonTriangulatedMesh => {
                write!(f, "mesh contains a face that is not a triangle")
            }
            GeodesicError::Unreachable => {
                write!(f, "queried location has no path from any source")
            }
            GeodesicError::DegeneratePropagation => {
                write!(f, "cone tree invariant violated during propagation")
            }
            GeodesicError::NumericOverflow => {
                write!(f, "kernel could not construct a required point")
            }
            GeodesicError::Traversal(e) => write!(f, "mesh traversal failed: {e}"),
        }
    }
}

impl std::error::Error for GeodesicError {}

impl From<TraversalError> for GeodesicError {
    fn from(e: TraversalError) -> Self {
        GeodesicError::Traversal(e)
    }
}
