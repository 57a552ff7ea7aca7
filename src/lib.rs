// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Exact geodesic shortest paths on triangulated polyhedral surfaces.
//!
//! Given one or more source locations on the surface of a triangle mesh, this
//! crate builds a structure that answers, for any query point on the mesh,
//! the exact geodesic distance to the nearest source and the sequence of mesh
//! features the shortest path crosses. It implements the Chen-Han O(n^2)
//! algorithm with the Xin-Wang pruning filter (MMP/CH with filtering).

/// Some useful re-exports
pub mod prelude;

/// The halfedge graph data structure and its traversal primitives.
pub mod mesh;

/// `SVec`/`SVecN` small-vector aliases and iterator helpers.
pub mod common_utils;

/// Orderable vector wrapper and small math helpers.
pub mod common_math;

/// The geometry kernel: 2D/3D points, unfolding, intersection, predicates.
pub mod geometry;

/// Classifies a barycentric triple as internal, on-edge, or at-vertex.
pub mod barycentric;

/// The cone tree node type and its slotmap-backed arena.
pub mod cone_tree;

/// The cancellable min-priority event queue driving propagation order.
pub mod event_queue;

/// The propagation engine: root/child/pseudo-source expansion and arbitration.
pub mod engine;

/// Post-construction queries and path reconstruction.
pub mod query;

/// Visitor traits for streaming reconstructed paths to callers.
pub mod visitor;

/// Error types returned at the public API boundary.
pub mod error;

pub use engine::{GeodesicConfig, GeodesicEngine};
pub use error::GeodesicError;
pub use query::SurfaceLocation;
pub use visitor::{CollectPath, CollectPoints, PathEvent, PathVisitor, PointVisitor};
