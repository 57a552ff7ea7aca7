// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Visitor traits for streaming a reconstructed shortest path to callers, in
//! order from the query point toward the source: feature-level events
//! (`on_edge`/`on_vertex`/`on_face`), or the 3D-point decorator built on top
//! of them.

use glam::Vec3;

use crate::geometry::Kernel;
use crate::mesh::halfedge::{FaceId, HalfEdgeId, HalfEdgeMesh, VertexId};

/// Receives the feature-level sequence of a reconstructed geodesic path, in
/// order from the query location toward the nearest source: zero or more
/// edge crossings / pseudo-source vertex stops, terminating in the face (or
/// edge, or vertex) the owning cone was rooted at.
pub trait PathVisitor {
    /// The path crosses `halfedge` at parameter `t` along it (`t=0` at
    /// `source(halfedge)`, `t=1` at its target).
    fn on_edge(&mut self, halfedge: HalfEdgeId, t: f32);
    /// The path passes through pseudo-source vertex `vertex`.
    fn on_vertex(&mut self, vertex: VertexId);
    /// The path terminates at `bary` within `face`, the root cone's source
    /// location.
    fn on_face(&mut self, face: FaceId, bary: [f32; 3]);
}

/// Receives a 3D polyline, one point at a time, in the same order as the
/// `PathVisitor` events it was built from.
pub trait PointVisitor {
    fn on_point(&mut self, point: Vec3);
}

/// Decorates a [`PointVisitor`] as a [`PathVisitor`], interpolating each
/// feature-level event into a 3D coordinate: edge crossings linearly blend
/// the halfedge's two endpoints, vertex stops use the vertex's own point, and
/// the terminal face event evaluates the barycentric location in 3D.
pub(crate) struct PathToPoints<'a, K: Kernel> {
    pub mesh: &'a HalfEdgeMesh,
    pub kernel: &'a K,
    pub inner: &'a mut dyn PointVisitor,
}

impl<'a, K: Kernel> PathVisitor for PathToPoints<'a, K> {
    fn on_edge(&mut self, halfedge: HalfEdgeId, t: f32) {
        let conn = self.mesh.connectivity();
        let (a, b) = conn.edge_endpoints(halfedge);
        let pa = self.mesh.positions()[a];
        let pb = self.mesh.positions()[b];
        self.inner.on_point(crate::common_math::lerp(pa, pb, t));
    }

    fn on_vertex(&mut self, vertex: VertexId) {
        self.inner.on_point(self.mesh.positions()[vertex]);
    }

    fn on_face(&mut self, face: FaceId, bary: [f32; 3]) {
        let conn = self.mesh.connectivity();
        let verts = conn.face_vertices(face);
        let tri3 = [
            self.mesh.positions()[verts[0]],
            self.mesh.positions()[verts[1]],
            self.mesh.positions()[verts[2]],
        ];
        self.inner
            .on_point(self.kernel.construct_triangle_location_3(tri3, bary));
    }
}

/// A `PointVisitor` that simply collects every point into a `Vec`, handy for
/// tests and for callers that want the whole polyline at once rather than
/// streaming callbacks.
#[derive(Debug, Default, Clone)]
pub struct CollectPoints(pub Vec<Vec3>);

impl PointVisitor for CollectPoints {
    fn on_point(&mut self, point: Vec3) {
        self.0.push(point);
    }
}

/// A `PathVisitor` that collects every feature-level event, for tests that
/// want to assert on the reconstructed sequence directly.
#[derive(Debug, Default, Clone)]
pub struct CollectPath(pub Vec<PathEvent>);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathEvent {
    Edge(HalfEdgeId, f32),
    Vertex(VertexId),
    Face(FaceId, [f32; 3]),
}

impl PathVisitor for CollectPath {
    fn on_edge(&mut self, halfedge: HalfEdgeId, t: f32) {
        self.0.push(PathEvent::Edge(halfedge, t));
    }

    fn on_vertex(&mut self, vertex: VertexId) {
        self.0.push(PathEvent::Vertex(vertex));
    }

    fn on_face(&mut self, face: FaceId, bary: [f32; 3]) {
        self.0.push(PathEvent::Face(face, bary));
    }
}
