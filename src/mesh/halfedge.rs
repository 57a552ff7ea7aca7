// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::marker::PhantomData;

use crate::prelude::*;

use glam::*;
use itertools::Itertools;
use slotmap::SlotMap;
use smallvec::SmallVec;

/// Implements indexing traits so the mesh data structure can be used to access
/// vertex, face or halfedge information using ids as indices.
pub mod mesh_index_impls;

/// Type-safe wrappers over the internal allocator indices used as pointers
pub mod id_types;
pub use id_types::*;

/// An API to represent type-safe and error-handled graph traversals over a mesh
pub mod traversals;
pub use traversals::*;

/// Primitive shapes used as test fixtures and quick meshes: tetrahedron, cube,
/// icosahedron, flat square, open disk.
pub mod primitives;

/// HalfEdge meshes are a type of linked list. This means it is sometimes
/// impossible to ensure some algorithms will terminate when the mesh is
/// malformed. To ensure the code never goes into an infinite loop, this max
/// number of iterations will be performed before giving an error. This error
/// should be large enough, as faces with a very large number of vertices may
/// trigger it.
pub const MAX_LOOP_ITERATIONS: usize = 8196;

#[derive(Debug, Default, Clone)]
pub struct HalfEdge {
    twin: Option<HalfEdgeId>,
    next: Option<HalfEdgeId>,
    vertex: Option<VertexId>,
    face: Option<FaceId>,
}

#[derive(Debug, Clone)]
pub struct Vertex {
    halfedge: Option<HalfEdgeId>,
}

#[derive(Debug, Clone)]
pub struct Face {
    halfedge: Option<HalfEdgeId>,
}

#[derive(Debug, Clone, Default)]
pub struct MeshConnectivity {
    vertices: SlotMap<VertexId, Vertex>,
    faces: SlotMap<FaceId, Face>,
    halfedges: SlotMap<HalfEdgeId, HalfEdge>,
}

/// Per-vertex 3D positions. A plain secondary map, unlike the teacher's
/// generic `Channel` system: this engine never attaches arbitrary per-element
/// data to the mesh, only positions.
pub type Positions = slotmap::SecondaryMap<VertexId, Vec3>;

#[derive(Debug, Clone, Default)]
pub struct HalfEdgeMesh {
    connectivity: MeshConnectivity,
    positions: Positions,
}

impl MeshConnectivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the edges of a given face
    pub fn face_edges(&self, face_id: FaceId) -> SVec<HalfEdgeId> {
        let mut edges = SmallVec::new();
        let h0 = self[face_id].halfedge.expect("Face should have a halfedge");
        let mut h = h0;

        edges.push(h);

        let mut counter = 0;

        loop {
            if counter > MAX_LOOP_ITERATIONS {
                panic!("Max number of iterations reached. Is the mesh malformed?");
            }
            counter += 1;

            h = self[h]
                .next
                .unwrap_or_else(|| panic!("Halfedge {h:?} has no next"));
            if h == h0 {
                break;
            }
            edges.push(h);
        }

        edges
    }

    pub fn face_vertices(&self, face_id: FaceId) -> SVec<VertexId> {
        self.face_edges(face_id)
            .iter()
            .map(|e| self.at_halfedge(*e).vertex().end())
            .collect()
    }

    pub fn edge_endpoints(&self, edge: HalfEdgeId) -> (VertexId, VertexId) {
        let a = self.at_halfedge(edge).vertex().end();
        let b = self.at_halfedge(edge).next().vertex().end();
        (a, b)
    }

    /// Given a `self` in an inconsistent state, where some halfedges have no
    /// `twin` (because it's in the boundary), this method adds twin halfedges
    /// forming a loop across the boundaries of the mesh. The new halfedges will
    /// be marked as boundary with a None face.
    fn add_boundary_halfedges(&mut self) {
        // Clone to avoid double-borrow issues
        let halfedges: Vec<HalfEdgeId> = self.iter_halfedges().map(|(h, _)| h).collect();

        for &h0 in halfedges.iter() {
            let mut boundary_halfedges = Vec::<HalfEdgeId>::new();
            if self[h0].twin.is_none() {
                let mut h_it = h0;
                loop {
                    let t = self.alloc_halfedge(HalfEdge::default());
                    boundary_halfedges.push(t);
                    self[h_it].twin = Some(t);
                    self[t].twin = Some(h_it);
                    self[t].vertex = Some(self.at_halfedge(h_it).next().vertex().end());

                    // Look for the next outgoing halfedge for this vertex
                    // that's in the boundary
                    h_it = self.at_halfedge(h_it).next().end();
                    while h_it != h0 && self[h_it].twin.is_some() {
                        // Twin-next cycles around the outgoing halfedges of a vertex
                        h_it = self.at_halfedge(h_it).twin().next().end();
                    }

                    if h_it == h0 {
                        break;
                    }
                }
            }

            for (&b_h, &b_h_next) in boundary_halfedges.iter().rev().circular_tuple_windows() {
                self[b_h].next = Some(b_h_next);
            }
        }
    }

    fn halfedge_loop(&self, h0: HalfEdgeId) -> SVec<HalfEdgeId> {
        let mut ret = smallvec::smallvec![h0];
        let mut h = h0;

        let mut count = 0;

        loop {
            if count > MAX_LOOP_ITERATIONS {
                panic!("Max number of iterations reached. Is the mesh malformed?");
            }
            count += 1;

            h = self[h].next.expect("Halfedges should form a loop");
            if h == h0 {
                break;
            } else {
                ret.push(h);
            }
        }
        ret
    }

    /// Returns an iterator that cycles around the halfedge fan starting at `h0`
    /// until closing the loop.
    pub fn halfedge_fan_iter(&self, h0: HalfEdgeId) -> HalfedgeOpIterator<'_, CycleFanOp> {
        HalfedgeOpIterator {
            conn: self,
            start: h0,
            next: h0,
            count: 0,
            _op: PhantomData,
        }
    }

    pub fn iter_vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex)> {
        self.vertices.iter()
    }

    pub fn iter_faces(&self) -> impl Iterator<Item = (FaceId, &Face)> {
        self.faces.iter()
    }

    pub fn iter_halfedges(&self) -> impl Iterator<Item = (HalfEdgeId, &HalfEdge)> {
        self.halfedges.iter()
    }

    /// Adds a new vertex to the mesh, disconnected from everything else. Returns its handle.
    fn alloc_vertex(
        &mut self,
        positions: &mut Positions,
        position: Vec3,
        halfedge: Option<HalfEdgeId>,
    ) -> VertexId {
        let v = self.vertices.insert(Vertex { halfedge });
        positions.insert(v, position);
        v
    }

    /// Adds a new face to the mesh, disconnected from everything else. Returns its handle.
    fn alloc_face(&mut self, halfedge: Option<HalfEdgeId>) -> FaceId {
        self.faces.insert(Face { halfedge })
    }

    /// Adds a new halfedge to the mesh, disconnected from everything else.
    fn alloc_halfedge(&mut self, halfedge: HalfEdge) -> HalfEdgeId {
        self.halfedges.insert(halfedge)
    }

    /// Returns the average of a face's vertices. Note that this is different
    /// from the centroid. See:
    /// https://en.wikipedia.org/wiki/Centroid#Of_a_polygon
    /// https://stackoverflow.com/questions/2355931/compute-the-centroid-of-a-3d-planar-polygon
    pub fn face_vertex_average(&self, positions: &Positions, face_id: FaceId) -> Vec3 {
        let face_vertices = self
            .face_vertices(face_id)
            .iter()
            .map(|v| positions[*v])
            .collect::<SVec<_>>();
        face_vertices.iter().fold(Vec3::ZERO, |v1, v2| v1 + *v2) / face_vertices.len() as f32
    }

    pub fn vertex_exists(&self, vertex: VertexId) -> bool {
        self.vertices.contains_key(vertex)
    }

    /// Returns the normal of the face, assuming the face is a triangle. If the
    /// vertices of the face are not coplanar, the result will not be correct.
    pub fn face_normal(&self, positions: &Positions, face: FaceId) -> Option<Vec3> {
        let verts = self.face_vertices(face);
        if verts.len() >= 3 {
            let v01 = positions[verts[0]] - positions[verts[1]];
            let v12 = positions[verts[1]] - positions[verts[2]];
            Some(v01.cross(v12).normalize())
        } else {
            None
        }
    }

    /// True when this halfedge has no associated face, i.e. it lies on the
    /// boundary of the surface.
    pub fn is_boundary_halfedge(&self, h: HalfEdgeId) -> bool {
        self[h].face.is_none()
    }

    /// True when every face of the mesh has exactly three edges. The
    /// propagation engine requires this; non-triangulated input is rejected at
    /// construction with `GeodesicError::NonTriangulatedMesh`.
    pub fn is_triangulated(&self) -> bool {
        self.iter_faces()
            .all(|(f, _)| self.face_edges(f).len() == 3)
    }

    pub fn num_halfedges(&self) -> usize {
        self.halfedges.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }
}

impl HalfEdgeMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounding_box(&self) -> (Vec3, Vec3) {
        let mut min = Vec3::new(f32::MAX, f32::MAX, f32::MAX);
        let mut max = Vec3::new(f32::MIN, f32::MIN, f32::MIN);
        for (_, p) in self.positions.iter() {
            min = min.min(*p);
            max = max.max(*p);
        }
        let center = (min + max) / 2.0;
        let size = max - min;
        (center, size)
    }

    pub fn connectivity(&self) -> &MeshConnectivity {
        &self.connectivity
    }

    pub fn connectivity_mut(&mut self) -> &mut MeshConnectivity {
        &mut self.connectivity
    }

    pub fn positions(&self) -> &Positions {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut Positions {
        &mut self.positions
    }

    pub fn num_faces(&self) -> usize {
        self.connectivity.num_faces()
    }

    pub fn num_vertices(&self) -> usize {
        self.connectivity.num_vertices()
    }

    /// Builds this mesh from a list of vertex positions and a list of
    /// triangular faces (each a triple of indices into `positions`). Returns
    /// an error if any face is degenerate (fewer than 3 distinct vertices),
    /// the faces don't agree on winding order (non-manifold), or the result
    /// is not a triangulated, manifold surface.
    ///
    /// - Generic over Index: Use as much precision as you need / want.
    /// - Generic over Polygon: Use whatever input layout you want.
    ///
    /// If unsure, you can pass `Vec<Vec<u32>>` as `polygons`. You can also use
    /// `[[u32;3]]` or `&[&[u32]]`. Same for `u8`, `u16` or `usize` indices.
    pub fn build_from_polygons<Index, Polygon>(
        positions: &[Vec3],
        polygons: &[Polygon],
    ) -> Result<Self>
    where
        Index: num_traits::AsPrimitive<usize> + 'static + Eq + PartialEq + core::hash::Hash + Copy,
        Polygon: AsRef<[Index]>,
    {
        let mut mesh = Self::new();
        let conn = &mut mesh.connectivity;
        let positions_ch = &mut mesh.positions;

        // Maps indices from the `polygons` array to the allocated vertices in
        // the newly created halfedge mesh.
        let mut index_to_vertex = HashMap::<Index, VertexId>::new();

        // Used to compute the degree of a vertex. Useful to do some sanity
        // checks.
        let mut vertex_degree = HashMap::<VertexId, u32>::new();

        // First pass over polygon data to determine some initial properties
        for polygon in polygons.iter().map(|p| p.as_ref()) {
            // Some sanity checks
            if polygon.len() < 3 {
                bail!("Cannot build meshes where polygons have less than three vertices.")
            }
            if polygon.iter().duplicates().next().is_some() {
                bail!("Cannot not build meshes where a polygon has duplicate vertices")
            }

            // Compute correspondence between vertices and indices. Also fill in vertex degree data.
            for index in polygon {
                // Create the vertex if it doesn't exist
                let position = positions.get(index.as_()).ok_or_else(|| {
                    anyhow!("Out-of-bounds index in the polygon array {}", index.as_())
                })?;
                let v_id = index_to_vertex
                    .entry(*index)
                    .or_insert_with(|| conn.alloc_vertex(positions_ch, *position, None));

                // Increment the vertex degree counter for that vertex.
                *vertex_degree.entry(*v_id).or_insert(0) += 1;
            }
        }

        // Maps pairs of indices to mesh halfedges
        let mut pair_to_halfedge = HashMap::<(Index, Index), HalfEdgeId>::new();

        // We can now start building connectivity information by doing a second
        // pass over the polygon list
        for polygon in polygons.iter().map(|p| p.as_ref()) {
            // Cyclically ordered list of the half edge ids of this face.
            let mut half_edges_in_face = SVec::new();

            let face = conn.alloc_face(None);

            for (&a, &b) in polygon.iter().circular_tuple_windows() {
                if pair_to_halfedge.get(&(a, b)).is_some() {
                    bail!(
                        "Found multiple oriented edges with the same indices.\
                         This means either (i) surface is non-manifold or (ii) faces \
                         are not oriented in the same direction"
                    )
                }

                let h = conn.alloc_halfedge(HalfEdge::default());
                // Link halfedge to face
                conn[h].face = Some(face);
                conn[face].halfedge = Some(h);

                // Link halfedge to source vertex
                let v_a = index_to_vertex[&a];
                conn[h].vertex = Some(v_a);
                conn[v_a].halfedge = Some(h);

                half_edges_in_face.push(h);

                pair_to_halfedge.insert((a, b), h);

                if let Some(&other) = pair_to_halfedge.get(&(b, a)) {
                    conn[h].twin = Some(other);
                    conn[other].twin = Some(h);
                }
            }

            for (&h1, &h2) in half_edges_in_face.iter().circular_tuple_windows() {
                conn[h1].next = Some(h2);
            }
        }

        // Construct the boundary halfedges. Right now, the boundary consists of
        // incomplete edges, i.e. half edges that do not have a twin. Leaving it
        // like this would complicate some kinds of traversal because we can't
        // rely on halfedges always having a twin. We will instead create
        // boundary half edges: That is, twin halfedges that do not point to any
        // face. The boundary halfedges are linked following a circle around the
        // closed boundary.
        conn.add_boundary_halfedges();

        // Do some final manifoldness checks
        for (v, vertex) in conn.iter_vertices() {
            if vertex.halfedge.is_none() {
                bail!("There is at least a single vertex that's disconnected from any polygon");
            }

            // Check that the number of halfedges emanating from this vertex
            // equal the number of polygons containing this vertex. If this
            // doesn't check out, it means our vertex is not a polygon "fan",
            // but some other (thus, non-manifold) structure
            let h0 = conn.at_vertex(v).halfedge().end();
            let mut h = h0;
            let mut count = 0;
            loop {
                if !conn.at_halfedge(h).is_boundary().unwrap() {
                    count += 1;
                }
                h = conn.at_halfedge(h).twin().next().end();

                if h == h0 {
                    break;
                }
            }

            if count != vertex_degree[&v] {
                bail!("At least one of the vertices is not a polygon fan, but some other nonmanifold structure instead.")
            }
        }

        if !conn.is_triangulated() {
            bail!("Only triangulated meshes are supported.")
        }

        Ok(mesh)
    }
}

pub trait HalfEdgeOp {
    fn op(conn: &MeshConnectivity, h: HalfEdgeId) -> HalfEdgeId;
}

pub struct CycleFanOp;
impl HalfEdgeOp for CycleFanOp {
    fn op(conn: &MeshConnectivity, h: HalfEdgeId) -> HalfEdgeId {
        conn.at_halfedge(h).cycle_around_fan().end()
    }
}

pub struct HalfedgeOpIterator<'a, Op: HalfEdgeOp> {
    conn: &'a MeshConnectivity,
    start: HalfEdgeId,
    next: HalfEdgeId,
    count: usize,
    _op: PhantomData<Op>,
}

impl<'a, Op: HalfEdgeOp> Iterator for HalfedgeOpIterator<'a, Op> {
    type Item = HalfEdgeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.count >= MAX_LOOP_ITERATIONS {
            panic!("Max number of iterations reached. Is the mesh malformed?");
        } else if self.count > 0 && self.next == self.start {
            None
        } else {
            let res = self.next;
            self.next = Op::op(self.conn, self.next);
            self.count += 1;
            Some(res)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::halfedge::primitives::triangulated_cube;

    #[test]
    fn cube_is_triangulated_and_manifold() {
        let mesh = triangulated_cube(1.0).unwrap();
        assert_eq!(mesh.num_vertices(), 8);
        assert_eq!(mesh.num_faces(), 12);
        assert!(mesh.connectivity().is_triangulated());
    }

    #[test]
    fn rejects_degenerate_polygon() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let polygons: [[u32; 2]; 1] = [[0, 1]];
        assert!(HalfEdgeMesh::build_from_polygons(&positions, &polygons).is_err());
    }
}
