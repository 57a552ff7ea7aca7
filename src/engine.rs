// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The propagation engine: the main loop driving the cone tree's growth
//! across the mesh, the occupier/closest-at-vertex arbitration, the
//! Xin-Wang distance filter, and pseudo-source firing at saddle and
//! boundary vertices.

use glam::Vec2;
use slotmap::SecondaryMap;

use crate::barycentric::{classify, BaryClass};
use crate::cone_tree::{ConeNode, ConeTreeArena, NodeId, NodeKind};
use crate::error::GeodesicError;
use crate::event_queue::{EventKind, EventQueue};
use crate::geometry::{EuclideanKernel, Kernel, RelativeOrder};
use crate::mesh::halfedge::*;

/// The single numerical knob the algorithm has: the tolerance used by the
/// barycentric classifier and by the distance filter's dominance
/// comparisons. Mirrors the teacher's `MeshGenerationConfig`: a plain
/// `Default`-able struct passed into construction, not read from global
/// state.
#[derive(Debug, Clone, Copy)]
pub struct GeodesicConfig {
    pub tolerance: f32,
}

impl Default for GeodesicConfig {
    fn default() -> Self {
        Self { tolerance: 1e-5 }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Occupier {
    pub node: NodeId,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ClosestAtVertex {
    pub node: NodeId,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

/// Builds and queries the cone tree for a set of sources on a triangulated
/// mesh. One engine can be reused across multiple `compute_shortest_paths`
/// calls, possibly against different meshes: each call resets every
/// container before propagating.
pub struct GeodesicEngine {
    pub(crate) config: GeodesicConfig,
    pub(crate) kernel: EuclideanKernel,

    pub(crate) nodes: ConeTreeArena,
    pub(crate) queue: EventQueue,

    pub(crate) occupier: SecondaryMap<crate::mesh::halfedge::HalfEdgeId, Occupier>,
    pub(crate) closest_at_vertex: SecondaryMap<VertexId, ClosestAtVertex>,
    pub(crate) is_pseudo_source: SecondaryMap<VertexId, bool>,

    pub(crate) roots: Vec<NodeId>,
    pub(crate) face_occupiers: SecondaryMap<FaceId, Vec<NodeId>>,

    face_count: usize,
}

impl GeodesicEngine {
    pub fn new(config: GeodesicConfig) -> Self {
        Self {
            kernel: EuclideanKernel::new(config.tolerance),
            config,
            nodes: ConeTreeArena::new(),
            queue: EventQueue::new(),
            occupier: SecondaryMap::new(),
            closest_at_vertex: SecondaryMap::new(),
            is_pseudo_source: SecondaryMap::new(),
            roots: Vec::new(),
            face_occupiers: SecondaryMap::new(),
            face_count: 0,
        }
    }

    /// Builds the cone tree for `sources`, a set of `(face, bary)` locations.
    /// Resets all internal state first, so the same engine can be reused
    /// across independent constructions, including against a different mesh.
    #[profiling::function]
    pub fn compute_shortest_paths(
        &mut self,
        mesh: &HalfEdgeMesh,
        sources: impl IntoIterator<Item = (FaceId, [f32; 3])>,
    ) -> Result<(), GeodesicError> {
        self.reset(mesh)?;
        for (face, bary) in sources {
            self.expand_root(mesh, face, bary)?;
        }
        self.run_main_loop(mesh)?;
        self.build_face_occupiers();
        Ok(())
    }

    fn reset(&mut self, mesh: &HalfEdgeMesh) -> Result<(), GeodesicError> {
        self.nodes.clear();
        self.queue.clear();
        self.occupier.clear();
        self.closest_at_vertex.clear();
        self.is_pseudo_source.clear();
        self.roots.clear();
        self.face_occupiers.clear();

        let conn = mesh.connectivity();
        if !conn.is_triangulated() {
            return Err(GeodesicError::NonTriangulatedMesh);
        }
        self.face_count = mesh.num_faces();

        for (v, _) in conn.iter_vertices() {
            let saddle = self.kernel.is_saddle_vertex(conn, mesh.positions(), v);
            let boundary = is_boundary_vertex(conn, v)?;
            self.is_pseudo_source.insert(v, saddle || boundary);
        }
        Ok(())
    }

    #[profiling::function]
    fn run_main_loop(&mut self, mesh: &HalfEdgeMesh) -> Result<(), GeodesicError> {
        while let Some(event) = self.queue.pop() {
            match event.kind {
                EventKind::LeftChild => self.expand_side_child(mesh, event.node, Side::Left)?,
                EventKind::RightChild => self.expand_side_child(mesh, event.node, Side::Right)?,
                EventKind::PseudoSource => self.expand_pseudo_source_event(mesh, event.node)?,
            }
        }
        Ok(())
    }

    fn build_face_occupiers(&mut self) {
        self.face_occupiers.clear();
        for (id, node) in self.nodes.iter() {
            if node.kind == NodeKind::Root {
                continue;
            }
            if let Some(face) = node.current_face {
                if !self.face_occupiers.contains_key(face) {
                    self.face_occupiers.insert(face, Vec::new());
                }
                self.face_occupiers[face].push(id);
            }
        }
        let nodes = &self.nodes;
        for (_, list) in self.face_occupiers.iter_mut() {
            list.sort_by(|&a, &b| {
                let da = nodes.get(a).map(|n| n.distance_from_source_to_root);
                let db = nodes.get(b).map(|n| n.distance_from_source_to_root);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    /* ============== */
    /*  Root expansion */
    /* ============== */

    #[profiling::function]
    fn expand_root(
        &mut self,
        mesh: &HalfEdgeMesh,
        face: FaceId,
        bary: [f32; 3],
    ) -> Result<(), GeodesicError> {
        match classify(bary, self.config.tolerance)? {
            BaryClass::Internal => self.expand_face_root(mesh, face, bary),
            BaryClass::Edge(i) => self.expand_edge_root(mesh, face, i, bary),
            BaryClass::Vertex(i) => self.expand_vertex_root(mesh, face, i),
        }
    }

    fn expand_face_root(
        &mut self,
        mesh: &HalfEdgeMesh,
        face: FaceId,
        bary: [f32; 3],
    ) -> Result<(), GeodesicError> {
        let conn = mesh.connectivity();
        let canonical = conn.face_vertices(face);
        let root_id = self.nodes.insert(blank_root(0, None));
        self.roots.push(root_id);

        for h in conn.face_edges(face) {
            let corners = face_corners(conn, h);
            let tri3 = corners.map(|c| mesh.positions()[c]);
            let layout = self.kernel.project_triangle_3_to_triangle_2(tri3);
            let local_bary = remap_bary(&canonical, &corners, bary);
            let source_image = self.kernel.construct_triangle_location_2(layout, local_bary);

            let child = ConeNode {
                kind: NodeKind::FaceSource,
                entry_edge: Some(h),
                current_face: Some(face),
                layout_face: layout,
                source_image,
                distance_from_source_to_root: 0.0,
                window_left: layout[0],
                window_right: layout[2],
                parent: Some(root_id),
                left_child: None,
                right_child: None,
                middle_children: Vec::new(),
                pending_left: None,
                pending_right: None,
                pending_middle: None,
                level: 1,
                stored_bary: Some(local_bary),
                source_vertex: None,
            };
            let child_id = self.nodes.insert(child);
            if let Some(r) = self.nodes.get_mut(root_id) {
                r.middle_children.push(child_id);
            }
            self.process_node(mesh, child_id)?;
        }
        Ok(())
    }

    /// An edge source fans out over both incident faces, and within each
    /// face needs two cones rather than one: `process_node` forces
    /// source-kind nodes to propagate left-only (§4.6), so a single cone per
    /// face only ever reaches the face's edge following its own entry edge,
    /// silently dropping the other one. Mirroring `expand_face_root`'s
    /// one-cone-per-face-edge construction, each incident face gets a second
    /// cone entering through its other non-source edge, so between the two
    /// the face's two non-entry edges are both covered.
    fn expand_edge_root(
        &mut self,
        mesh: &HalfEdgeMesh,
        face: FaceId,
        i: u8,
        bary: [f32; 3],
    ) -> Result<(), GeodesicError> {
        let conn = mesh.connectivity();
        let edges = conn.face_edges(face);
        let h = edges[(i as usize + 1) % 3];
        let t = bary[(i as usize + 2) % 3];

        let root_id = self.nodes.insert(blank_root(0, None));
        self.roots.push(root_id);

        let h_corners = face_corners(conn, h);
        let (vertex_a, vertex_b) = (h_corners[0], h_corners[2]);

        let twin = conn.at_halfedge(h).twin().try_end().ok();
        let candidates = [Some(h), twin];

        for candidate in candidates.into_iter().flatten() {
            if conn.is_boundary_halfedge(candidate) {
                continue;
            }
            let second = conn.at_halfedge(candidate).next().try_end()?;
            for entry in [candidate, second] {
                if conn.is_boundary_halfedge(entry) {
                    continue;
                }
                let corners = face_corners(conn, entry);
                let tri3 = corners.map(|c| mesh.positions()[c]);
                let layout = self.kernel.project_triangle_3_to_triangle_2(tri3);
                // The point's weight is intrinsic to the two edge endpoints
                // (1-t at `vertex_a`, t at `vertex_b`, 0 at the apex)
                // regardless of which of the face's edges is used as entry.
                let local_bary = corners.map(|c| {
                    if c == vertex_a {
                        1.0 - t
                    } else if c == vertex_b {
                        t
                    } else {
                        0.0
                    }
                });
                let source_image = self.kernel.construct_triangle_location_2(layout, local_bary);

                let child = ConeNode {
                    kind: NodeKind::EdgeSource,
                    entry_edge: Some(entry),
                    current_face: conn.at_halfedge(entry).face().try_end().ok(),
                    layout_face: layout,
                    source_image,
                    distance_from_source_to_root: 0.0,
                    window_left: layout[0],
                    window_right: layout[2],
                    parent: Some(root_id),
                    left_child: None,
                    right_child: None,
                    middle_children: Vec::new(),
                    pending_left: None,
                    pending_right: None,
                    pending_middle: None,
                    level: 1,
                    stored_bary: None,
                    source_vertex: None,
                };
                let child_id = self.nodes.insert(child);
                if let Some(r) = self.nodes.get_mut(root_id) {
                    r.middle_children.push(child_id);
                }
                self.process_node(mesh, child_id)?;
            }
        }
        Ok(())
    }

    fn expand_vertex_root(
        &mut self,
        mesh: &HalfEdgeMesh,
        face: FaceId,
        i: u8,
    ) -> Result<(), GeodesicError> {
        let conn = mesh.connectivity();
        let v = conn.face_vertices(face)[i as usize];
        let root_id = self.nodes.insert(blank_root(0, Some(v)));
        self.roots.push(root_id);
        self.closest_at_vertex
            .insert(v, ClosestAtVertex { node: root_id, distance: 0.0 });
        self.expand_pseudo_source(mesh, root_id, v, 0.0)
    }

    /* ======================= */
    /*  Pseudo-source expansion */
    /* ======================= */

    #[profiling::function]
    fn expand_pseudo_source(
        &mut self,
        mesh: &HalfEdgeMesh,
        parent_id: NodeId,
        v: VertexId,
        base_distance: f32,
    ) -> Result<(), GeodesicError> {
        let conn = mesh.connectivity();
        let parent_level = self.nodes.get(parent_id).map(|p| p.level).unwrap_or(0);

        let h0 = conn.at_vertex(v).halfedge().try_end()?;
        let mut children = Vec::new();
        for h in conn.halfedge_fan_iter(h0) {
            if conn.is_boundary_halfedge(h) {
                continue;
            }
            let entry_edge = conn.at_halfedge(h).next().try_end()?;
            let corners = face_corners(conn, entry_edge);
            let tri3 = corners.map(|c| mesh.positions()[c]);
            let layout = self.kernel.project_triangle_3_to_triangle_2(tri3);

            let child = ConeNode {
                kind: NodeKind::VertexSource,
                entry_edge: Some(entry_edge),
                current_face: conn.at_halfedge(entry_edge).face().try_end().ok(),
                layout_face: layout,
                source_image: layout[1],
                distance_from_source_to_root: base_distance,
                window_left: layout[0],
                window_right: layout[2],
                parent: Some(parent_id),
                left_child: None,
                right_child: None,
                middle_children: Vec::new(),
                pending_left: None,
                pending_right: None,
                pending_middle: None,
                level: parent_level + 1,
                stored_bary: None,
                source_vertex: Some(v),
            };
            let id = self.nodes.insert(child);
            children.push(id);
        }

        if let Some(p) = self.nodes.get_mut(parent_id) {
            p.middle_children.extend(children.iter().copied());
            p.pending_middle = None;
        }
        for child in children {
            self.process_node(mesh, child)?;
        }
        Ok(())
    }

    fn expand_pseudo_source_event(
        &mut self,
        mesh: &HalfEdgeMesh,
        n_id: NodeId,
    ) -> Result<(), GeodesicError> {
        let Some(n) = self.nodes.get(n_id).cloned() else {
            return Ok(());
        };
        let entry_edge = n.entry_edge.ok_or(GeodesicError::DegeneratePropagation)?;
        let conn = mesh.connectivity();
        let target_vertex = conn.at_halfedge(entry_edge).next().next().vertex().try_end()?;
        let base_distance = n.distance_from_target_to_root(n.layout_face[1]);
        self.expand_pseudo_source(mesh, n_id, target_vertex, base_distance)
    }

    /* ================ */
    /*  Child expansion */
    /* ================ */

    fn crossed_edge(
        &self,
        conn: &MeshConnectivity,
        n: &ConeNode,
        side: Side,
    ) -> Result<Option<crate::mesh::halfedge::HalfEdgeId>, GeodesicError> {
        let Some(entry_edge) = n.entry_edge else {
            return Ok(None);
        };
        let h = match side {
            Side::Left => conn.at_halfedge(entry_edge).next().twin().try_end(),
            Side::Right => conn.at_halfedge(entry_edge).next().next().twin().try_end(),
        };
        let h = match h {
            Ok(h) => h,
            Err(_) => return Ok(None),
        };
        if conn.is_boundary_halfedge(h) {
            Ok(None)
        } else {
            Ok(Some(h))
        }
    }

    fn base_segment(n: &ConeNode, side: Side) -> (Vec2, Vec2, Vec2) {
        match side {
            Side::Left => (n.layout_face[1], n.layout_face[2], n.layout_face[0]),
            Side::Right => (n.layout_face[0], n.layout_face[1], n.layout_face[2]),
        }
    }

    fn clip_window(
        &self,
        conn: &MeshConnectivity,
        n: &ConeNode,
        side: Side,
    ) -> Result<Option<(Vec2, Vec2)>, GeodesicError> {
        if self.crossed_edge(conn, n, side)?.is_none() {
            return Ok(None);
        }
        let (seg_a, seg_b, _away) = Self::base_segment(n, side);
        let clipped_a = self
            .kernel
            .intersect_segment_ray((seg_a, seg_b), n.source_image, n.window_left)
            .unwrap_or(seg_a);
        let clipped_b = self
            .kernel
            .intersect_segment_ray((seg_a, seg_b), n.source_image, n.window_right)
            .unwrap_or(seg_b);

        if (clipped_a - clipped_b).length_squared() <= self.config.tolerance * self.config.tolerance
        {
            return Ok(None);
        }
        Ok(Some((clipped_a, clipped_b)))
    }

    fn side_vertices(
        conn: &MeshConnectivity,
        n: &ConeNode,
        side: Side,
    ) -> Result<(VertexId, VertexId, VertexId), GeodesicError> {
        let entry_edge = n.entry_edge.ok_or(GeodesicError::DegeneratePropagation)?;
        let src = conn.at_halfedge(entry_edge).vertex().try_end()?;
        let dst = conn.at_halfedge(entry_edge).next().vertex().try_end()?;
        let apex = conn.at_halfedge(entry_edge).next().next().vertex().try_end()?;
        Ok(match side {
            Side::Left => (apex, src, dst),
            Side::Right => (src, dst, apex),
        })
    }

    /// The Xin-Wang dominance filter (see the distance-filter component
    /// design): prunes a candidate child window when any of its three
    /// relevant vertices already has a known shorter alternative route.
    fn is_dominated(
        &self,
        n: &ConeNode,
        side: Side,
        v1: VertexId,
        v2: VertexId,
        v3: VertexId,
        a: Vec2,
        b: Vec2,
    ) -> bool {
        let d = n.distance_from_source_to_root;
        let i = n.source_image;
        let (v1_img, v2_img, v3_img) = match side {
            Side::Left => (n.layout_face[1], n.layout_face[0], n.layout_face[2]),
            Side::Right => (n.layout_face[0], n.layout_face[2], n.layout_face[1]),
        };

        let dist = |p: Vec2, q: Vec2| (p - q).length();

        if let Some(c) = self.closest_at_vertex.get(v1) {
            if d + dist(i, b) > c.distance + dist(v1_img, b) {
                return true;
            }
        }
        if let Some(c) = self.closest_at_vertex.get(v2) {
            if d + dist(i, a) > c.distance + dist(v2_img, a) {
                return true;
            }
        }
        if let Some(c) = self.closest_at_vertex.get(v3) {
            if d + dist(i, a) > c.distance + dist(v3_img, a) {
                return true;
            }
        }
        false
    }

    #[profiling::function]
    fn expand_side_child(
        &mut self,
        mesh: &HalfEdgeMesh,
        parent_id: NodeId,
        side: Side,
    ) -> Result<(), GeodesicError> {
        let Some(parent) = self.nodes.get(parent_id).cloned() else {
            return Ok(());
        };
        let conn = mesh.connectivity();

        let Some(crossed_edge) = self.crossed_edge(conn, &parent, side)? else {
            return Ok(());
        };
        let Some((a, b)) = self.clip_window(conn, &parent, side)? else {
            return Ok(());
        };

        let (v1, v2, v3) = Self::side_vertices(conn, &parent, side)?;
        if self.is_dominated(&parent, side, v1, v2, v3, a, b) {
            return Ok(());
        }

        let (seg_a, seg_b, away_from) = Self::base_segment(&parent, side);
        let corners = face_corners(conn, crossed_edge);
        let tri3 = corners.map(|c| mesh.positions()[c]);
        let layout = self.kernel.flatten_triangle_3_along_segment_2(
            tri3,
            (0, 2),
            (seg_a, seg_b),
            away_from,
        )?;

        let child = ConeNode {
            kind: NodeKind::Interval,
            entry_edge: Some(crossed_edge),
            current_face: conn.at_halfedge(crossed_edge).face().try_end().ok(),
            layout_face: layout,
            source_image: parent.source_image,
            distance_from_source_to_root: parent.distance_from_source_to_root,
            window_left: a,
            window_right: b,
            parent: Some(parent_id),
            left_child: None,
            right_child: None,
            middle_children: Vec::new(),
            pending_left: None,
            pending_right: None,
            pending_middle: None,
            level: parent.level + 1,
            stored_bary: None,
            source_vertex: None,
        };
        let child_id = self.nodes.insert(child);
        if let Some(p) = self.nodes.get_mut(parent_id) {
            match side {
                Side::Left => {
                    p.left_child = Some(child_id);
                    p.pending_left = None;
                }
                Side::Right => {
                    p.right_child = Some(child_id);
                    p.pending_right = None;
                }
            }
        }
        self.process_node(mesh, child_id)
    }

    /* ============================ */
    /*  Process node (arbitration)  */
    /* ============================ */

    #[profiling::function]
    fn process_node(&mut self, mesh: &HalfEdgeMesh, n_id: NodeId) -> Result<(), GeodesicError> {
        let Some(n) = self.nodes.get(n_id).cloned() else {
            return Ok(());
        };
        if n.level >= self.face_count.max(1) {
            return Ok(());
        }
        let Some(entry_edge) = n.entry_edge else {
            return Ok(());
        };
        let conn = mesh.connectivity();

        let left_window = self.clip_window(conn, &n, Side::Left)?;
        let right_window = self.clip_window(conn, &n, Side::Right)?;
        let left_side = left_window.is_some();
        let right_side = right_window.is_some();
        let is_source_kind = n.kind != NodeKind::Interval;

        let mut propagate_left = false;
        let mut propagate_right = false;
        let mut propagate_middle = false;

        if is_source_kind || (left_side && right_side) {
            let target_vertex = conn.at_halfedge(entry_edge).next().next().vertex().try_end()?;
            let target_image = n.layout_face[1];
            let d_new = n.distance_from_target_to_root(target_image);

            let existing = self.occupier.get(entry_edge).copied();
            let is_left_of_current = match existing {
                Some(occ) => self.compare_occupier_side(&n, occ.node, entry_edge),
                None => true,
            };
            let wins = existing.map_or(true, |occ| occ.distance > d_new);

            if wins {
                propagate_left = true;
                propagate_right = true;
                if is_source_kind {
                    propagate_right = false;
                }
                // A null-face-targeting pseudo-source would also suppress
                // left propagation, but `expand_pseudo_source` never creates
                // one: its fan skips boundary halfedges outright, so every
                // `VertexSource` it builds already has a real `current_face`.

                if let Some(occ) = existing {
                    self.evict_side(occ.node, is_left_of_current);
                }
                self.occupier
                    .insert(entry_edge, Occupier { node: n_id, distance: d_new });

                let improves = self
                    .closest_at_vertex
                    .get(target_vertex)
                    .map_or(true, |c| c.distance > d_new);
                if improves {
                    let target_is_pseudo = self
                        .is_pseudo_source
                        .get(target_vertex)
                        .copied()
                        .unwrap_or(false);
                    if target_is_pseudo {
                        if let Some(prev) = self.closest_at_vertex.get(target_vertex).copied() {
                            self.evict_middle_fan(prev.node);
                        }
                        propagate_middle = true;
                    }
                    self.closest_at_vertex
                        .insert(target_vertex, ClosestAtVertex { node: n_id, distance: d_new });
                }
            } else {
                if is_left_of_current {
                    propagate_left = true;
                } else if !is_source_kind {
                    propagate_right = true;
                }
            }
        } else {
            propagate_left = left_side;
            propagate_right = right_side;
        }

        if propagate_left {
            self.push_left_child(mesh, n_id)?;
        }
        if propagate_right {
            self.push_right_child(mesh, n_id)?;
        }
        if propagate_middle {
            self.push_middle_child(n_id)?;
        }
        Ok(())
    }

    /// Compares the arrival order of `n` against the current occupier of
    /// `entry_edge` by bringing the occupier's source image into `n`'s own
    /// unfolded frame (both nodes share the same entry edge, hence the same
    /// two reference points, so a single rigid alignment suffices) and
    /// comparing where each node's ray to the target vertex crosses the
    /// shared entry segment.
    fn compare_occupier_side(
        &self,
        n: &ConeNode,
        occ_id: NodeId,
        _entry_edge: crate::mesh::halfedge::HalfEdgeId,
    ) -> bool {
        let Some(occ) = self.nodes.get(occ_id) else {
            return true;
        };

        let entry_seg = (n.layout_face[0], n.layout_face[2]);
        let occ_source_in_n_frame = rigid_align(
            occ.layout_face[0],
            occ.layout_face[2],
            n.layout_face[0],
            n.layout_face[2],
            occ.source_image,
        );
        let occ_target_in_n_frame = rigid_align(
            occ.layout_face[0],
            occ.layout_face[2],
            n.layout_face[0],
            n.layout_face[2],
            occ.layout_face[1],
        );

        let line_n = (n.source_image, n.layout_face[1]);
        let line_occ = (occ_source_in_n_frame, occ_target_in_n_frame);

        match self
            .kernel
            .compare_relative_intersection_along_segment_2(entry_seg, line_n, entry_seg, line_occ)
        {
            RelativeOrder::Smaller => true,
            RelativeOrder::Larger => false,
            RelativeOrder::Equal => match (n.kind, occ.kind) {
                (NodeKind::VertexSource, _) => false,
                (_, NodeKind::VertexSource) => true,
                _ => true,
            },
        }
    }

    fn evict_side(&mut self, node_id: NodeId, left: bool) {
        let (child, pending) = match self.nodes.get(node_id) {
            Some(node) if left => (node.left_child, node.pending_left),
            Some(node) => (node.right_child, node.pending_right),
            None => return,
        };
        if let Some(p) = pending {
            self.queue.cancel(p);
        }
        if let Some(c) = child {
            self.destroy_subtree(c);
        }
        if let Some(node) = self.nodes.get_mut(node_id) {
            if left {
                node.left_child = None;
                node.pending_left = None;
            } else {
                node.right_child = None;
                node.pending_right = None;
            }
        }
    }

    fn evict_middle_fan(&mut self, node_id: NodeId) {
        let (middle, pending) = match self.nodes.get_mut(node_id) {
            Some(node) => (std::mem::take(&mut node.middle_children), node.pending_middle.take()),
            None => return,
        };
        if let Some(p) = pending {
            self.queue.cancel(p);
        }
        for c in middle {
            self.destroy_subtree(c);
        }
    }

    /// Recursively destroys a node and every descendant, cancelling all
    /// pending events along the way. The only safe reference a cancelled
    /// event retains is its `cancelled` flag; nothing dereferences the node
    /// after this call.
    fn destroy_subtree(&mut self, node_id: NodeId) {
        let Some(node) = self.nodes.remove(node_id) else {
            return;
        };
        if let Some(p) = node.pending_left {
            self.queue.cancel(p);
        }
        if let Some(p) = node.pending_right {
            self.queue.cancel(p);
        }
        if let Some(p) = node.pending_middle {
            self.queue.cancel(p);
        }
        if let Some(c) = node.left_child {
            self.destroy_subtree(c);
        }
        if let Some(c) = node.right_child {
            self.destroy_subtree(c);
        }
        for c in node.middle_children {
            self.destroy_subtree(c);
        }
    }

    /* ================ */
    /*  Pushing events  */
    /* ================ */

    fn push_left_child(&mut self, mesh: &HalfEdgeMesh, n_id: NodeId) -> Result<(), GeodesicError> {
        self.push_side_child(mesh, n_id, Side::Left)
    }

    fn push_right_child(&mut self, mesh: &HalfEdgeMesh, n_id: NodeId) -> Result<(), GeodesicError> {
        self.push_side_child(mesh, n_id, Side::Right)
    }

    fn push_side_child(
        &mut self,
        mesh: &HalfEdgeMesh,
        n_id: NodeId,
        side: Side,
    ) -> Result<(), GeodesicError> {
        let conn = mesh.connectivity();
        let Some(n) = self.nodes.get(n_id).cloned() else {
            return Ok(());
        };
        let Some((a, b)) = self.clip_window(conn, &n, side)? else {
            return Ok(());
        };
        let d = n.distance_from_source_to_root;
        let estimate =
            (d + (n.source_image - a).length()).min(d + (n.source_image - b).length());
        let kind = match side {
            Side::Left => EventKind::LeftChild,
            Side::Right => EventKind::RightChild,
        };
        let event = self.queue.push(n_id, estimate, kind);
        if let Some(node) = self.nodes.get_mut(n_id) {
            match side {
                Side::Left => node.pending_left = Some(event),
                Side::Right => node.pending_right = Some(event),
            }
        }
        Ok(())
    }

    fn push_middle_child(&mut self, n_id: NodeId) -> Result<(), GeodesicError> {
        let Some(n) = self.nodes.get(n_id).cloned() else {
            return Ok(());
        };
        let estimate = n.distance_from_target_to_root(n.layout_face[1]);
        let event = self.queue.push(n_id, estimate, EventKind::PseudoSource);
        if let Some(node) = self.nodes.get_mut(n_id) {
            node.pending_middle = Some(event);
        }
        Ok(())
    }
}

fn blank_root(level: usize, source_vertex: Option<VertexId>) -> ConeNode {
    ConeNode {
        kind: NodeKind::Root,
        entry_edge: None,
        current_face: None,
        layout_face: [Vec2::ZERO; 3],
        source_image: Vec2::ZERO,
        distance_from_source_to_root: 0.0,
        window_left: Vec2::ZERO,
        window_right: Vec2::ZERO,
        parent: None,
        left_child: None,
        right_child: None,
        middle_children: Vec::new(),
        pending_left: None,
        pending_right: None,
        pending_middle: None,
        level,
        stored_bary: None,
        source_vertex,
    }
}

/// The three vertices of the face entered by `h`, ordered `[source(h),
/// apex, target(h)]` to match the cone tree's `layout_face` convention
/// (corner 0 = `source(entry_edge)`, corner 1 = the third corner, corner 2 =
/// `target(entry_edge)`).
pub(crate) fn face_corners(
    conn: &MeshConnectivity,
    h: crate::mesh::halfedge::HalfEdgeId,
) -> [VertexId; 3] {
    let src = conn.at_halfedge(h).vertex().end();
    let dst = conn.at_halfedge(h).next().vertex().end();
    let apex = conn.at_halfedge(h).next().next().vertex().end();
    [src, apex, dst]
}

pub(crate) fn remap_bary(canonical: &[VertexId], corners: &[VertexId; 3], bary: [f32; 3]) -> [f32; 3] {
    let mut out = [0.0; 3];
    for (i, &v) in corners.iter().enumerate() {
        if let Some(idx) = canonical.iter().position(|&c| c == v) {
            out[i] = bary[idx];
        }
    }
    out
}

fn is_boundary_vertex(conn: &MeshConnectivity, v: VertexId) -> Result<bool, GeodesicError> {
    let outgoing = conn.at_vertex(v).outgoing_halfedges()?;
    for h in outgoing {
        if conn.is_boundary_halfedge(h) {
            return Ok(true);
        }
        if let Ok(t) = conn.at_halfedge(h).twin().try_end() {
            if conn.is_boundary_halfedge(t) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Maps `p`, expressed relative to the frame spanned by `(from0, from1)`, into
/// the frame spanned by `(to0, to1)`, via the unique orientation-preserving
/// similarity transform taking `from0 -> to0` and `from1 -> to1`. Used to
/// compare two cone tree nodes that independently unfolded the same shared
/// face: both place that face's edge endpoints consistently, so this
/// transform brings one node's source image into the other's coordinate
/// frame for a direct geometric comparison.
fn rigid_align(from0: Vec2, from1: Vec2, to0: Vec2, to1: Vec2, p: Vec2) -> Vec2 {
    let from_d = from1 - from0;
    let to_d = to1 - to0;
    let from_len = from_d.length();
    if from_len <= 1e-9 {
        return to0;
    }
    let to_len = to_d.length();
    let scale = to_len / from_len;
    let from_angle = from_d.y.atan2(from_d.x);
    let to_angle = to_d.y.atan2(to_d.x);
    let rot = to_angle - from_angle;
    let (s, c) = rot.sin_cos();
    let rel = p - from0;
    let rotated = Vec2::new(rel.x * c - rel.y * s, rel.x * s + rel.y * c) * scale;
    to0 + rotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::halfedge::primitives::{open_disk, tetrahedron};

    #[test]
    fn single_vertex_source_reaches_every_other_vertex() {
        let mesh = tetrahedron(1.0).unwrap();
        let conn = mesh.connectivity();
        let (source_vertex, _) = conn.iter_vertices().next().unwrap();
        let face = conn
            .iter_faces()
            .find(|(f, _)| conn.face_vertices(*f).contains(&source_vertex))
            .unwrap()
            .0;
        let verts = conn.face_vertices(face);
        let i = verts.iter().position(|&v| v == source_vertex).unwrap();
        let mut bary = [0.0f32; 3];
        bary[i] = 1.0;

        let mut engine = GeodesicEngine::new(GeodesicConfig::default());
        engine.compute_shortest_paths(&mesh, [(face, bary)]).unwrap();

        for (v, _) in conn.iter_vertices() {
            if v == source_vertex {
                continue;
            }
            let d = engine.shortest_distance_to_vertex(v).unwrap();
            assert!(d.is_finite());
            assert!(d > 0.0);
        }
    }

    #[test]
    fn rejects_non_triangulated_mesh() {
        let positions = [
            glam::Vec3::ZERO,
            glam::Vec3::X,
            glam::Vec3::Y,
            glam::Vec3::new(1.0, 1.0, 0.0),
        ];
        let polygons: [[u32; 4]; 1] = [[0, 1, 3, 2]];
        let mesh = HalfEdgeMesh::build_from_polygons(&positions, &polygons);
        assert!(mesh.is_err());
    }

    // Every vertex touching an open boundary must be flagged as a pseudo
    // source during reset, since the Chen-Han construction has to fire a fan
    // expansion there regardless of angle defect.
    #[test]
    fn boundary_vertices_are_marked_pseudo_source() {
        let mesh = open_disk(glam::Vec3::ZERO, 1.0, 6).unwrap();
        let conn = mesh.connectivity();

        let hub = conn
            .iter_vertices()
            .find(|(v, _)| mesh.positions()[*v].length() < 1e-5)
            .unwrap()
            .0;
        let face = conn
            .iter_faces()
            .find(|(f, _)| conn.face_vertices(*f).contains(&hub))
            .unwrap()
            .0;
        let verts = conn.face_vertices(face);
        let i = verts.iter().position(|&v| v == hub).unwrap();
        let mut bary = [0.0f32; 3];
        bary[i] = 1.0;

        let mut engine = GeodesicEngine::new(GeodesicConfig::default());
        engine.compute_shortest_paths(&mesh, [(face, bary)]).unwrap();

        for (h, _) in conn.iter_halfedges() {
            if conn.is_boundary_halfedge(h) {
                let v = conn.at_halfedge(h).vertex().try_end().unwrap();
                assert_eq!(
                    engine.is_pseudo_source.get(v).copied(),
                    Some(true),
                    "boundary vertex not marked as pseudo source"
                );
            }
        }
    }
}
