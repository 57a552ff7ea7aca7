// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The cone tree (window tree): nodes are stored in a slotmap arena and refer
//! to each other through `NodeId` keys, the same pattern the mesh uses for
//! `VertexId`/`FaceId`/`HalfEdgeId` — never through `Rc`/`RefCell` cycles.

use glam::Vec2;
use slotmap::SlotMap;

use crate::event_queue::EventId;
use crate::mesh::halfedge::{FaceId, HalfEdgeId, VertexId};

slotmap::new_key_type! { pub struct NodeId; }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    FaceSource,
    EdgeSource,
    VertexSource,
    Interval,
}

/// A single cone tree node: one unfolded window of shortest paths sharing a
/// common `source_image` and entry edge.
#[derive(Debug, Clone)]
pub struct ConeNode {
    pub kind: NodeKind,

    /// The halfedge this cone enters its current face across. `None` only
    /// for the synthetic root of a vertex source, which has no single entry
    /// edge until its pseudo-source fan is expanded.
    pub entry_edge: Option<HalfEdgeId>,
    pub current_face: Option<FaceId>,

    /// The unfolded 2D triangle of `current_face`: corner 0 = source of
    /// `entry_edge`, corner 2 = target of `entry_edge`, corner 1 the third
    /// corner.
    pub layout_face: [Vec2; 3],

    pub source_image: Vec2,
    pub distance_from_source_to_root: f32,

    pub window_left: Vec2,
    pub window_right: Vec2,

    pub parent: Option<NodeId>,
    pub left_child: Option<NodeId>,
    pub right_child: Option<NodeId>,
    pub middle_children: Vec<NodeId>,

    pub pending_left: Option<EventId>,
    pub pending_right: Option<EventId>,
    pub pending_middle: Option<EventId>,

    pub level: usize,

    /// For `FaceSource` roots only: the original query bary used to locate
    /// the source inside the face, needed to terminate reconstruction.
    pub stored_bary: Option<[f32; 3]>,
    /// For `VertexSource`/pseudo-source fans: the vertex this node fans out
    /// from.
    pub source_vertex: Option<VertexId>,
}

impl ConeNode {
    pub fn target_vertex(&self) -> Option<VertexId> {
        self.source_vertex.filter(|_| self.entry_edge.is_none())
    }

    pub fn distance_from_target_to_root(&self, target_image: Vec2) -> f32 {
        self.distance_from_source_to_root + (self.source_image - target_image).length()
    }
}

/// Arena owning every live cone tree node. Indexed by `NodeId`, a slotmap
/// generational key, so a stale reference to an evicted node fails a lookup
/// instead of reading freed memory.
#[derive(Debug, Clone, Default)]
pub struct ConeTreeArena {
    nodes: SlotMap<NodeId, ConeNode>,
}

impl ConeTreeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: ConeNode) -> NodeId {
        self.nodes.insert(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&ConeNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut ConeNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn remove(&mut self, id: NodeId) -> Option<ConeNode> {
        self.nodes.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ConeNode)> {
        self.nodes.iter()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Minimal node constructors shared by this module's tests and by other
/// modules' tests that need a `ConeNode`/`NodeId` to exercise without
/// building a full mesh (e.g. `event_queue`'s queue-ordering tests).
#[cfg(test)]
pub mod test_fixtures {
    use super::*;

    pub fn blank_node() -> ConeNode {
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
            level: 0,
            stored_bary: None,
            source_vertex: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::blank_node;
    use super::*;

    #[test]
    fn arena_insert_get_remove_round_trips() {
        let mut arena = ConeTreeArena::new();
        let id = arena.insert(blank_node());
        assert!(arena.contains(id));
        assert_eq!(arena.get(id).unwrap().kind, NodeKind::Root);
        arena.remove(id);
        assert!(!arena.contains(id));
        assert!(arena.get(id).is_none());
    }

    #[test]
    fn distance_from_target_to_root_adds_euclidean_offset() {
        let mut node = blank_node();
        node.source_image = Vec2::new(0.0, 0.0);
        node.distance_from_source_to_root = 1.0;
        let target_image = Vec2::new(3.0, 4.0);
        assert!((node.distance_from_target_to_root(target_image) - 6.0).abs() < 1e-5);
    }
}
