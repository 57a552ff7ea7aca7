// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The event queue driving propagation order: a min-heap keyed by distance
//! estimate, with logical (lazy) cancellation instead of decrease-key —
//! exactly the tradeoff the distilled design calls for. Ordering reuses the
//! teacher's `FloatOrd`-based approach to making `f32` comparable
//! (`common_math.rs::Vec3Ord`), rather than a hand-rolled `Ord` impl on `f32`.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use float_ord::FloatOrd;
use slotmap::SlotMap;

use crate::cone_tree::NodeId;

slotmap::new_key_type! { pub struct EventId; }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    LeftChild,
    RightChild,
    PseudoSource,
}

#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub node: NodeId,
    pub distance_estimate: f32,
    pub kind: EventKind,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapKey {
    distance: FloatOrd<f32>,
    id: EventId,
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance.cmp(&other.distance)
    }
}

/// A min-priority queue of propagation events with lazy cancellation. Events
/// are never removed from the heap on cancellation — only the arena entry's
/// `cancelled` flag is flipped. The entry is freed once the heap naturally
/// dequeues it, per the design note against attempting decrease-key.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<HeapKey>>,
    events: SlotMap<EventId, Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: NodeId, distance_estimate: f32, kind: EventKind) -> EventId {
        let id = self.events.insert(Event {
            node,
            distance_estimate,
            kind,
            cancelled: false,
        });
        self.heap.push(Reverse(HeapKey {
            distance: FloatOrd(distance_estimate),
            id,
        }));
        id
    }

    /// Flips the cancelled flag on a still-queued event. A no-op if the event
    /// was already dequeued (and thus freed).
    pub fn cancel(&mut self, id: EventId) {
        if let Some(event) = self.events.get_mut(id) {
            event.cancelled = true;
        }
    }

    /// Pops events off the heap until finding one that was not cancelled, or
    /// the heap is exhausted. Cancelled events are discarded silently; this
    /// is where their arena slot is actually freed.
    pub fn pop(&mut self) -> Option<Event> {
        while let Some(Reverse(key)) = self.heap.pop() {
            if let Some(event) = self.events.remove(key.id) {
                if !event.cancelled {
                    return Some(event);
                }
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cone_tree::ConeTreeArena;
    use crate::cone_tree::test_fixtures::blank_node;

    #[test]
    fn pops_in_nondecreasing_distance_order() {
        let mut arena = ConeTreeArena::new();
        let n = arena.insert(blank_node());
        let mut q = EventQueue::new();
        q.push(n, 3.0, EventKind::LeftChild);
        q.push(n, 1.0, EventKind::RightChild);
        q.push(n, 2.0, EventKind::PseudoSource);

        let mut order = Vec::new();
        while let Some(e) = q.pop() {
            order.push(e.distance_estimate);
        }
        assert_eq!(order, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn cancelled_events_are_skipped() {
        let mut arena = ConeTreeArena::new();
        let n = arena.insert(blank_node());
        let mut q = EventQueue::new();
        let id_a = q.push(n, 1.0, EventKind::LeftChild);
        q.push(n, 2.0, EventKind::RightChild);

        q.cancel(id_a);

        let e = q.pop().unwrap();
        assert_eq!(e.kind, EventKind::RightChild);
        assert!(q.pop().is_none());
    }
}
