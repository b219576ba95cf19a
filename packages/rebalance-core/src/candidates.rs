//! Candidate orderings for a planning round.
//!
//! Two finite, consumed-once iterators drive each round:
//!
//! - [`LargeItems`]: items to push *off* full nodes — fullest node first,
//!   largest item first
//! - [`SmallItems`]: swap partners to pull *from* empty nodes — emptiest
//!   node first, smallest item first
//!
//! Both walk the node order produced by [`resort`] and skip items that have
//! already moved in this pass. Both carry an early-stop predicate: once the
//! utilization gap (or the node position, for [`SmallItems`]) shows that no
//! remaining pair can qualify, iteration ends rather than scanning the
//! tail.

use crate::placement::{ItemId, NodeId, Placement};

/// Refreshes per-node sort order and the node ranking for a new round.
///
/// Each node's planned items are re-sorted by size descending (with the
/// cached `planned_used` recomputed), then `order` is sorted by planned
/// fractional utilization descending. Both sorts are stable, so ties keep
/// their previous relative order and the pass stays deterministic.
pub fn resort(placement: &mut Placement, order: &mut [NodeId]) {
    placement.planned_sort();
    order.sort_by(|&a, &b| {
        placement
            .node(b)
            .planned_fraction_used()
            .total_cmp(&placement.node(a).planned_fraction_used())
    });
}

// ---------------------------------------------------------------------------
// LargeItems
// ---------------------------------------------------------------------------

/// Iterator over relocation candidates, highest priority first.
///
/// Walks `order` from the fullest node down, yielding each node's unmoved
/// items largest-first. Stops for good once the current node's utilization
/// is within `node_fraction_threshold` of the emptiest node's: every node
/// after it is at most as full, so no remaining pair can be far enough
/// apart to exchange anything.
pub struct LargeItems<'a> {
    placement: &'a Placement,
    order: &'a [NodeId],
    node_fraction_threshold: f64,
    node_idx: usize,
    item_idx: usize,
    done: bool,
}

impl<'a> LargeItems<'a> {
    #[must_use]
    pub fn new(placement: &'a Placement, order: &'a [NodeId], node_fraction_threshold: f64) -> Self {
        Self {
            placement,
            order,
            node_fraction_threshold,
            node_idx: 0,
            item_idx: 0,
            done: false,
        }
    }
}

impl Iterator for LargeItems<'_> {
    type Item = ItemId;

    fn next(&mut self) -> Option<ItemId> {
        if self.done {
            return None;
        }
        let emptiest = *self.order.last()?;
        loop {
            let Some(&node_id) = self.order.get(self.node_idx) else {
                self.done = true;
                return None;
            };
            if self.item_idx == 0 {
                let gap = (self.placement.node(emptiest).planned_fraction_used()
                    - self.placement.node(node_id).planned_fraction_used())
                .abs();
                if gap < self.node_fraction_threshold {
                    self.done = true;
                    return None;
                }
            }
            let items = self.placement.node(node_id).planned_items();
            while let Some(&item) = items.get(self.item_idx) {
                self.item_idx += 1;
                if !self.placement.item(item).has_moved() {
                    return Some(item);
                }
            }
            self.node_idx += 1;
            self.item_idx = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// SmallItems
// ---------------------------------------------------------------------------

/// Iterator over swap partners for an item leaving `large_node`, highest
/// priority first.
///
/// Walks `order` from the emptiest node up, yielding each node's unmoved
/// items smallest-first. Stops on reaching `large_node`: every node past it
/// is at least as full, so no partner there could help.
pub struct SmallItems<'a> {
    placement: &'a Placement,
    order: &'a [NodeId],
    large_node: NodeId,
    node_rev_idx: usize,
    item_rev_idx: usize,
    done: bool,
}

impl<'a> SmallItems<'a> {
    #[must_use]
    pub fn new(placement: &'a Placement, order: &'a [NodeId], large_node: NodeId) -> Self {
        Self {
            placement,
            order,
            large_node,
            node_rev_idx: 0,
            item_rev_idx: 0,
            done: false,
        }
    }
}

impl Iterator for SmallItems<'_> {
    type Item = ItemId;

    fn next(&mut self) -> Option<ItemId> {
        if self.done {
            return None;
        }
        loop {
            let Some(pos) = self.order.len().checked_sub(1 + self.node_rev_idx) else {
                self.done = true;
                return None;
            };
            let node_id = self.order[pos];
            if node_id == self.large_node {
                self.done = true;
                return None;
            }
            let items = self.placement.node(node_id).planned_items();
            while self.item_rev_idx < items.len() {
                let item = items[items.len() - 1 - self.item_rev_idx];
                self.item_rev_idx += 1;
                if !self.placement.item(item).has_moved() {
                    return Some(item);
                }
            }
            self.node_rev_idx += 1;
            self.item_rev_idx = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
