//! The placement model: nodes, items, and the move primitive.
//!
//! Nodes and items live in arena vectors owned by [`Placement`]; [`NodeId`]
//! and [`ItemId`] are stable indexes into them. Items hold their owner as a
//! `NodeId` and nodes hold their residents as `ItemId` lists, so the two-way
//! item/node link never forms a cyclic ownership structure and structural
//! invariants (every item resides in exactly one node's list) stay cheap to
//! check.
//!
//! Two views of residency exist side by side: `initial_items` is the
//! placement as observed in the cluster, `planned_items` is the placement
//! under the in-progress plan. [`Placement::begin_plan`] resets the planned
//! view to the initial one; [`Placement::move_item`] mutates only the
//! planned view.

use crate::constraint::PlacementConstraint;
use crate::error::PlanError;

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// Stable index of a node within a [`Placement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of this node in the arena, for parallel side tables.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Stable index of an item within a [`Placement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(usize);

impl ItemId {
    /// Position of this item in the arena, for parallel side tables.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A storage node with a fixed capacity and a mutable item list.
#[derive(Debug, Clone)]
pub struct Node {
    capacity: u64,
    initial_items: Vec<ItemId>,
    planned_items: Vec<ItemId>,
    planned_used: u64,
}

impl Node {
    /// Capacity in the common size unit.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Items originally resident on this node.
    #[must_use]
    pub fn initial_items(&self) -> &[ItemId] {
        &self.initial_items
    }

    /// Items resident on this node under the in-progress plan.
    #[must_use]
    pub fn planned_items(&self) -> &[ItemId] {
        &self.planned_items
    }

    /// Cached sum of planned item sizes, refreshed on
    /// [`Placement::planned_sort`].
    #[must_use]
    pub fn planned_used(&self) -> u64 {
        self.planned_used
    }

    /// Planned fractional utilization, `planned_used / capacity`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // disk sizes are far below 2^52
    pub fn planned_fraction_used(&self) -> f64 {
        self.planned_used as f64 / self.capacity as f64
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// A sized item resident on a node, relocatable by the planner.
#[derive(Debug, Clone)]
pub struct Item {
    size: u64,
    initial_owner: NodeId,
    planned_owner: Option<NodeId>,
}

impl Item {
    /// On-disk size in the common size unit.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The node this item started on.
    #[must_use]
    pub fn initial_owner(&self) -> NodeId {
        self.initial_owner
    }

    /// The node the planner decided to move this item to, if any.
    #[must_use]
    pub fn planned_owner(&self) -> Option<NodeId> {
        self.planned_owner
    }

    /// The planned owner if moved, otherwise the initial owner.
    #[must_use]
    pub fn current_owner(&self) -> NodeId {
        self.planned_owner.unwrap_or(self.initial_owner)
    }

    /// Whether the planner has already relocated this item. Once true it
    /// stays true for the rest of the planning pass.
    #[must_use]
    pub fn has_moved(&self) -> bool {
        self.planned_owner.is_some()
    }
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// Arena of nodes and items plus the ownership links between them.
#[derive(Debug, Clone, Default)]
pub struct Placement {
    nodes: Vec<Node>,
    items: Vec<Item>,
}

impl Placement {
    /// Creates an empty placement.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero: fractional utilization is undefined
    /// for a node without capacity.
    pub fn add_node(&mut self, capacity: u64) -> NodeId {
        assert!(capacity > 0, "node capacity must be positive");
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            capacity,
            initial_items: Vec::new(),
            planned_items: Vec::new(),
            planned_used: 0,
        });
        id
    }

    /// Adds an item of the given size, initially resident on `owner`.
    ///
    /// # Panics
    ///
    /// Panics if `owner` is not a node of this placement.
    pub fn add_item(&mut self, owner: NodeId, size: u64) -> ItemId {
        let id = ItemId(self.items.len());
        self.items.push(Item {
            size,
            initial_owner: owner,
            planned_owner: None,
        });
        self.nodes[owner.0].initial_items.push(id);
        id
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    #[must_use]
    pub fn item(&self, id: ItemId) -> &Item {
        &self.items[id.0]
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn item_ids(&self) -> impl Iterator<Item = ItemId> {
        (0..self.items.len()).map(ItemId)
    }

    /// Resets the planned view to the initial placement and validates the
    /// structural invariants.
    ///
    /// Every item must appear in exactly one node's initial list, and that
    /// node must be the item's `initial_owner`. A violation means the
    /// caller assembled the graph inconsistently and planning aborts.
    ///
    /// # Errors
    ///
    /// [`PlanError::OwnerMismatch`] or [`PlanError::NotExactlyOnce`] on an
    /// inconsistent graph.
    pub fn begin_plan(&mut self) -> Result<(), PlanError> {
        let mut seen = vec![0usize; self.items.len()];
        for (node_idx, node) in self.nodes.iter().enumerate() {
            for &item in &node.initial_items {
                seen[item.0] += 1;
                if self.items[item.0].initial_owner != NodeId(node_idx) {
                    return Err(PlanError::OwnerMismatch {
                        item,
                        listed_by: NodeId(node_idx),
                        owner: self.items[item.0].initial_owner,
                    });
                }
            }
        }
        if let Some((idx, &count)) = seen.iter().enumerate().find(|&(_, &c)| c != 1) {
            return Err(PlanError::NotExactlyOnce {
                item: ItemId(idx),
                count,
            });
        }

        for node in &mut self.nodes {
            node.planned_items = node.initial_items.clone();
        }
        for item in &mut self.items {
            item.planned_owner = None;
        }
        self.planned_sort();
        Ok(())
    }

    /// Relocates `item` from its current owner to `dest`.
    ///
    /// Only the planned item lists change; `planned_used` is refreshed at
    /// the next [`Placement::planned_sort`], which the planner runs at
    /// round boundaries.
    ///
    /// # Panics
    ///
    /// Panics if `item` is missing from its current owner's planned list,
    /// which indicates the placement was mutated outside of [`Placement`]
    /// methods.
    pub fn move_item(&mut self, item: ItemId, dest: NodeId) {
        let src = self.items[item.0].current_owner();
        let src_items = &mut self.nodes[src.0].planned_items;
        let pos = src_items
            .iter()
            .position(|&i| i == item)
            .expect("item missing from its owner's planned list");
        src_items.remove(pos);
        self.items[item.0].planned_owner = Some(dest);
        self.nodes[dest.0].planned_items.push(item);
    }

    /// Sorts each node's planned items by size descending and refreshes the
    /// cached `planned_used` sums.
    pub fn planned_sort(&mut self) {
        let items = &self.items;
        for node in &mut self.nodes {
            node.planned_items
                .sort_by(|&a, &b| items[b.0].size.cmp(&items[a.0].size));
            node.planned_used = node.planned_items.iter().map(|&i| items[i.0].size).sum();
        }
    }

    /// Tests whether `item` may be relocated to `dest`.
    ///
    /// The generic rules: an item never "moves" back to its initial owner
    /// (even via an intermediate hop), and the destination must have room
    /// for it. Domain rules are delegated to `constraint`.
    #[must_use]
    pub fn can_move_to<C: PlacementConstraint>(
        &self,
        item: ItemId,
        dest: NodeId,
        constraint: &C,
    ) -> bool {
        let it = &self.items[item.0];
        if dest == it.initial_owner {
            return false;
        }
        let node = &self.nodes[dest.0];
        if node.planned_used + it.size > node.capacity {
            return false;
        }
        constraint.admits(self, item, dest)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Unconstrained;

    fn two_nodes() -> (Placement, NodeId, NodeId) {
        let mut p = Placement::new();
        let a = p.add_node(100);
        let b = p.add_node(100);
        (p, a, b)
    }

    // -- construction --

    #[test]
    fn add_item_registers_with_owner() {
        let (mut p, a, _) = two_nodes();
        let x = p.add_item(a, 40);
        assert_eq!(p.node(a).initial_items(), &[x]);
        assert_eq!(p.item(x).initial_owner(), a);
        assert_eq!(p.item(x).current_owner(), a);
        assert!(!p.item(x).has_moved());
    }

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn zero_capacity_panics() {
        let mut p = Placement::new();
        p.add_node(0);
    }

    // -- begin_plan --

    #[test]
    fn begin_plan_copies_initial_to_planned() {
        let (mut p, a, b) = two_nodes();
        let x = p.add_item(a, 40);
        let y = p.add_item(b, 10);
        p.begin_plan().expect("consistent placement");
        assert_eq!(p.node(a).planned_items(), &[x]);
        assert_eq!(p.node(b).planned_items(), &[y]);
        assert_eq!(p.node(a).planned_used(), 40);
        assert_eq!(p.node(b).planned_used(), 10);
    }

    #[test]
    fn begin_plan_resets_a_previous_pass() {
        let (mut p, a, b) = two_nodes();
        let x = p.add_item(a, 40);
        p.begin_plan().expect("consistent placement");
        p.move_item(x, b);
        assert!(p.item(x).has_moved());

        p.begin_plan().expect("consistent placement");
        assert!(!p.item(x).has_moved());
        assert_eq!(p.item(x).current_owner(), a);
        assert_eq!(p.node(a).planned_items(), &[x]);
        assert!(p.node(b).planned_items().is_empty());
    }

    #[test]
    fn begin_plan_rejects_owner_mismatch() {
        let (mut p, a, b) = two_nodes();
        let x = p.add_item(a, 10);
        // Corrupt the graph: b also lists x.
        p.nodes[b.index()].initial_items.push(x);
        let err = p.begin_plan().unwrap_err();
        assert_eq!(
            err,
            crate::PlanError::OwnerMismatch {
                item: x,
                listed_by: b,
                owner: a
            }
        );
    }

    #[test]
    fn begin_plan_rejects_duplicate_listing() {
        let (mut p, a, _) = two_nodes();
        let x = p.add_item(a, 10);
        p.nodes[a.index()].initial_items.push(x);
        let err = p.begin_plan().unwrap_err();
        assert_eq!(err, crate::PlanError::NotExactlyOnce { item: x, count: 2 });
    }

    // -- move_item --

    #[test]
    fn move_item_transfers_ownership() {
        let (mut p, a, b) = two_nodes();
        let x = p.add_item(a, 40);
        p.begin_plan().expect("consistent placement");

        p.move_item(x, b);
        assert_eq!(p.item(x).planned_owner(), Some(b));
        assert_eq!(p.item(x).current_owner(), b);
        assert!(p.node(a).planned_items().is_empty());
        assert_eq!(p.node(b).planned_items(), &[x]);
        // Initial view is untouched.
        assert_eq!(p.node(a).initial_items(), &[x]);
    }

    #[test]
    fn conservation_across_moves() {
        let (mut p, a, b) = two_nodes();
        let items = [p.add_item(a, 40), p.add_item(a, 30), p.add_item(b, 20)];
        p.begin_plan().expect("consistent placement");
        p.move_item(items[0], b);
        p.move_item(items[2], a);

        let mut all: Vec<ItemId> = p
            .node_ids()
            .flat_map(|n| p.node(n).planned_items().to_vec())
            .collect();
        all.sort();
        let mut expected = items.to_vec();
        expected.sort();
        assert_eq!(all, expected);
    }

    // -- planned_sort --

    #[test]
    fn planned_sort_orders_by_size_descending() {
        let (mut p, a, _) = two_nodes();
        let small = p.add_item(a, 5);
        let big = p.add_item(a, 50);
        let mid = p.add_item(a, 20);
        p.begin_plan().expect("consistent placement");
        assert_eq!(p.node(a).planned_items(), &[big, mid, small]);
        assert_eq!(p.node(a).planned_used(), 75);
    }

    #[test]
    fn fraction_used_reflects_planned_load() {
        let (mut p, a, _) = two_nodes();
        p.add_item(a, 25);
        p.begin_plan().expect("consistent placement");
        let frac = p.node(a).planned_fraction_used();
        assert!((frac - 0.25).abs() < f64::EPSILON);
    }

    // -- can_move_to --

    #[test]
    fn cannot_move_back_to_initial_owner() {
        let (mut p, a, b) = two_nodes();
        let x = p.add_item(a, 40);
        p.begin_plan().expect("consistent placement");
        assert!(!p.can_move_to(x, a, &Unconstrained));
        assert!(p.can_move_to(x, b, &Unconstrained));
    }

    #[test]
    fn cannot_overflow_destination() {
        let (mut p, a, b) = two_nodes();
        let x = p.add_item(a, 40);
        p.add_item(b, 70);
        p.begin_plan().expect("consistent placement");
        // 70 + 40 > 100
        assert!(!p.can_move_to(x, b, &Unconstrained));
    }
}
