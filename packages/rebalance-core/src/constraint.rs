//! The feasibility seam between the generic planner and its domain.
//!
//! The core predicate in [`Placement::can_move_to`] knows about identity
//! (no move back to the initial owner) and capacity. Everything the domain
//! adds on top — pinned items, cross-node exclusion rules — comes in
//! through [`PlacementConstraint`].

use crate::placement::{ItemId, NodeId, Placement};

/// Domain veto applied after the generic identity and capacity checks.
///
/// Implementations must be pure with respect to the placement: `admits` is
/// called many times per planning round to score candidates that are never
/// committed.
pub trait PlacementConstraint {
    /// Returns `true` if the domain permits relocating `item` to `dest`.
    fn admits(&self, placement: &Placement, item: ItemId, dest: NodeId) -> bool;
}

/// A constraint that admits every move. Useful for tests and for domains
/// where capacity is the only rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconstrained;

impl PlacementConstraint for Unconstrained {
    fn admits(&self, _placement: &Placement, _item: ItemId, _dest: NodeId) -> bool {
        true
    }
}
