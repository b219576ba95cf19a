//! Error types surfaced by the planner core.

use crate::placement::{ItemId, NodeId};

/// Errors raised while validating inputs or planning.
///
/// All variants are non-recoverable for the current planning pass: the
/// placement graph is inconsistent or the caller supplied settings outside
/// their documented domain. Early termination because no beneficial move
/// remains is *not* an error; the planner logs it and returns the moves
/// accumulated so far.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("item {item:?} is listed by node {listed_by:?} but owned by {owner:?}")]
    OwnerMismatch {
        item: ItemId,
        listed_by: NodeId,
        owner: NodeId,
    },
    #[error("item {item:?} appears in {count} initial item lists, expected exactly 1")]
    NotExactlyOnce { item: ItemId, count: usize },
    #[error("simulated usage would underflow on node {node:?}")]
    CapacityUnderflow { node: NodeId },
    #[error("invalid plan settings: {reason}")]
    InvalidSettings { reason: String },
}
