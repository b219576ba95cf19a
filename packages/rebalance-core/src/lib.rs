//! Variance-minimizing rebalance planner for partitioned storage.
//!
//! Given a set of storage nodes with fixed capacities and a set of sized
//! items resident on them, the planner proposes a bounded sequence of item
//! relocations that reduces the variance of per-node fractional utilization.
//! The crate is domain-agnostic: callers attach their own meaning to nodes
//! and items and inject domain feasibility rules through
//! [`PlacementConstraint`].
//!
//! - **Placement** ([`placement`]): arena of nodes and items, ownership
//!   tracking, and the `move` primitive
//! - **Constraint** ([`constraint`]): the feasibility seam for domain rules
//! - **Variance** ([`variance`]): counterfactual utilization variance
//! - **Candidates** ([`candidates`]): large-item and small-item orderings
//! - **Planner** ([`planner`]): the greedy move/swap scheduling loop
//! - **Settings** ([`settings`]): iteration bound, thresholds, plan mode
//! - **Bytes** ([`bytes`]): human-readable byte formatting for move logs

pub mod bytes;
pub mod candidates;
pub mod constraint;
pub mod error;
pub mod placement;
pub mod planner;
pub mod settings;
pub mod variance;

pub use bytes::format_bytes;
pub use candidates::{resort, LargeItems, SmallItems};
pub use constraint::{PlacementConstraint, Unconstrained};
pub use error::PlanError;
pub use placement::{Item, ItemId, Node, NodeId, Placement};
pub use planner::plan;
pub use settings::{PlanMode, PlanSettings};
pub use variance::utilization_variance;
