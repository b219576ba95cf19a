//! Counterfactual variance of per-node fractional utilization.

// Sizes and capacities stay far below 2^52, so the u64 -> f64 casts in this
// module are exact in practice.
#![allow(clippy::cast_precision_loss)]

use crate::error::PlanError;
use crate::placement::{ItemId, NodeId, Placement};

/// Population variance of `used / capacity` across all nodes, under a
/// hypothetical set of item inclusions and exclusions.
///
/// For each node, `used` starts from the cached `planned_used`, subtracts
/// the sizes of `exclude` entries anchored at that node, and adds the sizes
/// of `include` entries anchored there. Pure: nothing is committed, which
/// lets the planner score a candidate move or swap before deciding.
///
/// An empty placement has variance 0.
///
/// # Errors
///
/// [`PlanError::CapacityUnderflow`] if an exclusion would drive a node's
/// simulated usage negative, which indicates a corrupt exclusion list.
pub fn utilization_variance(
    placement: &Placement,
    include: &[(NodeId, ItemId)],
    exclude: &[(NodeId, ItemId)],
) -> Result<f64, PlanError> {
    let count = placement.node_count();
    if count == 0 {
        return Ok(0.0);
    }

    let mut fractions = Vec::with_capacity(count);
    for id in placement.node_ids() {
        let node = placement.node(id);
        let mut used = node.planned_used();
        for &(anchor, item) in exclude {
            if anchor == id {
                used = used
                    .checked_sub(placement.item(item).size())
                    .ok_or(PlanError::CapacityUnderflow { node: id })?;
            }
        }
        for &(anchor, item) in include {
            if anchor == id {
                used += placement.item(item).size();
            }
        }
        fractions.push(used as f64 / node.capacity() as f64);
    }

    let mean = fractions.iter().sum::<f64>() / count as f64;
    let variance = fractions
        .iter()
        .map(|f| {
            let d = f - mean;
            d * d
        })
        .sum::<f64>()
        / count as f64;
    Ok(variance)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_placement_has_zero_variance() {
        let p = Placement::new();
        assert_eq!(utilization_variance(&p, &[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn equal_fractions_have_zero_variance() {
        let mut p = Placement::new();
        let a = p.add_node(100);
        let b = p.add_node(200);
        p.add_item(a, 50);
        p.add_item(b, 100);
        p.begin_plan().expect("consistent placement");
        let v = utilization_variance(&p, &[], &[]).expect("no underflow");
        assert!(v.abs() < 1e-12);
    }

    #[test]
    fn known_two_node_variance() {
        let mut p = Placement::new();
        let a = p.add_node(100);
        let _b = p.add_node(100);
        p.add_item(a, 90);
        p.begin_plan().expect("consistent placement");
        // Fractions 0.9 and 0.0: mean 0.45, pvariance 0.2025.
        let v = utilization_variance(&p, &[], &[]).expect("no underflow");
        assert!((v - 0.2025).abs() < 1e-12);
    }

    #[test]
    fn counterfactual_matches_committed_move() {
        let mut p = Placement::new();
        let a = p.add_node(100);
        let b = p.add_node(100);
        let x = p.add_item(a, 60);
        p.add_item(a, 20);
        p.begin_plan().expect("consistent placement");

        let hypothetical =
            utilization_variance(&p, &[(b, x)], &[(a, x)]).expect("no underflow");

        p.move_item(x, b);
        p.planned_sort();
        let committed = utilization_variance(&p, &[], &[]).expect("no underflow");
        assert!((hypothetical - committed).abs() < 1e-12);
    }

    #[test]
    fn exclusion_underflow_is_an_error() {
        let mut p = Placement::new();
        let a = p.add_node(100);
        let b = p.add_node(100);
        let big = p.add_item(a, 80);
        p.begin_plan().expect("consistent placement");
        // Excluding `big` from b, which never held it, underflows b's usage.
        let err = utilization_variance(&p, &[], &[(b, big)]).unwrap_err();
        assert_eq!(err, PlanError::CapacityUnderflow { node: b });
    }
}
