//! Plan settings: iteration bound, thresholds, and the move/swap mode.

use crate::error::PlanError;

/// Whether a round relocates one item or exchanges a pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlanMode {
    /// Each round moves a single item to an emptier node.
    Move,
    /// Each round exchanges a large item on a full node with a small item
    /// on an empty node. Swaps where the two sizes are too similar (ratio
    /// `min/max` above the threshold) are rejected as not worth the churn.
    Swap { item_fraction_threshold: f64 },
}

/// Tuning knobs for a planning pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSettings {
    /// Upper bound on accepted rounds. The pass stops earlier if no
    /// beneficial feasible move remains.
    pub max_iters: usize,
    /// Minimum gap in fractional utilization two nodes must exhibit to be
    /// considered for an exchange.
    pub node_fraction_threshold: f64,
    /// Move-only or swap mode.
    pub mode: PlanMode,
}

impl PlanSettings {
    /// Builds settings from the percentage-based knobs exposed at the tool
    /// boundary.
    ///
    /// `node_percentage_threshold` converts directly to a fraction. The
    /// item percentage is inverted: a caller asking not to swap items
    /// "within 90% of each other" allows only pairs whose size ratio is at
    /// most `1 - 90/100 = 0.1`. The item percentage is required when
    /// `swap` is set and ignored otherwise.
    ///
    /// # Errors
    ///
    /// [`PlanError::InvalidSettings`] if `max_iters` is zero, a percentage
    /// lies outside `[0, 100]`, or swap mode lacks an item percentage.
    pub fn from_percentages(
        max_iters: usize,
        node_percentage_threshold: f64,
        item_percentage_threshold: Option<f64>,
        swap: bool,
    ) -> Result<Self, PlanError> {
        if max_iters == 0 {
            return Err(PlanError::InvalidSettings {
                reason: "max_iters must be at least 1".to_string(),
            });
        }
        if !(0.0..=100.0).contains(&node_percentage_threshold) {
            return Err(PlanError::InvalidSettings {
                reason: format!(
                    "node percentage threshold {node_percentage_threshold} outside [0, 100]"
                ),
            });
        }
        let mode = if swap {
            let Some(item_pct) = item_percentage_threshold else {
                return Err(PlanError::InvalidSettings {
                    reason: "swap mode requires an item percentage threshold".to_string(),
                });
            };
            if !(0.0..=100.0).contains(&item_pct) {
                return Err(PlanError::InvalidSettings {
                    reason: format!("item percentage threshold {item_pct} outside [0, 100]"),
                });
            }
            PlanMode::Swap {
                item_fraction_threshold: 1.0 - item_pct / 100.0,
            }
        } else {
            PlanMode::Move
        };
        Ok(Self {
            max_iters,
            node_fraction_threshold: node_percentage_threshold / 100.0,
            mode,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentages_convert_to_fractions() {
        let s = PlanSettings::from_percentages(20, 10.0, Some(90.0), true)
            .expect("valid percentages");
        assert!((s.node_fraction_threshold - 0.1).abs() < 1e-12);
        let PlanMode::Swap {
            item_fraction_threshold,
        } = s.mode
        else {
            panic!("expected swap mode");
        };
        // 90% similarity cutoff allows ratios up to 0.1.
        assert!((item_fraction_threshold - 0.1).abs() < 1e-12);
    }

    #[test]
    fn item_percentage_ignored_without_swap() {
        let s = PlanSettings::from_percentages(5, 5.0, Some(90.0), false)
            .expect("valid percentages");
        assert_eq!(s.mode, PlanMode::Move);
    }

    #[test]
    fn zero_iterations_rejected() {
        assert!(PlanSettings::from_percentages(0, 10.0, None, false).is_err());
    }

    #[test]
    fn out_of_range_percentage_rejected() {
        assert!(PlanSettings::from_percentages(5, 101.0, None, false).is_err());
        assert!(PlanSettings::from_percentages(5, -1.0, None, false).is_err());
        assert!(PlanSettings::from_percentages(5, 10.0, Some(200.0), true).is_err());
    }

    #[test]
    fn swap_without_item_threshold_rejected() {
        assert!(PlanSettings::from_percentages(5, 10.0, None, true).is_err());
    }
}
