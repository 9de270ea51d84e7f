//! Fusion of model probability and rule severity into one fraud score

use crate::types::score::{Decision, DecisionThresholds};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Weights of the convex combination
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub model: f64,
    pub rules: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            model: 0.7,
            rules: 0.3,
        }
    }
}

/// Fused score (full precision) and the decision it maps to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedScore {
    pub score: f64,
    pub decision: Decision,
}

/// Combines model and rule scores and applies decision thresholds.
///
/// Fusion is a fixed convex combination; the rule engine's aggregate is
/// already a max, so one severe signal carries through at its full weight.
#[derive(Debug, Clone, Copy)]
pub struct ScoreFuser {
    weights: FusionWeights,
    thresholds: DecisionThresholds,
}

impl ScoreFuser {
    /// Create a fuser, rejecting weights or thresholds that could push the
    /// fused score out of [0, 1] or make the decision bands overlap.
    pub fn new(weights: FusionWeights, thresholds: DecisionThresholds) -> Result<Self> {
        ensure!(
            weights.model >= 0.0 && weights.rules >= 0.0,
            "Fusion weights must be non-negative, got model={} rules={}",
            weights.model,
            weights.rules
        );
        ensure!(
            ((weights.model + weights.rules) - 1.0).abs() < 1e-9,
            "Fusion weights must sum to 1, got {}",
            weights.model + weights.rules
        );
        ensure!(
            (0.0..=1.0).contains(&thresholds.review)
                && (0.0..=1.0).contains(&thresholds.decline)
                && thresholds.review <= thresholds.decline,
            "Decision thresholds must satisfy 0 <= review <= decline <= 1, got review={} decline={}",
            thresholds.review,
            thresholds.decline
        );
        Ok(Self {
            weights,
            thresholds,
        })
    }

    /// Fuse the two scores and decide
    pub fn fuse(&self, model_score: f64, rule_score: f64) -> FusedScore {
        let score = self.weights.model * model_score + self.weights.rules * rule_score;
        FusedScore {
            score,
            decision: self.thresholds.decide(score),
        }
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    pub fn thresholds(&self) -> DecisionThresholds {
        self.thresholds
    }
}

impl Default for ScoreFuser {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            thresholds: DecisionThresholds::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_fusion() {
        let fuser = ScoreFuser::default();

        let fused = fuser.fuse(0.1, 0.4);

        // 0.7 * 0.1 + 0.3 * 0.4 = 0.19
        assert!((fused.score - 0.19).abs() < 1e-12);
        assert_eq!(fused.decision, Decision::Approve);
    }

    #[test]
    fn test_decision_bands() {
        let fuser = ScoreFuser::default();

        assert_eq!(fuser.fuse(0.0, 0.0).decision, Decision::Approve);
        assert_eq!(fuser.fuse(0.5, 0.4).decision, Decision::Review);
        assert_eq!(fuser.fuse(1.0, 1.0).decision, Decision::Decline);
        // rule score alone can never decline at default weights
        assert_eq!(fuser.fuse(0.0, 1.0).decision, Decision::Approve);
    }

    #[test]
    fn test_high_velocity_decline_boundary() {
        let fuser = ScoreFuser::default();

        assert!(fuser.fuse(0.0, 0.8).score >= 0.24 - 1e-12);
        // 0.7 * m + 0.24 >= 0.7 needs m >= 0.6571..
        assert_eq!(fuser.fuse(0.66, 0.8).decision, Decision::Decline);
        assert_eq!(fuser.fuse(0.65, 0.8).decision, Decision::Review);
        assert_eq!(fuser.fuse(0.58, 0.8).decision, Decision::Review);
    }

    #[test]
    fn test_decision_monotone_in_both_scores() {
        let fuser = ScoreFuser::default();
        let grid: Vec<f64> = (0..=20).map(|i| i as f64 / 20.0).collect();

        for &m in &grid {
            for pair in grid.windows(2) {
                let (lo, hi) = (pair[0], pair[1]);
                assert!(fuser.fuse(m, lo).decision <= fuser.fuse(m, hi).decision);
                assert!(fuser.fuse(lo, m).decision <= fuser.fuse(hi, m).decision);
            }
        }
    }

    #[test]
    fn test_fusion_is_pure() {
        let fuser = ScoreFuser::default();
        assert_eq!(fuser.fuse(0.33, 0.6), fuser.fuse(0.33, 0.6));
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        let bad_weights = FusionWeights {
            model: 0.8,
            rules: 0.3,
        };
        assert!(ScoreFuser::new(bad_weights, DecisionThresholds::default()).is_err());

        let negative = FusionWeights {
            model: 1.2,
            rules: -0.2,
        };
        assert!(ScoreFuser::new(negative, DecisionThresholds::default()).is_err());

        let inverted = DecisionThresholds {
            decline: 0.3,
            review: 0.5,
        };
        assert!(ScoreFuser::new(FusionWeights::default(), inverted).is_err());
    }
}
