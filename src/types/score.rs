//! Scoring outcome data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Action taken for a scored transaction.
///
/// Variants are ordered by severity so `Approve < Review < Decline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approve,
    Review,
    Decline,
}

impl Decision {
    pub const ALL: [Decision; 3] = [Decision::Approve, Decision::Review, Decision::Decline];

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "APPROVE",
            Decision::Review => "REVIEW",
            Decision::Decline => "DECLINE",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fused-score cutoffs, checked from most to least severe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionThresholds {
    /// Scores at or above this are declined
    pub decline: f64,
    /// Scores at or above this (and below `decline`) go to manual review
    pub review: f64,
}

impl DecisionThresholds {
    /// Map a fused score to a decision; the first matching cutoff wins
    pub fn decide(&self, fused_score: f64) -> Decision {
        if fused_score >= self.decline {
            Decision::Decline
        } else if fused_score >= self.review {
            Decision::Review
        } else {
            Decision::Approve
        }
    }
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            decline: 0.7,
            review: 0.4,
        }
    }
}

/// A business rule that fired for a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFinding {
    /// Rule identifier
    pub rule: String,
    /// Severity in [0, 1]
    pub severity: f64,
}

impl RuleFinding {
    pub fn new(rule: impl Into<String>, severity: f64) -> Self {
        Self {
            rule: rule.into(),
            severity,
        }
    }
}

/// Full-precision result of scoring one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub transaction_id: String,
    /// Estimator probability
    pub model_score: f64,
    /// Highest severity among triggered rules
    pub rule_score: f64,
    /// Weighted combination of model and rule scores
    pub fused_score: f64,
    pub decision: Decision,
    pub findings: Vec<RuleFinding>,
    /// Number of rules evaluated, triggered or not
    pub rules_evaluated: usize,
    pub latency: Duration,
}

impl ScoreResult {
    /// Convert to the externally reported form (scores rounded to 4 places)
    pub fn to_response(&self) -> ScoreResponse {
        ScoreResponse {
            request_id: uuid::Uuid::new_v4().to_string(),
            transaction_id: self.transaction_id.clone(),
            fraud_score: round_score(self.fused_score),
            ml_score: round_score(self.model_score),
            rules_score: round_score(self.rule_score),
            decision: self.decision,
            rules_triggered: self
                .findings
                .iter()
                .map(|f| RuleFinding::new(f.rule.clone(), round_score(f.severity)))
                .collect(),
            rules_evaluated: self.rules_evaluated,
            latency_ms: round_to(self.latency.as_secs_f64() * 1000.0, 2),
            scored_at: Utc::now(),
        }
    }
}

/// Scoring response returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResponse {
    /// Unique identifier of this scoring request
    pub request_id: String,
    pub transaction_id: String,
    /// Fused score
    pub fraud_score: f64,
    /// Estimator probability
    pub ml_score: f64,
    /// Aggregate rule severity
    pub rules_score: f64,
    pub decision: Decision,
    pub rules_triggered: Vec<RuleFinding>,
    pub rules_evaluated: usize,
    pub latency_ms: f64,
    pub scored_at: DateTime<Utc>,
}

/// Round a score to the 4 decimal places reported externally
pub fn round_score(value: f64) -> f64 {
    round_to(value, 4)
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_from_score() {
        let thresholds = DecisionThresholds::default();

        assert_eq!(thresholds.decide(0.0), Decision::Approve);
        assert_eq!(thresholds.decide(0.3999), Decision::Approve);
        assert_eq!(thresholds.decide(0.4), Decision::Review);
        assert_eq!(thresholds.decide(0.6999), Decision::Review);
        assert_eq!(thresholds.decide(0.7), Decision::Decline);
        assert_eq!(thresholds.decide(1.0), Decision::Decline);
    }

    #[test]
    fn test_decision_ordering() {
        assert!(Decision::Approve < Decision::Review);
        assert!(Decision::Review < Decision::Decline);
    }

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_string(&Decision::Decline).unwrap();
        assert_eq!(json, "\"DECLINE\"");
        let decision: Decision = serde_json::from_str("\"REVIEW\"").unwrap();
        assert_eq!(decision, Decision::Review);
    }

    #[test]
    fn test_response_rounds_scores() {
        let result = ScoreResult {
            transaction_id: "txn_123".to_string(),
            model_score: 0.123456,
            rule_score: 0.4,
            fused_score: 0.7 * 0.123456 + 0.3 * 0.4,
            decision: Decision::Approve,
            findings: vec![RuleFinding::new("odd_hours_activity", 0.4)],
            rules_evaluated: 4,
            latency: Duration::from_micros(1234),
        };

        let response = result.to_response();

        assert_eq!(response.transaction_id, "txn_123");
        assert_eq!(response.ml_score, 0.1235);
        assert_eq!(response.fraud_score, 0.2064);
        assert_eq!(response.rules_score, 0.4);
        assert_eq!(response.latency_ms, 1.23);
        assert_eq!(response.rules_triggered.len(), 1);
        assert!(uuid::Uuid::parse_str(&response.request_id).is_ok());
    }
}
