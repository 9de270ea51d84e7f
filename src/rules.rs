//! Deterministic business-rule layer.
//!
//! Each rule is an independent predicate over the raw transaction with a
//! tiered severity. Rules never see each other's output, so the set can be
//! reordered or extended without changing any individual finding.

use crate::types::score::RuleFinding;
use crate::types::transaction::Transaction;
use serde::Serialize;

// ============================================================================
// Rule thresholds
// ============================================================================

/// Velocity at or above which the severe velocity tier fires
const VELOCITY_SEVERE: u32 = 10;
/// Velocity at or above which the elevated velocity tier fires
const VELOCITY_ELEVATED: u32 = 5;

/// New-device amount tiers (strictly above)
const NEW_DEVICE_AMOUNT_SEVERE: f64 = 500.0;
const NEW_DEVICE_AMOUNT_ELEVATED: f64 = 200.0;

/// Absolute amount tiers (strictly above)
const AMOUNT_EXTREME: f64 = 5000.0;
const AMOUNT_HIGH: f64 = 2000.0;

/// Odd hours are strictly before this hour
const ODD_HOURS_END: u8 = 5;
/// Minimum amount for odd-hours activity to count
const ODD_HOURS_MIN_AMOUNT: f64 = 100.0;

/// Registered fraud rules.
///
/// The set is closed: adding a rule means adding a variant and listing it
/// in [`Rule::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    HighVelocity,
    NewDeviceHighAmount,
    ExtremeAmount,
    OddHoursActivity,
}

impl Rule {
    pub const ALL: [Rule; 4] = [
        Rule::HighVelocity,
        Rule::NewDeviceHighAmount,
        Rule::ExtremeAmount,
        Rule::OddHoursActivity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Rule::HighVelocity => "high_velocity",
            Rule::NewDeviceHighAmount => "new_device_high_amount",
            Rule::ExtremeAmount => "extreme_amount",
            Rule::OddHoursActivity => "odd_hours_activity",
        }
    }

    /// Severity this rule assigns to the transaction, if it fires
    pub fn severity(&self, tx: &Transaction) -> Option<f64> {
        match self {
            Rule::HighVelocity => {
                if tx.velocity_1h >= VELOCITY_SEVERE {
                    Some(0.8)
                } else if tx.velocity_1h >= VELOCITY_ELEVATED {
                    Some(0.4)
                } else {
                    None
                }
            }
            Rule::NewDeviceHighAmount => {
                if !tx.is_new_device {
                    None
                } else if tx.amount > NEW_DEVICE_AMOUNT_SEVERE {
                    Some(0.6)
                } else if tx.amount > NEW_DEVICE_AMOUNT_ELEVATED {
                    Some(0.3)
                } else {
                    None
                }
            }
            Rule::ExtremeAmount => {
                if tx.amount > AMOUNT_EXTREME {
                    Some(0.7)
                } else if tx.amount > AMOUNT_HIGH {
                    Some(0.3)
                } else {
                    None
                }
            }
            Rule::OddHoursActivity => {
                (tx.hour < ODD_HOURS_END && tx.amount > ODD_HOURS_MIN_AMOUNT).then_some(0.4)
            }
        }
    }

    /// Evaluate this rule into a finding
    pub fn evaluate(&self, tx: &Transaction) -> Option<RuleFinding> {
        self.severity(tx)
            .map(|severity| RuleFinding::new(self.name(), severity))
    }
}

/// Outcome of running every registered rule over one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluation {
    /// Findings in rule registration order
    pub findings: Vec<RuleFinding>,
    /// Maximum severity among findings, 0.0 when nothing fired
    pub rules_score: f64,
    /// Number of rules that were run
    pub rules_evaluated: usize,
}

impl RuleEvaluation {
    pub fn triggered(&self) -> bool {
        !self.findings.is_empty()
    }
}

/// Runs the registered rule set
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    /// Engine with the full reference rule set
    pub fn new() -> Self {
        Self::with_rules(Rule::ALL.to_vec())
    }

    /// Engine with an explicit rule list
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Evaluate all rules. Total: never fails for a validated transaction.
    pub fn evaluate(&self, tx: &Transaction) -> RuleEvaluation {
        let findings: Vec<RuleFinding> = self
            .rules
            .iter()
            .filter_map(|rule| rule.evaluate(tx))
            .collect();

        RuleEvaluation {
            rules_score: aggregate_severity(&findings),
            rules_evaluated: self.rules.len(),
            findings,
        }
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate rule score: the single most severe finding dominates
pub fn aggregate_severity(findings: &[RuleFinding]) -> f64 {
    findings.iter().map(|f| f.severity).fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(amount: f64) -> Transaction {
        Transaction::new("txn_test", "user_123", amount).with_hour(14)
    }

    fn finding_for<'a>(eval: &'a RuleEvaluation, rule: Rule) -> Option<&'a RuleFinding> {
        eval.findings.iter().find(|f| f.rule == rule.name())
    }

    #[test]
    fn test_no_rules_fire_for_ordinary_transaction() {
        let eval = RuleEngine::new().evaluate(&tx(50.0).with_velocity(1));

        assert!(!eval.triggered());
        assert_eq!(eval.rules_score, 0.0);
        assert_eq!(eval.rules_evaluated, 4);
    }

    #[test]
    fn test_high_velocity_tiers() {
        let engine = RuleEngine::new();
        let severity = |v| {
            finding_for(&engine.evaluate(&tx(10.0).with_velocity(v)), Rule::HighVelocity)
                .map(|f| f.severity)
        };

        assert_eq!(severity(4), None);
        assert_eq!(severity(5), Some(0.4));
        assert_eq!(severity(9), Some(0.4));
        assert_eq!(severity(10), Some(0.8));
        assert_eq!(severity(30), Some(0.8));
    }

    #[test]
    fn test_new_device_tiers() {
        let engine = RuleEngine::new();
        let severity = |amount, new_device| {
            finding_for(
                &engine.evaluate(&tx(amount).with_new_device(new_device)),
                Rule::NewDeviceHighAmount,
            )
            .map(|f| f.severity)
        };

        assert_eq!(severity(1000.0, false), None);
        assert_eq!(severity(200.0, true), None);
        assert_eq!(severity(200.01, true), Some(0.3));
        assert_eq!(severity(500.0, true), Some(0.3));
        assert_eq!(severity(500.01, true), Some(0.6));
    }

    #[test]
    fn test_extreme_amount_tiers() {
        let engine = RuleEngine::new();
        let severity =
            |amount| finding_for(&engine.evaluate(&tx(amount)), Rule::ExtremeAmount).map(|f| f.severity);

        assert_eq!(severity(2000.0), None);
        assert_eq!(severity(2000.5), Some(0.3));
        assert_eq!(severity(5000.0), Some(0.3));
        assert_eq!(severity(5000.5), Some(0.7));
    }

    #[test]
    fn test_odd_hours_activity() {
        let engine = RuleEngine::new();
        let fires = |hour, amount| {
            finding_for(&engine.evaluate(&tx(amount).with_hour(hour)), Rule::OddHoursActivity)
                .is_some()
        };

        assert!(fires(3, 150.0));
        assert!(fires(0, 100.5));
        assert!(!fires(5, 150.0));
        assert!(!fires(3, 100.0));
    }

    #[test]
    fn test_night_purchase_scenario() {
        let eval = RuleEngine::new().evaluate(&tx(1000.0).with_hour(3).with_velocity(1));

        assert_eq!(eval.findings, vec![RuleFinding::new("odd_hours_activity", 0.4)]);
        assert_eq!(eval.rules_score, 0.4);
    }

    #[test]
    fn test_score_is_max_not_sum() {
        let eval = RuleEngine::new().evaluate(
            &tx(1000.0)
                .with_hour(3)
                .with_velocity(10)
                .with_new_device(true),
        );

        assert_eq!(eval.findings.len(), 3);
        assert_eq!(eval.rules_score, 0.8);
    }

    #[test]
    fn test_findings_independent_of_rule_order() {
        let sample = tx(6000.0).with_hour(2).with_velocity(7).with_new_device(true);

        let forward = RuleEngine::new().evaluate(&sample);
        let mut reversed_rules = Rule::ALL.to_vec();
        reversed_rules.reverse();
        let reversed = RuleEngine::with_rules(reversed_rules).evaluate(&sample);

        let sorted = |eval: &RuleEvaluation| {
            let mut names: Vec<(String, u64)> = eval
                .findings
                .iter()
                .map(|f| (f.rule.clone(), f.severity.to_bits()))
                .collect();
            names.sort();
            names
        };

        assert_eq!(sorted(&forward), sorted(&reversed));
        assert_eq!(forward.rules_score, reversed.rules_score);
        assert_eq!(forward.rules_score, 0.7);
    }

    #[test]
    fn test_removing_a_rule() {
        let engine = RuleEngine::with_rules(vec![Rule::ExtremeAmount]);
        let eval = engine.evaluate(&tx(100.0).with_velocity(12));

        assert_eq!(eval.rules_evaluated, 1);
        assert!(!eval.triggered());
    }
}
