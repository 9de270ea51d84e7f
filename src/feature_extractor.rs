//! Feature extraction for fraud model inference.
//!
//! Turns a raw transaction into the fixed-order numeric vector the
//! estimator was trained on. Order is part of the model contract.

use crate::types::transaction::Transaction;
use std::f64::consts::PI;

/// Number of features produced per transaction
pub const FEATURE_COUNT: usize = 10;

/// Feature names in model input order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "amount_log",
    "amount_scaled",
    "hour_sin",
    "hour_cos",
    "is_night",
    "is_weekend",
    "velocity_1h",
    "velocity_high",
    "is_new_device",
    "amount_velocity_interaction",
];

/// Amount divisor for `amount_scaled`
const AMOUNT_SCALE: f64 = 1000.0;
/// Upper cap for `amount_scaled`
const AMOUNT_SCALED_CAP: f64 = 10.0;
/// `velocity_high` fires strictly above this
const HIGH_VELOCITY: u32 = 5;

/// Immutable, ordered feature vector for one transaction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    /// Look up a feature by name
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|idx| self.values[idx])
    }

    /// (name, value) pairs in model order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }

    /// Single-precision copy for tensor-based runtimes
    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }

    pub fn len(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Feature extractor that transforms transactions into model input features.
///
/// Pure and total: every transaction that passed boundary validation maps to
/// exactly one vector, and identical input yields bit-identical output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        Self
    }

    /// Extract features from a transaction.
    pub fn extract(&self, tx: &Transaction) -> FeatureVector {
        let amount = tx.amount;
        let hour = f64::from(tx.hour);
        let velocity = f64::from(tx.velocity_1h);

        // log(1 + amount) stays finite at amount = 0
        let amount_log = amount.ln_1p();
        let amount_scaled = (amount / AMOUNT_SCALE).min(AMOUNT_SCALED_CAP);

        // Cyclic encoding so 23:00 and 00:00 are neighbours
        let angle = 2.0 * PI * hour / 24.0;
        let hour_sin = angle.sin();
        let hour_cos = angle.cos();

        let is_night = flag(tx.hour < 6 || tx.hour > 22);
        let is_weekend = flag(tx.day_of_week >= 5);
        let velocity_high = flag(tx.velocity_1h > HIGH_VELOCITY);
        let is_new_device = flag(tx.is_new_device);

        FeatureVector {
            values: [
                amount_log,
                amount_scaled,
                hour_sin,
                hour_cos,
                is_night,
                is_weekend,
                velocity,
                velocity_high,
                is_new_device,
                amount_log * velocity,
            ],
        }
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Get feature names in model order.
    pub fn feature_names(&self) -> &'static [&'static str] {
        &FEATURE_NAMES
    }
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_tx() -> Transaction {
        Transaction::new("test_001", "user_1", 250.0)
    }

    #[test]
    fn test_feature_count() {
        let extractor = FeatureExtractor::new();
        assert_eq!(extractor.feature_count(), 10);
        assert_eq!(extractor.feature_names().len(), 10);
        assert_eq!(extractor.extract(&base_tx()).len(), 10);
    }

    #[test]
    fn test_amount_features() {
        let extractor = FeatureExtractor::new();

        let zero = extractor.extract(&Transaction::new("t", "u", 0.0));
        assert_eq!(zero.get("amount_log"), Some(0.0));
        assert_eq!(zero.get("amount_scaled"), Some(0.0));

        let big = extractor.extract(&Transaction::new("t", "u", 50_000.0));
        assert_eq!(big.get("amount_scaled"), Some(10.0));
        assert!((big.get("amount_log").unwrap() - 50_001f64.ln()).abs() < 1e-12);

        let mid = extractor.extract(&Transaction::new("t", "u", 2500.0));
        assert_eq!(mid.get("amount_scaled"), Some(2.5));
    }

    #[test]
    fn test_hour_encoding_is_cyclic() {
        let extractor = FeatureExtractor::new();
        let at = |h| extractor.extract(&base_tx().with_hour(h));

        let midnight = at(0);
        let late = at(23);
        let noon = at(12);

        let dist = |a: &FeatureVector, b: &FeatureVector| {
            let ds = a.get("hour_sin").unwrap() - b.get("hour_sin").unwrap();
            let dc = a.get("hour_cos").unwrap() - b.get("hour_cos").unwrap();
            (ds * ds + dc * dc).sqrt()
        };

        assert!(dist(&midnight, &late) < dist(&midnight, &noon));
        assert_eq!(midnight.get("hour_cos"), Some(1.0));
    }

    #[test]
    fn test_indicator_boundaries() {
        let extractor = FeatureExtractor::new();
        let night = |h| extractor.extract(&base_tx().with_hour(h)).get("is_night");

        assert_eq!(night(5), Some(1.0));
        assert_eq!(night(6), Some(0.0));
        assert_eq!(night(22), Some(0.0));
        assert_eq!(night(23), Some(1.0));

        let weekend = |d| {
            extractor
                .extract(&base_tx().with_day_of_week(d))
                .get("is_weekend")
        };
        assert_eq!(weekend(4), Some(0.0));
        assert_eq!(weekend(5), Some(1.0));
        assert_eq!(weekend(6), Some(1.0));

        let high = |v| {
            extractor
                .extract(&base_tx().with_velocity(v))
                .get("velocity_high")
        };
        assert_eq!(high(5), Some(0.0));
        assert_eq!(high(6), Some(1.0));
    }

    #[test]
    fn test_interaction_term() {
        let extractor = FeatureExtractor::new();
        let features = extractor.extract(&base_tx().with_velocity(4).with_new_device(true));

        let amount_log = features.get("amount_log").unwrap();
        assert_eq!(features.get("amount_velocity_interaction"), Some(amount_log * 4.0));
        assert_eq!(features.get("velocity_1h"), Some(4.0));
        assert_eq!(features.get("is_new_device"), Some(1.0));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = FeatureExtractor::new();
        let tx = base_tx().with_hour(3).with_velocity(9).with_new_device(true);

        let a = extractor.extract(&tx);
        let b = extractor.extract(&tx);

        for (x, y) in a.values().iter().zip(b.values()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_order_matches_names() {
        let features = FeatureExtractor::new().extract(&base_tx().with_velocity(2));
        let names: Vec<&str> = features.iter().map(|(name, _)| name).collect();
        assert_eq!(names, FEATURE_NAMES.to_vec());
        assert_eq!(features.get("unknown"), None);
    }
}
