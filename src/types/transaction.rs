//! Transaction data structures for real-time fraud scoring

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hour used when a transaction arrives without one
pub const DEFAULT_HOUR: u8 = 12;

/// A single payment transaction submitted for scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction identifier
    pub transaction_id: String,

    /// Account that initiated the transaction
    pub user_id: String,

    /// Merchant receiving the payment
    #[serde(default)]
    pub merchant_id: String,

    /// Device fingerprint the payment came from
    #[serde(default)]
    pub device_id: String,

    /// Transaction amount (non-negative)
    pub amount: f64,

    /// Hour of day (0-23)
    #[serde(default = "default_hour")]
    pub hour: u8,

    /// Day of week (0 = Monday .. 6 = Sunday)
    #[serde(default)]
    pub day_of_week: u8,

    /// Transactions by this user in the trailing hour
    #[serde(default, alias = "velocity")]
    pub velocity_1h: u32,

    /// First time this device is seen for the user
    #[serde(default)]
    pub is_new_device: bool,
}

fn default_hour() -> u8 {
    DEFAULT_HOUR
}

/// A transaction rejected before it reaches the scoring pipeline
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid field `{field}`: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl Transaction {
    /// Create a transaction with neutral defaults for every optional attribute
    pub fn new(transaction_id: impl Into<String>, user_id: impl Into<String>, amount: f64) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            user_id: user_id.into(),
            merchant_id: String::new(),
            device_id: String::new(),
            amount,
            hour: DEFAULT_HOUR,
            day_of_week: 0,
            velocity_1h: 0,
            is_new_device: false,
        }
    }

    pub fn with_hour(mut self, hour: u8) -> Self {
        self.hour = hour;
        self
    }

    pub fn with_day_of_week(mut self, day_of_week: u8) -> Self {
        self.day_of_week = day_of_week;
        self
    }

    pub fn with_velocity(mut self, velocity_1h: u32) -> Self {
        self.velocity_1h = velocity_1h;
        self
    }

    pub fn with_new_device(mut self, is_new_device: bool) -> Self {
        self.is_new_device = is_new_device;
        self
    }

    /// Check the range invariants the scoring pipeline relies on.
    ///
    /// The pipeline itself never rejects input; callers validate at the
    /// boundary and only hand over transactions that pass.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.transaction_id.trim().is_empty() {
            return Err(ValidationError::new("transaction_id", "must not be empty"));
        }
        if !self.amount.is_finite() {
            return Err(ValidationError::new("amount", "must be a finite number"));
        }
        if self.amount < 0.0 {
            return Err(ValidationError::new(
                "amount",
                format!("must be non-negative, got {}", self.amount),
            ));
        }
        if self.hour > 23 {
            return Err(ValidationError::new(
                "hour",
                format!("must be within 0..=23, got {}", self.hour),
            ));
        }
        if self.day_of_week > 6 {
            return Err(ValidationError::new(
                "day_of_week",
                format!("must be within 0..=6, got {}", self.day_of_week),
            ));
        }
        Ok(())
    }
}
