//! Type definitions for the fraud scoring service

pub mod score;
pub mod transaction;

pub use score::{Decision, DecisionThresholds, RuleFinding, ScoreResponse, ScoreResult};
pub use transaction::{Transaction, ValidationError};
