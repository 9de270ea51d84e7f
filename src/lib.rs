//! Fraud Scoring Service Library
//!
//! Real-time transaction scoring: a trained estimator's fraud probability
//! fused with deterministic business rules, mapped to an approve / review /
//! decline decision, with rolling operational metrics and PSI drift checks.

pub mod config;
pub mod drift;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod rules;
pub mod service;
pub mod transport;
pub mod types;

pub use config::AppConfig;
pub use drift::{DriftMonitor, DriftReport, DriftSeverity};
pub use error::{ScoringError, ScoringResult};
pub use feature_extractor::{FeatureExtractor, FeatureVector};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use models::{ModelGateway, ScoreFuser};
pub use rules::RuleEngine;
pub use service::{ScoreOutcome, ScoringService};
pub use transport::RequestServer;
pub use types::{Decision, ScoreResponse, Transaction};
