//! Error taxonomy for the scoring pipeline
//!
//! Only two failures can leave the core: the estimator is unavailable, or
//! something unexpected broke mid-pipeline. Boundary validation errors are
//! [`crate::types::ValidationError`] and never reach this type.

use serde::Serialize;
use thiserror::Error;

/// Steps a scoring request moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    FeaturesDerived,
    ModelScored,
    RulesEvaluated,
    Fused,
    MetricsRecorded,
    Responded,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::FeaturesDerived => "features_derived",
            PipelineStage::ModelScored => "model_scored",
            PipelineStage::RulesEvaluated => "rules_evaluated",
            PipelineStage::Fused => "fused",
            PipelineStage::MetricsRecorded => "metrics_recorded",
            PipelineStage::Responded => "responded",
        };
        f.write_str(name)
    }
}

/// Pipeline error; either the estimator is unavailable or the pipeline broke
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    /// Estimator artifact missing, unreadable or corrupt
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Unexpected fault inside the pipeline
    #[error("Internal failure after stage `{stage}`: {message}")]
    Internal {
        stage: PipelineStage,
        message: String,
    },
}

impl ScoringError {
    /// Internal failure after `stage`
    pub fn internal(stage: PipelineStage, message: impl Into<String>) -> Self {
        ScoringError::Internal {
            stage,
            message: message.into(),
        }
    }

    /// True for the service-unavailable path
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, ScoringError::ModelUnavailable(_))
    }
}

/// Result type alias using ScoringError
pub type ScoringResult<T> = Result<T, ScoringError>;
