//! Estimator ownership and score fusion

pub mod estimator;
pub mod fusion;
pub mod gateway;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod training;

pub use estimator::{ArtifactLoader, Estimator, FileArtifactLoader, LogisticEstimator};
pub use fusion::{FusedScore, FusionWeights, ScoreFuser};
pub use gateway::{ModelGateway, ModelStatus};
pub use training::TrainingMetrics;
