//! Configuration management for the fraud scoring service

use crate::drift::PsiConfig;
use crate::models::fusion::{FusionWeights, ScoreFuser};
use crate::types::score::DecisionThresholds;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Config file used when `FRAUD_CONFIG` is not set
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub model: ModelConfig,
    pub scoring: ScoringConfig,
    pub metrics: MetricsConfig,
    pub drift: DriftConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Request subject for scoring transactions
    pub score_subject: String,
    /// Request subject for health checks
    pub health_subject: String,
    /// Request subject for metrics snapshots
    pub metrics_subject: String,
    /// Request subject for estimator status and training metrics
    pub model_info_subject: String,
    /// Request subject that triggers a model hot reload
    pub reload_subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            score_subject: "fraud.score".to_string(),
            health_subject: "fraud.health".to_string(),
            metrics_subject: "fraud.metrics".to_string(),
            model_info_subject: "fraud.model.info".to_string(),
            reload_subject: "fraud.model.reload".to_string(),
        }
    }
}

/// Estimator artifact configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Estimator artifact (`.json` logistic model or `.onnx`)
    pub path: String,
    /// Offline evaluation metrics shown by the model-info query
    pub training_metrics_path: Option<String>,
    /// Number of threads for ONNX inference
    pub onnx_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models/fraud_model.json".to_string(),
            training_metrics_path: Some("models/metrics.json".to_string()),
            onnx_threads: 1,
        }
    }
}

/// Score fusion and decision configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight of the estimator probability
    pub model_weight: f64,
    /// Weight of the aggregate rule severity
    pub rule_weight: f64,
    pub thresholds: DecisionThresholds,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let weights = FusionWeights::default();
        Self {
            model_weight: weights.model,
            rule_weight: weights.rules,
            thresholds: DecisionThresholds::default(),
        }
    }
}

impl ScoringConfig {
    /// Build a validated fuser from this configuration
    pub fn fuser(&self) -> Result<ScoreFuser> {
        ScoreFuser::new(
            FusionWeights {
                model: self.model_weight,
                rules: self.rule_weight,
            },
            self.thresholds,
        )
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Rolling window capacity for latency and score stats
    pub window_size: usize,
    /// Seconds between logged summaries
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_size: crate::metrics::DEFAULT_WINDOW_SIZE,
            report_interval_secs: 30,
        }
    }
}

/// Drift detection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub bins: usize,
    pub smoothing: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        let psi = PsiConfig::default();
        Self {
            bins: psi.bins,
            smoothing: psi.smoothing,
        }
    }
}

impl DriftConfig {
    pub fn psi(&self) -> PsiConfig {
        PsiConfig {
            bins: self.bins,
            smoothing: self.smoothing,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum requests processed concurrently
    pub workers: usize,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 64,
            timeout_ms: 1000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `FRAUD_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path = std::env::var("FRAUD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, with `FRAUD__*` overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("FRAUD").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        self.scoring.fuser().context("Invalid scoring configuration")?;
        anyhow::ensure!(self.drift.bins > 0, "drift.bins must be positive");
        anyhow::ensure!(
            self.drift.smoothing > 0.0,
            "drift.smoothing must be positive"
        );
        anyhow::ensure!(self.pipeline.workers > 0, "pipeline.workers must be positive");
        anyhow::ensure!(self.pipeline.timeout_ms > 0, "pipeline.timeout_ms must be positive");
        anyhow::ensure!(self.metrics.window_size > 0, "metrics.window_size must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.nats.score_subject, "fraud.score");
        assert_eq!(config.scoring.model_weight, 0.7);
        assert_eq!(config.scoring.rule_weight, 0.3);
        assert_eq!(config.scoring.thresholds.decline, 0.7);
        assert_eq!(config.scoring.thresholds.review, 0.4);
        assert_eq!(config.metrics.window_size, 1000);
        assert_eq!(config.drift.bins, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[model]
path = "models/custom.json"

[scoring.thresholds]
decline = 0.8
review = 0.5
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.model.path, "models/custom.json");
        assert_eq!(config.model.onnx_threads, 1);
        assert_eq!(config.scoring.thresholds.decline, 0.8);
        assert_eq!(config.scoring.model_weight, 0.7);
        assert_eq!(config.pipeline.workers, 64);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[scoring]\nmodel_weight = 0.9\nrule_weight = 0.3").unwrap();

        assert!(AppConfig::load_from_path(file.path()).is_err());
    }
}
