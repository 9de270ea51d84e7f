//! Scoring service: drives one transaction through the pipeline
//!
//! Feature derivation, rule evaluation and fusion are pure; the only shared
//! state touched per request is the cached estimator and the metrics
//! collector. The blocking part of a request (a cold artifact load) runs on
//! the blocking pool under a request timeout.

use crate::config::AppConfig;
use crate::drift::{check_drift, Dataset, DriftReport, PsiConfig};
use crate::error::{PipelineStage, ScoringError, ScoringResult};
use crate::feature_extractor::{FeatureExtractor, FEATURE_NAMES};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::models::{FusionWeights, ModelGateway, ModelStatus, ScoreFuser, TrainingMetrics};
use crate::rules::RuleEngine;
use crate::types::score::{DecisionThresholds, ScoreResponse, ScoreResult};
use crate::types::Transaction;
use anyhow::Result;
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Result of one scoring request
#[derive(Debug, Clone)]
pub enum ScoreOutcome {
    Scored(ScoreResponse),
    /// Estimator unavailable; no score was produced
    Unavailable {
        transaction_id: String,
        message: String,
    },
    /// Unexpected pipeline fault; details are logged, not returned
    InternalFailure { transaction_id: String },
}

impl ScoreOutcome {
    fn from_error(transaction_id: String, err: &ScoringError) -> Self {
        match err {
            ScoringError::ModelUnavailable(message) => ScoreOutcome::Unavailable {
                transaction_id,
                message: message.clone(),
            },
            ScoringError::Internal { .. } => ScoreOutcome::InternalFailure { transaction_id },
        }
    }

    /// True when a score was produced
    pub fn is_scored(&self) -> bool {
        matches!(self, ScoreOutcome::Scored(_))
    }

    /// Outcome code reported to callers
    pub fn status(&self) -> &'static str {
        match self {
            ScoreOutcome::Scored(_) => "ok",
            ScoreOutcome::Unavailable { .. } => "unavailable",
            ScoreOutcome::InternalFailure { .. } => "internal_error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// `healthy` when the estimator is loaded, `degraded` otherwise
    pub status: &'static str,
    pub model_loaded: bool,
    pub version: &'static str,
}

/// Estimator state plus everything that shapes a decision
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model: ModelStatus,
    pub training: Option<TrainingMetrics>,
    pub weights: FusionWeights,
    pub thresholds: DecisionThresholds,
    pub features: Vec<&'static str>,
    pub rules: Vec<&'static str>,
}

/// Stateless stages shared with the blocking pool
struct ScoringPipeline {
    extractor: FeatureExtractor,
    rules: RuleEngine,
    gateway: Arc<ModelGateway>,
    fuser: ScoreFuser,
}

impl ScoringPipeline {
    fn run(&self, tx: &Transaction, started: Instant) -> ScoringResult<ScoreResult> {
        let features = self.extractor.extract(tx);
        debug!(transaction_id = %tx.transaction_id, stage = %PipelineStage::FeaturesDerived, "Features derived");

        let model_score = self.gateway.predict(&features)?;
        debug!(transaction_id = %tx.transaction_id, stage = %PipelineStage::ModelScored, model_score, "Model scored");

        let evaluation = self.rules.evaluate(tx);
        debug!(
            transaction_id = %tx.transaction_id,
            stage = %PipelineStage::RulesEvaluated,
            triggered = evaluation.findings.len(),
            "Rules evaluated"
        );

        let fused = self.fuser.fuse(model_score, evaluation.rules_score);
        if !fused.score.is_finite() {
            return Err(ScoringError::internal(
                PipelineStage::RulesEvaluated,
                format!("fused score is {}", fused.score),
            ));
        }
        debug!(
            transaction_id = %tx.transaction_id,
            stage = %PipelineStage::Fused,
            fused_score = fused.score,
            decision = %fused.decision,
            "Scores fused"
        );

        Ok(ScoreResult {
            transaction_id: tx.transaction_id.clone(),
            model_score,
            rule_score: evaluation.rules_score,
            fused_score: fused.score,
            decision: fused.decision,
            findings: evaluation.findings,
            rules_evaluated: evaluation.rules_evaluated,
            latency: started.elapsed(),
        })
    }
}

/// Orchestrates scoring and exposes the operational queries
pub struct ScoringService {
    pipeline: Arc<ScoringPipeline>,
    metrics: Arc<MetricsCollector>,
    timeout: Duration,
    training_metrics_path: Option<PathBuf>,
    training: RwLock<Option<TrainingMetrics>>,
    psi: PsiConfig,
}

impl ScoringService {
    /// Service with the reference rule set and the default timeout
    pub fn new(gateway: Arc<ModelGateway>, fuser: ScoreFuser, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            pipeline: Arc::new(ScoringPipeline {
                extractor: FeatureExtractor::new(),
                rules: RuleEngine::new(),
                gateway,
                fuser,
            }),
            metrics,
            timeout: DEFAULT_TIMEOUT,
            training_metrics_path: None,
            training: RwLock::new(None),
            psi: PsiConfig::default(),
        }
    }

    /// Build the service and its collaborators from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let gateway = Arc::new(ModelGateway::new(&config.model.path, config.model.onnx_threads));
        let fuser = config.scoring.fuser()?;
        let metrics = Arc::new(MetricsCollector::with_window_size(config.metrics.window_size));

        let mut service = Self::new(gateway, fuser, metrics)
            .with_timeout(Duration::from_millis(config.pipeline.timeout_ms))
            .with_psi_config(config.drift.psi());
        if let Some(path) = &config.model.training_metrics_path {
            service = service.with_training_metrics_path(path);
        }
        Ok(service)
    }

    /// Request timeout; also bounds health-check and reload artifact loads
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Binning used by [`ScoringService::check_drift`]
    pub fn with_psi_config(mut self, psi: PsiConfig) -> Self {
        self.psi = psi;
        self
    }

    /// Read training metrics now and again on every model reload
    pub fn with_training_metrics_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        let path = path.into();
        *self.training.get_mut() = TrainingMetrics::load(&path);
        self.training_metrics_path = Some(path);
        self
    }

    /// Score with a different rule set
    pub fn with_rule_engine(mut self, rules: RuleEngine) -> Self {
        self.pipeline = Arc::new(ScoringPipeline {
            extractor: self.pipeline.extractor,
            rules,
            gateway: self.pipeline.gateway.clone(),
            fuser: self.pipeline.fuser,
        });
        self
    }

    /// Shared collector, for the periodic reporter
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Gateway owning the cached estimator
    pub fn gateway(&self) -> &Arc<ModelGateway> {
        &self.pipeline.gateway
    }

    /// Run the pipeline synchronously on the calling thread.
    ///
    /// Does not touch metrics; [`ScoringService::score`] is the recorded
    /// entry point.
    pub fn evaluate(&self, tx: &Transaction) -> ScoringResult<ScoreResult> {
        self.pipeline.run(tx, Instant::now())
    }

    /// Score one validated transaction.
    ///
    /// Every non-scored outcome increments the error counter exactly once and
    /// leaves the rolling windows untouched.
    pub async fn score(&self, tx: Transaction) -> ScoreOutcome {
        let started = Instant::now();
        let transaction_id = tx.transaction_id.clone();
        debug!(transaction_id = %transaction_id, stage = %PipelineStage::Received, "Scoring request received");

        let pipeline = self.pipeline.clone();
        let task = tokio::task::spawn_blocking(move || pipeline.run(&tx, started));

        let result = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ScoringError::internal(
                PipelineStage::Received,
                format!("scoring task failed: {}", join_error),
            )),
            Err(_) if !self.pipeline.gateway.is_loaded() => Err(ScoringError::ModelUnavailable(format!(
                "estimator not loaded within {:?}",
                self.timeout
            ))),
            Err(_) => Err(ScoringError::internal(
                PipelineStage::Received,
                format!("request exceeded {:?}", self.timeout),
            )),
        };

        match result {
            Ok(result) => {
                self.metrics
                    .record(result.latency, result.decision, result.fused_score);
                debug!(transaction_id = %transaction_id, stage = %PipelineStage::MetricsRecorded, "Metrics recorded");

                let response = result.to_response();
                debug!(
                    transaction_id = %transaction_id,
                    fraud_score = response.fraud_score,
                    decision = %response.decision,
                    latency_ms = response.latency_ms,
                    "Transaction scored"
                );
                ScoreOutcome::Scored(response)
            }
            Err(err) => {
                self.metrics.record_error();
                match &err {
                    ScoringError::ModelUnavailable(_) => {
                        warn!(transaction_id = %transaction_id, error = %err, "Scoring unavailable")
                    }
                    ScoringError::Internal { .. } => {
                        error!(transaction_id = %transaction_id, error = %err, "Scoring failed")
                    }
                }
                ScoreOutcome::from_error(transaction_id, &err)
            }
        }
    }

    /// Liveness plus estimator readiness; attempts a lazy load.
    ///
    /// A load that outlasts the request timeout reports the model as not
    /// loaded.
    pub async fn health(&self) -> HealthStatus {
        let gateway = self.pipeline.gateway.clone();
        let load = tokio::task::spawn_blocking(move || gateway.ensure_loaded().is_ok());
        let model_loaded = match tokio::time::timeout(self.timeout, load).await {
            Ok(Ok(loaded)) => loaded,
            Ok(Err(join_error)) => {
                error!(error = %join_error, "Health check load task failed");
                false
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "Health check load timed out");
                false
            }
        };
        HealthStatus {
            status: if model_loaded { "healthy" } else { "degraded" },
            model_loaded,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Current metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Estimator status, training metrics and decision configuration
    pub fn model_info(&self) -> ModelInfo {
        let pipeline = &self.pipeline;
        ModelInfo {
            model: pipeline.gateway.status(),
            training: self.training.read().clone(),
            weights: pipeline.fuser.weights(),
            thresholds: pipeline.fuser.thresholds(),
            features: pipeline.extractor.feature_names().to_vec(),
            rules: pipeline.rules.rules().iter().map(|r| r.name()).collect(),
        }
    }

    /// Hot-swap the estimator and refresh training metrics.
    ///
    /// A reload that outlasts the request timeout is reported unavailable;
    /// the load itself keeps running and swaps in the estimator if it
    /// eventually succeeds.
    pub async fn reload_model(&self) -> ScoringResult<ModelStatus> {
        info!(path = %self.pipeline.gateway.artifact_path().display(), "Reloading model");

        let gateway = self.pipeline.gateway.clone();
        let training_path = self.training_metrics_path.clone();
        let task = tokio::task::spawn_blocking(move || -> ScoringResult<Option<TrainingMetrics>> {
            gateway.reload()?;
            Ok(training_path.and_then(TrainingMetrics::load))
        });

        let training = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                return Err(ScoringError::internal(
                    PipelineStage::Received,
                    format!("reload task failed: {}", join_error),
                ))
            }
            Err(_) => {
                return Err(ScoringError::ModelUnavailable(format!(
                    "reload did not finish within {:?}",
                    self.timeout
                )))
            }
        };

        if self.training_metrics_path.is_some() {
            *self.training.write() = training;
        }
        Ok(self.pipeline.gateway.status())
    }

    /// PSI drift report over every model feature
    pub fn check_drift(&self, reference: &Dataset, current: &Dataset) -> DriftReport {
        check_drift(reference, current, &FEATURE_NAMES, &self.psi)
    }
}
