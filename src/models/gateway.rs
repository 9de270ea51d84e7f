//! Process-wide owner of the trained estimator
//!
//! The estimator is loaded lazily on first use and cached. Readers take a
//! short read lock and clone an `Arc`; loading and reloading are serialized
//! behind a separate mutex so a burst of cold-start requests performs a
//! single artifact load.

use crate::error::{PipelineStage, ScoringError, ScoringResult};
use crate::feature_extractor::FeatureVector;
use crate::models::estimator::{ArtifactLoader, Estimator, FileArtifactLoader};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
struct LoadedEstimator {
    estimator: Arc<dyn Estimator>,
    loaded_at: DateTime<Utc>,
    generation: u64,
}

/// Current state of the cached estimator
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub loaded: bool,
    pub path: String,
    pub kind: Option<&'static str>,
    pub loaded_at: Option<DateTime<Utc>>,
    /// Successful loads since startup
    pub generation: u64,
}

/// Owns the cached estimator and serializes its loading
pub struct ModelGateway {
    path: PathBuf,
    loader: Arc<dyn ArtifactLoader>,
    cached: RwLock<Option<LoadedEstimator>>,
    /// Serializes load and reload
    load_lock: Mutex<()>,
    load_attempts: AtomicU64,
    generation: AtomicU64,
}

impl ModelGateway {
    /// Gateway reading artifacts from disk
    pub fn new<P: Into<PathBuf>>(path: P, onnx_threads: usize) -> Self {
        Self::with_loader(path, Arc::new(FileArtifactLoader::with_threads(onnx_threads)))
    }

    /// Gateway with a custom artifact loader
    pub fn with_loader<P: Into<PathBuf>>(path: P, loader: Arc<dyn ArtifactLoader>) -> Self {
        Self {
            path: path.into(),
            loader,
            cached: RwLock::new(None),
            load_lock: Mutex::new(()),
            load_attempts: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Location the artifact is loaded from
    pub fn artifact_path(&self) -> &Path {
        &self.path
    }

    /// True while an estimator is cached
    pub fn is_loaded(&self) -> bool {
        self.cached.read().is_some()
    }

    /// Number of times the artifact loader has been invoked
    pub fn load_count(&self) -> u64 {
        self.load_attempts.load(Ordering::SeqCst)
    }

    /// Return the cached estimator, loading it on first use
    pub fn ensure_loaded(&self) -> ScoringResult<Arc<dyn Estimator>> {
        if let Some(estimator) = self.current() {
            return Ok(estimator);
        }

        let _guard = self.load_lock.lock();
        // Another caller may have finished loading while we waited
        if let Some(estimator) = self.current() {
            return Ok(estimator);
        }

        let loaded = self.load_artifact()?;
        let estimator = loaded.estimator.clone();
        *self.cached.write() = Some(loaded);
        Ok(estimator)
    }

    /// Fraud probability for one feature vector
    pub fn predict(&self, features: &FeatureVector) -> ScoringResult<f64> {
        let estimator = self.ensure_loaded()?;

        let probability = estimator
            .predict_probability(features)
            .map_err(|e| ScoringError::internal(PipelineStage::FeaturesDerived, format!("{:#}", e)))?;

        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(ScoringError::internal(
                PipelineStage::FeaturesDerived,
                format!("estimator returned probability {} outside [0, 1]", probability),
            ));
        }

        Ok(probability)
    }

    /// Force re-acquisition of the artifact.
    ///
    /// On success the new estimator replaces the old one in a single swap.
    /// On failure the cache is invalidated, so callers see the model as
    /// unavailable rather than silently scoring with a stale artifact.
    pub fn reload(&self) -> ScoringResult<()> {
        let _guard = self.load_lock.lock();
        match self.load_artifact() {
            Ok(loaded) => {
                info!(generation = loaded.generation, "Estimator reloaded");
                *self.cached.write() = Some(loaded);
                Ok(())
            }
            Err(e) => {
                *self.cached.write() = None;
                Err(e)
            }
        }
    }

    /// Snapshot of the cached estimator, for health and model info
    pub fn status(&self) -> ModelStatus {
        let cached = self.cached.read();
        ModelStatus {
            loaded: cached.is_some(),
            path: self.path.display().to_string(),
            kind: cached.as_ref().map(|c| c.estimator.kind()),
            loaded_at: cached.as_ref().map(|c| c.loaded_at),
            generation: cached.as_ref().map(|c| c.generation).unwrap_or(0),
        }
    }

    fn current(&self) -> Option<Arc<dyn Estimator>> {
        self.cached.read().as_ref().map(|c| c.estimator.clone())
    }

    /// Caller must hold `load_lock`
    fn load_artifact(&self) -> ScoringResult<LoadedEstimator> {
        self.load_attempts.fetch_add(1, Ordering::SeqCst);
        info!(path = %self.path.display(), "Loading estimator artifact");

        match self.loader.load(&self.path) {
            Ok(estimator) => Ok(LoadedEstimator {
                estimator,
                loaded_at: Utc::now(),
                generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            }),
            Err(e) => {
                error!(path = %self.path.display(), error = %format!("{:#}", e), "Estimator artifact unavailable");
                Err(ScoringError::ModelUnavailable(format!("{:#}", e)))
            }
        }
    }
}

impl std::fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelGateway")
            .field("path", &self.path)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
