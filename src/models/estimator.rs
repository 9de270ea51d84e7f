//! Estimator contract and artifact loading
//!
//! The trained model is opaque to the pipeline: anything that maps a
//! [`FeatureVector`] to a fraud probability can back the gateway.

use crate::feature_extractor::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// A trained fraud probability estimator
pub trait Estimator: Send + Sync {
    /// Probability that the transaction behind `features` is fraudulent
    fn predict_probability(&self, features: &FeatureVector) -> Result<f64>;

    /// Short identifier for logs and model info
    fn kind(&self) -> &'static str;
}

/// Turns an artifact location into a ready estimator
pub trait ArtifactLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn Estimator>>;
}

/// Logistic regression stored as JSON.
///
/// `feature_names` pins the input order the weights were fitted against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticEstimator {
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LogisticEstimator {
    pub fn new(weights: [f64; FEATURE_COUNT], intercept: f64) -> Self {
        Self {
            feature_names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
            weights: weights.to_vec(),
            intercept,
        }
    }

    /// Load and validate a JSON artifact
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let estimator: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("Failed to deserialize model from {}", path.display()))?;
        estimator.validate()?;
        Ok(estimator)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.feature_names.len() == FEATURE_COUNT
                && self
                    .feature_names
                    .iter()
                    .zip(FEATURE_NAMES.iter())
                    .all(|(a, b)| a == b),
            "Model feature order {:?} does not match extractor order {:?}",
            self.feature_names,
            FEATURE_NAMES
        );
        ensure!(
            self.weights.len() == FEATURE_COUNT,
            "Expected {} weights, found {}",
            FEATURE_COUNT,
            self.weights.len()
        );
        ensure!(
            self.intercept.is_finite() && self.weights.iter().all(|w| w.is_finite()),
            "Model parameters must be finite"
        );
        Ok(())
    }
}

impl Estimator for LogisticEstimator {
    fn predict_probability(&self, features: &FeatureVector) -> Result<f64> {
        let logit = self.intercept
            + self
                .weights
                .iter()
                .zip(features.values())
                .map(|(w, x)| w * x)
                .sum::<f64>();
        Ok(1.0 / (1.0 + (-logit).exp()))
    }

    fn kind(&self) -> &'static str {
        "logistic"
    }
}

/// Loads estimators from disk, choosing the format by file extension
#[derive(Debug, Clone)]
pub struct FileArtifactLoader {
    /// Threads per ONNX session
    #[cfg_attr(not(feature = "onnx"), allow(dead_code))]
    onnx_threads: usize,
}

impl FileArtifactLoader {
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }
}

impl Default for FileArtifactLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactLoader for FileArtifactLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Estimator>> {
        if !path.exists() {
            bail!("Model not found: {}", path.display());
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let estimator: Arc<dyn Estimator> = match extension.as_deref() {
            Some("json") => Arc::new(LogisticEstimator::from_json_file(path)?),
            #[cfg(feature = "onnx")]
            Some("onnx") => Arc::new(super::onnx::OnnxEstimator::load(path, self.onnx_threads)?),
            #[cfg(not(feature = "onnx"))]
            Some("onnx") => bail!(
                "{} is an ONNX model but ONNX support is not compiled in (enable the `onnx` feature)",
                path.display()
            ),
            _ => bail!("Unsupported model artifact format: {}", path.display()),
        };

        info!(path = %path.display(), kind = estimator.kind(), "Estimator artifact loaded");
        Ok(estimator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::FeatureExtractor;
    use crate::types::Transaction;
    use std::io::Write;

    fn write_artifact(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_logistic_probability() {
        let features = FeatureExtractor::new().extract(&Transaction::new("t", "u", 0.0));

        let zero = LogisticEstimator::new([0.0; FEATURE_COUNT], 0.0);
        assert_eq!(zero.predict_probability(&features).unwrap(), 0.5);

        let confident = LogisticEstimator::new([0.0; FEATURE_COUNT], 10.0);
        assert!(confident.predict_probability(&features).unwrap() > 0.99);
    }

    #[test]
    fn test_load_json_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let model = LogisticEstimator::new([0.1; FEATURE_COUNT], -2.0);
        let path = write_artifact(&dir, "model.json", &serde_json::to_string(&model).unwrap());

        let loaded = FileArtifactLoader::new().load(&path).unwrap();
        assert_eq!(loaded.kind(), "logistic");
    }

    #[test]
    fn test_missing_artifact() {
        let err = FileArtifactLoader::new()
            .load(Path::new("/nonexistent/fraud_model.json"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("Model not found"));
    }

    #[test]
    fn test_corrupt_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(&dir, "model.json", "{not json");
        assert!(FileArtifactLoader::new().load(&path).is_err());
    }

    #[test]
    fn test_feature_order_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = LogisticEstimator::new([0.1; FEATURE_COUNT], 0.0);
        model.feature_names.swap(0, 1);
        let path = write_artifact(&dir, "model.json", &serde_json::to_string(&model).unwrap());

        let err = FileArtifactLoader::new().load(&path).err().unwrap();
        assert!(err.to_string().contains("feature order"));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(&dir, "model.joblib", "binary");
        assert!(FileArtifactLoader::new().load(&path).is_err());
    }
}
