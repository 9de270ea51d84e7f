//! Offline training metrics shipped next to the model artifact.
//!
//! Display only: nothing in the scoring path reads these values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// ROC-AUC on the held-out set
    pub auc: f64,
    /// F1-optimal probability threshold found during evaluation
    #[serde(default)]
    pub best_threshold: Option<f64>,
    #[serde(default)]
    pub feature_importances: BTreeMap<String, f64>,
}

impl TrainingMetrics {
    /// Read metrics if present; a missing or malformed file yields `None`
    pub fn load<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No training metrics available");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring malformed training metrics");
                None
            }
        }
    }
}
