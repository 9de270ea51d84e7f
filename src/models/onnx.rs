//! ONNX Runtime estimator

use crate::feature_extractor::FeatureVector;
use crate::models::estimator::Estimator;
use anyhow::{anyhow, Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info, warn};

/// Estimator backed by an ONNX Runtime session
pub struct OnnxEstimator {
    /// Session runs need exclusive access
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxEstimator {
    /// Build a session from an `.onnx` file
    pub fn load(path: &Path, onnx_threads: usize) -> Result<Self> {
        info!(path = %path.display(), threads = onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(input = %input_name, output = %output_name, "ONNX session ready");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    /// Class-1 probability from whichever output shape the exporter produced
    fn extract_probability(&self, outputs: &SessionOutputs) -> Result<f64> {
        if let Some(output) = outputs.get(self.output_name.as_str()) {
            if let Some(prob) = probability_from_value(output) {
                return Ok(prob);
            }
        }

        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(prob) = probability_from_value(&output) {
                debug!(output = %name, prob, "Probability read from fallback output");
                return Ok(prob);
            }
        }

        warn!(output = %self.output_name, "No probability output found");
        Err(anyhow!("model produced no readable probability output"))
    }
}

impl Estimator for OnnxEstimator {
    fn predict_probability(&self, features: &FeatureVector) -> Result<f64> {
        let values = features.to_f32();
        let shape = vec![1_i64, values.len() as i64];
        let input = Tensor::from_array((shape, values)).context("Failed to create input tensor")?;

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![&self.input_name => input])?;
        let probability = self.extract_probability(&outputs);
        probability
    }

    fn kind(&self) -> &'static str {
        "onnx"
    }
}

fn probability_from_value(value: &DynValue) -> Option<f64> {
    if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
        return probability_from_tensor(shape.iter().copied().collect(), data);
    }
    let dtype = value.dtype();
    if DynSequenceValueType::can_downcast(&dtype) {
        return probability_from_sequence_map(value).ok();
    }
    None
}

/// `[1, 2]` / `[2]` tensors hold both classes; `[1, 1]` / `[1]` hold class 1 only
fn probability_from_tensor(dims: Vec<i64>, data: &[f32]) -> Option<f64> {
    let classes = *dims.last()?;
    match classes {
        c if c >= 2 => data.get(1).map(|&p| f64::from(p)),
        1 => data.first().map(|&p| f64::from(p)),
        _ => None,
    }
}

/// `seq(map(int64, float))` as written by tree-ensemble converters
fn probability_from_sequence_map(value: &DynValue) -> Result<f64> {
    let allocator = Allocator::default();
    let sequence = value
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow!("Failed to downcast to sequence: {}", e))?;
    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
    let first = maps.first().ok_or_else(|| anyhow!("Empty sequence"))?;
    let pairs = first.try_extract_key_values::<i64, f32>()?;

    if let Some((_, prob)) = pairs.iter().find(|(class, _)| *class == 1) {
        return Ok(f64::from(*prob));
    }
    if let Some((_, prob)) = pairs.iter().find(|(class, _)| *class == 0) {
        return Ok(1.0 - f64::from(*prob));
    }
    Err(anyhow!("No probability found in map"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_probability_shapes() {
        assert_eq!(probability_from_tensor(vec![1, 2], &[0.25, 0.75]), Some(0.75));
        assert_eq!(probability_from_tensor(vec![2], &[0.25, 0.75]), Some(0.75));
        assert_eq!(probability_from_tensor(vec![1, 1], &[0.5]), Some(0.5));
        assert_eq!(probability_from_tensor(vec![1, 0], &[]), None);
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(OnnxEstimator::load(Path::new("/nonexistent/model.onnx"), 1).is_err());
    }
}
