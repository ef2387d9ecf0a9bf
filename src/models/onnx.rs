//! ONNX-backed scoring model (cargo feature `onnx`)

use super::ScoringModel;
use anyhow::{anyhow, Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Binary classifier exported to ONNX.
///
/// Accepts a `[1, n]` float tensor and reads class probabilities from either
/// a `[1, 2]` tensor or a `seq(map(int64, float))` output.
pub struct OnnxModel {
    name: String,
    /// `Session::run` needs `&mut`; the lock only serialises access to the session
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxModel {
    pub fn load<P: AsRef<Path>>(path: P, onnx_threads: usize) -> Result<Self> {
        let path = path.as_ref();

        ort::init().commit()?;
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

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(Self {
            name,
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    fn extract_probabilities(&self, outputs: &SessionOutputs<'_>) -> Result<Vec<f64>> {
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| anyhow!("model output '{}' missing", self.output_name))?;

        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            debug!(model = %self.name, ?dims, "Extracted from tensor");
            return probabilities_from_tensor(&dims, data);
        }

        if DynSequenceValueType::can_downcast(&output.dtype()) {
            return self.extract_from_sequence_map(&output);
        }

        Err(anyhow!(
            "model output '{}' is neither a tensor nor seq(map)",
            self.output_name
        ))
    }

    /// Read `{0: p_normal, 1: p_fraud}` from the first map of a seq(map) output.
    fn extract_from_sequence_map(&self, output: &DynValue) -> Result<Vec<f64>> {
        let allocator = Allocator::default();
        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| anyhow!("Failed to downcast to sequence: {e}"))?;
        let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
        let first = maps.first().ok_or_else(|| anyhow!("Empty sequence"))?;

        let mut probabilities = [None, None];
        for (class_id, prob) in first.try_extract_key_values::<i64, f32>()? {
            if let Some(slot) = usize::try_from(class_id)
                .ok()
                .and_then(|i| probabilities.get_mut(i))
            {
                *slot = Some(f64::from(prob));
            }
        }

        match probabilities {
            [Some(p0), Some(p1)] => Ok(vec![p0, p1]),
            _ => Err(anyhow!("seq(map) output lacks class 0 or class 1")),
        }
    }
}

/// Interpret a probability tensor for batch size 1.
fn probabilities_from_tensor(dims: &[i64], data: &[f32]) -> Result<Vec<f64>> {
    let classes = match dims {
        [1, n] | [n] => *n,
        _ => return Err(anyhow!("unexpected probability tensor shape {dims:?}")),
    };

    match (classes, data) {
        (2, [p0, p1, ..]) => Ok(vec![f64::from(*p0), f64::from(*p1)]),
        // Single fraud probability
        (1, [p]) => Ok(vec![1.0 - f64::from(*p), f64::from(*p)]),
        _ => Err(anyhow!(
            "expected 2 class probabilities, got shape {dims:?} with {} values",
            data.len()
        )),
    }
}

impl ScoringModel for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>> {
        let features: Vec<f32> = row.iter().map(|&x| x as f32).collect();
        let shape = vec![1_i64, features.len() as i64];
        let input = Tensor::from_array((shape, features)).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow!("Lock error: {e}"))?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input])?;
        self.extract_probabilities(&outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_shapes() {
        assert_eq!(
            probabilities_from_tensor(&[1, 2], &[0.25, 0.75]).unwrap(),
            vec![0.25, 0.75]
        );
        assert_eq!(
            probabilities_from_tensor(&[1, 1], &[0.75]).unwrap(),
            vec![0.25, 0.75]
        );
        assert!(probabilities_from_tensor(&[1, 3], &[0.2, 0.3, 0.5]).is_err());
        assert!(probabilities_from_tensor(&[2, 2, 2], &[0.5; 8]).is_err());
    }
}
