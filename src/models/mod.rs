//! Scoring models and the risk classifier

pub mod classifier;
pub mod linear;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use classifier::{RiskClassifier, Score};
pub use linear::LinearModel;
#[cfg(feature = "onnx")]
pub use onnx::OnnxModel;

use crate::config::{ModelConfig, ModelKind};
use crate::types::FeatureSchema;
use anyhow::Result;
use std::sync::Arc;

/// A frozen, already-trained binary classifier.
///
/// Takes one encoded feature row and returns its raw class distribution
/// `[p_normal, p_fraud]`. Implementations must be safe to call from many
/// threads at once.
pub trait ScoringModel: Send + Sync {
    fn name(&self) -> &str;

    fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>>;
}

/// Load the configured model and bind it to `schema`.
pub fn load_model(config: &ModelConfig, schema: &FeatureSchema) -> Result<Arc<dyn ScoringModel>> {
    match config.kind {
        ModelKind::Linear => Ok(Arc::new(LinearModel::load(&config.path, schema)?)),
        #[cfg(feature = "onnx")]
        ModelKind::Onnx => Ok(Arc::new(OnnxModel::load(&config.path, config.onnx_threads)?)),
        #[cfg(not(feature = "onnx"))]
        ModelKind::Onnx => anyhow::bail!(
            "model.kind = \"onnx\" requires building with the `onnx` feature"
        ),
    }
}
