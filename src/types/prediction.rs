//! Prediction results and batch records

use crate::error::{ErrorKind, PipelineError};
use serde::{Deserialize, Serialize};

/// Discrete risk label derived from the fraud probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

/// Verdict for one wallet or one feature row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// 0 = normal, 1 = fraud
    pub pred_class: u8,
    /// `[p_normal, p_fraud]`
    pub probabilities: [f64; 2],
    pub risk_level: RiskLevel,
}

impl PredictionResult {
    pub fn fraud_probability(&self) -> f64 {
        self.probabilities[1]
    }
}

/// Error marker occupying a failed item's position in a batch response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub error: String,
}

impl From<&PipelineError> for ErrorRecord {
    fn from(err: &PipelineError) -> Self {
        Self {
            kind: err.kind(),
            error: err.to_string(),
        }
    }
}

/// One position in a batch response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchItem {
    Prediction(PredictionResult),
    Error(ErrorRecord),
}

impl BatchItem {
    pub fn prediction(&self) -> Option<&PredictionResult> {
        match self {
            BatchItem::Prediction(p) => Some(p),
            BatchItem::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        match self {
            BatchItem::Prediction(_) => None,
            BatchItem::Error(e) => Some(e),
        }
    }
}

impl From<Result<PredictionResult, PipelineError>> for BatchItem {
    fn from(result: Result<PredictionResult, PipelineError>) -> Self {
        match result {
            Ok(prediction) => BatchItem::Prediction(prediction),
            Err(err) => BatchItem::Error(ErrorRecord::from(&err)),
        }
    }
}
