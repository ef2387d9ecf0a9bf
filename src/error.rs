//! Error taxonomy for the risk pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error category, carried into batch error records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnresolvableAddress,
    DataUnavailable,
    SchemaMismatch,
    ClassifierFault,
    InvalidProbability,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnresolvableAddress => "unresolvable_address",
            ErrorKind::DataUnavailable => "data_unavailable",
            ErrorKind::SchemaMismatch => "schema_mismatch",
            ErrorKind::ClassifierFault => "classifier_fault",
            ErrorKind::InvalidProbability => "invalid_probability",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Failure of a single prediction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// The address failed the format or checksum check.
    #[error("invalid wallet address: {0}")]
    UnresolvableAddress(String),

    /// The activity source could not be reached, timed out, or had nothing for the address.
    #[error("wallet activity unavailable: {0}")]
    DataUnavailable(String),

    /// Extractor and classifier disagree on the feature layout.
    #[error("feature schema mismatch between service components: {0}")]
    SchemaMismatch(String),

    /// The scoring model produced an output that is not a probability distribution.
    #[error("classifier produced an invalid output: {0}")]
    ClassifierFault(String),

    #[error("probability out of range: {0}")]
    InvalidProbability(f64),

    /// A batch worker task failed before producing a result.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UnresolvableAddress(_) => ErrorKind::UnresolvableAddress,
            PipelineError::DataUnavailable(_) => ErrorKind::DataUnavailable,
            PipelineError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            PipelineError::ClassifierFault(_) => ErrorKind::ClassifierFault,
            PipelineError::InvalidProbability(_) => ErrorKind::InvalidProbability,
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Transient failures worth retrying later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::DataUnavailable(_))
    }

    /// Failures the caller can fix by changing the input.
    pub fn is_user_error(&self) -> bool {
        matches!(self, PipelineError::UnresolvableAddress(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            PipelineError::SchemaMismatch("x".into()).kind(),
            ErrorKind::SchemaMismatch
        );
        assert_eq!(
            PipelineError::InvalidProbability(1.5).kind().as_str(),
            "invalid_probability"
        );
    }

    #[test]
    fn test_system_faults_are_not_user_errors() {
        let mismatch = PipelineError::SchemaMismatch("missing field tx_count".into());
        let fault = PipelineError::ClassifierFault("NaN".into());

        assert!(!mismatch.is_user_error());
        assert!(!fault.is_user_error());
        assert!(!mismatch.to_string().contains("invalid wallet"));
        assert!(!fault.to_string().contains("invalid wallet"));
        assert!(PipelineError::UnresolvableAddress("bad".into()).is_user_error());
    }

    #[test]
    fn test_only_data_unavailable_is_retryable() {
        assert!(PipelineError::DataUnavailable("timeout".into()).is_retryable());
        assert!(!PipelineError::ClassifierFault("x".into()).is_retryable());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnresolvableAddress).unwrap();
        assert_eq!(json, "\"unresolvable_address\"");
    }
}
