//! Risk classifier: schema enforcement around a scoring model

use super::ScoringModel;
use crate::error::PipelineError;
use crate::types::{FeatureSchema, FeatureVector};
use std::sync::Arc;
use tracing::{debug, error};

/// Tolerance for `p_normal + p_fraud == 1`.
pub const PROBABILITY_SUM_TOLERANCE: f64 = 1e-6;

/// Classifier output before risk levelling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub pred_class: u8,
    pub probabilities: [f64; 2],
}

impl Score {
    pub fn fraud_probability(&self) -> f64 {
        self.probabilities[1]
    }
}

/// Stateless scoring entry point.
///
/// Holds the schema the model was bound to and refuses any vector that does
/// not match it before a single number is computed.
#[derive(Clone)]
pub struct RiskClassifier {
    schema: Arc<FeatureSchema>,
    model: Arc<dyn ScoringModel>,
}

impl RiskClassifier {
    pub fn new(schema: Arc<FeatureSchema>, model: Arc<dyn ScoringModel>) -> Self {
        Self { schema, model }
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Score a feature vector.
    ///
    /// Fails with `SchemaMismatch` for vectors that do not match the schema
    /// and with `ClassifierFault` when the model output is not a valid
    /// two-class distribution. Outputs are never clamped.
    pub fn score(&self, vector: &FeatureVector) -> Result<Score, PipelineError> {
        let row = match self.schema.encode(vector) {
            Ok(row) => row,
            Err(e) => {
                error!(
                    schema = self.schema.version(),
                    vector_schema = vector.schema_version(),
                    error = %e,
                    "Feature vector rejected before scoring"
                );
                return Err(e);
            }
        };

        let output = self
            .model
            .predict_proba(&row)
            .map_err(|e| self.fault(format!("model {} failed: {e}", self.model.name())))?;

        let probabilities = self.validate_output(&output)?;

        // Ties resolve to class 0 (normal)
        let pred_class = u8::from(probabilities[1] > probabilities[0]);

        debug!(
            model = self.model.name(),
            pred_class,
            p_fraud = probabilities[1],
            "Vector scored"
        );

        Ok(Score {
            pred_class,
            probabilities,
        })
    }

    fn validate_output(&self, output: &[f64]) -> Result<[f64; 2], PipelineError> {
        let [p_normal, p_fraud] = output else {
            return Err(self.fault(format!(
                "expected 2 class probabilities, got {}",
                output.len()
            )));
        };

        for p in [*p_normal, *p_fraud] {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(self.fault(format!("probability {p} is outside [0, 1]")));
            }
        }

        let sum = p_normal + p_fraud;
        if (sum - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
            return Err(self.fault(format!("probabilities sum to {sum}, not 1")));
        }

        Ok([*p_normal, *p_fraud])
    }

    fn fault(&self, message: String) -> PipelineError {
        error!(model = self.model.name(), %message, "Classifier invariant violated");
        PipelineError::ClassifierFault(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::features::{FieldConfig, SchemaConfig};
    use crate::types::{Feature, FeatureValue};

    /// Returns a fixed output regardless of input.
    struct FixedModel(Vec<f64>);

    impl ScoringModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict_proba(&self, _row: &[f64]) -> anyhow::Result<Vec<f64>> {
            Ok(self.0.clone())
        }
    }

    struct FailingModel;

    impl ScoringModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        fn predict_proba(&self, _row: &[f64]) -> anyhow::Result<Vec<f64>> {
            anyhow::bail!("session crashed")
        }
    }

    fn schema() -> Arc<FeatureSchema> {
        let field = |name: &str| FieldConfig {
            name: name.into(),
            kind: "numeric".into(),
            vocabulary: vec![],
            default: None,
            other: None,
        };
        Arc::new(
            FeatureSchema::from_config(&SchemaConfig {
                version: "test-v1".into(),
                fields: vec![field("tx_count"), field("age_days")],
            })
            .unwrap(),
        )
    }

    fn vector() -> FeatureVector {
        FeatureVector::new(
            "test-v1",
            vec![
                Feature {
                    name: "tx_count".into(),
                    value: FeatureValue::Numeric(50.0),
                },
                Feature {
                    name: "age_days".into(),
                    value: FeatureValue::Numeric(400.0),
                },
            ],
        )
    }

    fn classifier(output: Vec<f64>) -> RiskClassifier {
        RiskClassifier::new(schema(), Arc::new(FixedModel(output)))
    }

    #[test]
    fn test_argmax_class() {
        let score = classifier(vec![0.2, 0.8]).score(&vector()).unwrap();
        assert_eq!(score.pred_class, 1);
        assert_eq!(score.probabilities, [0.2, 0.8]);

        let score = classifier(vec![0.9, 0.1]).score(&vector()).unwrap();
        assert_eq!(score.pred_class, 0);
    }

    #[test]
    fn test_tie_resolves_to_normal() {
        let score = classifier(vec![0.5, 0.5]).score(&vector()).unwrap();
        assert_eq!(score.pred_class, 0);
    }

    #[test]
    fn test_missing_field_is_rejected_before_scoring() {
        let err = classifier(vec![0.2, 0.8])
            .score(&vector().without("age_days"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));
    }

    #[test]
    fn test_invalid_outputs_are_faults() {
        for output in [
            vec![0.2, 0.9],
            vec![-0.1, 1.1],
            vec![f64::NAN, 0.5],
            vec![1.0],
            vec![0.2, 0.3, 0.5],
        ] {
            let err = classifier(output.clone()).score(&vector()).unwrap_err();
            assert!(
                matches!(err, PipelineError::ClassifierFault(_)),
                "{output:?} should be a fault"
            );
        }
    }

    #[test]
    fn test_sum_within_tolerance_is_accepted() {
        let score = classifier(vec![0.3, 0.7 + 5e-7]).score(&vector()).unwrap();
        assert_eq!(score.pred_class, 1);
    }

    #[test]
    fn test_model_error_is_fault() {
        let classifier = RiskClassifier::new(schema(), Arc::new(FailingModel));
        assert!(matches!(
            classifier.score(&vector()),
            Err(PipelineError::ClassifierFault(_))
        ));
    }
}
