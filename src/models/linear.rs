//! Frozen linear (logistic) wallet risk model

use super::ScoringModel;
use crate::types::{FeatureSchema, FieldKind};
use anyhow::{bail, ensure, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Per-field numeric weight as stored in the model file.
#[derive(Debug, Clone, Deserialize)]
pub struct NumericWeight {
    pub weight: f64,
    #[serde(default)]
    pub center: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Apply `ln(1 + max(x, 0))` before standardising
    #[serde(default)]
    pub log1p: bool,
}

fn default_scale() -> f64 {
    1.0
}

/// Bound on each column's contribution and on the summed logit. Keeps
/// `exp` finite for extreme but valid inputs.
const MAX_LOGIT: f64 = 700.0;

/// On-disk model description.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearModelSpec {
    pub name: String,
    pub schema_version: String,
    pub intercept: f64,
    #[serde(default)]
    pub numeric: HashMap<String, NumericWeight>,
    /// Field → (category → weight). Unlisted categories weigh 0.
    #[serde(default)]
    pub categorical: HashMap<String, HashMap<String, f64>>,
}

#[derive(Debug, Clone)]
enum Column {
    Numeric(NumericWeight),
    Categorical(Vec<f64>),
}

/// Two-class softmax over `[0, z]` where `z` is a linear fraud logit.
#[derive(Debug, Clone)]
pub struct LinearModel {
    name: String,
    intercept: f64,
    columns: Vec<Column>,
}

impl LinearModel {
    /// Load a model file and bind it to `schema`.
    pub fn load<P: AsRef<Path>>(path: P, schema: &FeatureSchema) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file {}", path.display()))?;
        let spec: LinearModelSpec = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse model file {}", path.display()))?;

        let model = Self::from_spec(spec, schema)
            .with_context(|| format!("Model {} does not fit the feature schema", path.display()))?;

        info!(
            model = %model.name,
            path = %path.display(),
            columns = model.columns.len(),
            "Linear model loaded"
        );
        Ok(model)
    }

    /// Bind a model description to a schema. Every schema field must have exactly one weight entry.
    pub fn from_spec(spec: LinearModelSpec, schema: &FeatureSchema) -> Result<Self> {
        ensure!(
            spec.schema_version == schema.version(),
            "model was trained on schema '{}', service runs '{}'",
            spec.schema_version,
            schema.version()
        );
        ensure!(spec.intercept.is_finite(), "model intercept is not finite");

        let mut columns = Vec::with_capacity(schema.len());
        for field in schema.fields() {
            let column = match &field.kind {
                FieldKind::Numeric => {
                    let Some(w) = spec.numeric.get(&field.name) else {
                        bail!("model has no numeric weight for field '{}'", field.name);
                    };
                    ensure!(
                        w.weight.is_finite() && w.center.is_finite() && w.scale.is_finite(),
                        "weights for field '{}' are not finite",
                        field.name
                    );
                    ensure!(w.scale != 0.0, "field '{}' has a zero scale", field.name);
                    Column::Numeric(w.clone())
                }
                FieldKind::Categorical { vocabulary, .. } => {
                    let Some(weights) = spec.categorical.get(&field.name) else {
                        bail!("model has no categorical weights for field '{}'", field.name);
                    };
                    if let Some(unknown) = weights.keys().find(|k| !vocabulary.contains(k)) {
                        bail!(
                            "model weights category '{unknown}' which is not in the \
                             vocabulary of '{}'",
                            field.name
                        );
                    }
                    let per_index: Vec<f64> = vocabulary
                        .iter()
                        .map(|v| weights.get(v).copied().unwrap_or(0.0))
                        .collect();
                    ensure!(
                        per_index.iter().all(|w| w.is_finite()),
                        "weights for field '{}' are not finite",
                        field.name
                    );
                    Column::Categorical(per_index)
                }
            };
            columns.push(column);
        }

        let expected = spec.numeric.len() + spec.categorical.len();
        ensure!(
            expected == schema.len(),
            "model weights {} fields but the schema has {}",
            expected,
            schema.len()
        );

        Ok(Self {
            name: spec.name,
            intercept: spec.intercept,
            columns,
        })
    }

    fn fraud_logit(&self, row: &[f64]) -> Result<f64> {
        ensure!(
            row.len() == self.columns.len(),
            "model expects {} inputs, got {}",
            self.columns.len(),
            row.len()
        );

        let mut z = self.intercept;
        for (column, &x) in self.columns.iter().zip(row) {
            let contribution = match column {
                Column::Numeric(w) if w.weight == 0.0 => 0.0,
                Column::Numeric(w) => {
                    let x = if w.log1p { x.max(0.0).ln_1p() } else { x };
                    w.weight * ((x - w.center) / w.scale)
                }
                Column::Categorical(weights) => {
                    let Some(weight) = weights.get(x as usize) else {
                        bail!("category code {x} out of range");
                    };
                    *weight
                }
            };
            z += contribution.clamp(-MAX_LOGIT, MAX_LOGIT);
        }
        Ok(z.clamp(-MAX_LOGIT, MAX_LOGIT))
    }
}

impl ScoringModel for LinearModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>> {
        let z = self.fraud_logit(row)?;
        Ok(softmax(&[0.0, z]))
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::features::{FieldConfig, SchemaConfig};

    fn schema() -> FeatureSchema {
        FeatureSchema::from_config(&SchemaConfig {
            version: "test-v1".into(),
            fields: vec![
                FieldConfig {
                    name: "tx_count".into(),
                    kind: "numeric".into(),
                    vocabulary: vec![],
                    default: None,
                    other: None,
                },
                FieldConfig {
                    name: "counterparty_category".into(),
                    kind: "categorical".into(),
                    vocabulary: vec!["exchange".into(), "mixer".into(), "other".into()],
                    default: Some("other".into()),
                    other: Some("other".into()),
                },
            ],
        })
        .unwrap()
    }

    fn spec() -> LinearModelSpec {
        serde_json::from_str(
            r#"{
                "name": "test",
                "schema_version": "test-v1",
                "intercept": -1.0,
                "numeric": {"tx_count": {"weight": 0.5, "log1p": false}},
                "categorical": {"counterparty_category": {"mixer": 2.0}}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_probabilities_follow_logit() {
        let model = LinearModel::from_spec(spec(), &schema()).unwrap();

        // z = -1 + 0.5 * 2 + 0 = 0 -> even odds
        let even = model.predict_proba(&[2.0, 2.0]).unwrap();
        assert!((even[0] - 0.5).abs() < 1e-12);
        assert!((even[1] - 0.5).abs() < 1e-12);

        // z = -1 + 0.5 * 2 + 2 = 2 -> fraud favoured
        let mixer = model.predict_proba(&[2.0, 1.0]).unwrap();
        assert!(mixer[1] > 0.85);
        assert!((mixer[0] + mixer[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_wrong_width_is_error() {
        let model = LinearModel::from_spec(spec(), &schema()).unwrap();
        assert!(model.predict_proba(&[1.0]).is_err());
    }

    #[test]
    fn test_spec_must_match_schema() {
        let mut wrong_version = spec();
        wrong_version.schema_version = "test-v0".into();
        assert!(LinearModel::from_spec(wrong_version, &schema()).is_err());

        let mut missing = spec();
        missing.numeric.clear();
        assert!(LinearModel::from_spec(missing, &schema()).is_err());

        let mut extra = spec();
        extra.numeric.insert(
            "age_days".into(),
            NumericWeight {
                weight: 1.0,
                center: 0.0,
                scale: 1.0,
                log1p: false,
            },
        );
        assert!(LinearModel::from_spec(extra, &schema()).is_err());

        let mut unknown_category = spec();
        unknown_category
            .categorical
            .get_mut("counterparty_category")
            .unwrap()
            .insert("casino".into(), 1.0);
        assert!(LinearModel::from_spec(unknown_category, &schema()).is_err());
    }

    #[test]
    fn test_softmax_is_stable() {
        let p = softmax(&[0.0, 1000.0]);
        assert!(p.iter().all(|v| v.is_finite()));
        assert!((p[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_extreme_inputs_keep_probabilities_finite() {
        let mut steep = spec();
        steep.numeric.get_mut("tx_count").unwrap().weight = 4.0;
        let model = LinearModel::from_spec(steep, &schema()).unwrap();

        let high = model.predict_proba(&[1e308, 1.0]).unwrap();
        assert!(high.iter().all(|p| p.is_finite()));
        assert!((high[0] + high[1] - 1.0).abs() < 1e-12);
        assert!(high[1] > high[0]);

        let low = model.predict_proba(&[-1e308, 1.0]).unwrap();
        assert!(low.iter().all(|p| p.is_finite()));
        assert!((low[0] + low[1] - 1.0).abs() < 1e-12);
        assert!(low[0] > low[1]);
    }

    #[test]
    fn test_shipped_model_survives_overflowing_ratio() {
        let config = crate::config::AppConfig::default();
        let schema = FeatureSchema::from_config(&config.schema).unwrap();
        let model = LinearModel::load(&config.model.path, &schema).unwrap();

        // failed_tx_ratio is unlogged with weight 2.0, so 1e308 overflows unbounded
        let mut row = vec![0.0; schema.len()];
        row[3] = 4.0;
        row[8] = 1e308;
        let p = model.predict_proba(&row).unwrap();
        assert!(p.iter().all(|v| v.is_finite()));
        assert!((p[0] + p[1] - 1.0).abs() < 1e-12);
        assert!(p[1] > 0.99);
    }

    #[test]
    fn test_shipped_model_matches_shipped_schema() {
        let config = crate::config::AppConfig::default();
        let schema = FeatureSchema::from_config(&config.schema).unwrap();
        let model = LinearModel::load(&config.model.path, &schema).unwrap();
        assert_eq!(model.columns.len(), schema.len());
    }
}
