//! Feature schema and feature vectors
//!
//! The schema is the contract shared by the feature extractor and the
//! classifier: field names, their order, and the closed vocabulary of every
//! categorical field. Vectors that do not match it are rejected before
//! scoring.

use crate::error::PipelineError;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Kind of a schema field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldKind {
    Numeric,
    Categorical {
        /// Closed vocabulary; the wire encoding is the index into this list
        vocabulary: Vec<String>,
        /// Sentinel used when the raw value is missing
        default: String,
        /// Bucket for raw values outside the vocabulary
        other: String,
    },
}

impl FieldKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Numeric)
    }

    /// Map a raw category onto the vocabulary.
    ///
    /// Returns `None` for numeric fields.
    pub fn resolve_category(&self, raw: Option<&str>) -> Option<&str> {
        let FieldKind::Categorical {
            vocabulary,
            default,
            other,
        } = self
        else {
            return None;
        };

        let resolved = match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => default,
            Some(raw) => vocabulary
                .iter()
                .find(|v| v.eq_ignore_ascii_case(raw))
                .unwrap_or(other),
        };
        Some(resolved.as_str())
    }

    fn vocabulary_index(&self, value: &str) -> Option<usize> {
        match self {
            FieldKind::Numeric => None,
            FieldKind::Categorical { vocabulary, .. } => {
                vocabulary.iter().position(|v| v == value)
            }
        }
    }
}

/// One named, typed position in the schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

/// Field entry as written in the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldConfig {
    pub name: String,
    /// "numeric" or "categorical"
    pub kind: String,
    #[serde(default)]
    pub vocabulary: Vec<String>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub other: Option<String>,
}

/// Schema section of the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaConfig {
    pub version: String,
    pub fields: Vec<FieldConfig>,
}

/// Ordered, versioned feature schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSchema {
    version: String,
    fields: Vec<FieldSpec>,
}

impl FeatureSchema {
    /// Build a schema from configuration, rejecting structurally invalid layouts.
    pub fn from_config(config: &SchemaConfig) -> Result<Self> {
        if config.version.trim().is_empty() {
            bail!("schema version must not be empty");
        }
        if config.fields.is_empty() {
            bail!("schema must declare at least one field");
        }

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(config.fields.len());

        for field in &config.fields {
            if !seen.insert(field.name.as_str()) {
                bail!("duplicate schema field '{}'", field.name);
            }

            let kind = match field.kind.as_str() {
                "numeric" => FieldKind::Numeric,
                "categorical" => categorical_kind(field)?,
                other => bail!(
                    "field '{}' has unknown kind '{other}' (expected numeric or categorical)",
                    field.name
                ),
            };

            fields.push(FieldSpec {
                name: field.name.clone(),
                kind,
            });
        }

        Ok(Self {
            version: config.version.clone(),
            fields,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Verify that a vector matches this schema exactly.
    pub fn check(&self, vector: &FeatureVector) -> Result<(), PipelineError> {
        if vector.schema_version != self.version {
            return Err(PipelineError::SchemaMismatch(format!(
                "vector built for schema '{}', classifier expects '{}'",
                vector.schema_version, self.version
            )));
        }

        if vector.features.len() != self.fields.len() {
            let expected: HashSet<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
            let actual: HashSet<&str> = vector.features.iter().map(|f| f.name.as_str()).collect();
            let mut missing: Vec<&str> = expected.difference(&actual).copied().collect();
            let mut extra: Vec<&str> = actual.difference(&expected).copied().collect();
            missing.sort_unstable();
            extra.sort_unstable();
            return Err(PipelineError::SchemaMismatch(format!(
                "expected {} fields, got {} (missing: {missing:?}, unexpected: {extra:?})",
                self.fields.len(),
                vector.features.len()
            )));
        }

        for (position, (spec, feature)) in self.fields.iter().zip(&vector.features).enumerate() {
            if spec.name != feature.name {
                return Err(PipelineError::SchemaMismatch(format!(
                    "position {position}: expected field '{}', found '{}'",
                    spec.name, feature.name
                )));
            }

            match (&spec.kind, &feature.value) {
                (FieldKind::Numeric, FeatureValue::Numeric(v)) => {
                    if !v.is_finite() {
                        return Err(PipelineError::SchemaMismatch(format!(
                            "field '{}' is not a finite number",
                            spec.name
                        )));
                    }
                }
                (FieldKind::Categorical { vocabulary, .. }, FeatureValue::Categorical(v)) => {
                    if !vocabulary.contains(v) {
                        return Err(PipelineError::SchemaMismatch(format!(
                            "field '{}' value '{v}' is outside its vocabulary",
                            spec.name
                        )));
                    }
                }
                _ => {
                    return Err(PipelineError::SchemaMismatch(format!(
                        "field '{}' has the wrong kind",
                        spec.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Encode a vector as a numeric row (categoricals become vocabulary indices).
    pub fn encode(&self, vector: &FeatureVector) -> Result<Vec<f64>, PipelineError> {
        self.check(vector)?;

        Ok(self
            .fields
            .iter()
            .zip(&vector.features)
            .map(|(spec, feature)| match &feature.value {
                FeatureValue::Numeric(v) => *v,
                // check() guarantees the value is in the vocabulary
                FeatureValue::Categorical(v) => {
                    spec.kind.vocabulary_index(v).unwrap_or_default() as f64
                }
            })
            .collect())
    }

    /// Decode a numeric row back into a vector, validating every cell.
    pub fn decode(&self, row: &[f64]) -> Result<FeatureVector, PipelineError> {
        if row.len() != self.fields.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "row has {} values, schema '{}' expects {}",
                row.len(),
                self.version,
                self.fields.len()
            )));
        }

        let mut features = Vec::with_capacity(row.len());
        for (spec, &cell) in self.fields.iter().zip(row) {
            if !cell.is_finite() {
                return Err(PipelineError::SchemaMismatch(format!(
                    "field '{}' is not a finite number",
                    spec.name
                )));
            }

            let value = match &spec.kind {
                FieldKind::Numeric => FeatureValue::Numeric(cell),
                FieldKind::Categorical { vocabulary, .. } => {
                    let in_range =
                        cell.fract() == 0.0 && cell >= 0.0 && (cell as usize) < vocabulary.len();
                    if !in_range {
                        return Err(PipelineError::SchemaMismatch(format!(
                            "field '{}' code {cell} is not a vocabulary index (0..{})",
                            spec.name,
                            vocabulary.len()
                        )));
                    }
                    FeatureValue::Categorical(vocabulary[cell as usize].clone())
                }
            };

            features.push(Feature {
                name: spec.name.clone(),
                value,
            });
        }

        Ok(FeatureVector::new(self.version.clone(), features))
    }
}

fn categorical_kind(field: &FieldConfig) -> Result<FieldKind> {
    if field.vocabulary.is_empty() {
        bail!("categorical field '{}' has an empty vocabulary", field.name);
    }

    let mut seen = HashSet::new();
    for value in &field.vocabulary {
        if !seen.insert(value.to_ascii_lowercase()) {
            bail!(
                "categorical field '{}' lists '{value}' more than once",
                field.name
            );
        }
    }

    let Some(other) = field.other.clone() else {
        bail!("categorical field '{}' must name an 'other' bucket", field.name);
    };
    let default = field.default.clone().unwrap_or_else(|| other.clone());

    for (label, value) in [("other", &other), ("default", &default)] {
        if !field.vocabulary.contains(value) {
            bail!(
                "categorical field '{}': {label} value '{value}' is not in the vocabulary",
                field.name
            );
        }
    }

    Ok(FieldKind::Categorical {
        vocabulary: field.vocabulary.clone(),
        default,
        other,
    })
}

/// A single feature value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Numeric(f64),
    Categorical(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub value: FeatureValue,
}

/// Immutable, ordered feature record for one wallet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    schema_version: String,
    features: Vec<Feature>,
}

impl FeatureVector {
    pub fn new(schema_version: impl Into<String>, features: Vec<Feature>) -> Self {
        Self {
            schema_version: schema_version.into(),
            features,
        }
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.features
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }

    pub fn values(&self) -> Vec<&FeatureValue> {
        self.features.iter().map(|f| &f.value).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Copy of this vector without the named field.
    pub fn without(&self, name: &str) -> Self {
        Self {
            schema_version: self.schema_version.clone(),
            features: self
                .features
                .iter()
                .filter(|f| f.name != name)
                .cloned()
                .collect(),
        }
    }
}
