//! Feature extraction for wallet risk model inference.
//!
//! Turns raw wallet activity into a [`FeatureVector`] laid out exactly as the
//! configured schema requires. Derivations are deterministic: the same raw
//! activity always yields a bit-identical vector.

use crate::error::PipelineError;
use crate::source::RawActivitySource;
use crate::types::{
    Feature, FeatureSchema, FeatureValue, FeatureVector, WalletActivity, WalletAddress,
};
use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Significant digits kept for derived averages and ratios.
pub const SIGNIFICANT_DIGITS: usize = 6;

/// How a catalog feature is computed from raw activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Derivation {
    TxCount,
    AgeDays,
    ContractInteractions,
    TotalValueEth,
    AvgValueEth,
    UniqueCounterparties,
    CounterpartyRatio,
    FailedTxRatio,
    OutgoingRatio,
    TxPerDay,
    FlaggedInteractions,
    CounterpartyCategory,
}

impl Derivation {
    fn is_categorical(self) -> bool {
        matches!(self, Derivation::CounterpartyCategory)
    }
}

/// Every feature the extractor knows how to derive.
const CATALOG: &[(&str, Derivation)] = &[
    ("tx_count", Derivation::TxCount),
    ("age_days", Derivation::AgeDays),
    ("contract_interactions", Derivation::ContractInteractions),
    ("total_value_eth", Derivation::TotalValueEth),
    ("avg_value_eth", Derivation::AvgValueEth),
    ("unique_counterparties", Derivation::UniqueCounterparties),
    ("counterparty_ratio", Derivation::CounterpartyRatio),
    ("failed_tx_ratio", Derivation::FailedTxRatio),
    ("outgoing_ratio", Derivation::OutgoingRatio),
    ("tx_per_day", Derivation::TxPerDay),
    ("flagged_interactions", Derivation::FlaggedInteractions),
    ("counterparty_category", Derivation::CounterpartyCategory),
];

/// Names of every derivable feature, in catalog order.
pub fn catalog_names() -> Vec<&'static str> {
    CATALOG.iter().map(|(name, _)| *name).collect()
}

/// Round to a fixed number of significant digits.
///
/// Goes through the shortest scientific representation so the result is
/// identical on every platform. Non-finite input maps to 0.
pub fn round_significant(value: f64, digits: usize) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    if value == 0.0 {
        return 0.0;
    }
    let precision = digits.saturating_sub(1);
    format!("{value:.precision$e}").parse().unwrap_or(0.0)
}

/// Feature extractor that transforms wallet activity into model input features.
pub struct FeatureExtractor<S> {
    schema: Arc<FeatureSchema>,
    plan: Vec<Derivation>,
    source: S,
    fetch_timeout: Duration,
}

impl<S: RawActivitySource> FeatureExtractor<S> {
    /// Create an extractor for `schema`, failing if the schema names a
    /// feature outside the catalog or declares it with the wrong kind.
    pub fn new(schema: Arc<FeatureSchema>, source: S, fetch_timeout: Duration) -> Result<Self> {
        let mut plan = Vec::with_capacity(schema.len());

        for field in schema.fields() {
            let Some((_, derivation)) = CATALOG.iter().find(|(name, _)| *name == field.name) else {
                bail!(
                    "schema field '{}' is not a derivable feature (known: {})",
                    field.name,
                    catalog_names().join(", ")
                );
            };
            if derivation.is_categorical() == field.kind.is_numeric() {
                bail!(
                    "schema field '{}' is declared {} but the extractor derives it as {}",
                    field.name,
                    if field.kind.is_numeric() { "numeric" } else { "categorical" },
                    if derivation.is_categorical() { "categorical" } else { "numeric" }
                );
            }
            plan.push(*derivation);
        }

        Ok(Self {
            schema,
            plan,
            source,
            fetch_timeout,
        })
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        self.plan.len()
    }

    /// Resolve an address and derive its feature vector.
    pub async fn extract(&self, address: &str) -> Result<FeatureVector, PipelineError> {
        let address = WalletAddress::parse(address)?;
        let activity = self.fetch(&address).await?;
        let vector = self.derive(&activity);

        debug!(
            wallet = %address,
            features = vector.len(),
            "Features extracted"
        );
        Ok(vector)
    }

    async fn fetch(&self, address: &WalletAddress) -> Result<WalletActivity, PipelineError> {
        let fetched =
            tokio::time::timeout(self.fetch_timeout, self.source.fetch_activity(address)).await;

        match fetched {
            Err(_elapsed) => {
                warn!(
                    wallet = %address,
                    source = self.source.name(),
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "Activity fetch timed out"
                );
                Err(PipelineError::DataUnavailable(format!(
                    "{} did not answer within {}ms",
                    self.source.name(),
                    self.fetch_timeout.as_millis()
                )))
            }
            Ok(Err(e)) => {
                warn!(
                    wallet = %address,
                    source = self.source.name(),
                    error = %e,
                    "Activity fetch failed"
                );
                Err(PipelineError::DataUnavailable(format!(
                    "{} request failed: {e}",
                    self.source.name()
                )))
            }
            Ok(Ok(Some(activity))) if !activity.is_empty() => Ok(activity),
            Ok(Ok(_)) => Err(PipelineError::DataUnavailable(format!(
                "{} has no activity for {address}",
                self.source.name()
            ))),
        }
    }

    /// Derive the feature vector for already-fetched activity.
    ///
    /// Missing facts take sentinel values (0 for numerics, the field default
    /// for categoricals) instead of failing the extraction.
    pub fn derive(&self, activity: &WalletActivity) -> FeatureVector {
        let features = self
            .schema
            .fields()
            .iter()
            .zip(&self.plan)
            .map(|(field, derivation)| {
                let value = match derivation {
                    Derivation::CounterpartyCategory => {
                        let category = field
                            .kind
                            .resolve_category(activity.counterparty_category.as_deref())
                            .unwrap_or_default();
                        FeatureValue::Categorical(category.to_string())
                    }
                    numeric => FeatureValue::Numeric(numeric_feature(*numeric, activity)),
                };
                Feature {
                    name: field.name.clone(),
                    value,
                }
            })
            .collect();

        FeatureVector::new(self.schema.version(), features)
    }
}

fn count(value: Option<u64>) -> f64 {
    value.map_or(0.0, |v| v as f64)
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// `numerator / denominator`, or 0 when either side is missing or the denominator is 0.
fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> f64 {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => round_significant(n / d, SIGNIFICANT_DIGITS),
        _ => 0.0,
    }
}

fn numeric_feature(derivation: Derivation, a: &WalletActivity) -> f64 {
    let tx_count = a.tx_count.map(|v| v as f64);

    match derivation {
        Derivation::TxCount => count(a.tx_count),
        Derivation::AgeDays => count(a.age_days),
        Derivation::ContractInteractions => count(a.contract_interactions),
        Derivation::TotalValueEth => finite(a.total_value_eth)
            .map_or(0.0, |v| round_significant(v, SIGNIFICANT_DIGITS)),
        Derivation::AvgValueEth => ratio(finite(a.total_value_eth), tx_count),
        Derivation::UniqueCounterparties => count(a.unique_counterparties),
        Derivation::CounterpartyRatio => {
            ratio(a.unique_counterparties.map(|v| v as f64), tx_count)
        }
        Derivation::FailedTxRatio => ratio(a.failed_tx_count.map(|v| v as f64), tx_count),
        Derivation::OutgoingRatio => ratio(a.outgoing_tx_count.map(|v| v as f64), tx_count),
        // Accounts younger than a day count as one day old
        Derivation::TxPerDay => ratio(tx_count, a.age_days.map(|d| d.max(1) as f64)),
        Derivation::FlaggedInteractions => count(a.flagged_interactions),
        Derivation::CounterpartyCategory => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FixtureSource;
    use crate::types::features::{FieldConfig, SchemaConfig};

    const WALLET: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

    fn numeric(name: &str) -> FieldConfig {
        FieldConfig {
            name: name.to_string(),
            kind: "numeric".to_string(),
            vocabulary: Vec::new(),
            default: None,
            other: None,
        }
    }

    fn category() -> FieldConfig {
        FieldConfig {
            name: "counterparty_category".to_string(),
            kind: "categorical".to_string(),
            vocabulary: ["exchange", "defi", "bridge", "mixer", "other"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default: Some("other".to_string()),
            other: Some("other".to_string()),
        }
    }

    fn schema(fields: Vec<FieldConfig>) -> Arc<FeatureSchema> {
        Arc::new(
            FeatureSchema::from_config(&SchemaConfig {
                version: "test-v1".to_string(),
                fields,
            })
            .unwrap(),
        )
    }

    fn extractor(
        fields: Vec<FieldConfig>,
        source: FixtureSource,
    ) -> FeatureExtractor<FixtureSource> {
        FeatureExtractor::new(schema(fields), source, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_headline_features() {
        let ex = extractor(
            vec![
                numeric("tx_count"),
                numeric("age_days"),
                numeric("contract_interactions"),
                category(),
            ],
            FixtureSource::new(),
        );

        let vector = ex.derive(&WalletActivity::new(50, 400, 2));
        assert_eq!(
            vector.values(),
            vec![
                &FeatureValue::Numeric(50.0),
                &FeatureValue::Numeric(400.0),
                &FeatureValue::Numeric(2.0),
                &FeatureValue::Categorical("other".to_string()),
            ]
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let ex = extractor(
            catalog_names()
                .into_iter()
                .map(|n| if n == "counterparty_category" { category() } else { numeric(n) })
                .collect(),
            FixtureSource::new(),
        );
        let activity = WalletActivity::new(7, 3, 1)
            .with_total_value_eth(1.0 / 3.0)
            .with_counterparties(5)
            .with_failed_tx_count(1)
            .with_outgoing_tx_count(4)
            .with_flagged_interactions(2)
            .with_counterparty_category("Mixer");

        let a = ex.derive(&activity);
        let b = ex.derive(&activity);
        assert_eq!(a, b);
        for (x, y) in a.values().iter().zip(b.values()) {
            if let (FeatureValue::Numeric(x), FeatureValue::Numeric(y)) = (x, y) {
                assert_eq!(x.to_bits(), y.to_bits());
            }
        }

        assert_eq!(a.get("avg_value_eth"), Some(&FeatureValue::Numeric(0.047619)));
        assert_eq!(a.get("failed_tx_ratio"), Some(&FeatureValue::Numeric(0.142857)));
        assert_eq!(a.get("tx_per_day"), Some(&FeatureValue::Numeric(2.33333)));
        assert_eq!(
            a.get("counterparty_category"),
            Some(&FeatureValue::Categorical("mixer".to_string()))
        );
    }

    #[test]
    fn test_missing_facts_use_sentinels() {
        let ex = extractor(
            vec![
                numeric("tx_count"),
                numeric("failed_tx_ratio"),
                numeric("tx_per_day"),
                category(),
            ],
            FixtureSource::new(),
        );
        let activity = WalletActivity {
            failed_tx_count: Some(3),
            total_value_eth: Some(f64::NAN),
            counterparty_category: Some("casino".to_string()),
            ..WalletActivity::default()
        };

        let vector = ex.derive(&activity);
        assert_eq!(vector.get("tx_count"), Some(&FeatureValue::Numeric(0.0)));
        assert_eq!(vector.get("failed_tx_ratio"), Some(&FeatureValue::Numeric(0.0)));
        assert_eq!(vector.get("tx_per_day"), Some(&FeatureValue::Numeric(0.0)));
        assert_eq!(
            vector.get("counterparty_category"),
            Some(&FeatureValue::Categorical("other".to_string()))
        );
    }

    #[test]
    fn test_rejects_unknown_or_mistyped_fields() {
        let unknown = FeatureExtractor::new(
            schema(vec![numeric("gas_spent")]),
            FixtureSource::new(),
            Duration::from_secs(1),
        );
        assert!(unknown.is_err());

        let mut mistyped = category();
        mistyped.name = "tx_count".to_string();
        let mistyped = FeatureExtractor::new(
            schema(vec![mistyped]),
            FixtureSource::new(),
            Duration::from_secs(1),
        );
        assert!(mistyped.is_err());
    }

    #[test]
    fn test_round_significant() {
        assert_eq!(round_significant(1.0 / 3.0, 6), 0.333333);
        assert_eq!(round_significant(123456789.0, 6), 123457000.0);
        assert_eq!(round_significant(-0.000123456789, 6), -0.000123457);
        assert_eq!(round_significant(0.0, 6), 0.0);
        assert_eq!(round_significant(f64::NAN, 6), 0.0);
    }

    #[tokio::test]
    async fn test_extract_resolves_address() {
        let source = FixtureSource::new().with_activity(WALLET, WalletActivity::new(50, 400, 2));
        let ex = extractor(vec![numeric("tx_count")], source);

        let vector = ex.extract(WALLET).await.unwrap();
        assert_eq!(vector.get("tx_count"), Some(&FeatureValue::Numeric(50.0)));
        assert_eq!(vector.schema_version(), "test-v1");
    }

    #[tokio::test]
    async fn test_extract_failures() {
        let source = FixtureSource::new().with_activity(WALLET, WalletActivity::default());
        let ex = extractor(vec![numeric("tx_count")], source);

        assert!(matches!(
            ex.extract("0x1234").await,
            Err(PipelineError::UnresolvableAddress(_))
        ));
        // Known address with no facts at all
        assert!(matches!(
            ex.extract(WALLET).await,
            Err(PipelineError::DataUnavailable(_))
        ));
        // Unknown address
        assert!(matches!(
            ex.extract("0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359").await,
            Err(PipelineError::DataUnavailable(_))
        ));
    }
}
