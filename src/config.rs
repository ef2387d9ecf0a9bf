//! Configuration management for the wallet risk pipeline

use crate::risk_policy::RiskThresholds;
use crate::types::features::{FieldConfig, SchemaConfig};
use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "WALLET_RISK_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub schema: SchemaConfig,
    pub model: ModelConfig,
    pub risk_levels: RiskThresholds,
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Scoring model backend
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Logistic model described by a JSON weights file
    #[default]
    Linear,
    /// ONNX classifier (requires the `onnx` feature)
    Onnx,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub kind: ModelKind,
    /// Model file (JSON weights or .onnx)
    pub path: String,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

/// Orchestration limits
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum concurrent wallet extractions across all batches
    pub workers: usize,
    /// Per-item activity fetch timeout in milliseconds
    pub timeout_ms: u64,
    /// Largest accepted batch
    pub max_batch_size: usize,
}

impl PipelineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where raw wallet activity comes from
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Etherscan,
    Fixture,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    /// Etherscan-compatible API base URL
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// JSON fixture file used when `kind = "fixture"`
    #[serde(default)]
    pub fixture_path: Option<String>,
    /// Known counterparties: address → category label
    #[serde(default)]
    pub flagged: HashMap<String, String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between metrics summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

impl AppConfig {
    /// Load configuration from `$WALLET_RISK_CONFIG` or `config/config.toml`
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, layered with `WALLET_RISK__*` variables
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("WALLET_RISK")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.risk_levels
            .validate()
            .context("Invalid risk_levels section")?;
        ensure!(self.pipeline.workers > 0, "pipeline.workers must be at least 1");
        ensure!(self.pipeline.timeout_ms > 0, "pipeline.timeout_ms must be positive");
        ensure!(
            self.pipeline.max_batch_size > 0,
            "pipeline.max_batch_size must be at least 1"
        );
        if self.source.kind == SourceKind::Fixture {
            ensure!(
                self.source.fixture_path.is_some(),
                "source.fixture_path is required when source.kind = \"fixture\""
            );
        }
        ensure!(
            matches!(self.logging.format.as_str(), "json" | "pretty"),
            "logging.format must be \"json\" or \"pretty\""
        );
        Ok(())
    }
}

fn numeric_field(name: &str) -> FieldConfig {
    FieldConfig {
        name: name.to_string(),
        kind: "numeric".to_string(),
        vocabulary: Vec::new(),
        default: None,
        other: None,
    }
}

/// Schema shipped in `config/config.toml`.
pub fn default_schema() -> SchemaConfig {
    let mut fields: Vec<FieldConfig> = ["tx_count", "age_days", "contract_interactions"]
        .into_iter()
        .map(numeric_field)
        .collect();

    fields.push(FieldConfig {
        name: "counterparty_category".to_string(),
        kind: "categorical".to_string(),
        vocabulary: ["exchange", "defi", "bridge", "mixer", "other"]
            .into_iter()
            .map(String::from)
            .collect(),
        default: Some("other".to_string()),
        other: Some("other".to_string()),
    });

    fields.extend(
        [
            "total_value_eth",
            "avg_value_eth",
            "unique_counterparties",
            "counterparty_ratio",
            "failed_tx_ratio",
            "outgoing_ratio",
            "tx_per_day",
            "flagged_interactions",
        ]
        .into_iter()
        .map(numeric_field),
    );

    SchemaConfig {
        version: "wallet-features-v1".to_string(),
        fields,
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut flagged = HashMap::new();
        flagged.insert(
            "0x722122df12d4e14e13ac3b6895a86e84145b6967".to_string(),
            "mixer".to_string(),
        );
        flagged.insert(
            "0x28c6c06298d514db089934071355e5743bf21d60".to_string(),
            "exchange".to_string(),
        );

        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            schema: default_schema(),
            model: ModelConfig {
                kind: ModelKind::Linear,
                path: "config/model.json".to_string(),
                onnx_threads: 1,
            },
            risk_levels: RiskThresholds::default(),
            pipeline: PipelineConfig {
                workers: 8,
                timeout_ms: 5000,
                max_batch_size: 256,
            },
            source: SourceConfig {
                kind: SourceKind::Etherscan,
                api_url: "https://api.etherscan.io/api".to_string(),
                api_key: None,
                fixture_path: Some("config/fixtures.json".to_string()),
                flagged,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
            metrics: MetricsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureSchema;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.risk_levels.low, 0.33);
        assert_eq!(config.risk_levels.high, 0.66);
        assert_eq!(config.model.kind, ModelKind::Linear);
        assert_eq!(config.schema.fields.len(), 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_schema_is_valid() {
        let schema = FeatureSchema::from_config(&default_schema()).unwrap();
        assert_eq!(
            &schema.field_names()[..4],
            &["tx_count", "age_days", "contract_interactions", "counterparty_category"]
        );
    }

    #[test]
    fn test_shipped_file_matches_defaults() {
        let config = AppConfig::load_from_path("config/config.toml").unwrap();
        let defaults = AppConfig::default();

        assert_eq!(config.schema.version, defaults.schema.version);
        assert_eq!(
            FeatureSchema::from_config(&config.schema).unwrap(),
            FeatureSchema::from_config(&defaults.schema).unwrap()
        );
        assert_eq!(config.risk_levels, defaults.risk_levels);
        assert_eq!(config.pipeline.workers, defaults.pipeline.workers);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut config = AppConfig::default();
        config.risk_levels = RiskThresholds { low: 0.8, high: 0.2 };
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.workers = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.source.kind = SourceKind::Fixture;
        config.source.fixture_path = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_custom_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let base = std::fs::read_to_string("config/config.toml").unwrap();
        let custom = base.replace("low = 0.33", "low = 0.3").replace("high = 0.66", "high = 0.7");
        std::fs::write(&path, custom).unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.risk_levels, RiskThresholds { low: 0.3, high: 0.7 });
    }
}
