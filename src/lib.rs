//! Wallet Risk Pipeline Library
//!
//! Scores blockchain wallets for fraud risk: raw on-chain activity is turned
//! into a schema-checked feature vector, scored by a frozen classifier and
//! levelled into Low / Medium / High.

pub mod api;
pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod risk_policy;
pub mod source;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorKind, PipelineError};
pub use feature_extractor::FeatureExtractor;
pub use models::{RiskClassifier, ScoringModel};
pub use orchestrator::PredictionOrchestrator;
pub use risk_policy::{RiskLevelPolicy, RiskThresholds};
pub use types::{BatchItem, FeatureVector, PredictionResult, RiskLevel, WalletActivity};
