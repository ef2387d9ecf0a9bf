//! Type definitions for the wallet risk pipeline

pub mod activity;
pub mod address;
pub mod features;
pub mod prediction;

pub use activity::WalletActivity;
pub use address::WalletAddress;
pub use features::{Feature, FeatureSchema, FeatureValue, FeatureVector, FieldKind, FieldSpec};
pub use prediction::{BatchItem, ErrorRecord, PredictionResult, RiskLevel};
