//! Raw on-chain activity facts for a wallet

use serde::{Deserialize, Serialize};

/// Raw per-address facts as reported by an activity source.
///
/// Every field is optional: sources may only know part of the picture, and
/// the feature extractor substitutes sentinels for whatever is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletActivity {
    /// Number of transactions the wallet took part in
    #[serde(default)]
    pub tx_count: Option<u64>,

    /// Days since the first observed transaction
    #[serde(default, alias = "account_age_days")]
    pub age_days: Option<u64>,

    /// Transactions that called contract code or created a contract
    #[serde(default)]
    pub contract_interactions: Option<u64>,

    /// Total value moved in either direction, in ETH
    #[serde(default)]
    pub total_value_eth: Option<f64>,

    /// Distinct addresses on the other side of a transaction
    #[serde(default)]
    pub unique_counterparties: Option<u64>,

    /// Transactions that reverted
    #[serde(default)]
    pub failed_tx_count: Option<u64>,

    /// Transactions sent by this wallet
    #[serde(default)]
    pub outgoing_tx_count: Option<u64>,

    /// Transactions touching a known flagged counterparty
    #[serde(default)]
    pub flagged_interactions: Option<u64>,

    /// Category of the wallet's dominant labelled counterparty (e.g. "exchange", "mixer")
    #[serde(default)]
    pub counterparty_category: Option<String>,
}

impl WalletActivity {
    /// Activity with only the three headline facts set.
    pub fn new(tx_count: u64, age_days: u64, contract_interactions: u64) -> Self {
        Self {
            tx_count: Some(tx_count),
            age_days: Some(age_days),
            contract_interactions: Some(contract_interactions),
            ..Self::default()
        }
    }

    pub fn with_total_value_eth(mut self, value: f64) -> Self {
        self.total_value_eth = Some(value);
        self
    }

    pub fn with_counterparties(mut self, unique: u64) -> Self {
        self.unique_counterparties = Some(unique);
        self
    }

    pub fn with_failed_tx_count(mut self, failed: u64) -> Self {
        self.failed_tx_count = Some(failed);
        self
    }

    pub fn with_outgoing_tx_count(mut self, outgoing: u64) -> Self {
        self.outgoing_tx_count = Some(outgoing);
        self
    }

    pub fn with_flagged_interactions(mut self, flagged: u64) -> Self {
        self.flagged_interactions = Some(flagged);
        self
    }

    pub fn with_counterparty_category(mut self, category: impl Into<String>) -> Self {
        self.counterparty_category = Some(category.into());
        self
    }

    /// True when the source reported no facts at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
