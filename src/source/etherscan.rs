//! Live activity source backed by the Etherscan account API

use super::RawActivitySource;
use crate::types::{WalletActivity, WalletAddress};
use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

const WEI_PER_ETH: f64 = 1e18;
const SECS_PER_DAY: i64 = 86_400;

/// Etherscan `txlist` client that summarises a wallet's transactions.
pub struct EtherscanSource {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    /// Known counterparties (lowercase address → category label)
    flagged: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TxListResponse {
    status: String,
    message: String,
    result: serde_json::Value,
}

/// Subset of an Etherscan normal-transaction record.
#[derive(Debug, Clone, Deserialize)]
pub struct EtherscanTx {
    #[serde(rename = "timeStamp")]
    pub time_stamp: String,
    pub from: String,
    #[serde(default)]
    pub to: String,
    pub value: String,
    #[serde(rename = "isError", default)]
    pub is_error: String,
    #[serde(default)]
    pub input: String,
    #[serde(rename = "contractAddress", default)]
    pub contract_address: String,
}

impl EtherscanSource {
    pub fn new(
        api_url: &str,
        api_key: Option<String>,
        flagged: &HashMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        Url::parse(api_url).with_context(|| format!("Invalid Etherscan API URL '{api_url}'"))?;

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            flagged: flagged
                .iter()
                .map(|(addr, category)| (addr.to_ascii_lowercase(), category.clone()))
                .collect(),
        })
    }

    pub fn txlist_url(&self, address: &WalletAddress) -> Result<Url> {
        let mut url = Url::parse(&self.api_url)?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("module", "account");
            qp.append_pair("action", "txlist");
            qp.append_pair("address", address.as_str());
            qp.append_pair("sort", "asc");
            if let Some(key) = &self.api_key {
                qp.append_pair("apikey", key);
            }
        }
        Ok(url)
    }
}

impl RawActivitySource for EtherscanSource {
    fn name(&self) -> &str {
        "etherscan"
    }

    async fn fetch_activity(&self, address: &WalletAddress) -> Result<Option<WalletActivity>> {
        let url = self.txlist_url(address)?;
        let response: TxListResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(txs) = parse_txlist(response)? else {
            debug!(wallet = %address, "Etherscan has no transactions for wallet");
            return Ok(None);
        };

        let now = chrono::Utc::now().timestamp();
        Ok(Some(summarize_transactions(
            address,
            &txs,
            now,
            &self.flagged,
        )))
    }
}

fn parse_txlist(response: TxListResponse) -> Result<Option<Vec<EtherscanTx>>> {
    if response.status != "1" {
        if response.message.starts_with("No transactions found") {
            return Ok(None);
        }
        bail!(
            "Etherscan returned status {}: {} ({})",
            response.status,
            response.message,
            response.result
        );
    }

    let txs: Vec<EtherscanTx> =
        serde_json::from_value(response.result).context("Unexpected txlist payload")?;
    Ok(if txs.is_empty() { None } else { Some(txs) })
}

/// Reduce a transaction list to raw activity facts.
pub fn summarize_transactions(
    address: &WalletAddress,
    txs: &[EtherscanTx],
    now_epoch: i64,
    flagged: &HashMap<String, String>,
) -> WalletActivity {
    let me = address.as_str();

    let mut total_wei: u128 = 0;
    let mut counterparties = HashSet::new();
    let mut contract_interactions = 0u64;
    let mut failed = 0u64;
    let mut outgoing = 0u64;
    let mut flagged_hits = 0u64;
    let mut flagged_categories: BTreeMap<&str, u64> = BTreeMap::new();
    let mut earliest: Option<i64> = None;

    for tx in txs {
        let from = tx.from.to_ascii_lowercase();
        let to = if tx.to.is_empty() {
            tx.contract_address.to_ascii_lowercase()
        } else {
            tx.to.to_ascii_lowercase()
        };

        total_wei = total_wei.saturating_add(tx.value.parse::<u128>().unwrap_or(0));

        if let Ok(ts) = tx.time_stamp.parse::<i64>() {
            earliest = Some(earliest.map_or(ts, |e| e.min(ts)));
        }

        let is_outgoing = from == me;
        if is_outgoing {
            outgoing += 1;
        }

        let counterparty = if is_outgoing { to } else { from };
        if !counterparty.is_empty() && counterparty != me {
            if let Some(category) = flagged.get(&counterparty) {
                flagged_hits += 1;
                *flagged_categories.entry(category.as_str()).or_insert(0) += 1;
            }
            counterparties.insert(counterparty);
        }

        let has_calldata = !tx.input.is_empty() && tx.input != "0x";
        if has_calldata || tx.to.is_empty() {
            contract_interactions += 1;
        }

        if tx.is_error == "1" {
            failed += 1;
        }
    }

    // Most frequent flagged category; BTreeMap order breaks ties by name
    let counterparty_category = flagged_categories
        .iter()
        .fold(None::<(&str, u64)>, |best, (&category, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((category, count)),
        })
        .map(|(category, _)| category.to_string());

    WalletActivity {
        tx_count: Some(txs.len() as u64),
        age_days: earliest.map(|ts| ((now_epoch - ts).max(0) / SECS_PER_DAY) as u64),
        contract_interactions: Some(contract_interactions),
        total_value_eth: Some(total_wei as f64 / WEI_PER_ETH),
        unique_counterparties: Some(counterparties.len() as u64),
        failed_tx_count: Some(failed),
        outgoing_tx_count: Some(outgoing),
        flagged_interactions: Some(flagged_hits),
        counterparty_category,
    }
}
