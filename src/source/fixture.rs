//! In-memory activity source backed by a JSON fixture file

use super::RawActivitySource;
use crate::types::{WalletActivity, WalletAddress};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Serves activity from a fixed address → activity map.
///
/// Used for offline runs (`source.kind = "fixture"`) and as the test double
/// for the live source. Unknown addresses resolve to `Ok(None)`.
#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
    activities: HashMap<String, WalletActivity>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON object of `{"0xaddress": {activity...}}`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture file {}", path.display()))?;
        let source = Self::from_json(&content)
            .with_context(|| format!("Failed to parse fixture file {}", path.display()))?;

        info!(
            path = %path.display(),
            wallets = source.len(),
            "Fixture activity source loaded"
        );
        Ok(source)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: HashMap<String, WalletActivity> = serde_json::from_str(content)?;
        let mut source = Self::new();
        for (address, activity) in raw {
            let address = WalletAddress::parse(&address)
                .with_context(|| format!("Fixture key '{address}' is not a valid address"))?;
            source.activities.insert(address.as_str().to_string(), activity);
        }
        Ok(source)
    }

    /// Register activity for an address; the address is stored canonically.
    pub fn with_activity(mut self, address: &str, activity: WalletActivity) -> Self {
        let key = WalletAddress::parse(address)
            .map(|a| a.as_str().to_string())
            .unwrap_or_else(|_| address.to_ascii_lowercase());
        self.activities.insert(key, activity);
        self
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

impl RawActivitySource for FixtureSource {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn fetch_activity(&self, address: &WalletAddress) -> Result<Option<WalletActivity>> {
        Ok(self.activities.get(address.as_str()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALLET: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let source = FixtureSource::new().with_activity(WALLET, WalletActivity::new(5, 10, 0));
        let mixed = WalletAddress::parse("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap();

        let activity = source.fetch_activity(&mixed).await.unwrap();
        assert_eq!(activity, Some(WalletActivity::new(5, 10, 0)));
    }

    #[tokio::test]
    async fn test_unknown_address_is_none() {
        let source = FixtureSource::new();
        let addr = WalletAddress::parse(WALLET).unwrap();
        assert_eq!(source.fetch_activity(&addr).await.unwrap(), None);
    }

    #[test]
    fn test_from_json_rejects_bad_keys() {
        let json = r#"{"not-an-address": {"tx_count": 1}}"#;
        assert!(FixtureSource::from_json(json).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixtures.json");
        std::fs::write(&path, format!(r#"{{"{WALLET}": {{"tx_count": 3}}}}"#)).unwrap();

        let source = FixtureSource::load(&path).unwrap();
        assert_eq!(source.len(), 1);
    }
}
