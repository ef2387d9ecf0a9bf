//! Wallet activity sources
//!
//! The extractor only depends on the [`RawActivitySource`] capability. The
//! server picks an implementation at startup: the live Etherscan client, or a
//! fixture file for offline runs and tests.

pub mod etherscan;
pub mod fixture;

use crate::types::{WalletActivity, WalletAddress};
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;

pub use etherscan::EtherscanSource;
pub use fixture::FixtureSource;

/// Capability to resolve an address into raw activity facts.
///
/// `Ok(None)` means the source answered but knows nothing about the address.
/// Errors are transport or upstream failures.
pub trait RawActivitySource: Send + Sync {
    fn name(&self) -> &str;

    fn fetch_activity(
        &self,
        address: &WalletAddress,
    ) -> impl Future<Output = Result<Option<WalletActivity>>> + Send;
}

impl<S: RawActivitySource> RawActivitySource for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch_activity(
        &self,
        address: &WalletAddress,
    ) -> impl Future<Output = Result<Option<WalletActivity>>> + Send {
        (**self).fetch_activity(address)
    }
}
