//! Wallet address parsing

use crate::error::PipelineError;
use sha3::{Digest, Keccak256};
use std::fmt;

/// A validated account address, stored in canonical lowercase form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Parse and validate an address.
    ///
    /// Accepts `0x` followed by 40 hex digits. Mixed-case input must carry a
    /// valid EIP-55 checksum; all-lowercase and all-uppercase bodies are
    /// accepted as-is.
    pub fn parse(input: &str) -> Result<Self, PipelineError> {
        let address = input.trim();

        let Some(body) = address.strip_prefix("0x") else {
            return Err(PipelineError::UnresolvableAddress(format!(
                "'{address}' must start with 0x"
            )));
        };

        if body.len() != 40 {
            return Err(PipelineError::UnresolvableAddress(format!(
                "'{address}' must have 40 hex digits after 0x, found {}",
                body.len()
            )));
        }

        if !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PipelineError::UnresolvableAddress(format!(
                "'{address}' contains non-hex characters"
            )));
        }

        let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper && !is_eip55_checksum_valid(body) {
            return Err(PipelineError::UnresolvableAddress(format!(
                "'{address}' has an invalid EIP-55 checksum"
            )));
        }

        Ok(Self(format!("0x{}", body.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check mixed-case hex against the Keccak-256 nibbles of its lowercase form.
fn is_eip55_checksum_valid(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    let hash = Keccak256::digest(lower.as_bytes());

    body.chars().enumerate().all(|(i, ch)| {
        let nibble = (hash[i / 2] >> (4 * (1 - (i % 2)))) & 0x0f;
        match ch {
            'a'..='f' => nibble < 8,
            'A'..='F' => nibble >= 8,
            _ => true,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_lowercase_and_uppercase() {
        let lower = WalletAddress::parse("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        let upper = WalletAddress::parse("0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.as_str(), "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");
    }

    #[test]
    fn test_accepts_valid_checksums() {
        for addr in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            assert!(WalletAddress::parse(addr).is_ok(), "{addr} should be valid");
        }
    }

    #[test]
    fn test_rejects_bad_checksum() {
        let err = WalletAddress::parse("0x5aAeb6053f3E94C9b9A09f33669435E7Ef1BeAed").unwrap_err();
        assert!(matches!(err, PipelineError::UnresolvableAddress(_)));
    }

    #[test]
    fn test_rejects_malformed() {
        for addr in [
            "",
            "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1bea",
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaedff",
            "0xzzaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "not-a-wallet",
        ] {
            assert!(
                matches!(
                    WalletAddress::parse(addr),
                    Err(PipelineError::UnresolvableAddress(_))
                ),
                "{addr:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_trims_whitespace() {
        let addr = WalletAddress::parse("  0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed\n").unwrap();
        assert_eq!(addr.to_string(), "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");
    }
}
