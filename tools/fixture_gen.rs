//! Fixture Generator
//!
//! Writes a JSON activity fixture of random normal and suspicious wallets for
//! offline runs of the server (`source.kind = "fixture"`).
//!
//! Usage: fixture-gen [output] [count] [fraud_rate]

use anyhow::{ensure, Context};
use rand::Rng;
use std::collections::BTreeMap;
use tracing::info;
use wallet_risk_pipeline::types::WalletActivity;

/// Activity generator for offline testing
struct ActivityGenerator {
    rng: rand::rngs::ThreadRng,
}

impl ActivityGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    fn address(&mut self) -> String {
        let bytes: [u8; 20] = self.rng.gen();
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        format!("0x{hex}")
    }

    /// Established wallet: old, steady, mostly exchange / DeFi counterparties
    fn generate_normal(&mut self) -> WalletActivity {
        let tx_count = self.rng.gen_range(20..2000);
        let age_days = self.rng.gen_range(180..2500);

        WalletActivity::new(tx_count, age_days, self.rng.gen_range(0..tx_count / 3 + 1))
            .with_total_value_eth(self.rng.gen_range(0.5..500.0))
            .with_counterparties(self.rng.gen_range(tx_count / 10 + 1..tx_count / 2 + 2))
            .with_failed_tx_count(self.rng.gen_range(0..tx_count / 50 + 1))
            .with_outgoing_tx_count(self.rng.gen_range(tx_count / 4..tx_count * 3 / 4 + 1))
            .with_counterparty_category(self.random_choice(&["exchange", "defi", "other"]))
    }

    /// Fresh wallet with bursty, failing, mixer-heavy activity
    fn generate_suspicious(&mut self) -> WalletActivity {
        let tx_count = self.rng.gen_range(30..400);
        let age_days = self.rng.gen_range(0..14);

        WalletActivity::new(tx_count, age_days, self.rng.gen_range(tx_count / 3..tx_count + 1))
            .with_total_value_eth(self.rng.gen_range(50.0..5000.0))
            .with_counterparties(self.rng.gen_range(1..12))
            .with_failed_tx_count(self.rng.gen_range(tx_count / 10..tx_count / 3 + 1))
            .with_outgoing_tx_count(self.rng.gen_range(tx_count * 3 / 4..tx_count + 1))
            .with_flagged_interactions(self.rng.gen_range(5..tx_count / 2 + 6))
            .with_counterparty_category(self.random_choice(&["mixer", "bridge"]))
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fixture_gen=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let output = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("config/fixtures.generated.json");
    let count: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);
    let fraud_rate: f64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(0.1);
    ensure!(
        (0.0..=1.0).contains(&fraud_rate),
        "fraud_rate must be within [0, 1], got {fraud_rate}"
    );

    info!(output, count, fraud_rate, "Generating wallet fixtures");

    let mut generator = ActivityGenerator::new();
    let mut rng = rand::thread_rng();
    let mut wallets = BTreeMap::new();
    let mut suspicious_count = 0;

    for _ in 0..count {
        let activity = if rng.gen_bool(fraud_rate) {
            suspicious_count += 1;
            generator.generate_suspicious()
        } else {
            generator.generate_normal()
        };
        wallets.insert(generator.address(), activity);
    }

    let json = serde_json::to_string_pretty(&wallets)?;
    std::fs::write(output, json).with_context(|| format!("Failed to write {output}"))?;

    info!(
        "Completed! Wrote {} wallets ({} normal, {} suspicious) to {}",
        wallets.len(),
        wallets.len() as u64 - suspicious_count,
        suspicious_count,
        output
    );

    Ok(())
}
