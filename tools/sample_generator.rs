//! Sample Upload Generator
//!
//! Writes a synthetic account table for trying out the detector.
//!
//! Usage: sample_generator [OUTPUT] [COUNT] [SUSPICIOUS_RATE] [SEED]

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

/// Row layout matching model/feature_names.json, plus a passthrough id
#[derive(Debug, Clone, Serialize)]
struct AccountRow {
    account_id: String,
    txn_count_30d: u32,
    avg_txn_amount: f64,
    max_txn_amount: f64,
    night_txn_ratio: f64,
    intl_txn_ratio: f64,
    unique_counterparties: u32,
    account_age_days: u32,
    failed_login_count: u32,
}

struct AccountGenerator {
    rng: StdRng,
    account_counter: u64,
}

impl AccountGenerator {
    fn new(seed: Option<u64>) -> Self {
        Self {
            rng: match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
            account_counter: 0,
        }
    }

    fn next_id(&mut self) -> String {
        self.account_counter += 1;
        format!("acc_{:08}", self.account_counter)
    }

    /// An established account with everyday activity
    fn generate_normal(&mut self) -> AccountRow {
        let avg = self.rng.gen_range(20.0..300.0);
        AccountRow {
            account_id: self.next_id(),
            txn_count_30d: self.rng.gen_range(5..80),
            avg_txn_amount: round2(avg),
            max_txn_amount: round2(avg * self.rng.gen_range(1.5..4.0)),
            night_txn_ratio: round2(self.rng.gen_range(0.0..0.15)),
            intl_txn_ratio: round2(self.rng.gen_range(0.0..0.1)),
            unique_counterparties: self.rng.gen_range(2..25),
            account_age_days: self.rng.gen_range(180..4000),
            failed_login_count: self.rng.gen_range(0..2),
        }
    }

    /// A young, high-volume account moving money at odd hours
    fn generate_suspicious(&mut self) -> AccountRow {
        let avg = self.rng.gen_range(800.0..9000.0);
        AccountRow {
            account_id: self.next_id(),
            txn_count_30d: self.rng.gen_range(60..400),
            avg_txn_amount: round2(avg),
            max_txn_amount: round2(avg * self.rng.gen_range(3.0..12.0)),
            night_txn_ratio: round2(self.rng.gen_range(0.3..0.9)),
            intl_txn_ratio: round2(self.rng.gen_range(0.25..0.95)),
            unique_counterparties: self.rng.gen_range(30..250),
            account_age_days: self.rng.gen_range(1..60),
            failed_login_count: self.rng.gen_range(2..15),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sample_generator=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let output = args.get(1).map(|s| s.as_str()).unwrap_or("sample_accounts.csv");
    let count: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);
    let suspicious_rate: f64 = args
        .get(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.1_f64)
        .clamp(0.0, 1.0);
    let seed: Option<u64> = args.get(4).and_then(|s| s.parse().ok());

    info!(output, count, suspicious_rate, seed, "Generating sample upload");

    let mut generator = AccountGenerator::new(seed);
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output))?;

    let mut suspicious_count = 0u64;
    for _ in 0..count {
        let row = if generator.rng.gen_bool(suspicious_rate) {
            suspicious_count += 1;
            generator.generate_suspicious()
        } else {
            generator.generate_normal()
        };
        writer.serialize(&row)?;
    }
    writer.flush()?;

    info!(
        "Completed! Wrote {} accounts ({} normal, {} suspicious) to {}",
        count,
        count - suspicious_count,
        suspicious_count,
        output
    );

    Ok(())
}
