//! Drift Check
//!
//! Compares a current dataset against a reference dataset with PSI and
//! prints the drift report as JSON.
//!
//! Usage: drift-check <reference.csv> <current.csv> [--derived] [--bins N]
//!
//! With `--derived`, both files hold raw transactions and the comparison
//! runs over the model's derived features. Otherwise every numeric column
//! present in the reference file is compared.
//!
//! Exits with status 2 when any feature shows significant drift.

use anyhow::{bail, Context, Result};
use fraud_scoring_service::drift::{Dataset, DriftMonitor, DriftSeverity, PsiConfig};
use fraud_scoring_service::feature_extractor::{FeatureExtractor, FEATURE_NAMES};
use fraud_scoring_service::Transaction;
use std::path::Path;
use tracing::{info, warn};

fn read_transactions(path: &Path) -> Result<Vec<Transaction>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut transactions = Vec::new();
    for (row, record) in reader.deserialize().enumerate() {
        let tx: Transaction =
            record.with_context(|| format!("{}: bad transaction at row {}", path.display(), row + 1))?;
        match tx.validate() {
            Ok(()) => transactions.push(tx),
            Err(e) => warn!(row = row + 1, error = %e, "Skipping invalid transaction"),
        }
    }
    Ok(transactions)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("drift_check=info".parse()?),
        )
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let derived = args.iter().any(|a| a == "--derived");
    let mut config = PsiConfig::default();
    if let Some(pos) = args.iter().position(|a| a == "--bins") {
        config.bins = args
            .get(pos + 1)
            .and_then(|s| s.parse().ok())
            .filter(|&bins| bins > 0)
            .context("--bins expects a positive integer")?;
    }
    let paths: Vec<&String> = args
        .iter()
        .enumerate()
        .filter(|(i, a)| !a.starts_with("--") && (*i == 0 || args[i - 1] != "--bins"))
        .map(|(_, a)| a)
        .collect();
    let [reference_path, current_path] = paths.as_slice() else {
        bail!("usage: drift-check <reference.csv> <current.csv> [--derived] [--bins N]");
    };

    let (reference, current, features) = if derived {
        let extractor = FeatureExtractor::new();
        let reference = Dataset::from_transactions(&read_transactions(Path::new(reference_path))?, &extractor);
        let current = Dataset::from_transactions(&read_transactions(Path::new(current_path))?, &extractor);
        let features: Vec<String> = FEATURE_NAMES.iter().map(|n| n.to_string()).collect();
        (reference, current, features)
    } else {
        let reference = Dataset::from_csv_path(reference_path)?;
        let current = Dataset::from_csv_path(current_path)?;
        let features: Vec<String> = reference.column_names().map(str::to_string).collect();
        (reference, current, features)
    };

    let monitor = DriftMonitor::with_config(reference, features, config);
    info!(
        reference = %reference_path,
        current = %current_path,
        features = monitor.features().len(),
        bins = config.bins,
        "Checking drift"
    );

    let report = monitor.check(&current);
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!(
        overall_status = ?report.overall_status,
        max_psi = report.max_psi,
        skipped = report.skipped.len(),
        "Drift check complete"
    );

    if report.overall_status == DriftSeverity::SignificantDrift {
        std::process::exit(2);
    }
    Ok(())
}
