//! Score Request Client
//!
//! Sends transactions from a JSON-lines file to the scoring subject and logs
//! each reply.
//!
//! Usage: score-request <transactions.jsonl> [nats_url] [subject] [timeout_ms]

use anyhow::{Context, Result};
use fraud_scoring_service::transport::{decode_transaction, ScoreReply};
use fraud_scoring_service::{Decision, Transaction};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, warn};

fn read_transactions(path: &str) -> Result<Vec<Transaction>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let mut transactions = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match decode_transaction(line.as_bytes()) {
            Ok(tx) => transactions.push(tx),
            Err(reply) => warn!(line = line_no + 1, reply = ?reply, "Skipping invalid transaction"),
        }
    }
    Ok(transactions)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("score_request=info".parse()?),
        )
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let input = args
        .get(1)
        .context("usage: score-request <transactions.jsonl> [nats_url] [subject] [timeout_ms]")?;
    let nats_url = args.get(2).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(3).map(|s| s.as_str()).unwrap_or("fraud.score");
    let timeout_ms: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(2000);

    let transactions = read_transactions(input)?;
    info!(
        input = %input,
        nats_url = %nats_url,
        subject = %subject,
        count = transactions.len(),
        "Configuration loaded"
    );

    let client = async_nats::connect(nats_url).await?;
    info!("Connected to NATS");

    let mut decisions: BTreeMap<Decision, u64> = BTreeMap::new();
    let mut failures = 0u64;

    for tx in &transactions {
        let payload = serde_json::to_vec(tx)?;
        let request = client.request(subject.to_string(), payload.into());

        let message = match tokio::time::timeout(Duration::from_millis(timeout_ms), request).await {
            Ok(Ok(message)) => message,
            Ok(Err(e)) => {
                error!(transaction_id = %tx.transaction_id, error = %e, "Request failed");
                failures += 1;
                continue;
            }
            Err(_) => {
                error!(transaction_id = %tx.transaction_id, "Request timed out");
                failures += 1;
                continue;
            }
        };

        match serde_json::from_slice::<ScoreReply>(&message.payload) {
            Ok(ScoreReply::Ok(response)) => {
                *decisions.entry(response.decision).or_insert(0) += 1;
                info!(
                    transaction_id = %response.transaction_id,
                    fraud_score = response.fraud_score,
                    ml_score = response.ml_score,
                    rules_score = response.rules_score,
                    decision = %response.decision,
                    rules_triggered = response.rules_triggered.len(),
                    latency_ms = response.latency_ms,
                    "Scored"
                );
            }
            Ok(other) => {
                failures += 1;
                warn!(transaction_id = %tx.transaction_id, reply = ?other, "Not scored");
            }
            Err(e) => {
                failures += 1;
                error!(transaction_id = %tx.transaction_id, error = %e, "Unreadable reply");
            }
        }
    }

    info!(
        sent = transactions.len(),
        failures = failures,
        decisions = ?decisions,
        "Completed"
    );

    Ok(())
}
