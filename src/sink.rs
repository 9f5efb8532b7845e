//! Opportunity sink
//!
//! Serializes ranked opportunities into the tagged JSON shape consumers
//! read (alerts, execution). U256 amounts travel as decimal strings,
//! addresses as hex. Optionally appends each record to a JSONL file.
//!
//! Author: AI-Generated
//! Created: 2026-02-06

use crate::types::{MevAssessment, Opportunity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

/// Wire form of an opportunity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedOpportunity {
    #[serde(rename = "type")]
    pub kind: String,
    pub chain_id: u64,
    pub path: Vec<String>,
    pub dexes: Vec<String>,
    pub pools: Vec<String>,
    /// Raw base-token units as a decimal string.
    pub amount_in: String,
    pub expected_out: String,
    pub gross_profit: String,
    pub spread_percent: f64,
    pub net_profit_usd: f64,
    pub gas_cost_usd: f64,
    pub min_liquidity_usd: f64,
    pub timestamp: u64,
    pub observed_at: DateTime<Utc>,
    pub block_number: u64,
    pub score: f64,
    pub tier: String,
    pub recommendation: String,
    pub mev: MevAssessment,
    pub confidence: f64,
    pub flash_loan_available: bool,
    pub estimated_quote: bool,
    pub rebase_window: bool,
}

impl From<&Opportunity> for SerializedOpportunity {
    fn from(opp: &Opportunity) -> Self {
        Self {
            kind: opp.kind.to_string(),
            chain_id: opp.chain_id,
            path: opp.path.clone(),
            dexes: opp.hops.iter().map(|h| h.dex.clone()).collect(),
            pools: opp.hops.iter().map(|h| format!("{:?}", h.pool)).collect(),
            amount_in: opp.amount_in.to_string(),
            expected_out: opp.expected_out.to_string(),
            gross_profit: opp.gross_profit.to_string(),
            spread_percent: opp.spread_percent,
            net_profit_usd: opp.net_profit_usd,
            gas_cost_usd: opp.gas_cost_usd,
            min_liquidity_usd: opp.min_liquidity_usd,
            timestamp: opp.timestamp,
            observed_at: Utc::now(),
            block_number: opp.block_number,
            score: opp.score,
            tier: format!("{:?}", opp.tier).to_uppercase(),
            recommendation: opp.recommendation.to_string(),
            mev: opp.mev.clone(),
            confidence: opp.confidence,
            flash_loan_available: opp.flash_loan_available,
            estimated_quote: opp.estimated_quote,
            rebase_window: opp.rebase_window,
        }
    }
}

/// Consume the coordinator's merged stream: log each record, append to
/// the JSONL file when configured, and forward to any external consumer.
pub async fn run_sink(
    rx: mpsc::Receiver<Opportunity>,
    jsonl_path: Option<PathBuf>,
    forward: Option<mpsc::Sender<SerializedOpportunity>>,
) {
    let mut file = match &jsonl_path {
        Some(path) => match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
        {
            Ok(f) => Some(f),
            Err(err) => {
                warn!("sink: cannot open {}: {}", path.display(), err);
                None
            }
        },
        None => None,
    };

    let mut stream = ReceiverStream::new(rx);
    while let Some(opp) = stream.next().await {
        let record = SerializedOpportunity::from(&opp);
        info!(
            "opportunity [{}] chain {} {} net ${:.2} score {:.0} {} conf {:.2}",
            record.kind,
            record.chain_id,
            record.path.join(">"),
            record.net_profit_usd,
            record.score,
            record.recommendation,
            record.confidence
        );
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(err) => {
                warn!("sink: serialization failed: {}", err);
                continue;
            }
        };
        if let Some(f) = file.as_mut() {
            if let Err(err) = f.write_all(format!("{}\n", line).as_bytes()).await {
                warn!("sink: write failed: {}", err);
                file = None;
            }
        }
        if let Some(tx) = &forward {
            let _ = tx.send(record).await;
        }
    }
    if let Some(mut f) = file {
        let _ = f.flush().await;
    }
}
