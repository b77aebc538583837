//! Implementation of the `fedsync status` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{detail_table, output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::transport::{DirectTransport, RetryPolicy};
use crate::services::CoordinatorStats;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Coordinator API base URL (overrides sync.endpoint)
    #[arg(short, long)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub endpoint: String,
    #[serde(flatten)]
    pub stats: CoordinatorStats,
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        let stats = &self.stats;
        let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
        let table = detail_table(&[
            ("Coordinator", self.endpoint.clone()),
            ("Open round", stats.current_round.to_string()),
            ("Round started", stats.current_round_started_at.to_rfc3339()),
            ("Contributions", stats.current_round_contributions.to_string()),
            ("Latest round", or_dash(stats.latest_finalized_round.map(|r| r.to_string()))),
            ("Finalized at", or_dash(stats.latest_finalized_at.map(|t| t.to_rfc3339()))),
            ("Tactics", stats.tactics_count.to_string()),
            ("Behaviors", stats.behaviors_count.to_string()),
            ("Data points", stats.total_attempts.to_string()),
        ]);
        table.to_string()
    }
}

pub async fn execute(args: StatusArgs, config: &Config, json_mode: bool) -> Result<()> {
    let endpoint = args.endpoint.unwrap_or_else(|| config.sync.endpoint.clone());
    let transport = DirectTransport::new(&endpoint, config.sync.call_timeout())?
        .with_retry_policy(RetryPolicy::from_config(&config.retry));
    let stats = transport
        .stats()
        .await
        .with_context(|| format!("Failed to fetch stats from {endpoint}"))?;

    output(&StatusOutput { endpoint, stats }, json_mode);
    Ok(())
}
