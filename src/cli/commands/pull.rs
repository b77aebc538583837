//! Implementation of the `fedsync pull` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{detail_table, list_table, output, percent, CommandOutput};
use crate::domain::models::{Config, RemoteSnapshot, StatFamily};
use crate::infrastructure::transport::build_transport;

#[derive(Args, Debug)]
pub struct PullArgs {
    /// List every tactic and behavior entry
    #[arg(short, long)]
    pub entries: bool,
}

#[derive(Debug, Serialize)]
pub struct PullOutput {
    pub transport: &'static str,
    pub snapshot: Option<RemoteSnapshot>,
    #[serde(skip)]
    pub show_entries: bool,
}

impl CommandOutput for PullOutput {
    fn to_human(&self) -> String {
        let Some(snapshot) = &self.snapshot else {
            return format!("No global snapshot published yet ({} transport).", self.transport);
        };
        let document = &snapshot.document;
        let mut lines = vec![detail_table(&[
            ("Transport", self.transport.to_string()),
            ("Round", snapshot.summary.round_number.to_string()),
            ("Contributors", snapshot.summary.contributor_count.to_string()),
            ("Finalized at", snapshot.summary.finalized_at.to_rfc3339()),
            ("Tactics", document.tactics.len().to_string()),
            ("Behaviors", document.behaviors.len().to_string()),
            ("Data points", document.total_attempts().to_string()),
        ])
        .to_string()];

        if self.show_entries && !document.is_empty() {
            let mut table = list_table(&["family", "category", "id", "attempts", "successes", "rate"]);
            for family in StatFamily::ALL {
                for entry in document.family(family).values() {
                    table.add_row(vec![
                        family.as_str().to_string(),
                        entry.key().category().to_string(),
                        entry.key().tactic_id().to_string(),
                        entry.total_attempts().to_string(),
                        entry.successful_attempts().to_string(),
                        percent(entry.success_rate()),
                    ]);
                }
            }
            lines.push(table.to_string());
        }
        lines.join("\n\n")
    }
}

pub async fn execute(args: PullArgs, config: &Config, json_mode: bool) -> Result<()> {
    let transport = build_transport(config)?;
    let kind = transport.kind();
    let snapshot = tokio::time::timeout(config.sync.call_timeout(), transport.fetch())
        .await
        .with_context(|| format!("{} transport timed out", kind.as_str()))?
        .with_context(|| format!("Failed to download through the {} transport", kind.as_str()))?;

    output(
        &PullOutput {
            transport: kind.as_str(),
            snapshot,
            show_entries: args.entries,
        },
        json_mode,
    );
    Ok(())
}
