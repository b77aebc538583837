//! Implementation of the `fedsync coordinator` command.

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::adapters::http::{CoordinatorHttpConfig, CoordinatorServer};
use crate::adapters::sqlite::open_snapshot_repository;
use crate::domain::models::Config;
use crate::domain::ports::SystemClock;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::flight_log::JsonlFlightRecorder;
use crate::services::{RoundCoordinator, RoundPolicy, RoundTicker};

#[derive(Args, Debug)]
pub struct CoordinatorArgs {
    /// Host to bind (overrides coordinator.host)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides coordinator.port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Distinct contributors that close a round (overrides coordinator.contributor_threshold)
    #[arg(short, long)]
    pub threshold: Option<usize>,

    /// SQLite file for finalized snapshots (overrides coordinator.database_path)
    #[arg(long)]
    pub database: Option<String>,
}

impl CoordinatorArgs {
    fn apply(self, config: &mut Config) {
        let coordinator = &mut config.coordinator;
        if let Some(host) = self.host {
            coordinator.host = host;
        }
        if let Some(port) = self.port {
            coordinator.port = port;
        }
        if let Some(threshold) = self.threshold {
            coordinator.contributor_threshold = threshold;
        }
        if self.database.is_some() {
            coordinator.database_path = self.database;
        }
    }
}

pub async fn execute(args: CoordinatorArgs, mut config: Config) -> Result<()> {
    args.apply(&mut config);
    ConfigLoader::validate(&config)?;
    let settings = &config.coordinator;

    let mut coordinator = RoundCoordinator::new(RoundPolicy::from(settings), Arc::new(SystemClock));
    if let Some(path) = &settings.database_path {
        let repository = open_snapshot_repository(path)
            .await
            .with_context(|| format!("Failed to open snapshot database {path}"))?;
        coordinator = coordinator.with_repository(Arc::new(repository));
    }
    if let Some(path) = &settings.flight_log_path {
        coordinator = coordinator.with_flight_recorder(Arc::new(JsonlFlightRecorder::new(path)));
    }
    let coordinator = Arc::new(
        coordinator
            .restore()
            .await
            .context("Failed to restore coordinator state")?,
    );

    let ticker = RoundTicker::new(Arc::clone(&coordinator), settings.tick_interval());
    let ticker_handle = ticker.handle();
    let mut events = ticker.run();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "round ticker event");
        }
    });

    info!(
        contributor_threshold = settings.contributor_threshold,
        round_deadline_secs = settings.round_deadline_secs,
        persistent = settings.database_path.is_some(),
        "starting round coordinator"
    );
    let server = CoordinatorServer::new(
        Arc::clone(&coordinator),
        CoordinatorHttpConfig::from(settings),
    );
    let served = server.serve_with_shutdown(shutdown_signal()).await;
    ticker_handle.stop();

    let stats = coordinator.stats().await;
    info!(
        current_round = stats.current_round,
        latest_finalized_round = ?stats.latest_finalized_round,
        "round coordinator stopped"
    );
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
