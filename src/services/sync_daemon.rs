//! Contributor sync background daemon.
//!
//! Wakes up on a fixed poll interval and lets [`ContributorSync`] decide
//! whether an upload or download is due. Sync errors are absorbed here and
//! reported as events; they never reach the code recording outcomes. When
//! stopped, the daemon makes one final attempt to push pending outcomes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::services::contributor_sync::{ContributorSync, DownloadOutcome, UploadOutcome};

/// Configuration for the sync daemon.
#[derive(Debug, Clone)]
pub struct SyncDaemonConfig {
    /// How often to check whether a sync is due.
    pub poll_interval: Duration,
    /// Push everything pending when the daemon stops.
    pub flush_on_stop: bool,
}

impl Default for SyncDaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            flush_on_stop: true,
        }
    }
}

impl SyncDaemonConfig {
    pub fn with_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..Default::default()
        }
    }
}

/// Direction of a sync call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Upload,
    Download,
}

/// Event emitted by the sync daemon.
#[derive(Debug, Clone)]
pub enum SyncDaemonEvent {
    Started,
    Uploaded { round_number: u64, data_points: u64 },
    SnapshotApplied { round_number: u64 },
    SyncFailed { direction: SyncDirection, error: String },
    Stopped,
}

/// Counters kept by the sync daemon.
#[derive(Debug, Clone, Default)]
pub struct SyncDaemonStatus {
    pub running: bool,
    pub polls: u64,
    pub uploads: u64,
    pub snapshots_applied: u64,
    pub failures: u64,
    pub last_poll: Option<Instant>,
}

/// Handle to control a running sync daemon.
#[derive(Clone)]
pub struct SyncDaemonHandle {
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    status: Arc<RwLock<SyncDaemonStatus>>,
}

impl SyncDaemonHandle {
    /// Request the daemon to stop. It finishes its current poll first.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> SyncDaemonStatus {
        self.status.read().await.clone()
    }
}

/// Periodic driver for one contributor's [`ContributorSync`].
pub struct SyncDaemon {
    sync: Arc<ContributorSync>,
    config: SyncDaemonConfig,
    status: Arc<RwLock<SyncDaemonStatus>>,
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl SyncDaemon {
    pub fn new(sync: Arc<ContributorSync>, config: SyncDaemonConfig) -> Self {
        Self {
            sync,
            config,
            status: Arc::new(RwLock::new(SyncDaemonStatus::default())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn handle(&self) -> SyncDaemonHandle {
        SyncDaemonHandle {
            stop_flag: self.stop_flag.clone(),
            wake: self.wake.clone(),
            status: self.status.clone(),
        }
    }

    /// Spawn the daemon, returning a channel of events.
    pub fn run(self) -> mpsc::Receiver<SyncDaemonEvent> {
        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(async move {
            self.run_loop(tx).await;
        });
        rx
    }

    async fn run_loop(self, tx: mpsc::Sender<SyncDaemonEvent>) {
        self.status.write().await.running = true;
        let _ = tx.send(SyncDaemonEvent::Started).await;
        info!(poll_interval = ?self.config.poll_interval, "sync daemon started");

        let mut timer = interval(self.config.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.stop_flag.load(Ordering::Acquire) {
            tokio::select! {
                _ = timer.tick() => self.poll_once(&tx).await,
                () = self.wake.notified() => {}
            }
        }

        if self.config.flush_on_stop {
            match self.sync.flush().await {
                Ok(UploadOutcome::Uploaded {
                    round_number,
                    data_points,
                }) => {
                    let _ = tx
                        .send(SyncDaemonEvent::Uploaded {
                            round_number,
                            data_points,
                        })
                        .await;
                }
                Ok(UploadOutcome::Skipped(_)) => {}
                Err(err) => {
                    warn!(error = %err, "final upload failed");
                    let _ = tx
                        .send(SyncDaemonEvent::SyncFailed {
                            direction: SyncDirection::Upload,
                            error: err.to_string(),
                        })
                        .await;
                }
            }
        }

        self.status.write().await.running = false;
        info!("sync daemon stopped");
        let _ = tx.send(SyncDaemonEvent::Stopped).await;
    }

    /// Run one upload check followed by one download check.
    pub async fn poll_once(&self, tx: &mpsc::Sender<SyncDaemonEvent>) {
        {
            let mut status = self.status.write().await;
            status.polls += 1;
            status.last_poll = Some(Instant::now());
        }

        match self.sync.upload().await {
            Ok(UploadOutcome::Uploaded {
                round_number,
                data_points,
            }) => {
                self.status.write().await.uploads += 1;
                let _ = tx
                    .send(SyncDaemonEvent::Uploaded {
                        round_number,
                        data_points,
                    })
                    .await;
            }
            Ok(UploadOutcome::Skipped(_)) => {}
            Err(err) => self.report_failure(tx, SyncDirection::Upload, err.to_string()).await,
        }

        match self.sync.download().await {
            Ok(DownloadOutcome::Applied { round_number }) => {
                self.status.write().await.snapshots_applied += 1;
                let _ = tx
                    .send(SyncDaemonEvent::SnapshotApplied { round_number })
                    .await;
            }
            Ok(_) => {}
            Err(err) => {
                self.report_failure(tx, SyncDirection::Download, err.to_string())
                    .await;
            }
        }
    }

    async fn report_failure(
        &self,
        tx: &mpsc::Sender<SyncDaemonEvent>,
        direction: SyncDirection,
        error: String,
    ) {
        self.status.write().await.failures += 1;
        let _ = tx
            .send(SyncDaemonEvent::SyncFailed { direction, error })
            .await;
    }

    pub fn config(&self) -> &SyncDaemonConfig {
        &self.config
    }
}
