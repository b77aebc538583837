//! Round deadline ticker.
//!
//! Calls [`RoundCoordinator::tick`] on a fixed cadence so that a round closes
//! by its deadline even when no further contributions arrive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::domain::models::RoundSummary;
use crate::services::round_coordinator::RoundCoordinator;

/// Event emitted by the ticker.
#[derive(Debug, Clone)]
pub enum RoundTickerEvent {
    Started,
    RoundFinalized { summary: RoundSummary },
    TickFailed { error: String },
    Stopped,
}

/// Handle to stop a running ticker.
#[derive(Clone)]
pub struct RoundTickerHandle {
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl RoundTickerHandle {
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}

pub struct RoundTicker {
    coordinator: Arc<RoundCoordinator>,
    tick_interval: Duration,
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl RoundTicker {
    pub fn new(coordinator: Arc<RoundCoordinator>, tick_interval: Duration) -> Self {
        Self {
            coordinator,
            tick_interval,
            stop_flag: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn handle(&self) -> RoundTickerHandle {
        RoundTickerHandle {
            stop_flag: self.stop_flag.clone(),
            wake: self.wake.clone(),
        }
    }

    /// Spawn the ticker, returning a channel of events.
    pub fn run(self) -> mpsc::Receiver<RoundTickerEvent> {
        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(async move {
            self.run_loop(tx).await;
        });
        rx
    }

    async fn run_loop(self, tx: mpsc::Sender<RoundTickerEvent>) {
        let _ = tx.send(RoundTickerEvent::Started).await;
        info!(tick_interval = ?self.tick_interval, "round ticker started");

        let mut timer = interval(self.tick_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.stop_flag.load(Ordering::Acquire) {
            tokio::select! {
                _ = timer.tick() => {
                    match self.coordinator.tick().await {
                        Ok(Some(summary)) => {
                            let _ = tx.send(RoundTickerEvent::RoundFinalized { summary }).await;
                        }
                        Ok(None) => {}
                        Err(err) => {
                            error!(error = %err, "round tick failed");
                            let _ = tx.send(RoundTickerEvent::TickFailed { error: err.to_string() }).await;
                        }
                    }
                }
                () = self.wake.notified() => {}
            }
        }

        info!("round ticker stopped");
        let _ = tx.send(RoundTickerEvent::Stopped).await;
    }
}
