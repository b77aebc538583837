//! Contributor sync gating, failure handling and double-count avoidance.

mod common;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::key;
use fedsync::domain::models::SyncSchedule;
use fedsync::domain::ports::{ManualClock, UploadReceipt};
use fedsync::services::{DownloadOutcome, SkipReason, UploadOutcome};
use fedsync::{
    AggregateDocument, ContributorSync, OutcomeRecorder, RemoteSnapshot, RoundCoordinator,
    RoundPolicy, StatFamily, SyncTransport, TransportError, TransportKind,
};

fn schedule() -> SyncSchedule {
    SyncSchedule {
        upload_interval: Duration::seconds(60),
        download_interval: Duration::seconds(30),
        min_contributions: 10,
        failure_threshold: 3,
        max_backoff_factor: 8,
    }
}

/// Transport replaying queued results and counting calls.
#[derive(Default)]
struct ScriptedTransport {
    pushes: AtomicUsize,
    fetches: AtomicUsize,
    push_results: Mutex<VecDeque<Result<UploadReceipt, TransportError>>>,
    fetch_results: Mutex<VecDeque<Result<Option<RemoteSnapshot>, TransportError>>>,
    delay: Option<std::time::Duration>,
}

impl ScriptedTransport {
    fn push_result(&self, result: Result<UploadReceipt, TransportError>) {
        self.push_results.lock().unwrap().push_back(result);
    }

    fn fetch_result(&self, result: Result<Option<RemoteSnapshot>, TransportError>) {
        self.fetch_results.lock().unwrap().push_back(result);
    }

    fn calls(&self) -> usize {
        self.pushes.load(Ordering::SeqCst) + self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncTransport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Direct
    }

    async fn push(
        &self,
        _contributor_token: &str,
        _contribution: &AggregateDocument,
    ) -> Result<UploadReceipt, TransportError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.push_results.lock().unwrap().pop_front();
        next.unwrap_or(Ok(UploadReceipt {
            round_number: 1,
            merged: None,
        }))
    }

    async fn fetch(&self) -> Result<Option<RemoteSnapshot>, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.fetch_results.lock().unwrap().pop_front();
        next.unwrap_or(Ok(None))
    }
}

/// In-process transport straight into a coordinator.
struct CoordinatorTransport(Arc<RoundCoordinator>);

#[async_trait]
impl SyncTransport for CoordinatorTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Direct
    }

    async fn push(
        &self,
        contributor_token: &str,
        contribution: &AggregateDocument,
    ) -> Result<UploadReceipt, TransportError> {
        let receipt = self
            .0
            .contribute(contributor_token, contribution)
            .await
            .map_err(|e| TransportError::Rejected {
                status: 400,
                message: e.to_string(),
            })?;
        Ok(UploadReceipt {
            round_number: receipt.round_number,
            merged: None,
        })
    }

    async fn fetch(&self) -> Result<Option<RemoteSnapshot>, TransportError> {
        Ok(self.0.snapshot().await)
    }
}

fn record(recorder: &OutcomeRecorder, id: &str, successes: usize, failures: usize) {
    for _ in 0..successes {
        recorder.record_outcome(key(id, "melee"), true);
    }
    for _ in 0..failures {
        recorder.record_outcome(key(id, "melee"), false);
    }
}

fn sync_with(transport: Arc<dyn SyncTransport>, clock: Arc<ManualClock>) -> ContributorSync {
    ContributorSync::new(
        transport,
        Arc::new(OutcomeRecorder::new()),
        clock,
        schedule(),
        std::time::Duration::from_secs(5),
        true,
    )
}

#[tokio::test]
async fn test_below_minimum_does_no_io() {
    let transport = Arc::new(ScriptedTransport::default());
    let sync = sync_with(transport.clone(), Arc::new(ManualClock::default()));
    record(sync.recorder(), "flank", 4, 3);

    let outcome = sync.upload().await.unwrap();
    assert_eq!(
        outcome,
        UploadOutcome::Skipped(SkipReason::BelowMinimum {
            pending: 7,
            required: 10
        })
    );
    assert_eq!(transport.calls(), 0);
    assert_eq!(sync.recorder().pending_count(), 7);
}

#[tokio::test]
async fn test_disabled_sync_does_no_io() {
    let transport = Arc::new(ScriptedTransport::default());
    let sync = sync_with(transport.clone(), Arc::new(ManualClock::default()));
    sync.set_enabled(false).await;
    record(sync.recorder(), "flank", 20, 0);

    assert_eq!(
        sync.upload().await.unwrap(),
        UploadOutcome::Skipped(SkipReason::Disabled)
    );
    assert_eq!(
        sync.download().await.unwrap(),
        DownloadOutcome::Skipped(SkipReason::Disabled)
    );
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_failed_upload_keeps_batch_pending() {
    let transport = Arc::new(ScriptedTransport::default());
    transport.push_result(Err(TransportError::Network("connection refused".into())));
    let clock = Arc::new(ManualClock::default());
    let sync = sync_with(transport.clone(), clock.clone());
    record(sync.recorder(), "flank", 6, 6);

    assert!(sync.upload().await.is_err());
    assert_eq!(sync.recorder().pending_count(), 12);
    let state = sync.sync_state().await;
    assert_eq!(state.consecutive_failures, 1);
    assert!(state.last_error.unwrap().contains("connection refused"));

    clock.advance(Duration::seconds(60));
    let outcome = sync.upload().await.unwrap();
    assert_eq!(
        outcome,
        UploadOutcome::Uploaded {
            round_number: 1,
            data_points: 12
        }
    );
    assert_eq!(sync.recorder().pending_count(), 0);
    assert_eq!(sync.sync_state().await.consecutive_failures, 0);
}

#[tokio::test]
async fn test_interval_stretches_after_repeated_failures() {
    let transport = Arc::new(ScriptedTransport::default());
    for _ in 0..4 {
        transport.push_result(Err(TransportError::Server {
            status: 503,
            message: "unavailable".into(),
        }));
    }
    let clock = Arc::new(ManualClock::default());
    let sync = sync_with(transport.clone(), clock.clone());
    record(sync.recorder(), "flank", 10, 0);

    for _ in 0..4 {
        assert!(sync.upload().await.is_err());
        clock.advance(Duration::seconds(60));
    }
    // Four failures with a threshold of three double the interval
    assert_eq!(
        sync.upload().await.unwrap(),
        UploadOutcome::Skipped(SkipReason::NotDue)
    );
    clock.advance(Duration::seconds(60));
    assert!(matches!(
        sync.upload().await.unwrap(),
        UploadOutcome::Uploaded { .. }
    ));
    assert_eq!(transport.pushes.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_slow_transport_times_out() {
    let transport = Arc::new(ScriptedTransport {
        delay: Some(std::time::Duration::from_secs(30)),
        ..ScriptedTransport::default()
    });
    let sync = ContributorSync::new(
        transport,
        Arc::new(OutcomeRecorder::new()),
        Arc::new(ManualClock::default()),
        schedule(),
        std::time::Duration::from_millis(50),
        true,
    );
    record(sync.recorder(), "flank", 10, 0);

    let err = sync.upload().await.unwrap_err();
    assert!(matches!(err, TransportError::Timeout(_)));
    assert!(err.is_transient());
    assert_eq!(sync.recorder().pending_count(), 10);
}

#[tokio::test]
async fn test_malformed_download_keeps_local_state() {
    let transport = Arc::new(ScriptedTransport::default());
    transport.fetch_result(Err(TransportError::Malformed("truncated document".into())));
    let sync = sync_with(transport.clone(), Arc::new(ManualClock::default()));
    record(sync.recorder(), "flank", 3, 1);

    let outcome = sync.download().await.unwrap();
    assert!(matches!(outcome, DownloadOutcome::Malformed { .. }));
    assert_eq!(sync.sync_state().await.consecutive_failures, 0);
    assert!((sync.recorder().success_rate(&key("flank", "melee")) - 0.75).abs() < 1e-12);
}

#[tokio::test]
async fn test_flush_ignores_minimum_and_interval() {
    let transport = Arc::new(ScriptedTransport::default());
    let sync = sync_with(transport.clone(), Arc::new(ManualClock::default()));
    record(sync.recorder(), "flank", 10, 0);
    sync.upload().await.unwrap();

    record(sync.recorder(), "flank", 2, 0);
    assert_eq!(
        sync.upload().await.unwrap(),
        UploadOutcome::Skipped(SkipReason::NotDue)
    );
    assert!(matches!(
        sync.flush().await.unwrap(),
        UploadOutcome::Uploaded { data_points: 2, .. }
    ));
    assert_eq!(
        sync.flush().await.unwrap(),
        UploadOutcome::Skipped(SkipReason::NothingPending)
    );
}

#[tokio::test]
async fn test_two_contributors_converge_without_double_counting() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let coordinator = Arc::new(RoundCoordinator::new(
        RoundPolicy {
            contributor_threshold: 2,
            ..RoundPolicy::default()
        },
        clock.clone(),
    ));
    let transport: Arc<dyn SyncTransport> = Arc::new(CoordinatorTransport(coordinator.clone()));
    let alice = sync_with(transport.clone(), clock.clone()).with_token("alice");
    let bob = sync_with(transport, clock.clone()).with_token("bob");

    record(alice.recorder(), "flank", 90, 10);
    record(bob.recorder(), "flank", 10, 0);

    // Round 1 closes as soon as both have uploaded
    alice.upload().await.unwrap();
    bob.upload().await.unwrap();
    assert_eq!(coordinator.snapshot().await.unwrap().summary.round_number, 1);

    for sync in [&alice, &bob] {
        assert_eq!(
            sync.download().await.unwrap(),
            DownloadOutcome::Applied { round_number: 1 }
        );
        let entry = sync
            .recorder()
            .entry(StatFamily::Tactics, &key("flank", "melee"))
            .unwrap();
        assert_eq!(entry.total_attempts(), 110, "uploaded batch is not counted twice");
        assert_eq!(entry.successful_attempts(), 100);
    }

    // Fresh local outcomes sit on top of the global baseline
    record(alice.recorder(), "flank", 1, 0);
    let entry = alice
        .recorder()
        .entry(StatFamily::Tactics, &key("flank", "melee"))
        .unwrap();
    assert_eq!(entry.total_attempts(), 111);

    // Re-downloading the same round is a no-op
    clock.advance(Duration::seconds(30));
    assert_eq!(
        alice.download().await.unwrap(),
        DownloadOutcome::Stale { round_number: 1 }
    );
}
