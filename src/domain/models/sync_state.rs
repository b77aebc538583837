//! Per-contributor synchronization state and its timing rules.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of shared store a contributor synchronizes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Versioned repository with pull-merge-push.
    Repository,
    /// Request/response against the round coordinator.
    Direct,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repository => "repository",
            Self::Direct => "direct",
        }
    }

    /// Default upload/download intervals for this transport.
    ///
    /// Repository pushes are a full commit cycle against a shared store, so
    /// they run less often than direct uploads.
    pub fn default_schedule(&self) -> SyncSchedule {
        match self {
            Self::Repository => SyncSchedule {
                upload_interval: Duration::minutes(10),
                download_interval: Duration::minutes(5),
                ..SyncSchedule::default()
            },
            Self::Direct => SyncSchedule {
                upload_interval: Duration::minutes(3),
                download_interval: Duration::minutes(1),
                ..SyncSchedule::default()
            },
        }
    }
}

/// Timing and gating parameters for one contributor's sync loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSchedule {
    /// Minimum time between upload attempts.
    pub upload_interval: Duration,
    /// Minimum time between download attempts.
    pub download_interval: Duration,
    /// New outcomes required before an upload does any I/O.
    pub min_contributions: u64,
    /// Consecutive failures tolerated before intervals start growing.
    pub failure_threshold: u32,
    /// Upper bound on the interval multiplier while backing off.
    pub max_backoff_factor: u32,
}

impl Default for SyncSchedule {
    fn default() -> Self {
        Self {
            upload_interval: Duration::minutes(5),
            download_interval: Duration::minutes(5),
            min_contributions: 10,
            failure_threshold: 3,
            max_backoff_factor: 64,
        }
    }
}

/// Mutable sync bookkeeping owned by a contributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub last_upload_at: Option<DateTime<Utc>>,
    pub last_download_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub enabled: bool,
    /// Most recent failure, kept for operators.
    pub last_error: Option<String>,
}

impl SyncState {
    pub fn new(enabled: bool) -> Self {
        Self {
            last_upload_at: None,
            last_download_at: None,
            consecutive_failures: 0,
            enabled,
            last_error: None,
        }
    }

    /// Multiplier applied to the base intervals.
    ///
    /// Stays at 1 up to `failure_threshold` failures, then doubles with every
    /// further failure until `max_backoff_factor`.
    pub fn backoff_factor(&self, schedule: &SyncSchedule) -> u32 {
        if self.consecutive_failures <= schedule.failure_threshold {
            return 1;
        }
        let exponent = self.consecutive_failures - schedule.failure_threshold;
        2_u32
            .checked_pow(exponent)
            .unwrap_or(u32::MAX)
            .min(schedule.max_backoff_factor.max(1))
    }

    /// Upload interval after applying the backoff factor.
    pub fn effective_upload_interval(&self, schedule: &SyncSchedule) -> Duration {
        schedule.upload_interval * i32::try_from(self.backoff_factor(schedule)).unwrap_or(i32::MAX)
    }

    /// Download interval after applying the backoff factor.
    pub fn effective_download_interval(&self, schedule: &SyncSchedule) -> Duration {
        schedule.download_interval * i32::try_from(self.backoff_factor(schedule)).unwrap_or(i32::MAX)
    }

    pub fn upload_due(&self, schedule: &SyncSchedule, now: DateTime<Utc>) -> bool {
        is_due(self.last_upload_at, self.effective_upload_interval(schedule), now)
    }

    pub fn download_due(&self, schedule: &SyncSchedule, now: DateTime<Utc>) -> bool {
        is_due(self.last_download_at, self.effective_download_interval(schedule), now)
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_error = None;
    }

    pub fn record_failure(&mut self, reason: impl Into<String>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(reason.into());
    }
}

fn is_due(last: Option<DateTime<Utc>>, interval: Duration, now: DateTime<Utc>) -> bool {
    last.is_none_or(|last| now - last >= interval)
}
