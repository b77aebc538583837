use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::sync_state::{SyncSchedule, TransportKind};

/// Main configuration structure for fedsync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Contributor synchronization configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Round coordinator configuration
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Contributor-side synchronization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    /// Whether this node synchronizes at all
    #[serde(default)]
    pub enabled: bool,

    /// Transport used to reach the shared store
    #[serde(default = "default_transport")]
    pub transport: TransportKind,

    /// Coordinator base URL (direct transport)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Shared repository URL (repository transport)
    #[serde(default)]
    pub repository_url: String,

    /// Local checkout of the shared repository
    #[serde(default = "default_checkout_path")]
    pub checkout_path: String,

    /// Branch holding the shared documents
    #[serde(default = "default_branch")]
    pub branch: String,

    /// How often the sync daemon wakes up
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// New outcomes required before an upload does any I/O
    #[serde(default = "default_min_contributions")]
    pub min_contributions: u64,

    /// Override for the transport's default upload interval
    #[serde(default)]
    pub upload_interval_secs: Option<u64>,

    /// Override for the transport's default download interval
    #[serde(default)]
    pub download_interval_secs: Option<u64>,

    /// Upper bound on a single transport call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Consecutive failures tolerated before backing off
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Largest multiplier applied to intervals while backing off
    #[serde(default = "default_max_backoff_factor")]
    pub max_backoff_factor: u32,
}

const fn default_transport() -> TransportKind {
    TransportKind::Direct
}

fn default_endpoint() -> String {
    "http://127.0.0.1:9300/api/v1/knowledge".to_string()
}

fn default_checkout_path() -> String {
    ".fedsync/checkout".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

const fn default_poll_interval_secs() -> u64 {
    30
}

const fn default_min_contributions() -> u64 {
    10
}

const fn default_call_timeout_secs() -> u64 {
    30
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_max_backoff_factor() -> u32 {
    64
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            transport: default_transport(),
            endpoint: default_endpoint(),
            repository_url: String::new(),
            checkout_path: default_checkout_path(),
            branch: default_branch(),
            poll_interval_secs: default_poll_interval_secs(),
            min_contributions: default_min_contributions(),
            upload_interval_secs: None,
            download_interval_secs: None,
            call_timeout_secs: default_call_timeout_secs(),
            failure_threshold: default_failure_threshold(),
            max_backoff_factor: default_max_backoff_factor(),
        }
    }
}

impl SyncConfig {
    /// Build the gating schedule for the configured transport.
    pub fn schedule(&self) -> SyncSchedule {
        let defaults = self.transport.default_schedule();
        SyncSchedule {
            upload_interval: self
                .upload_interval_secs
                .map_or(defaults.upload_interval, secs),
            download_interval: self
                .download_interval_secs
                .map_or(defaults.download_interval, secs),
            min_contributions: self.min_contributions,
            failure_threshold: self.failure_threshold,
            max_backoff_factor: self.max_backoff_factor,
        }
    }

    pub fn call_timeout(&self) -> std::time::Duration {
        std_secs(self.call_timeout_secs)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std_secs(self.poll_interval_secs)
    }
}

/// Longest interval, deadline or timeout accepted from configuration.
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Out-of-range values saturate at [`MAX_DURATION_SECS`].
fn secs(value: u64) -> Duration {
    let clamped = i64::try_from(value.min(MAX_DURATION_SECS)).unwrap_or(i64::MAX);
    Duration::try_seconds(clamped).unwrap_or(Duration::MAX)
}

fn std_secs(value: u64) -> std::time::Duration {
    std::time::Duration::from_secs(value.min(MAX_DURATION_SECS))
}

/// Round coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoordinatorConfig {
    /// Host to bind the HTTP server to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Distinct contributors that close a round early
    #[serde(default = "default_contributor_threshold")]
    pub contributor_threshold: usize,

    /// Longest a round stays open
    #[serde(default = "default_round_deadline_secs")]
    pub round_deadline_secs: u64,

    /// Cadence of the round ticker
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Sustained upload rate accepted by the HTTP ingress
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Burst size for the ingress token bucket
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// SQLite file for finalized snapshots (in-memory only when unset)
    #[serde(default)]
    pub database_path: Option<String>,

    /// JSON-lines file receiving one record per finalized round
    #[serde(default)]
    pub flight_log_path: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    9300
}

const fn default_contributor_threshold() -> usize {
    10
}

const fn default_round_deadline_secs() -> u64 {
    600
}

const fn default_tick_interval_secs() -> u64 {
    5
}

const fn default_requests_per_second() -> u32 {
    20
}

const fn default_burst_size() -> u32 {
    40
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            contributor_threshold: default_contributor_threshold(),
            round_deadline_secs: default_round_deadline_secs(),
            tick_interval_secs: default_tick_interval_secs(),
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
            database_path: None,
            flight_log_path: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn round_deadline(&self) -> Duration {
        secs(self.round_deadline_secs)
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std_secs(self.tick_interval_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_log_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_log_rotation(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}
