//! JSON bodies exchanged between the direct transport and the coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::{AggregateDocument, RemoteSnapshot, RoundSummary};

/// Base path of every coordinator endpoint.
pub const API_BASE_PATH: &str = "/api/v1/knowledge";

/// Header carrying the opaque per-contributor token.
pub const CONTRIBUTOR_TOKEN_HEADER: &str = "x-contributor-token";

/// Body of a successful `POST /upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub accepted: bool,
    pub round_number: u64,
    pub round_closed: bool,
}

/// Body of `GET /download`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadResponse {
    Available {
        round_number: u64,
        contributor_count: u32,
        finalized_at: DateTime<Utc>,
        document: AggregateDocument,
    },
    Unavailable,
}

impl From<Option<RemoteSnapshot>> for DownloadResponse {
    fn from(snapshot: Option<RemoteSnapshot>) -> Self {
        match snapshot {
            Some(RemoteSnapshot { summary, document }) => Self::Available {
                round_number: summary.round_number,
                contributor_count: summary.contributor_count,
                finalized_at: summary.finalized_at,
                document,
            },
            None => Self::Unavailable,
        }
    }
}

impl From<DownloadResponse> for Option<RemoteSnapshot> {
    fn from(response: DownloadResponse) -> Self {
        match response {
            DownloadResponse::Available {
                round_number,
                contributor_count,
                finalized_at,
                document,
            } => Some(RemoteSnapshot {
                summary: RoundSummary {
                    round_number,
                    contributor_count,
                    finalized_at,
                },
                document,
            }),
            DownloadResponse::Unavailable => None,
        }
    }
}

/// Error body returned by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
