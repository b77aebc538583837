//! HTTP transport against a round coordinator.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument};

use super::retry::RetryPolicy;
use super::wire::{DownloadResponse, UploadResponse, CONTRIBUTOR_TOKEN_HEADER};
use crate::domain::models::{AggregateDocument, RemoteSnapshot, TransportKind};
use crate::domain::ports::{SyncTransport, TransportError, UploadReceipt};
use crate::services::round_coordinator::CoordinatorStats;

/// Stateless client for the coordinator's knowledge API.
pub struct DirectTransport {
    http_client: ReqwestClient,
    /// Endpoint prefix, e.g. `http://host:9300/api/v1/knowledge`
    base_url: String,
    retry_policy: RetryPolicy,
}

impl DirectTransport {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry_policy: RetryPolicy::none(),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Fetch the coordinator's public counters.
    pub async fn stats(&self) -> Result<CoordinatorStats, TransportError> {
        self.retry_policy
            .execute(move || async move {
                let response = self.http_client.get(self.url("stats")).send().await?;
                let body = check_status(response).await?.bytes().await?;
                serde_json::from_slice(&body).map_err(|e| TransportError::Malformed(e.to_string()))
            })
            .await
    }

    /// Liveness probe; succeeds if the coordinator answers `pong`.
    pub async fn ping(&self) -> Result<(), TransportError> {
        let response = self.http_client.get(self.url("ping")).send().await?;
        let body = check_status(response).await?.text().await?;
        if body.trim() == "pong" {
            Ok(())
        } else {
            Err(TransportError::Malformed(format!("unexpected ping reply: {body}")))
        }
    }

    async fn send_upload(
        &self,
        contributor_token: &str,
        contribution: &AggregateDocument,
    ) -> Result<UploadReceipt, TransportError> {
        let response = self
            .http_client
            .post(self.url("upload"))
            .header(CONTRIBUTOR_TOKEN_HEADER, contributor_token)
            .json(contribution)
            .send()
            .await?;

        let body = check_status(response).await?.bytes().await?;
        let reply: UploadResponse =
            serde_json::from_slice(&body).map_err(|e| TransportError::Malformed(e.to_string()))?;
        if !reply.accepted {
            return Err(TransportError::Rejected {
                status: StatusCode::OK.as_u16(),
                message: "coordinator did not accept the contribution".to_string(),
            });
        }
        debug!(
            round_number = reply.round_number,
            round_closed = reply.round_closed,
            "coordinator accepted contribution"
        );
        Ok(UploadReceipt {
            round_number: reply.round_number,
            merged: None,
        })
    }

    async fn send_download(&self) -> Result<Option<RemoteSnapshot>, TransportError> {
        let response = self.http_client.get(self.url("download")).send().await?;
        let body = check_status(response).await?.bytes().await?;
        let reply: DownloadResponse =
            serde_json::from_slice(&body).map_err(|e| TransportError::Malformed(e.to_string()))?;
        Ok(reply.into())
    }
}

/// Map a non-success status onto the transport error taxonomy.
async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());

    Err(if status == StatusCode::TOO_MANY_REQUESTS {
        TransportError::RateLimited
    } else if status.is_server_error() {
        TransportError::Server {
            status: status.as_u16(),
            message,
        }
    } else {
        TransportError::Rejected {
            status: status.as_u16(),
            message,
        }
    })
}

#[async_trait]
impl SyncTransport for DirectTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Direct
    }

    #[instrument(skip(self, contributor_token, contribution), fields(base_url = %self.base_url))]
    async fn push(
        &self,
        contributor_token: &str,
        contribution: &AggregateDocument,
    ) -> Result<UploadReceipt, TransportError> {
        // Only a 429 proves the coordinator did not merge the upload.
        self.retry_policy
            .execute_when(
                |err| matches!(err, TransportError::RateLimited),
                move || self.send_upload(contributor_token, contribution),
            )
            .await
    }

    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn fetch(&self) -> Result<Option<RemoteSnapshot>, TransportError> {
        self.retry_policy.execute(move || self.send_download()).await
    }
}
