//! HTTP client for the server's agent plane.
//!
//! All motion is agent-initiated: heartbeat, task pull, result
//! submission, and fatal failure reports. Every call carries the bearer
//! token; the server's `{data: ...}` envelope is unwrapped here.

use inspect_core::item::ItemSnapshot;
use inspect_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;

/// Errors surfaced by the agent client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned HTTP {status}: {reason}")]
    Server { status: u16, reason: String },
}

/// Cluster information shipped with each task.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterContext {
    pub cluster_id: DbId,
    pub cluster_name: String,
    #[serde(default)]
    pub prometheus_url: Option<String>,
}

/// One reserved unit of work from `GET /agents/{id}/tasks`.
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub run_id: DbId,
    pub item_id: DbId,
    pub item_snapshot: ItemSnapshot,
    pub cluster_context: ClusterContext,
    pub lease_expires_at: Timestamp,
}

/// One result element of a submission batch.
#[derive(Debug, Clone, Serialize)]
pub struct ResultPayload {
    pub item_id: DbId,
    pub status: String,
    pub detail: Option<String>,
    pub suggestion: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    run_id: DbId,
    results: &'a [ResultPayload],
}

#[derive(Debug, Serialize)]
struct FailureRequest<'a> {
    run_id: DbId,
    reason: &'a str,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Heartbeat {
    pub server_time: Timestamp,
}

/// Thin reqwest wrapper around the agent plane.
pub struct AgentClient {
    http: reqwest::Client,
    base: String,
    agent_id: DbId,
    token: String,
}

impl AgentClient {
    pub fn new(config: &AgentConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(AgentClient {
            http,
            base: config.server_base.clone(),
            agent_id: config.agent_id,
            token: config.token.clone(),
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/agents/{}/{suffix}", self.base, self.agent_id)
    }

    async fn unwrap<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let reason = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.reason)
                .unwrap_or_else(|| status.to_string());
            return Err(ClientError::Server {
                status: status.as_u16(),
                reason,
            });
        }
        Ok(response.json::<Envelope<T>>().await?.data)
    }

    /// POST /agents/{id}/heartbeat
    pub async fn heartbeat(&self) -> Result<Heartbeat, ClientError> {
        let response = self
            .http
            .post(self.url("heartbeat"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::unwrap(response).await
    }

    /// GET /agents/{id}/tasks?limit=N
    pub async fn pull_tasks(&self, limit: i64) -> Result<Vec<Task>, ClientError> {
        let response = self
            .http
            .get(self.url("tasks"))
            .query(&[("limit", limit)])
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::unwrap(response).await
    }

    /// POST /agents/{id}/results
    pub async fn submit_results(
        &self,
        run_id: DbId,
        results: &[ResultPayload],
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url("results"))
            .bearer_auth(&self.token)
            .json(&SubmitRequest { run_id, results })
            .send()
            .await?;
        Self::unwrap::<serde_json::Value>(response).await.map(|_| ())
    }

    /// POST /agents/{id}/failures
    pub async fn report_failure(&self, run_id: DbId, reason: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url("failures"))
            .bearer_auth(&self.token)
            .json(&FailureRequest { run_id, reason })
            .send()
            .await?;
        Self::unwrap::<serde_json::Value>(response).await.map(|_| ())
    }
}
