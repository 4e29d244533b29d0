//! The agent poll loop.
//!
//! Each cycle: heartbeat, pull reserved tasks, evaluate them with the
//! shared check engine, and submit the results per run. A run whose
//! evaluation cannot even start is reported as a fatal failure so the
//! server finalises it instead of waiting for the lease to lapse.

use std::collections::BTreeMap;

use inspect_core::checks::{self, CheckContext};
use inspect_core::types::DbId;

use crate::client::{AgentClient, ClientError, ResultPayload, Task};
use crate::config::AgentConfig;

/// Delay before the next poll when the last cycle had work.
const BUSY_POLL_SECS: u64 = 1;

pub struct AgentRunner {
    config: AgentConfig,
    client: AgentClient,
}

impl AgentRunner {
    pub fn new(config: AgentConfig, client: AgentClient) -> Self {
        AgentRunner { config, client }
    }

    /// Poll until the process is stopped.
    pub async fn run_forever(&self) {
        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Agent started"
        );
        loop {
            let had_tasks = match self.run_once().await {
                Ok(had_tasks) => had_tasks,
                Err(e) => {
                    tracing::error!(error = %e, "Poll cycle failed");
                    false
                }
            };
            let sleep = if had_tasks {
                std::time::Duration::from_secs(BUSY_POLL_SECS)
            } else {
                self.config.poll_interval
            };
            tokio::time::sleep(sleep).await;
        }
    }

    /// One poll cycle. Returns whether any tasks were processed.
    pub async fn run_once(&self) -> Result<bool, ClientError> {
        if let Err(e) = self.client.heartbeat().await {
            tracing::warn!(error = %e, "Heartbeat failed");
        }

        let tasks = self.client.pull_tasks(self.config.batch_size.max(1)).await?;
        if tasks.is_empty() {
            tracing::debug!("No pending tasks");
            return Ok(false);
        }

        // Tasks arrive flattened; evaluate and submit per run.
        let mut by_run: BTreeMap<DbId, Vec<Task>> = BTreeMap::new();
        for task in tasks {
            by_run.entry(task.run_id).or_default().push(task);
        }

        for (run_id, tasks) in by_run {
            match self.execute_run(&tasks).await {
                Ok(results) => {
                    if let Err(e) = self.client.submit_results(run_id, &results).await {
                        tracing::error!(run_id, error = %e, "Result submission failed");
                    } else {
                        tracing::info!(run_id, items = results.len(), "Results submitted");
                    }
                }
                Err(reason) => {
                    tracing::error!(run_id, reason = %reason, "Run execution failed");
                    if let Err(e) = self.client.report_failure(run_id, &reason).await {
                        tracing::error!(run_id, error = %e, "Failure report failed");
                    }
                }
            }
        }
        Ok(true)
    }

    /// Evaluate every task of one run. Returns `Err` only for conditions
    /// that doom the whole run (e.g. an unreadable kubeconfig).
    async fn execute_run(&self, tasks: &[Task]) -> Result<Vec<ResultPayload>, String> {
        let kubeconfig = match &self.config.kubeconfig_path {
            Some(path) => Some(
                tokio::fs::read(path)
                    .await
                    .map_err(|e| format!("cannot read kubeconfig {}: {e}", path.display()))?,
            ),
            None => None,
        };

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            let ctx = CheckContext {
                kubeconfig: kubeconfig.clone(),
                prometheus_url: self
                    .config
                    .prometheus_url
                    .clone()
                    .or_else(|| task.cluster_context.prometheus_url.clone()),
                prom_timeout: None,
            };
            let outcome = checks::evaluate(&task.item_snapshot, &ctx).await;
            tracing::debug!(
                run_id = task.run_id,
                item_id = task.item_id,
                status = outcome.status.as_str(),
                "Item evaluated"
            );
            results.push(ResultPayload {
                item_id: task.item_id,
                status: outcome.status.as_str().to_string(),
                detail: outcome.detail,
                suggestion: outcome.suggestion,
            });
        }
        Ok(results)
    }
}
