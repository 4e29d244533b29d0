//! Cluster connectivity probe.
//!
//! A one-shot validation of an uploaded kubeconfig: query the API server
//! version and count nodes, recording status, a short message, and the
//! observed version/node count onto the cluster row. Runs on cluster
//! creation, kubeconfig replacement, and explicit `test-connection`.

use std::time::Duration;

use chrono::Utc;
use inspect_core::checks::command::{run_command, CommandRun};
use inspect_core::checks::kubeconfig::TransientKubeconfig;
use inspect_core::status::ConnectionStatus;
use inspect_db::models::cluster::ConnectionRecord;

/// Outcome of probing one kubeconfig.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub status: ConnectionStatus,
    pub message: String,
    pub kubernetes_version: Option<String>,
    pub node_count: Option<i64>,
}

impl ProbeOutcome {
    /// Convert to the persisted connection record, stamped now.
    pub fn into_record(self) -> ConnectionRecord {
        ConnectionRecord {
            connection_status: self.status.as_str().to_string(),
            connection_message: Some(self.message),
            kubernetes_version: self.kubernetes_version,
            node_count: self.node_count,
            last_checked_at: Utc::now(),
        }
    }
}

/// Probe a cluster through its kubeconfig blob.
///
/// Version failure is a full `failed`; version success with node listing
/// failure degrades to `warning`.
pub async fn probe_kubeconfig(blob: &[u8], timeout: Duration) -> ProbeOutcome {
    let transient = match TransientKubeconfig::materialize(blob) {
        Ok(transient) => transient,
        Err(e) => {
            return ProbeOutcome {
                status: ConnectionStatus::Failed,
                message: format!("Cannot materialise kubeconfig: {e}"),
                kubernetes_version: None,
                node_count: None,
            }
        }
    };
    let kubeconfig = transient.path().to_string_lossy().into_owned();

    let version = match kubectl_json(
        &format!("kubectl --kubeconfig {kubeconfig} get --raw=/version"),
        timeout,
    )
    .await
    {
        Ok(payload) => payload
            .get("gitVersion")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        Err(message) => {
            return ProbeOutcome {
                status: ConnectionStatus::Failed,
                message: format!("Kubernetes API error: {message}"),
                kubernetes_version: None,
                node_count: None,
            }
        }
    };

    match kubectl_json(
        &format!("kubectl --kubeconfig {kubeconfig} get nodes -o json"),
        timeout,
    )
    .await
    {
        Ok(payload) => {
            let node_count = payload
                .get("items")
                .and_then(serde_json::Value::as_array)
                .map(|items| items.len() as i64)
                .unwrap_or(0);
            ProbeOutcome {
                status: ConnectionStatus::Connected,
                message: format!("Server version {version}; nodes {node_count}."),
                kubernetes_version: Some(version),
                node_count: Some(node_count),
            }
        }
        Err(message) => ProbeOutcome {
            status: ConnectionStatus::Warning,
            message: format!("Server version {version}; node listing failed: {message}"),
            kubernetes_version: Some(version),
            node_count: None,
        },
    }
}

/// Run a kubectl command expected to print JSON.
async fn kubectl_json(rendered: &str, timeout: Duration) -> Result<serde_json::Value, String> {
    match run_command(rendered, false, timeout).await {
        CommandRun::Completed(output) if output.exit_code == 0 => {
            serde_json::from_str(output.stdout.trim())
                .map_err(|_| "kubectl output not in JSON format".to_string())
        }
        CommandRun::Completed(output) => {
            let stderr = output.stderr.trim();
            if stderr.is_empty() {
                Err(format!("kubectl exited {}", output.exit_code))
            } else {
                Err(stderr.to_string())
            }
        }
        CommandRun::TimedOut => Err("kubectl timed out".to_string()),
        CommandRun::SpawnFailed(e) => Err(format!("kubectl execution error: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_cluster_probes_as_failed() {
        // A kubeconfig pointing nowhere: kubectl (if present) fails fast,
        // and a missing kubectl binary is a failure too.
        let blob = b"apiVersion: v1\nkind: Config\nclusters: []\ncontexts: []\nusers: []\n";
        let outcome = probe_kubeconfig(blob, Duration::from_secs(5)).await;
        assert_eq!(outcome.status, ConnectionStatus::Failed);
        assert!(!outcome.message.is_empty());
    }
}
