//! Builtin check handlers.
//!
//! Each builtin kind is a fixed handler with hard-coded kubectl invocations
//! or PromQL expressions. Resource-usage kinds require Prometheus and
//! degrade to a warning when no endpoint is configured, matching the
//! behaviour of user-defined `promql` items.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use crate::item::CheckKind;
use crate::status::CheckStatus;

use super::command::{run_command, CommandRun};
use super::promql::{PromClient, PromSample};
use super::{CheckContext, CheckOutcome};

/// Budget for a single kubectl invocation.
const KUBECTL_TIMEOUT: Duration = Duration::from_secs(15);

/// How many hotspot readings are reported.
const TOP_READINGS: usize = 5;

/// How many problem pods are listed before the detail is cut off.
const MAX_LISTED_PODS: usize = 8;

/// Cluster CPU usage thresholds (percent).
const CLUSTER_CPU_WARN: f64 = 75.0;
const CLUSTER_CPU_FAIL: f64 = 90.0;

/// Cluster memory usage thresholds (percent).
const CLUSTER_MEM_WARN: f64 = 80.0;
const CLUSTER_MEM_FAIL: f64 = 90.0;

/// Per-node CPU hotspot thresholds (percent).
const NODE_CPU_WARN: f64 = 80.0;
const NODE_CPU_FAIL: f64 = 90.0;

/// Per-node memory pressure thresholds (percent).
const NODE_MEM_WARN: f64 = 85.0;
const NODE_MEM_FAIL: f64 = 95.0;

/// Disk IO time ratio thresholds (seconds of IO per second).
const DISK_IO_WARN: f64 = 0.4;
const DISK_IO_FAIL: f64 = 0.8;

/// Dispatch a builtin kind to its handler.
pub async fn evaluate_builtin(
    kind: CheckKind,
    ctx: &CheckContext,
    kubeconfig: Option<&Path>,
) -> CheckOutcome {
    match kind {
        CheckKind::ClusterVersion => check_cluster_version(kubeconfig).await,
        CheckKind::NodesStatus => check_nodes_status(kubeconfig).await,
        CheckKind::PodsStatus => check_pods_status(kubeconfig).await,
        CheckKind::EventsRecent => check_events_recent(kubeconfig).await,
        CheckKind::ClusterCpuUsage => check_cluster_cpu_usage(ctx).await,
        CheckKind::ClusterMemoryUsage => check_cluster_memory_usage(ctx).await,
        CheckKind::NodeCpuHotspots => check_node_cpu_hotspots(ctx).await,
        CheckKind::NodeMemoryPressure => check_node_memory_pressure(ctx).await,
        CheckKind::ClusterDiskIo => check_cluster_disk_io(ctx).await,
        CheckKind::Command | CheckKind::Promql => {
            // Routed elsewhere by the engine; reaching this is a config bug.
            CheckOutcome::failed("not a builtin check type")
        }
    }
}

/// Run `kubectl` with the given arguments, returning `(ok, output)`.
async fn run_kubectl(args: &[&str], kubeconfig: Option<&Path>) -> (bool, String) {
    let mut rendered = String::from("kubectl");
    if let Some(path) = kubeconfig {
        rendered.push_str(" --kubeconfig ");
        rendered.push_str(&path.to_string_lossy());
    }
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }

    match run_command(&rendered, false, KUBECTL_TIMEOUT).await {
        CommandRun::Completed(output) if output.exit_code == 0 => {
            (true, output.stdout.trim().to_string())
        }
        CommandRun::Completed(output) => {
            let stderr = output.stderr.trim();
            let message = if stderr.is_empty() {
                format!("kubectl exited {}", output.exit_code)
            } else {
                stderr.to_string()
            };
            (false, message)
        }
        CommandRun::TimedOut => (false, "kubectl timed out".to_string()),
        CommandRun::SpawnFailed(e) => (false, format!("kubectl execution error: {e}")),
    }
}

async fn check_cluster_version(kubeconfig: Option<&Path>) -> CheckOutcome {
    let (ok, payload) = run_kubectl(&["version"], kubeconfig).await;
    if !ok {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some(payload),
            Some("Verify kubectl connectivity to the cluster.".to_string()),
        );
    }
    let server_line = payload
        .lines()
        .find(|line| line.to_lowercase().starts_with("server version"));
    match server_line {
        Some(line) => CheckOutcome::new(CheckStatus::Passed, Some(line.trim().to_string()), None),
        None => CheckOutcome::new(
            CheckStatus::Warning,
            Some(payload),
            Some("Could not parse a Server Version line from the output.".to_string()),
        ),
    }
}

async fn check_nodes_status(kubeconfig: Option<&Path>) -> CheckOutcome {
    let (ok, payload) = run_kubectl(&["get", "nodes", "-o", "json"], kubeconfig).await;
    if !ok {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some(payload),
            Some("Ensure nodes are reachable and kubeconfig is configured.".to_string()),
        );
    }
    let Ok(parsed) = serde_json::from_str::<Value>(&payload) else {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some(payload),
            Some("kubectl output not in JSON format.".to_string()),
        );
    };

    let items = parsed.get("items").and_then(Value::as_array).cloned().unwrap_or_default();
    let mut not_ready = Vec::new();
    for item in &items {
        let conditions = item
            .pointer("/status/conditions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let ready = conditions
            .iter()
            .find(|cond| cond.get("type").and_then(Value::as_str) == Some("Ready"));
        if let Some(cond) = ready {
            if cond.get("status").and_then(Value::as_str) != Some("True") {
                let name = item
                    .pointer("/metadata/name")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                not_ready.push(name.to_string());
            }
        }
    }

    if not_ready.is_empty() {
        return CheckOutcome::new(
            CheckStatus::Passed,
            Some(format!("{} nodes ready.", items.len())),
            None,
        );
    }
    CheckOutcome::new(
        CheckStatus::Failed,
        Some(format!("Nodes not ready: {}", not_ready.join(", "))),
        Some("Investigate node conditions via 'kubectl describe node <name>'.".to_string()),
    )
}

async fn check_pods_status(kubeconfig: Option<&Path>) -> CheckOutcome {
    let (ok, payload) =
        run_kubectl(&["get", "pods", "--all-namespaces", "-o", "json"], kubeconfig).await;
    if !ok {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some(payload),
            Some("Verify cluster access or specify kubeconfig.".to_string()),
        );
    }
    let Ok(parsed) = serde_json::from_str::<Value>(&payload) else {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some(payload),
            Some("kubectl output not in JSON format.".to_string()),
        );
    };

    let mut failing = Vec::new();
    for item in parsed.get("items").and_then(Value::as_array).into_iter().flatten() {
        let phase = item.pointer("/status/phase").and_then(Value::as_str).unwrap_or("Unknown");
        if phase != "Running" && phase != "Succeeded" {
            let namespace = item
                .pointer("/metadata/namespace")
                .and_then(Value::as_str)
                .unwrap_or("default");
            let name = item
                .pointer("/metadata/name")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            failing.push(format!("{namespace}/{name} ({phase})"));
        }
    }

    if failing.is_empty() {
        return CheckOutcome::new(
            CheckStatus::Passed,
            Some("All pods running or completed.".to_string()),
            None,
        );
    }
    failing.truncate(MAX_LISTED_PODS);
    CheckOutcome::new(
        CheckStatus::Warning,
        Some(format!("Problem pods: {}", failing.join(", "))),
        Some("Check pod logs or describe pods for details.".to_string()),
    )
}

async fn check_events_recent(kubeconfig: Option<&Path>) -> CheckOutcome {
    let (ok, payload) = run_kubectl(
        &[
            "get",
            "events",
            "--all-namespaces",
            "--sort-by=.metadata.creationTimestamp",
            "-o",
            "wide",
        ],
        kubeconfig,
    )
    .await;
    if !ok {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some(payload),
            Some("Confirm cluster permissions for events.".to_string()),
        );
    }
    let truncated: String = payload.chars().take(2000).collect();
    CheckOutcome::new(
        CheckStatus::Passed,
        Some(truncated),
        Some("Use kubectl get events for full details.".to_string()),
    )
}

/// Shared prelude for the Prometheus-backed builtins: resolve the endpoint
/// (or degrade to a warning) and run the expression.
async fn prom_query(
    ctx: &CheckContext,
    expression: &str,
) -> Result<Vec<PromSample>, CheckOutcome> {
    let Some(base_url) = ctx.prometheus_url.as_deref().filter(|u| !u.is_empty()) else {
        return Err(CheckOutcome::new(
            CheckStatus::Warning,
            Some("Prometheus endpoint is not configured for this cluster.".to_string()),
            Some("Set the cluster's Prometheus URL to enable this check.".to_string()),
        ));
    };
    let client = PromClient::new(base_url, ctx.prom_timeout())
        .map_err(|e| CheckOutcome::failed(e.to_string()))?;
    client.query(expression).await.map_err(|e| {
        CheckOutcome::new(
            CheckStatus::Warning,
            Some(e.to_string()),
            Some("Confirm the Prometheus endpoint is reachable and scraping node metrics.".to_string()),
        )
    })
}

fn format_percentage(value: f64) -> String {
    format!("{value:.2}%")
}

async fn check_cluster_cpu_usage(ctx: &CheckContext) -> CheckOutcome {
    let expression = "sum(rate(node_cpu_seconds_total{mode!='idle'}[5m])) \
                      / sum(rate(node_cpu_seconds_total[5m])) * 100";
    let samples = match prom_query(ctx, expression).await {
        Ok(samples) => samples,
        Err(outcome) => return outcome,
    };
    let Some(sample) = samples.first() else {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some("Prometheus returned no CPU data.".to_string()),
            Some("Check that node CPU metrics are being scraped.".to_string()),
        );
    };
    let value = sample.value;
    if value.is_nan() {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some("Prometheus CPU data could not be parsed.".to_string()),
            Some("Check the metric format.".to_string()),
        );
    }

    let (status, suggestion) = if value >= CLUSTER_CPU_FAIL {
        (
            CheckStatus::Failed,
            Some("CPU is close to saturation; review cluster load and consider scaling out.".to_string()),
        )
    } else if value >= CLUSTER_CPU_WARN {
        (
            CheckStatus::Warning,
            Some("CPU usage is elevated; watch key workloads or scale out.".to_string()),
        )
    } else {
        (CheckStatus::Passed, None)
    };
    CheckOutcome::new(
        status,
        Some(format!("Cluster CPU usage ~ {}.", format_percentage(value))),
        suggestion,
    )
}

async fn check_cluster_memory_usage(ctx: &CheckContext) -> CheckOutcome {
    let expression = "(sum(node_memory_MemTotal_bytes - node_memory_MemAvailable_bytes) \
                      / sum(node_memory_MemTotal_bytes)) * 100";
    let samples = match prom_query(ctx, expression).await {
        Ok(samples) => samples,
        Err(outcome) => return outcome,
    };
    let Some(sample) = samples.first() else {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some("Prometheus returned no memory data.".to_string()),
            Some("Check that node_memory_* metrics exist.".to_string()),
        );
    };
    let value = sample.value;
    if value.is_nan() {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some("Prometheus memory data could not be parsed.".to_string()),
            Some("Check the metric format.".to_string()),
        );
    }

    let (status, suggestion) = if value >= CLUSTER_MEM_FAIL {
        (
            CheckStatus::Failed,
            Some("Memory usage is very high; scale out or investigate leaks.".to_string()),
        )
    } else if value >= CLUSTER_MEM_WARN {
        (
            CheckStatus::Warning,
            Some("Memory usage is elevated; watch key nodes and workloads.".to_string()),
        )
    } else {
        (CheckStatus::Passed, None)
    };
    CheckOutcome::new(
        status,
        Some(format!("Cluster memory usage ~ {}.", format_percentage(value))),
        suggestion,
    )
}

/// Collect `(instance, value)` readings, highest first.
fn top_readings(samples: &[PromSample]) -> Vec<(String, f64)> {
    let mut readings: Vec<(String, f64)> = samples
        .iter()
        .filter(|s| !s.value.is_nan())
        .map(|s| (s.instance().to_string(), s.value))
        .collect();
    readings.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    readings.truncate(TOP_READINGS);
    readings
}

async fn check_node_cpu_hotspots(ctx: &CheckContext) -> CheckOutcome {
    let expression =
        "topk(5, (1 - avg by (instance)(rate(node_cpu_seconds_total{mode='idle'}[5m]))) * 100)";
    let samples = match prom_query(ctx, expression).await {
        Ok(samples) => samples,
        Err(outcome) => return outcome,
    };
    if samples.is_empty() {
        return CheckOutcome::new(
            CheckStatus::Passed,
            Some("All node CPU usage is low.".to_string()),
            None,
        );
    }

    let readings = top_readings(&samples);
    if readings.is_empty() {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some("Node CPU metrics could not be parsed.".to_string()),
            Some("Confirm node labels (instance/node) are present.".to_string()),
        );
    }

    let summary = readings
        .iter()
        .map(|(name, value)| format!("{name}: {}", format_percentage(*value)))
        .collect::<Vec<_>>()
        .join(", ");
    let worst = readings[0].1;
    let (status, suggestion) = if worst >= NODE_CPU_FAIL {
        (
            CheckStatus::Failed,
            Some("Some nodes are near CPU saturation; investigate hot workloads or rebalance.".to_string()),
        )
    } else if worst >= NODE_CPU_WARN {
        (
            CheckStatus::Warning,
            Some("Some nodes show elevated CPU; consider scheduling changes or scaling.".to_string()),
        )
    } else {
        (CheckStatus::Passed, None)
    };
    CheckOutcome::new(status, Some(format!("Top node CPU usage: {summary}")), suggestion)
}

async fn check_node_memory_pressure(ctx: &CheckContext) -> CheckOutcome {
    let expression = "topk(5, ((node_memory_MemTotal_bytes - node_memory_MemAvailable_bytes) \
                      / node_memory_MemTotal_bytes) * 100)";
    let samples = match prom_query(ctx, expression).await {
        Ok(samples) => samples,
        Err(outcome) => return outcome,
    };
    if samples.is_empty() {
        return CheckOutcome::new(
            CheckStatus::Passed,
            Some("All node memory usage is normal.".to_string()),
            None,
        );
    }

    let readings = top_readings(&samples);
    if readings.is_empty() {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some("Node memory data could not be parsed.".to_string()),
            Some("Check the metric labels.".to_string()),
        );
    }

    let summary = readings
        .iter()
        .map(|(name, value)| format!("{name}: {}", format_percentage(*value)))
        .collect::<Vec<_>>()
        .join(", ");
    let worst = readings[0].1;
    let (status, suggestion) = if worst >= NODE_MEM_FAIL {
        (
            CheckStatus::Failed,
            Some("Node memory is nearly exhausted; investigate leaks or scale out.".to_string()),
        )
    } else if worst >= NODE_MEM_WARN {
        (
            CheckStatus::Warning,
            Some("Some nodes are under memory pressure; watch key workloads.".to_string()),
        )
    } else {
        (CheckStatus::Passed, None)
    };
    CheckOutcome::new(status, Some(format!("Top node memory usage: {summary}")), suggestion)
}

async fn check_cluster_disk_io(ctx: &CheckContext) -> CheckOutcome {
    let expression = "topk(5, sum by (instance)(rate(node_disk_io_time_seconds_total[5m])))";
    let samples = match prom_query(ctx, expression).await {
        Ok(samples) => samples,
        Err(outcome) => return outcome,
    };
    if samples.is_empty() {
        return CheckOutcome::new(
            CheckStatus::Passed,
            Some("Prometheus detected no significant disk IO.".to_string()),
            None,
        );
    }

    let readings = top_readings(&samples);
    if readings.is_empty() {
        return CheckOutcome::new(
            CheckStatus::Warning,
            Some("Disk IO metrics could not be parsed.".to_string()),
            Some("Confirm the node exporter exposes disk IO metrics.".to_string()),
        );
    }

    let summary = readings
        .iter()
        .map(|(name, value)| format!("{name}: {value:.4}s/s"))
        .collect::<Vec<_>>()
        .join(", ");
    let worst = readings[0].1;
    let (status, suggestion) = if worst >= DISK_IO_FAIL {
        (
            CheckStatus::Failed,
            Some("Disk IO time ratio is very high; a storage bottleneck is likely.".to_string()),
        )
    } else if worst >= DISK_IO_WARN {
        (
            CheckStatus::Warning,
            Some("Disk IO ratio is elevated; watch hot nodes and disk health.".to_string()),
        )
    } else {
        (CheckStatus::Passed, None)
    };
    CheckOutcome::new(status, Some(format!("Top node disk IO (s/s): {summary}")), suggestion)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(instance: &str, value: f64) -> PromSample {
        let mut labels = serde_json::Map::new();
        labels.insert("instance".into(), serde_json::Value::String(instance.into()));
        PromSample { labels, value }
    }

    #[test]
    fn top_readings_sorts_descending_and_truncates() {
        let samples: Vec<PromSample> = (0..8).map(|i| sample(&format!("n{i}"), i as f64)).collect();
        let readings = top_readings(&samples);
        assert_eq!(readings.len(), TOP_READINGS);
        assert_eq!(readings[0].0, "n7");
        assert!(readings.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn top_readings_drops_unparseable_samples() {
        let samples = vec![sample("a", f64::NAN), sample("b", 1.0)];
        let readings = top_readings(&samples);
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].0, "b");
    }

    #[tokio::test]
    async fn prom_builtins_warn_without_endpoint() {
        let ctx = CheckContext::default();
        for kind in [
            CheckKind::ClusterCpuUsage,
            CheckKind::ClusterMemoryUsage,
            CheckKind::NodeCpuHotspots,
            CheckKind::NodeMemoryPressure,
            CheckKind::ClusterDiskIo,
        ] {
            let outcome = evaluate_builtin(kind, &ctx, None).await;
            assert_eq!(outcome.status, CheckStatus::Warning, "kind {kind:?}");
        }
    }
}
