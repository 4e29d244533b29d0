//! Inspection item model: check kinds, per-kind configuration, and the
//! snapshot shape embedded into run plans and agent tasks.
//!
//! `InspectionItem.config` is free-form JSON in the store; [`ItemConfig`]
//! is the validated, tagged view of it. Rows whose `check_type` is no
//! longer recognised parse to [`ItemConfig::Unknown`] and evaluate to a
//! failed result instead of an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::DbId;

/// Default wall-clock budget for command items, in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Kinds of inspection items the engine knows how to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Command,
    Promql,
    ClusterVersion,
    NodesStatus,
    PodsStatus,
    EventsRecent,
    ClusterCpuUsage,
    ClusterMemoryUsage,
    NodeCpuHotspots,
    NodeMemoryPressure,
    ClusterDiskIo,
}

impl CheckKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::Command => "command",
            CheckKind::Promql => "promql",
            CheckKind::ClusterVersion => "cluster_version",
            CheckKind::NodesStatus => "nodes_status",
            CheckKind::PodsStatus => "pods_status",
            CheckKind::EventsRecent => "events_recent",
            CheckKind::ClusterCpuUsage => "cluster_cpu_usage",
            CheckKind::ClusterMemoryUsage => "cluster_memory_usage",
            CheckKind::NodeCpuHotspots => "node_cpu_hotspots",
            CheckKind::NodeMemoryPressure => "node_memory_pressure",
            CheckKind::ClusterDiskIo => "cluster_disk_io",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "command" => Some(CheckKind::Command),
            "promql" => Some(CheckKind::Promql),
            "cluster_version" => Some(CheckKind::ClusterVersion),
            "nodes_status" => Some(CheckKind::NodesStatus),
            "pods_status" => Some(CheckKind::PodsStatus),
            "events_recent" => Some(CheckKind::EventsRecent),
            "cluster_cpu_usage" => Some(CheckKind::ClusterCpuUsage),
            "cluster_memory_usage" => Some(CheckKind::ClusterMemoryUsage),
            "node_cpu_hotspots" => Some(CheckKind::NodeCpuHotspots),
            "node_memory_pressure" => Some(CheckKind::NodeMemoryPressure),
            "cluster_disk_io" => Some(CheckKind::ClusterDiskIo),
            _ => None,
        }
    }

    /// Builtin kinds carry no user configuration.
    pub fn is_builtin(self) -> bool {
        !matches!(self, CheckKind::Command | CheckKind::Promql)
    }
}

/// Comparison operator for PromQL threshold checks.
///
/// The operator names the **failure** condition: a sample value satisfying
/// `value cmp threshold` makes the check fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Lt,
    Eq,
    Ge,
    Le,
    Ne,
}

impl Comparison {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Lt => "<",
            Comparison::Eq => "==",
            Comparison::Ge => ">=",
            Comparison::Le => "<=",
            Comparison::Ne => "!=",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            ">" => Some(Comparison::Gt),
            "<" => Some(Comparison::Lt),
            "==" => Some(Comparison::Eq),
            ">=" => Some(Comparison::Ge),
            "<=" => Some(Comparison::Le),
            "!=" => Some(Comparison::Ne),
            _ => None,
        }
    }

    /// Whether the failure predicate holds for a sample value.
    ///
    /// Non-finite values never satisfy an ordered comparison. A NaN sample
    /// under `==`/`!=` fails the check outright: equality cannot be
    /// established, so the conservative outcome is a failure.
    pub fn failure_satisfied(self, value: f64, threshold: f64) -> bool {
        if !value.is_finite() {
            return value.is_nan() && matches!(self, Comparison::Eq | Comparison::Ne);
        }
        match self {
            Comparison::Gt => value > threshold,
            Comparison::Lt => value < threshold,
            Comparison::Eq => value == threshold,
            Comparison::Ge => value >= threshold,
            Comparison::Le => value <= threshold,
            Comparison::Ne => value != threshold,
        }
    }
}

/// Configuration for a `command` item.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandConfig {
    /// Command template; `{{kubeconfig}}` is substituted with a transient
    /// kubeconfig path at execution time.
    pub command: String,
    /// Run through `sh -c` when true; otherwise split on whitespace.
    pub shell: bool,
    pub timeout_secs: u64,
    pub success_message: Option<String>,
    pub failure_message: Option<String>,
    pub suggestion_on_fail: Option<String>,
    pub suggestion_on_success: Option<String>,
}

/// Configuration for a `promql` item.
#[derive(Debug, Clone, PartialEq)]
pub struct PromqlConfig {
    pub expression: String,
    pub comparison: Comparison,
    pub fail_threshold: f64,
    /// May reference `{expression}` and `{value}`.
    pub detail_template: Option<String>,
    pub suggestion_on_fail: Option<String>,
    pub empty_message: Option<String>,
    pub suggestion_if_empty: Option<String>,
}

/// Validated view of an item's `(check_type, config)` pair.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemConfig {
    Command(CommandConfig),
    Promql(PromqlConfig),
    /// A builtin handler; no user configuration.
    Builtin(CheckKind),
    /// Historical row whose check type is no longer recognised.
    Unknown { check_type: String },
}

/// A required configuration key was missing or had the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("inspection item misconfigured: {key}")]
pub struct Misconfigured {
    pub key: &'static str,
}

fn required_str(config: &Value, key: &'static str) -> Result<String, Misconfigured> {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(Misconfigured { key })
}

fn optional_str(config: &Value, key: &str) -> Option<String> {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl ItemConfig {
    /// Parse the stored `(check_type, config)` pair into a validated config.
    ///
    /// Unrecognised check types yield [`ItemConfig::Unknown`], not an error;
    /// only recognised kinds with missing required keys fail.
    pub fn from_parts(check_type: &str, config: &Value) -> Result<Self, Misconfigured> {
        let Some(kind) = CheckKind::parse(check_type) else {
            return Ok(ItemConfig::Unknown {
                check_type: check_type.to_string(),
            });
        };

        match kind {
            CheckKind::Command => {
                let command = required_str(config, "command")?;
                let shell = config.get("shell").and_then(Value::as_bool).unwrap_or(true);
                let timeout_secs = config
                    .get("timeout")
                    .or_else(|| config.get("timeout_s"))
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);
                Ok(ItemConfig::Command(CommandConfig {
                    command,
                    shell,
                    timeout_secs,
                    success_message: optional_str(config, "success_message"),
                    failure_message: optional_str(config, "failure_message"),
                    suggestion_on_fail: optional_str(config, "suggestion_on_fail"),
                    suggestion_on_success: optional_str(config, "suggestion_on_success"),
                }))
            }
            CheckKind::Promql => {
                let expression = required_str(config, "expression")?;
                let comparison_raw = required_str(config, "comparison")?;
                let comparison = Comparison::parse(&comparison_raw)
                    .ok_or(Misconfigured { key: "comparison" })?;
                let fail_threshold = config
                    .get("fail_threshold")
                    .and_then(Value::as_f64)
                    .ok_or(Misconfigured {
                        key: "fail_threshold",
                    })?;
                Ok(ItemConfig::Promql(PromqlConfig {
                    expression,
                    comparison,
                    fail_threshold,
                    detail_template: optional_str(config, "detail_template"),
                    suggestion_on_fail: optional_str(config, "suggestion_on_fail"),
                    empty_message: optional_str(config, "empty_message"),
                    suggestion_if_empty: optional_str(config, "suggestion_if_empty"),
                }))
            }
            builtin => Ok(ItemConfig::Builtin(builtin)),
        }
    }
}

/// Frozen view of one item as selected into a run.
///
/// Stored in the run's `plan_json` at admission so later item edits or
/// deletions cannot retro-alter history, and shipped verbatim to agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub item_id: DbId,
    pub name: String,
    pub check_type: String,
    #[serde(default)]
    pub config: Value,
}
