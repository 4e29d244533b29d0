//! Check engine: evaluates one inspection item against one cluster.
//!
//! The engine never raises across its boundary. Every failure mode --
//! misconfiguration, subprocess error, Prometheus transport error, unknown
//! check type -- becomes a result with `status = failed` (or `warning`
//! for missing optional dependencies like an unset Prometheus endpoint).

pub mod builtin;
pub mod command;
pub mod kubeconfig;
pub mod promql;

use std::time::Duration;

use crate::item::{CheckKind, ItemConfig, ItemSnapshot};
use crate::status::CheckStatus;

use kubeconfig::TransientKubeconfig;

/// Default budget for a single Prometheus instant query.
pub const DEFAULT_PROM_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum stored length of a result detail, in characters.
const MAX_DETAIL_CHARS: usize = 2000;

/// Maximum stored length of a result suggestion, in characters.
const MAX_SUGGESTION_CHARS: usize = 500;

/// Everything the engine needs to evaluate items against one cluster.
#[derive(Debug, Clone, Default)]
pub struct CheckContext {
    /// Raw kubeconfig blob; materialised to a transient 0600 file only for
    /// the duration of a single evaluation.
    pub kubeconfig: Option<Vec<u8>>,
    pub prometheus_url: Option<String>,
    pub prom_timeout: Option<Duration>,
}

impl CheckContext {
    fn prom_timeout(&self) -> Duration {
        self.prom_timeout.unwrap_or(DEFAULT_PROM_TIMEOUT)
    }
}

/// Outcome of evaluating one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub status: CheckStatus,
    pub detail: Option<String>,
    pub suggestion: Option<String>,
}

impl CheckOutcome {
    pub fn new(
        status: CheckStatus,
        detail: impl Into<Option<String>>,
        suggestion: impl Into<Option<String>>,
    ) -> Self {
        CheckOutcome {
            status,
            detail: detail.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        CheckOutcome {
            status: CheckStatus::Failed,
            detail: Some(detail.into()),
            suggestion: None,
        }
    }
}

/// Evaluate one item snapshot against a cluster context.
///
/// This is the single entry point used by both the server executor and the
/// agent binary.
pub async fn evaluate(snapshot: &ItemSnapshot, ctx: &CheckContext) -> CheckOutcome {
    let config = match ItemConfig::from_parts(&snapshot.check_type, &snapshot.config) {
        Ok(config) => config,
        Err(misconfigured) => return sanitize_outcome(CheckOutcome::failed(misconfigured.to_string())),
    };

    let outcome = match config {
        ItemConfig::Unknown { check_type } => {
            CheckOutcome::failed(format!("unknown check type '{check_type}'"))
        }
        ItemConfig::Command(cfg) => {
            let transient = match materialize_if_needed(ctx, cfg.command.contains(command::KUBECONFIG_PLACEHOLDER)) {
                Ok(transient) => transient,
                Err(outcome) => return sanitize_outcome(outcome),
            };
            command::evaluate_command(&cfg, transient.as_ref().map(|t| t.path())).await
        }
        ItemConfig::Promql(cfg) => promql::evaluate_promql(&cfg, ctx).await,
        ItemConfig::Builtin(kind) => {
            let needs_kubectl = matches!(
                kind,
                CheckKind::ClusterVersion
                    | CheckKind::NodesStatus
                    | CheckKind::PodsStatus
                    | CheckKind::EventsRecent
            );
            let transient = match materialize_if_needed(ctx, needs_kubectl) {
                Ok(transient) => transient,
                Err(outcome) => return sanitize_outcome(outcome),
            };
            builtin::evaluate_builtin(kind, ctx, transient.as_ref().map(|t| t.path())).await
        }
    };

    sanitize_outcome(outcome)
}

/// Materialise the cluster kubeconfig to a transient file when the check
/// needs one. Returns an engine-style failure outcome instead of an error.
fn materialize_if_needed(
    ctx: &CheckContext,
    needed: bool,
) -> Result<Option<TransientKubeconfig>, CheckOutcome> {
    if !needed {
        return Ok(None);
    }
    match &ctx.kubeconfig {
        Some(blob) => TransientKubeconfig::materialize(blob)
            .map(Some)
            .map_err(|e| CheckOutcome::failed(format!("cannot materialise kubeconfig: {e}"))),
        None => Ok(None),
    }
}

fn sanitize_outcome(outcome: CheckOutcome) -> CheckOutcome {
    CheckOutcome {
        status: outcome.status,
        detail: outcome.detail.as_deref().and_then(|d| sanitize(d, MAX_DETAIL_CHARS)),
        suggestion: outcome
            .suggestion
            .as_deref()
            .and_then(|s| sanitize(s, MAX_SUGGESTION_CHARS)),
    }
}

/// Collapse whitespace runs and clamp to `max` characters.
pub fn sanitize(text: &str, max: usize) -> Option<String> {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed.chars().take(max).collect())
}
