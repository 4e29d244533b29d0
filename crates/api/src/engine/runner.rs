//! Server-executor run task.
//!
//! Each admitted server run is an independent Tokio task. Items are
//! evaluated sequentially in plan order, the cancellation flag is observed
//! at item boundaries, and every insertion advances the run's counters.
//! A panicking task is contained: the run is finalised `incomplete` with
//! failed rows carrying the panic summary, and the process keeps running.

use std::sync::atomic::Ordering;

use inspect_core::audit::{actions, entities};
use inspect_core::checks::{self, CheckContext};
use inspect_core::status::RunStatus;
use inspect_core::types::DbId;
use inspect_db::models::result::CreateResult;
use inspect_db::repositories::{ClusterRepo, RunRepo};

use crate::state::AppState;

use super::{
    audit_system, emit_report_best_effort, fail_remaining_items, finalize_run, CANCELLED_DETAIL,
};

/// Spawn the background task for an admitted server-executor run.
///
/// The inner task is wrapped so a panic is observed, audited, and turned
/// into an `incomplete` finalisation instead of killing the process.
pub fn spawn_run(state: AppState, run_id: DbId) {
    let flag = state.runs.register(run_id);

    tokio::spawn(async move {
        let inner_state = state.clone();
        let inner_flag = std::sync::Arc::clone(&flag);
        let handle = tokio::spawn(async move { execute_run(inner_state, run_id, inner_flag).await });

        match handle.await {
            Ok(()) => {}
            Err(join_err) if join_err.is_panic() => {
                let panic_summary = join_err
                    .try_into_panic()
                    .ok()
                    .and_then(|payload| {
                        payload
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| payload.downcast_ref::<String>().cloned())
                    })
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(run_id, panic = %panic_summary, "Run task panicked");
                contain_panic(&state, run_id, &panic_summary).await;
            }
            Err(join_err) => {
                tracing::error!(run_id, error = %join_err, "Run task aborted");
            }
        }

        state.runs.remove(run_id);
    });
}

/// Record a panic as failed rows plus an `incomplete` finalisation.
async fn contain_panic(state: &AppState, run_id: DbId, panic_summary: &str) {
    let pool = &state.pool;
    audit_system(
        pool,
        actions::RUN_FINALIZED,
        entities::INSPECTION_RUN,
        Some(run_id),
        format!("Run task panicked: {panic_summary}"),
    )
    .await;

    let Ok(Some(run)) = RunRepo::find_by_id(pool, run_id).await else {
        return;
    };
    let detail = format!("executor panicked: {panic_summary}");
    if let Err(e) = fail_remaining_items(pool, &run, &detail).await {
        tracing::error!(run_id, error = %e, "Cannot record panic results");
    }
    if let Err(e) = finalize_run(pool, run_id, Some(RunStatus::Incomplete), None).await {
        tracing::error!(run_id, error = %e, "Cannot finalize panicked run");
    }
}

/// The run loop proper: transition to running, evaluate items, finalise.
async fn execute_run(state: AppState, run_id: DbId, flag: std::sync::Arc<std::sync::atomic::AtomicBool>) {
    let pool = &state.pool;

    // A run cancelled before the task was scheduled is already terminal;
    // `mark_running` refuses and we simply bow out.
    let run = match RunRepo::mark_running(pool, run_id).await {
        Ok(Some(run)) => run,
        Ok(None) => {
            tracing::info!(run_id, "Run no longer queued, skipping execution");
            return;
        }
        Err(e) => {
            tracing::error!(run_id, error = %e, "Cannot transition run to running");
            return;
        }
    };

    let cluster = match ClusterRepo::find_by_id(pool, run.cluster_id).await {
        Ok(Some(cluster)) => cluster,
        Ok(None) => {
            tracing::error!(run_id, cluster_id = run.cluster_id, "Cluster vanished mid-run");
            let _ = fail_remaining_items(pool, &run, "cluster no longer exists").await;
            let _ = finalize_run(pool, run_id, Some(RunStatus::Incomplete), None).await;
            return;
        }
        Err(e) => {
            tracing::error!(run_id, error = %e, "Cannot load cluster");
            return;
        }
    };

    let kubeconfig = match tokio::fs::read(&cluster.kubeconfig_path).await {
        Ok(blob) => Some(blob),
        Err(e) => {
            tracing::warn!(run_id, error = %e, "Cluster kubeconfig unreadable");
            None
        }
    };
    let ctx = CheckContext {
        kubeconfig,
        prometheus_url: cluster
            .prometheus_url
            .clone()
            .or_else(|| state.config.prometheus_url.clone()),
        prom_timeout: None,
    };

    let mut cancelled = false;
    for snapshot in run.plan() {
        if flag.load(Ordering::SeqCst) {
            cancelled = true;
            break;
        }

        let outcome = checks::evaluate(&snapshot, &ctx).await;
        let result = CreateResult {
            run_id,
            item_id: Some(snapshot.item_id),
            item_name: snapshot.name.clone(),
            status: outcome.status.as_str().to_string(),
            detail: outcome.detail,
            suggestion: outcome.suggestion,
        };
        match RunRepo::insert_result(pool, &result).await {
            Ok((row, advanced)) => {
                if advanced {
                    audit_system(
                        pool,
                        actions::RESULT_RECORDED,
                        entities::INSPECTION_RESULT,
                        Some(row.id),
                        format!("Recorded result for item '{}' with status={}", row.item_name, row.status),
                    )
                    .await;
                }
            }
            Err(e) => {
                tracing::error!(run_id, item_id = snapshot.item_id, error = %e, "Cannot insert result");
                // The run may have been cancelled underneath us.
                if matches!(e, sqlx::Error::Protocol(_)) {
                    return;
                }
            }
        }
    }

    if cancelled {
        tracing::info!(run_id, "Cancellation observed at item boundary");
        if let Err(e) = fail_remaining_items(pool, &run, CANCELLED_DETAIL).await {
            tracing::error!(run_id, error = %e, "Cannot record cancellation results");
        }
        let _ = finalize_run(pool, run_id, Some(RunStatus::Cancelled), None).await;
        audit_system(
            pool,
            actions::RUN_CANCELLED,
            entities::INSPECTION_RUN,
            Some(run_id),
            "Run cancelled by operator request".to_string(),
        )
        .await;
        return;
    }

    match finalize_run(pool, run_id, None, None).await {
        Ok(Some(finalized)) => {
            emit_report_best_effort(
                pool,
                &state.config.reports_dir(),
                &finalized,
                &cluster.name,
            )
            .await;
        }
        Ok(None) => {
            tracing::info!(run_id, "Run already finalized elsewhere");
        }
        Err(e) => {
            tracing::error!(run_id, error = %e, "Finalization failed");
        }
    }
}
