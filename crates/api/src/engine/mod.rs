//! Run orchestration: state machine helpers, the server-executor runner,
//! the per-run cancellation registry, and the stale-lease sweeper.

pub mod registry;
pub mod runner;
pub mod sweeper;

use inspect_core::audit::{actions, entities, ACTOR_SYSTEM};
use inspect_core::status::{AgentPhase, CheckStatus, RunStatus};
use inspect_core::types::DbId;
use inspect_db::models::audit::CreateAuditLog;
use inspect_db::models::result::CreateResult;
use inspect_db::models::run::InspectionRun;
use inspect_db::repositories::{AuditRepo, RunRepo};
use inspect_db::DbPool;

use crate::report;

/// Detail recorded on result rows for items skipped by cancellation.
pub const CANCELLED_DETAIL: &str = "cancelled before execution";

/// Localised summary sentence for a finalised run.
pub fn summary_for_counts(passed: i64, warnings: i64, failed: i64) -> String {
    format!("{passed} item(s) passed, {warnings} warning(s), {failed} failed")
}

/// Derive the terminal status from result counts: `completed` iff every
/// result passed.
pub fn terminal_status(passed: i64, warnings: i64, failed: i64, total: i64) -> RunStatus {
    if passed == total && warnings == 0 && failed == 0 {
        RunStatus::Completed
    } else {
        RunStatus::Incomplete
    }
}

/// Write `failed` skip rows for every plan item of `run` that has no
/// result yet. Already-recorded results are never rewritten.
pub async fn fail_remaining_items(
    pool: &DbPool,
    run: &InspectionRun,
    detail: &str,
) -> Result<(), sqlx::Error> {
    let existing = RunRepo::results_for_run(pool, run.id).await?;
    for snapshot in run.plan() {
        if existing.iter().any(|r| r.item_id == Some(snapshot.item_id)) {
            continue;
        }
        let result = CreateResult {
            run_id: run.id,
            item_id: Some(snapshot.item_id),
            item_name: snapshot.name.clone(),
            status: CheckStatus::Failed.as_str().to_string(),
            detail: Some(detail.to_string()),
            suggestion: None,
        };
        RunRepo::insert_result(pool, &result).await?;
    }
    Ok(())
}

/// Finalise a run from its recorded results.
///
/// `status_override` forces the terminal status (cancellation); otherwise
/// it is derived from the counts. Idempotent: an already-terminal run is
/// returned unchanged.
pub async fn finalize_run(
    pool: &DbPool,
    run_id: DbId,
    status_override: Option<RunStatus>,
    agent_status: Option<AgentPhase>,
) -> Result<Option<InspectionRun>, sqlx::Error> {
    let Some(run) = RunRepo::find_by_id(pool, run_id).await? else {
        return Ok(None);
    };
    if run.is_terminal() {
        return Ok(Some(run));
    }

    let (passed, warnings, failed) = RunRepo::result_counts(pool, run_id).await?;
    let status =
        status_override.unwrap_or_else(|| terminal_status(passed, warnings, failed, run.total_items));
    let summary = summary_for_counts(passed, warnings, failed);

    let finalized =
        RunRepo::finalize(pool, run_id, status, Some(&summary), agent_status).await?;

    if finalized.is_some() {
        audit_system(
            pool,
            actions::RUN_FINALIZED,
            entities::INSPECTION_RUN,
            Some(run_id),
            format!("Run finalized with status={}", status.as_str()),
        )
        .await;
    }
    Ok(finalized)
}

/// Emit the report artefacts for a finalised run, best-effort.
///
/// A failure never flips the run status; it is logged and recorded in the
/// audit trail, and `report_path` stays null.
pub async fn emit_report_best_effort(
    pool: &DbPool,
    reports_dir: &std::path::Path,
    run: &InspectionRun,
    cluster_name: &str,
) {
    let results = match RunRepo::results_for_run(pool, run.id).await {
        Ok(results) => report::sort_by_plan(run, results),
        Err(e) => {
            tracing::warn!(run_id = run.id, error = %e, "Cannot load results for report");
            return;
        }
    };

    match report::emit(reports_dir, run, cluster_name, &results) {
        Ok(artefacts) => {
            if let Err(e) =
                RunRepo::set_report_path(pool, run.id, &artefacts.pdf.to_string_lossy()).await
            {
                tracing::warn!(run_id = run.id, error = %e, "Cannot record report path");
            }
        }
        Err(e) => {
            tracing::warn!(run_id = run.id, error = %e, "Report emission failed");
            audit_system(
                pool,
                actions::REPORT_EMIT_FAILED,
                entities::INSPECTION_RUN,
                Some(run.id),
                format!("Report emission failed: {e}"),
            )
            .await;
        }
    }
}

/// Append a system-actor audit entry, swallowing (but logging) failures.
pub async fn audit_system(
    pool: &DbPool,
    action: &str,
    entity_type: &str,
    entity_id: Option<DbId>,
    detail: String,
) {
    let entry = CreateAuditLog {
        actor: ACTOR_SYSTEM.to_string(),
        action: action.to_string(),
        entity_type: entity_type.to_string(),
        entity_id,
        detail: Some(detail),
    };
    if let Err(e) = AuditRepo::append(pool, &entry).await {
        tracing::warn!(error = %e, action, "Audit append failed");
    }
}
