//! Repository for the `inspection_runs` and `inspection_results` tables.
//!
//! Result insertion is the atomic unit of progress: a row is inserted and
//! the run's counters advance in one transaction, and a duplicate
//! `(run_id, item_id)` submission returns the existing row unchanged.
//! Status transitions are guarded in their WHERE clauses so terminal runs
//! never change again.

use chrono::Utc;
use inspect_core::status::{AgentPhase, CheckStatus, Executor, RunStatus};
use inspect_core::types::{DbId, Timestamp};

use crate::models::result::{CreateResult, InspectionResult};
use crate::models::run::{CreateRun, InspectionRun, RunListRow};
use crate::DbPool;

/// Column list for `inspection_runs` queries.
const RUN_COLUMNS: &str = "\
    id, cluster_id, operator, status, executor, agent_id, agent_status, \
    total_items, processed_items, progress, summary, report_path, plan_json, \
    created_at, started_at, completed_at, lease_expires_at";

/// Column list for `inspection_results` queries.
const RESULT_COLUMNS: &str =
    "id, run_id, item_id, item_name, status, detail, suggestion, created_at";

/// Default page size for run listings.
const DEFAULT_LIST_LIMIT: i64 = 100;

/// Provides operations for inspection runs and their result rows.
pub struct RunRepo;

impl RunRepo {
    /// Insert a new run in `queued` state with its frozen item plan.
    pub async fn create(pool: &DbPool, input: &CreateRun) -> Result<InspectionRun, sqlx::Error> {
        let query = format!(
            "INSERT INTO inspection_runs \
                 (cluster_id, operator, status, executor, agent_id, agent_status, \
                  total_items, plan_json, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {RUN_COLUMNS}"
        );
        sqlx::query_as::<_, InspectionRun>(&query)
            .bind(input.cluster_id)
            .bind(&input.operator)
            .bind(RunStatus::Queued.as_str())
            .bind(&input.executor)
            .bind(input.agent_id)
            .bind(&input.agent_status)
            .bind(input.total_items)
            .bind(&input.plan_json)
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<InspectionRun>, sqlx::Error> {
        let query = format!("SELECT {RUN_COLUMNS} FROM inspection_runs WHERE id = ?");
        sqlx::query_as::<_, InspectionRun>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Runs newest-first with the cluster name joined in.
    pub async fn list(pool: &DbPool, limit: Option<i64>) -> Result<Vec<RunListRow>, sqlx::Error> {
        let query = "\
            SELECT r.id, r.cluster_id, c.name AS cluster_name, r.operator, \
                   r.status, r.executor, r.agent_id, r.agent_status, \
                   r.total_items, r.processed_items, r.progress, r.summary, \
                   r.report_path, r.created_at, r.started_at, r.completed_at \
            FROM inspection_runs r \
            JOIN clusters c ON c.id = r.cluster_id \
            ORDER BY r.created_at DESC, r.id DESC \
            LIMIT ?";
        sqlx::query_as::<_, RunListRow>(query)
            .bind(limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .fetch_all(pool)
            .await
    }

    /// Transition a queued run to `running` (server executor admission).
    ///
    /// Returns `None` when the run was already past `queued` -- e.g.
    /// cancelled before the background task got scheduled.
    pub async fn mark_running(
        pool: &DbPool,
        id: DbId,
    ) -> Result<Option<InspectionRun>, sqlx::Error> {
        let query = format!(
            "UPDATE inspection_runs \
             SET status = ?, started_at = COALESCE(started_at, ?) \
             WHERE id = ? AND status = ? \
             RETURNING {RUN_COLUMNS}"
        );
        sqlx::query_as::<_, InspectionRun>(&query)
            .bind(RunStatus::Running.as_str())
            .bind(Utc::now())
            .bind(id)
            .bind(RunStatus::Queued.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Insert one result row and advance the run's counters atomically.
    ///
    /// Idempotent on `(run_id, item_id)`: if a row already exists it is
    /// returned unchanged and the counters do not move. Returns the row
    /// plus whether this call advanced the run.
    pub async fn insert_result(
        pool: &DbPool,
        input: &CreateResult,
    ) -> Result<(InspectionResult, bool), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let existing_query = format!(
            "SELECT {RESULT_COLUMNS} FROM inspection_results \
             WHERE run_id = ? AND item_id IS ?"
        );
        let existing = sqlx::query_as::<_, InspectionResult>(&existing_query)
            .bind(input.run_id)
            .bind(input.item_id)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(row) = existing {
            tx.commit().await?;
            return Ok((row, false));
        }

        // Terminal runs are frozen; late submissions for an item that was
        // never recorded are a protocol violation, not an insert.
        let status: String =
            sqlx::query_scalar("SELECT status FROM inspection_runs WHERE id = ?")
                .bind(input.run_id)
                .fetch_one(&mut *tx)
                .await?;
        if RunStatus::parse(&status).map(RunStatus::is_terminal).unwrap_or(false) {
            return Err(sqlx::Error::Protocol(format!(
                "run {} is already {status}",
                input.run_id
            )));
        }

        let insert_query = format!(
            "INSERT INTO inspection_results \
                 (run_id, item_id, item_name, status, detail, suggestion, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING {RESULT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, InspectionResult>(&insert_query)
            .bind(input.run_id)
            .bind(input.item_id)
            .bind(&input.item_name)
            .bind(&input.status)
            .bind(&input.detail)
            .bind(&input.suggestion)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE inspection_runs \
             SET processed_items = processed_items + 1, \
                 progress = CAST(ROUND(100.0 * (processed_items + 1) \
                     / MAX(total_items, 1)) AS INTEGER) \
             WHERE id = ?",
        )
        .bind(input.run_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((row, true))
    }

    /// Result rows for a run in insertion order; callers re-sort by plan
    /// order for display.
    pub async fn results_for_run(
        pool: &DbPool,
        run_id: DbId,
    ) -> Result<Vec<InspectionResult>, sqlx::Error> {
        let query = format!(
            "SELECT {RESULT_COLUMNS} FROM inspection_results \
             WHERE run_id = ? ORDER BY id ASC"
        );
        sqlx::query_as::<_, InspectionResult>(&query)
            .bind(run_id)
            .fetch_all(pool)
            .await
    }

    /// Count of results per status for a run: `(passed, warning, failed)`.
    pub async fn result_counts(
        pool: &DbPool,
        run_id: DbId,
    ) -> Result<(i64, i64, i64), sqlx::Error> {
        let row: (i64, i64, i64) = sqlx::query_as(
            "SELECT \
                 COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) \
             FROM inspection_results WHERE run_id = ?",
        )
        .bind(CheckStatus::Passed.as_str())
        .bind(CheckStatus::Warning.as_str())
        .bind(CheckStatus::Failed.as_str())
        .bind(run_id)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    /// Move a non-terminal run to a terminal status, setting `completed_at`
    /// and clearing any lease. Returns `None` when the run was already
    /// terminal (idempotent finalisation).
    pub async fn finalize(
        pool: &DbPool,
        id: DbId,
        status: RunStatus,
        summary: Option<&str>,
        agent_status: Option<AgentPhase>,
    ) -> Result<Option<InspectionRun>, sqlx::Error> {
        let query = format!(
            "UPDATE inspection_runs \
             SET status = ?, summary = COALESCE(?, summary), completed_at = ?, \
                 agent_status = COALESCE(?, agent_status), lease_expires_at = NULL \
             WHERE id = ? AND status NOT IN (?, ?, ?) \
             RETURNING {RUN_COLUMNS}"
        );
        sqlx::query_as::<_, InspectionRun>(&query)
            .bind(status.as_str())
            .bind(summary)
            .bind(Utc::now())
            .bind(agent_status.map(AgentPhase::as_str))
            .bind(id)
            .bind(RunStatus::Completed.as_str())
            .bind(RunStatus::Incomplete.as_str())
            .bind(RunStatus::Cancelled.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Attach the emitted report artefact path.
    pub async fn set_report_path(
        pool: &DbPool,
        id: DbId,
        report_path: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE inspection_runs SET report_path = ? WHERE id = ?")
            .bind(report_path)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Claim up to `max` queued agent runs for one agent, stamping a fresh
    /// lease on each.
    ///
    /// Claims are per-run conditional updates, so concurrent pullers
    /// observe first-writer-wins: a run claimed by one puller is gone from
    /// the other's view.
    pub async fn claim_queued_for_agent(
        pool: &DbPool,
        agent_id: DbId,
        max: i64,
        lease_expires_at: Timestamp,
    ) -> Result<Vec<InspectionRun>, sqlx::Error> {
        let candidate_ids: Vec<DbId> = sqlx::query_scalar(
            "SELECT id FROM inspection_runs \
             WHERE executor = ? AND agent_id = ? AND agent_status = ? \
               AND status IN (?, ?) \
             ORDER BY created_at ASC, id ASC \
             LIMIT ?",
        )
        .bind(Executor::Agent.as_str())
        .bind(agent_id)
        .bind(AgentPhase::Queued.as_str())
        .bind(RunStatus::Queued.as_str())
        .bind(RunStatus::Running.as_str())
        .bind(max)
        .fetch_all(pool)
        .await?;

        let claim_query = format!(
            "UPDATE inspection_runs \
             SET agent_status = ?, status = ?, \
                 started_at = COALESCE(started_at, ?), lease_expires_at = ? \
             WHERE id = ? AND agent_status = ? \
             RETURNING {RUN_COLUMNS}"
        );

        let mut claimed = Vec::with_capacity(candidate_ids.len());
        for id in candidate_ids {
            let run = sqlx::query_as::<_, InspectionRun>(&claim_query)
                .bind(AgentPhase::Running.as_str())
                .bind(RunStatus::Running.as_str())
                .bind(Utc::now())
                .bind(lease_expires_at)
                .bind(id)
                .bind(AgentPhase::Queued.as_str())
                .fetch_optional(pool)
                .await?;
            if let Some(run) = run {
                claimed.push(run);
            }
        }
        Ok(claimed)
    }

    /// Extend the lease of a running agent run (called on each submit).
    pub async fn refresh_lease(
        pool: &DbPool,
        id: DbId,
        lease_expires_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE inspection_runs SET lease_expires_at = ? \
             WHERE id = ? AND executor = ? AND status = ?",
        )
        .bind(lease_expires_at)
        .bind(id)
        .bind(Executor::Agent.as_str())
        .bind(RunStatus::Running.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Detach agent runs whose lease has expired, making them claimable
    /// again. Already-submitted results are untouched.
    pub async fn reclaim_expired_leases(
        pool: &DbPool,
        now: Timestamp,
    ) -> Result<Vec<InspectionRun>, sqlx::Error> {
        let query = format!(
            "UPDATE inspection_runs \
             SET agent_status = ?, lease_expires_at = NULL \
             WHERE executor = ? AND status = ? AND agent_status = ? \
               AND lease_expires_at IS NOT NULL AND lease_expires_at < ? \
             RETURNING {RUN_COLUMNS}"
        );
        sqlx::query_as::<_, InspectionRun>(&query)
            .bind(AgentPhase::Queued.as_str())
            .bind(Executor::Agent.as_str())
            .bind(RunStatus::Running.as_str())
            .bind(AgentPhase::Running.as_str())
            .bind(now)
            .fetch_all(pool)
            .await
    }

    /// Delete a run; result rows cascade via the schema.
    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM inspection_runs WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
