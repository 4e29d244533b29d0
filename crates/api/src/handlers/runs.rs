//! Handlers for the `/inspection-runs` resource.
//!
//! Run admission snapshots the selected items into the run's plan, routes
//! the run to the server or agent executor, and hands server runs to a
//! background task. Cancellation is cooperative.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use inspect_core::audit::{actions, entities, ACTOR_SYSTEM};
use inspect_core::error::CoreError;
use inspect_core::item::ItemSnapshot;
use inspect_core::license::features;
use inspect_core::status::{AgentPhase, Executor, RunStatus};
use inspect_core::types::DbId;
use inspect_db::models::audit::CreateAuditLog;
use inspect_db::models::result::InspectionResult;
use inspect_db::models::run::{CreateRun, CreateRunRequest, InspectionRun};
use inspect_db::repositories::{AgentRepo, AuditRepo, ClusterRepo, ItemRepo, RunRepo};
use serde::{Deserialize, Serialize};

use crate::engine::{self, runner};
use crate::error::{AppError, AppResult};
use crate::report;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Shared response shapes
// ---------------------------------------------------------------------------

/// Run detail: the run row plus its result rows in plan order.
#[derive(Debug, Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: InspectionRun,
    pub cluster_name: String,
    pub results: Vec<InspectionResult>,
}

async fn load_run_detail(state: &AppState, run_id: DbId) -> AppResult<RunDetail> {
    let run = RunRepo::find_by_id(&state.pool, run_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Run",
            id: run_id,
        }))?;
    let cluster_name = ClusterRepo::find_by_id(&state.pool, run.cluster_id)
        .await?
        .map(|c| c.name)
        .unwrap_or_default();
    let results = report::sort_by_plan(&run, RunRepo::results_for_run(&state.pool, run_id).await?);
    Ok(RunDetail {
        run,
        cluster_name,
        results,
    })
}

// ---------------------------------------------------------------------------
// List / get
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListRunsParams {
    pub limit: Option<i64>,
}

/// GET /inspection-runs
pub async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<ListRunsParams>,
) -> AppResult<impl IntoResponse> {
    let runs = RunRepo::list(&state.pool, params.limit).await?;
    Ok(Json(DataResponse { data: runs }))
}

/// GET /inspection-runs/{id}
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let detail = load_run_detail(&state, run_id).await?;
    Ok(Json(DataResponse { data: detail }))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /inspection-runs
///
/// Admission: validate the cluster and every item, snapshot the items into
/// the plan, route to the server or agent executor, and return the run in
/// `queued` state (server runs start executing immediately in the
/// background).
pub async fn create_run(
    State(state): State<AppState>,
    Json(input): Json<CreateRunRequest>,
) -> AppResult<impl IntoResponse> {
    state.license.require(&[features::INSPECTIONS])?;

    // Dedupe while preserving submission order; the plan order is the
    // display order for the run's whole life.
    let mut item_ids: Vec<DbId> = Vec::new();
    for id in &input.item_ids {
        if !item_ids.contains(id) {
            item_ids.push(*id);
        }
    }
    if item_ids.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "No inspection items selected.".into(),
        )));
    }

    let cluster = ClusterRepo::find_by_id(&state.pool, input.cluster_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Cluster",
            id: input.cluster_id,
        }))?;

    let items = ItemRepo::find_by_ids(&state.pool, &item_ids).await?;
    if items.len() != item_ids.len() {
        return Err(AppError::Core(CoreError::Validation(
            "One or more inspection items do not exist.".into(),
        )));
    }

    let plan: Vec<ItemSnapshot> = item_ids
        .iter()
        .map(|id| {
            let item = items
                .iter()
                .find(|i| i.id == *id)
                .expect("validated above");
            ItemSnapshot {
                item_id: item.id,
                name: item.name.clone(),
                check_type: item.check_type.clone(),
                config: item.config(),
            }
        })
        .collect();

    // Executor routing: agent mode needs an existing, enabled default
    // agent; anything else falls back to the server executor.
    let mut executor = Executor::Server;
    let mut agent_id = None;
    if Executor::parse(&cluster.execution_mode) == Some(Executor::Agent) {
        if let Some(default_agent_id) = cluster.default_agent_id {
            if let Some(agent) = AgentRepo::find_by_id(&state.pool, default_agent_id).await? {
                if agent.is_enabled {
                    executor = Executor::Agent;
                    agent_id = Some(agent.id);
                }
            }
        }
        if executor == Executor::Server {
            tracing::warn!(
                cluster_id = cluster.id,
                "Cluster is in agent mode without a usable default agent; falling back to server executor"
            );
        }
    }

    let create = CreateRun {
        cluster_id: cluster.id,
        operator: input.operator.clone(),
        executor: executor.as_str().to_string(),
        agent_id,
        agent_status: (executor == Executor::Agent).then(|| AgentPhase::Queued.as_str().to_string()),
        total_items: plan.len() as i64,
        plan_json: serde_json::to_string(&plan)
            .map_err(|e| AppError::InternalError(format!("cannot serialise plan: {e}")))?,
    };
    let run = RunRepo::create(&state.pool, &create).await?;

    AuditRepo::append(
        &state.pool,
        &CreateAuditLog {
            actor: input
                .operator
                .clone()
                .unwrap_or_else(|| ACTOR_SYSTEM.to_string()),
            action: actions::CREATE.to_string(),
            entity_type: entities::INSPECTION_RUN.to_string(),
            entity_id: Some(run.id),
            detail: Some(format!(
                "Created inspection run for cluster '{}' ({} items, executor={})",
                cluster.name,
                run.total_items,
                run.executor
            )),
        },
    )
    .await?;

    if executor == Executor::Server {
        runner::spawn_run(state.clone(), run.id);
    }

    tracing::info!(
        run_id = run.id,
        cluster_id = cluster.id,
        executor = %run.executor,
        total_items = run.total_items,
        "Run admitted"
    );

    let detail = load_run_detail(&state, run.id).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: detail })))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /inspection-runs/{id}/cancel
///
/// Cooperative cancel. Completed runs reject cancellation idempotently
/// (no error, returned as-is); results already computed are preserved.
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let run = RunRepo::find_by_id(&state.pool, run_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Run",
            id: run_id,
        }))?;

    if run.is_terminal() {
        let detail = load_run_detail(&state, run_id).await?;
        return Ok(Json(DataResponse { data: detail }));
    }

    let executor = Executor::parse(&run.executor).unwrap_or(Executor::Server);
    match executor {
        Executor::Server => {
            let in_flight = state.runs.request_cancel(run_id);
            let queued = RunStatus::parse(&run.status) == Some(RunStatus::Queued);
            if queued || !in_flight {
                // Not started yet (or the task is gone): settle it here.
                engine::fail_remaining_items(&state.pool, &run, engine::CANCELLED_DETAIL).await?;
                engine::finalize_run(&state.pool, run_id, Some(RunStatus::Cancelled), None).await?;
                engine::audit_system(
                    &state.pool,
                    actions::RUN_CANCELLED,
                    entities::INSPECTION_RUN,
                    Some(run_id),
                    "Run cancelled before start".to_string(),
                )
                .await;
            }
            // Otherwise the background task observes the flag at the next
            // item boundary and finalises the run itself.
        }
        Executor::Agent => {
            engine::fail_remaining_items(&state.pool, &run, engine::CANCELLED_DETAIL).await?;
            engine::finalize_run(
                &state.pool,
                run_id,
                Some(RunStatus::Cancelled),
                Some(AgentPhase::Failed),
            )
            .await?;
            engine::audit_system(
                &state.pool,
                actions::RUN_CANCELLED,
                entities::INSPECTION_RUN,
                Some(run_id),
                "Agent run cancelled by operator".to_string(),
            )
            .await;
        }
    }

    let detail = load_run_detail(&state, run_id).await?;
    Ok(Json(DataResponse { data: detail }))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub delete_files: bool,
}

/// DELETE /inspection-runs/{id}
pub async fn delete_run(
    State(state): State<AppState>,
    Path(run_id): Path<DbId>,
    Query(params): Query<DeleteParams>,
) -> AppResult<impl IntoResponse> {
    let run = RunRepo::find_by_id(&state.pool, run_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Run",
            id: run_id,
        }))?;

    if params.delete_files {
        remove_report_files(run.report_path.as_deref());
    }
    RunRepo::delete(&state.pool, run_id).await?;

    engine::audit_system(
        &state.pool,
        actions::DELETE,
        entities::INSPECTION_RUN,
        Some(run_id),
        format!("Deleted inspection run {run_id}"),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Best-effort removal of a run's report artefacts (pdf + md sibling).
pub fn remove_report_files(report_path: Option<&str>) {
    if let Some(path) = report_path {
        let pdf = std::path::Path::new(path);
        let _ = std::fs::remove_file(pdf);
        let _ = std::fs::remove_file(report::markdown_path_for(pdf));
    }
}

// ---------------------------------------------------------------------------
// Report download
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub format: Option<String>,
}

/// GET /inspection-runs/{id}/report?format=pdf|md
pub async fn download_report(
    State(state): State<AppState>,
    Path(run_id): Path<DbId>,
    Query(params): Query<ReportParams>,
) -> AppResult<impl IntoResponse> {
    state.license.require(&[features::REPORTS])?;

    let run = RunRepo::find_by_id(&state.pool, run_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Run",
            id: run_id,
        }))?;
    let report_path = run.report_path.as_deref().ok_or(AppError::Core(
        CoreError::NotFound {
            entity: "Report",
            id: run_id,
        },
    ))?;

    let format = params.format.as_deref().unwrap_or("pdf");
    let (path, content_type) = match format {
        "pdf" => (std::path::PathBuf::from(report_path), "application/pdf"),
        "md" => (
            report::markdown_path_for(std::path::Path::new(report_path)),
            "text/markdown; charset=utf-8",
        ),
        other => {
            return Err(AppError::Core(CoreError::Validation(format!(
                "Unknown report format '{other}'"
            ))))
        }
    };

    let bytes = tokio::fs::read(&path).await.map_err(|_| {
        AppError::Core(CoreError::NotFound {
            entity: "Report",
            id: run_id,
        })
    })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("inspection-run-{run_id}.{format}"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}
