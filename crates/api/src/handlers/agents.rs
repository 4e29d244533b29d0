//! Handlers for agent registration and the agent coordination plane.
//!
//! The server never dials an agent: all motion (heartbeat, task pull,
//! result submission, failure report) is agent-initiated over the
//! bearer-authenticated routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use inspect_core::audit::{actions, entities, ACTOR_SYSTEM};
use inspect_core::checks::sanitize;
use inspect_core::error::CoreError;
use inspect_core::item::ItemSnapshot;
use inspect_core::status::{AgentPhase, CheckStatus, Executor, RunStatus};
use inspect_core::token::generate_token;
use inspect_core::types::{DbId, Timestamp};
use inspect_db::models::agent::{AgentView, RegisterAgent};
use inspect_db::models::audit::CreateAuditLog;
use inspect_db::models::result::{CreateResult, SubmittedResult};
use inspect_db::models::run::InspectionRun;
use inspect_db::repositories::{AgentRepo, AuditRepo, ClusterRepo, RunRepo};
use serde::{Deserialize, Serialize};

use crate::engine;
use crate::error::{AppError, AppResult};
use crate::middleware::agent_auth::AuthedAgent;
use crate::response::DataResponse;
use crate::state::AppState;

/// Limits for one `PullTasks` call.
const DEFAULT_PULL_LIMIT: i64 = 1;
const MAX_PULL_LIMIT: i64 = 10;

/// Bounds applied to agent-submitted text, matching the engine's own.
const MAX_DETAIL_CHARS: usize = 2000;
const MAX_SUGGESTION_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// Registration & management
// ---------------------------------------------------------------------------

/// Registration response: the only place the plaintext token ever appears.
#[derive(Debug, Serialize)]
pub struct RegisteredAgent {
    pub agent: AgentView,
    pub token: String,
}

/// POST /agents
///
/// Register an agent and return its token exactly once. Idempotent by
/// name: re-registering an existing name bound to the same cluster
/// rotates the token; the same name on a different cluster conflicts.
pub async fn register_agent(
    State(state): State<AppState>,
    Json(input): Json<RegisterAgent>,
) -> AppResult<impl IntoResponse> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Agent name must not be empty".into(),
        )));
    }
    if let Some(cluster_id) = input.cluster_id {
        if ClusterRepo::find_by_id(&state.pool, cluster_id).await?.is_none() {
            return Err(AppError::Core(CoreError::NotFound {
                entity: "Cluster",
                id: cluster_id,
            }));
        }
    }

    let token = generate_token();
    let (agent, rotated) = match AgentRepo::find_by_name(&state.pool, &name).await? {
        Some(existing) => {
            if existing.cluster_id != input.cluster_id {
                return Err(AppError::Core(CoreError::Conflict(format!(
                    "Agent '{name}' is already registered for a different cluster"
                ))));
            }
            let agent = AgentRepo::rotate_token(&state.pool, existing.id, &token.hash).await?;
            (agent, true)
        }
        None => {
            let create = RegisterAgent {
                name: name.clone(),
                cluster_id: input.cluster_id,
                description: input.description.clone(),
                prometheus_url: input.prometheus_url.clone(),
            };
            let agent = AgentRepo::create(&state.pool, &create, &token.hash).await?;
            (agent, false)
        }
    };

    AuditRepo::append(
        &state.pool,
        &CreateAuditLog {
            actor: ACTOR_SYSTEM.to_string(),
            action: actions::CREATE.to_string(),
            entity_type: entities::INSPECTION_AGENT.to_string(),
            entity_id: Some(agent.id),
            detail: Some(if rotated {
                format!("Rotated token for agent '{name}'")
            } else {
                format!("Registered agent '{name}'")
            }),
        },
    )
    .await?;

    tracing::info!(agent_id = agent.id, agent_name = %name, rotated, "Agent registered");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: RegisteredAgent {
                agent: agent.into(),
                token: token.plaintext,
            },
        }),
    ))
}

/// GET /agents
pub async fn list_agents(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let agents: Vec<AgentView> = AgentRepo::list(&state.pool)
        .await?
        .into_iter()
        .map(AgentView::from)
        .collect();
    Ok(Json(DataResponse { data: agents }))
}

/// DELETE /agents/{id}
///
/// Historic runs keep their agent reference (nulled by the schema).
pub async fn delete_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    if !AgentRepo::delete(&state.pool, agent_id).await? {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Agent",
            id: agent_id,
        }));
    }
    engine::audit_system(
        &state.pool,
        actions::DELETE,
        entities::INSPECTION_AGENT,
        Some(agent_id),
        format!("Deleted agent {agent_id}"),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    /// Server wall clock, for agent-side clock-drift diagnosis.
    pub server_time: Timestamp,
}

/// POST /agents/{id}/heartbeat
pub async fn heartbeat(agent: AuthedAgent) -> AppResult<impl IntoResponse> {
    tracing::debug!(agent_id = agent.agent.id, "Agent heartbeat");
    Ok(Json(DataResponse {
        data: HeartbeatResponse {
            server_time: Utc::now(),
        },
    }))
}

// ---------------------------------------------------------------------------
// Task pull
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PullTasksParams {
    /// Maximum number of runs to claim (default 1, capped at 10).
    pub limit: Option<i64>,
}

/// What an agent needs to know about the cluster it inspects.
#[derive(Debug, Serialize)]
pub struct ClusterContext {
    pub cluster_id: DbId,
    pub cluster_name: String,
    pub prometheus_url: Option<String>,
}

/// One reserved unit of work: a single item of a claimed run.
#[derive(Debug, Serialize)]
pub struct AgentTask {
    pub run_id: DbId,
    pub item_id: DbId,
    pub item_snapshot: ItemSnapshot,
    pub cluster_context: ClusterContext,
    pub lease_expires_at: Timestamp,
}

/// GET /agents/{id}/tasks
///
/// Atomically claim up to `limit` queued runs bound to this agent and
/// return one task per still-pending item. Concurrent pullers observe
/// first-writer-wins; losers see fewer tasks or none.
pub async fn pull_tasks(
    agent: AuthedAgent,
    State(state): State<AppState>,
    Query(params): Query<PullTasksParams>,
) -> AppResult<impl IntoResponse> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PULL_LIMIT)
        .clamp(1, MAX_PULL_LIMIT);
    let lease_expires_at = Utc::now()
        + chrono::Duration::from_std(state.config.agent_lease)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));

    let claimed =
        RunRepo::claim_queued_for_agent(&state.pool, agent.agent.id, limit, lease_expires_at)
            .await?;

    let mut tasks: Vec<AgentTask> = Vec::new();
    for run in &claimed {
        let cluster = ClusterRepo::find_by_id(&state.pool, run.cluster_id)
            .await?
            .ok_or(AppError::Core(CoreError::NotFound {
                entity: "Cluster",
                id: run.cluster_id,
            }))?;
        let prometheus_url = agent
            .agent
            .prometheus_url
            .clone()
            .or_else(|| cluster.prometheus_url.clone())
            .or_else(|| state.config.prometheus_url.clone());

        let done: Vec<Option<DbId>> = RunRepo::results_for_run(&state.pool, run.id)
            .await?
            .into_iter()
            .map(|r| r.item_id)
            .collect();

        for snapshot in run.plan() {
            if done.contains(&Some(snapshot.item_id)) {
                continue;
            }
            tasks.push(AgentTask {
                run_id: run.id,
                item_id: snapshot.item_id,
                item_snapshot: snapshot,
                cluster_context: ClusterContext {
                    cluster_id: cluster.id,
                    cluster_name: cluster.name.clone(),
                    prometheus_url: prometheus_url.clone(),
                },
                lease_expires_at,
            });
        }
    }

    tracing::info!(
        agent_id = agent.agent.id,
        runs = claimed.len(),
        tasks = tasks.len(),
        "Tasks pulled"
    );
    Ok(Json(DataResponse { data: tasks }))
}

// ---------------------------------------------------------------------------
// Result submission
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitResultsRequest {
    pub run_id: DbId,
    pub results: Vec<SubmittedResult>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResultsResponse {
    pub run: InspectionRun,
    /// How many submissions inserted a new row (duplicates excluded).
    pub applied: usize,
}

/// POST /agents/{id}/results
///
/// Idempotent per `(run_id, item_id)`: a duplicate submission returns the
/// stored row unchanged and advances nothing. Each accepted batch
/// refreshes the lease; recording the final item finalises the run.
pub async fn submit_results(
    agent: AuthedAgent,
    State(state): State<AppState>,
    Json(input): Json<SubmitResultsRequest>,
) -> AppResult<impl IntoResponse> {
    let run = fetch_run_for_agent(&state, &agent, input.run_id).await?;
    let plan = run.plan();

    let mut applied = 0usize;
    for submitted in &input.results {
        let Some(status) = CheckStatus::parse(&submitted.status) else {
            return Err(AppError::Core(CoreError::Validation(format!(
                "Unknown result status '{}'",
                submitted.status
            ))));
        };
        let Some(snapshot) = plan.iter().find(|s| s.item_id == submitted.item_id) else {
            return Err(AppError::Core(CoreError::Validation(format!(
                "Item {} is not part of run {}",
                submitted.item_id, run.id
            ))));
        };

        let result = CreateResult {
            run_id: run.id,
            item_id: Some(submitted.item_id),
            item_name: snapshot.name.clone(),
            status: status.as_str().to_string(),
            detail: submitted
                .detail
                .as_deref()
                .and_then(|d| sanitize(d, MAX_DETAIL_CHARS)),
            suggestion: submitted
                .suggestion
                .as_deref()
                .and_then(|s| sanitize(s, MAX_SUGGESTION_CHARS)),
        };
        let (_, advanced) = RunRepo::insert_result(&state.pool, &result).await?;
        if advanced {
            applied += 1;
        }
    }

    let lease_expires_at = Utc::now()
        + chrono::Duration::from_std(state.config.agent_lease)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
    RunRepo::refresh_lease(&state.pool, run.id, lease_expires_at).await?;

    let mut current = RunRepo::find_by_id(&state.pool, run.id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Run",
            id: run.id,
        }))?;

    if current.processed_items >= current.total_items && !current.is_terminal() {
        if let Some(finalized) =
            engine::finalize_run(&state.pool, run.id, None, Some(AgentPhase::Finished)).await?
        {
            let cluster_name = ClusterRepo::find_by_id(&state.pool, finalized.cluster_id)
                .await?
                .map(|c| c.name)
                .unwrap_or_default();
            engine::emit_report_best_effort(
                &state.pool,
                &state.config.reports_dir(),
                &finalized,
                &cluster_name,
            )
            .await;
            current = RunRepo::find_by_id(&state.pool, run.id)
                .await?
                .unwrap_or(finalized);
        }
    }

    tracing::info!(
        agent_id = agent.agent.id,
        run_id = run.id,
        applied,
        "Agent results submitted"
    );
    Ok(Json(DataResponse {
        data: SubmitResultsResponse { run: current, applied },
    }))
}

// ---------------------------------------------------------------------------
// Fatal failure report
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RunFailureRequest {
    pub run_id: DbId,
    pub reason: String,
}

/// POST /agents/{id}/failures
///
/// Agent-initiated fatal: remaining items become failed rows and the run
/// finalises as `incomplete`.
pub async fn report_run_failure(
    agent: AuthedAgent,
    State(state): State<AppState>,
    Json(input): Json<RunFailureRequest>,
) -> AppResult<impl IntoResponse> {
    let run = fetch_run_for_agent(&state, &agent, input.run_id).await?;

    let detail = format!("agent reported failure: {}", input.reason);
    engine::fail_remaining_items(&state.pool, &run, &detail).await?;
    let finalized = engine::finalize_run(
        &state.pool,
        run.id,
        Some(RunStatus::Incomplete),
        Some(AgentPhase::Failed),
    )
    .await?
    .unwrap_or(run);

    engine::audit_system(
        &state.pool,
        actions::AGENT_RUN_FAILED,
        entities::INSPECTION_RUN,
        Some(finalized.id),
        format!(
            "Agent {} reported run failure: {}",
            agent.agent.id, input.reason
        ),
    )
    .await;

    tracing::warn!(
        agent_id = agent.agent.id,
        run_id = finalized.id,
        reason = %input.reason,
        "Agent reported run failure"
    );
    Ok(Json(DataResponse { data: finalized }))
}

/// Fetch a run and verify it is an agent run bound to the caller.
async fn fetch_run_for_agent(
    state: &AppState,
    agent: &AuthedAgent,
    run_id: DbId,
) -> AppResult<InspectionRun> {
    let run = RunRepo::find_by_id(&state.pool, run_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Run",
            id: run_id,
        }))?;
    if Executor::parse(&run.executor) != Some(Executor::Agent) || run.agent_id != Some(agent.agent.id)
    {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Run {run_id} is not assigned to agent {}",
            agent.agent.id
        ))));
    }
    Ok(run)
}
