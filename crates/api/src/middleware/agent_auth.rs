//! Bearer-token authentication extractor for the agent plane.
//!
//! Agent routes carry the agent id in the path and the token in the
//! `Authorization` header. The token digest comparison is constant-time,
//! and every successful authentication refreshes `last_seen_at`.

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use axum::RequestPartsExt;
use inspect_core::error::CoreError;
use inspect_core::token::verify_token;
use inspect_core::types::DbId;
use inspect_db::models::agent::InspectionAgent;
use inspect_db::repositories::AgentRepo;

use crate::error::AppError;
use crate::state::AppState;

/// Authenticated agent extracted from the path id + Bearer token.
///
/// Use as an extractor parameter in any agent-plane handler:
///
/// ```ignore
/// async fn pull_tasks(agent: AuthedAgent, State(state): State<AppState>) -> AppResult<...>
/// ```
pub struct AuthedAgent {
    pub agent: InspectionAgent,
}

impl FromRequestParts<AppState> for AuthedAgent {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Path(agent_id) = parts
            .extract::<Path<DbId>>()
            .await
            .map_err(|_| AppError::BadRequest("Invalid agent id".into()))?;

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthenticated(
                    "Missing Authorization header".into(),
                ))
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthenticated(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        let agent = AgentRepo::find_by_id(&state.pool, agent_id)
            .await?
            .filter(|agent| verify_token(token, &agent.token_hash))
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthenticated("Invalid agent token".into()))
            })?;

        if !agent.is_enabled {
            return Err(AppError::Core(CoreError::Unauthenticated(
                "Agent is disabled".into(),
            )));
        }

        AgentRepo::touch_last_seen(&state.pool, agent.id).await?;

        Ok(AuthedAgent { agent })
    }
}
