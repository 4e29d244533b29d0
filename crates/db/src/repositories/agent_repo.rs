//! Repository for the `inspection_agents` table.
//!
//! Token plaintext never touches this layer; callers hash the token and
//! hand over the digest.

use chrono::Utc;
use inspect_core::types::DbId;

use crate::models::agent::{InspectionAgent, RegisterAgent};
use crate::DbPool;

/// Column list for `inspection_agents` queries.
const COLUMNS: &str = "\
    id, name, cluster_id, description, is_enabled, prometheus_url, \
    token_hash, last_seen_at, created_at, updated_at";

/// Provides CRUD operations for inspection agents.
pub struct AgentRepo;

impl AgentRepo {
    pub async fn create(
        pool: &DbPool,
        input: &RegisterAgent,
        token_hash: &str,
    ) -> Result<InspectionAgent, sqlx::Error> {
        let now = Utc::now();
        let query = format!(
            "INSERT INTO inspection_agents \
                 (name, cluster_id, description, is_enabled, prometheus_url, \
                  token_hash, created_at, updated_at) \
             VALUES (?, ?, ?, 1, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, InspectionAgent>(&query)
            .bind(&input.name)
            .bind(input.cluster_id)
            .bind(&input.description)
            .bind(&input.prometheus_url)
            .bind(token_hash)
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await
    }

    /// Replace the stored token digest (re-registration of a known name).
    pub async fn rotate_token(
        pool: &DbPool,
        id: DbId,
        token_hash: &str,
    ) -> Result<InspectionAgent, sqlx::Error> {
        let query = format!(
            "UPDATE inspection_agents SET token_hash = ?, updated_at = ? \
             WHERE id = ? RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, InspectionAgent>(&query)
            .bind(token_hash)
            .bind(Utc::now())
            .bind(id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &DbPool,
        id: DbId,
    ) -> Result<Option<InspectionAgent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM inspection_agents WHERE id = ?");
        sqlx::query_as::<_, InspectionAgent>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_name(
        pool: &DbPool,
        name: &str,
    ) -> Result<Option<InspectionAgent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM inspection_agents WHERE name = ?");
        sqlx::query_as::<_, InspectionAgent>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &DbPool) -> Result<Vec<InspectionAgent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM inspection_agents ORDER BY name ASC");
        sqlx::query_as::<_, InspectionAgent>(&query)
            .fetch_all(pool)
            .await
    }

    /// Update `last_seen_at`; called on every authenticated agent request.
    pub async fn touch_last_seen(pool: &DbPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE inspection_agents SET last_seen_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete an agent. Historic runs keep their reference via
    /// `ON DELETE SET NULL`.
    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM inspection_agents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
