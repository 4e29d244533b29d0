//! Repository for the `clusters` table.

use chrono::Utc;
use inspect_core::types::DbId;

use crate::models::cluster::{Cluster, ConnectionRecord, CreateCluster, UpdateCluster};
use crate::DbPool;

/// Column list for `clusters` queries.
const COLUMNS: &str = "\
    id, name, kubeconfig_path, prometheus_url, contexts_json, \
    connection_status, connection_message, kubernetes_version, node_count, \
    last_checked_at, execution_mode, default_agent_id, created_at, updated_at";

/// Provides CRUD operations for registered clusters.
pub struct ClusterRepo;

impl ClusterRepo {
    /// Insert a new cluster, returning the created row.
    pub async fn create(pool: &DbPool, input: &CreateCluster) -> Result<Cluster, sqlx::Error> {
        let now = Utc::now();
        let query = format!(
            "INSERT INTO clusters \
                 (name, kubeconfig_path, prometheus_url, contexts_json, \
                  execution_mode, default_agent_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Cluster>(&query)
            .bind(&input.name)
            .bind(&input.kubeconfig_path)
            .bind(&input.prometheus_url)
            .bind(&input.contexts_json)
            .bind(&input.execution_mode)
            .bind(input.default_agent_id)
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await
    }

    /// Apply the non-`None` fields of `input` to a cluster row.
    pub async fn update(
        pool: &DbPool,
        id: DbId,
        input: &UpdateCluster,
    ) -> Result<Cluster, sqlx::Error> {
        let mut sets: Vec<&str> = Vec::new();
        if input.name.is_some() {
            sets.push("name = ?");
        }
        if input.kubeconfig_path.is_some() {
            sets.push("kubeconfig_path = ?");
        }
        if input.prometheus_url.is_some() {
            sets.push("prometheus_url = ?");
        }
        if input.contexts_json.is_some() {
            sets.push("contexts_json = ?");
        }
        if input.execution_mode.is_some() {
            sets.push("execution_mode = ?");
        }
        if input.default_agent_id.is_some() {
            sets.push("default_agent_id = ?");
        }
        sets.push("updated_at = ?");

        let query = format!(
            "UPDATE clusters SET {} WHERE id = ? RETURNING {COLUMNS}",
            sets.join(", ")
        );
        let mut q = sqlx::query_as::<_, Cluster>(&query);
        if let Some(name) = &input.name {
            q = q.bind(name);
        }
        if let Some(path) = &input.kubeconfig_path {
            q = q.bind(path);
        }
        if let Some(url) = &input.prometheus_url {
            q = q.bind(url);
        }
        if let Some(contexts) = &input.contexts_json {
            q = q.bind(contexts);
        }
        if let Some(mode) = &input.execution_mode {
            q = q.bind(mode);
        }
        if let Some(agent_id) = &input.default_agent_id {
            q = q.bind(agent_id);
        }
        q.bind(Utc::now()).bind(id).fetch_one(pool).await
    }

    /// Record a probe outcome onto the cluster row.
    pub async fn record_connection(
        pool: &DbPool,
        id: DbId,
        record: &ConnectionRecord,
    ) -> Result<Cluster, sqlx::Error> {
        let query = format!(
            "UPDATE clusters \
             SET connection_status = ?, connection_message = ?, \
                 kubernetes_version = ?, node_count = ?, last_checked_at = ?, \
                 updated_at = ? \
             WHERE id = ? \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Cluster>(&query)
            .bind(&record.connection_status)
            .bind(&record.connection_message)
            .bind(&record.kubernetes_version)
            .bind(record.node_count)
            .bind(record.last_checked_at)
            .bind(Utc::now())
            .bind(id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Cluster>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM clusters WHERE id = ?");
        sqlx::query_as::<_, Cluster>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_name(pool: &DbPool, name: &str) -> Result<Option<Cluster>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM clusters WHERE name = ?");
        sqlx::query_as::<_, Cluster>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// All clusters ordered by name.
    pub async fn list(pool: &DbPool) -> Result<Vec<Cluster>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM clusters ORDER BY name ASC");
        sqlx::query_as::<_, Cluster>(&query).fetch_all(pool).await
    }

    /// Delete a cluster; runs cascade via the schema.
    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM clusters WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
