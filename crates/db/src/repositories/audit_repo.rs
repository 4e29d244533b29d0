//! Repository for the append-only `audit_logs` table.

use chrono::Utc;

use crate::models::audit::{AuditLog, CreateAuditLog};
use crate::DbPool;

/// Column list for `audit_logs` queries.
const COLUMNS: &str = "id, actor, action, entity_type, entity_id, detail, created_at";

/// Maximum page size for the audit tail.
const MAX_LIMIT: i64 = 500;

/// Default page size for the audit tail.
const DEFAULT_LIMIT: i64 = 100;

/// Append and read audit entries. There is no update or delete.
pub struct AuditRepo;

impl AuditRepo {
    pub async fn append(pool: &DbPool, entry: &CreateAuditLog) -> Result<AuditLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO audit_logs (actor, action, entity_type, entity_id, detail, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(&entry.actor)
            .bind(&entry.action)
            .bind(&entry.entity_type)
            .bind(entry.entity_id)
            .bind(&entry.detail)
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    /// Newest entries first.
    pub async fn tail(pool: &DbPool, limit: Option<i64>) -> Result<Vec<AuditLog>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let query = format!(
            "SELECT {COLUMNS} FROM audit_logs ORDER BY created_at DESC, id DESC LIMIT ?"
        );
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
