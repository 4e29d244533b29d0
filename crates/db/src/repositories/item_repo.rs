//! Repository for the `inspection_items` table.

use chrono::Utc;
use inspect_core::types::DbId;

use crate::models::item::{CreateItem, InspectionItem, UpdateItem};
use crate::DbPool;

/// Column list for `inspection_items` queries.
const COLUMNS: &str =
    "id, name, description, check_type, config_json, created_at, updated_at";

/// Outcome of an import upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Provides CRUD operations for inspection item definitions.
pub struct ItemRepo;

impl ItemRepo {
    pub async fn create(pool: &DbPool, input: &CreateItem) -> Result<InspectionItem, sqlx::Error> {
        let now = Utc::now();
        let config_json = input
            .config
            .as_ref()
            .map(|c| serde_json::to_string(c).unwrap_or_else(|_| "{}".into()));
        let query = format!(
            "INSERT INTO inspection_items \
                 (name, description, check_type, config_json, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, InspectionItem>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.check_type)
            .bind(config_json)
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await
    }

    /// Apply the non-`None` fields of `input` to an item row.
    pub async fn update(
        pool: &DbPool,
        id: DbId,
        input: &UpdateItem,
    ) -> Result<InspectionItem, sqlx::Error> {
        let mut sets: Vec<&str> = Vec::new();
        if input.name.is_some() {
            sets.push("name = ?");
        }
        if input.description.is_some() {
            sets.push("description = ?");
        }
        if input.check_type.is_some() {
            sets.push("check_type = ?");
        }
        if input.config.is_some() {
            sets.push("config_json = ?");
        }
        sets.push("updated_at = ?");

        let query = format!(
            "UPDATE inspection_items SET {} WHERE id = ? RETURNING {COLUMNS}",
            sets.join(", ")
        );
        let mut q = sqlx::query_as::<_, InspectionItem>(&query);
        if let Some(name) = &input.name {
            q = q.bind(name);
        }
        if let Some(description) = &input.description {
            q = q.bind(description);
        }
        if let Some(check_type) = &input.check_type {
            q = q.bind(check_type);
        }
        if let Some(config) = &input.config {
            q = q.bind(serde_json::to_string(config).unwrap_or_else(|_| "{}".into()));
        }
        q.bind(Utc::now()).bind(id).fetch_one(pool).await
    }

    /// Delete an item after backfilling the snapshot name on its historic
    /// results; those rows keep working with `item_id = NULL`.
    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query(
            "UPDATE inspection_results \
             SET item_name = COALESCE(NULLIF(item_name, ''), \
                 (SELECT name FROM inspection_items WHERE id = ?)) \
             WHERE item_id = ?",
        )
        .bind(id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query("DELETE FROM inspection_items WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<InspectionItem>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM inspection_items WHERE id = ?");
        sqlx::query_as::<_, InspectionItem>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_name(
        pool: &DbPool,
        name: &str,
    ) -> Result<Option<InspectionItem>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM inspection_items WHERE name = ?");
        sqlx::query_as::<_, InspectionItem>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// Fetch the given items. The result may be shorter than `ids` when
    /// some do not exist; callers validate the count.
    pub async fn find_by_ids(
        pool: &DbPool,
        ids: &[DbId],
    ) -> Result<Vec<InspectionItem>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let query = format!(
            "SELECT {COLUMNS} FROM inspection_items WHERE id IN ({placeholders})"
        );
        let mut q = sqlx::query_as::<_, InspectionItem>(&query);
        for id in ids {
            q = q.bind(id);
        }
        q.fetch_all(pool).await
    }

    /// All items ordered by id.
    pub async fn list(pool: &DbPool) -> Result<Vec<InspectionItem>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM inspection_items ORDER BY id ASC");
        sqlx::query_as::<_, InspectionItem>(&query)
            .fetch_all(pool)
            .await
    }

    /// Import upsert keyed on the unique name.
    pub async fn upsert_by_name(
        pool: &DbPool,
        input: &CreateItem,
    ) -> Result<(InspectionItem, UpsertOutcome), sqlx::Error> {
        match Self::find_by_name(pool, &input.name).await? {
            Some(existing) => {
                let update = UpdateItem {
                    name: None,
                    description: input.description.clone(),
                    check_type: Some(input.check_type.clone()),
                    config: input.config.clone(),
                };
                let item = Self::update(pool, existing.id, &update).await?;
                Ok((item, UpsertOutcome::Updated))
            }
            None => {
                let item = Self::create(pool, input).await?;
                Ok((item, UpsertOutcome::Created))
            }
        }
    }
}
