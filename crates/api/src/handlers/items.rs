//! Handlers for the `/inspection-items` resource, including bulk
//! export/import.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use inspect_core::audit::{actions, entities};
use inspect_core::error::CoreError;
use inspect_core::item::{CheckKind, ItemConfig};
use inspect_core::types::{DbId, Timestamp};
use inspect_db::models::item::{CreateItem, InspectionItem, UpdateItem};
use inspect_db::repositories::item_repo::UpsertOutcome;
use inspect_db::repositories::ItemRepo;
use serde::{Deserialize, Serialize};

use crate::engine;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Validate the `(check_type, config)` pair of an incoming definition.
///
/// Creation only accepts recognised kinds; historical rows with retired
/// kinds still read fine (they evaluate to failed results).
fn validate_definition(check_type: &str, config: &Option<serde_json::Value>) -> AppResult<()> {
    if CheckKind::parse(check_type).is_none() {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Unknown check type '{check_type}'"
        ))));
    }
    let config = config.clone().unwrap_or_else(|| serde_json::json!({}));
    ItemConfig::from_parts(check_type, &config)
        .map_err(|e| AppError::Core(CoreError::Validation(e.to_string())))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

/// GET /inspection-items
pub async fn list_items(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let items = ItemRepo::list(&state.pool).await?;
    Ok(Json(DataResponse { data: items }))
}

/// GET /inspection-items/{id}
pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let item = ItemRepo::find_by_id(&state.pool, item_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "InspectionItem",
            id: item_id,
        }))?;
    Ok(Json(DataResponse { data: item }))
}

/// POST /inspection-items
pub async fn create_item(
    State(state): State<AppState>,
    Json(input): Json<CreateItem>,
) -> AppResult<impl IntoResponse> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Item name must not be empty".into(),
        )));
    }
    validate_definition(&input.check_type, &input.config)?;

    if ItemRepo::find_by_name(&state.pool, name).await?.is_some() {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Inspection item with name '{name}' already exists."
        ))));
    }

    let item = ItemRepo::create(&state.pool, &input).await?;
    engine::audit_system(
        &state.pool,
        actions::CREATE,
        entities::INSPECTION_ITEM,
        Some(item.id),
        format!("Created inspection item '{}'", item.name),
    )
    .await;

    Ok((StatusCode::CREATED, Json(DataResponse { data: item })))
}

/// PUT /inspection-items/{id}
pub async fn update_item(
    State(state): State<AppState>,
    Path(item_id): Path<DbId>,
    Json(input): Json<UpdateItem>,
) -> AppResult<impl IntoResponse> {
    let existing = ItemRepo::find_by_id(&state.pool, item_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "InspectionItem",
            id: item_id,
        }))?;

    let check_type = input.check_type.as_deref().unwrap_or(&existing.check_type);
    let config = input.config.clone().or_else(|| Some(existing.config()));
    validate_definition(check_type, &config)?;

    if let Some(new_name) = input.name.as_deref().map(str::trim) {
        if new_name.is_empty() {
            return Err(AppError::Core(CoreError::Validation(
                "Item name must not be empty".into(),
            )));
        }
        if new_name != existing.name {
            if ItemRepo::find_by_name(&state.pool, new_name).await?.is_some() {
                return Err(AppError::Core(CoreError::Conflict(format!(
                    "Inspection item with name '{new_name}' already exists."
                ))));
            }
        }
    }

    let item = ItemRepo::update(&state.pool, item_id, &input).await?;
    engine::audit_system(
        &state.pool,
        actions::UPDATE,
        entities::INSPECTION_ITEM,
        Some(item.id),
        format!("Updated inspection item '{}'", item.name),
    )
    .await;

    Ok(Json(DataResponse { data: item }))
}

/// DELETE /inspection-items/{id}
///
/// Historic results keep the snapshotted item name and drop the reference.
pub async fn delete_item(
    State(state): State<AppState>,
    Path(item_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let item = ItemRepo::find_by_id(&state.pool, item_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "InspectionItem",
            id: item_id,
        }))?;

    ItemRepo::delete(&state.pool, item_id).await?;
    engine::audit_system(
        &state.pool,
        actions::DELETE,
        entities::INSPECTION_ITEM,
        Some(item_id),
        format!("Deleted inspection item '{}'", item.name),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Export / import
// ---------------------------------------------------------------------------

/// One portable item definition in the export payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct PortableItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub check_type: String,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportPayload {
    pub exported_at: Timestamp,
    pub items: Vec<PortableItem>,
}

impl From<InspectionItem> for PortableItem {
    fn from(item: InspectionItem) -> Self {
        let config = item.config();
        PortableItem {
            name: item.name,
            description: item.description,
            check_type: item.check_type,
            config: if config == serde_json::json!({}) {
                None
            } else {
                Some(config)
            },
        }
    }
}

/// GET /inspection-items/export
pub async fn export_items(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let items: Vec<PortableItem> = ItemRepo::list(&state.pool)
        .await?
        .into_iter()
        .map(PortableItem::from)
        .collect();
    Ok(Json(ExportPayload {
        exported_at: Utc::now(),
        items,
    }))
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub total: usize,
}

/// POST /inspection-items/import
///
/// Multipart upload of an export payload; items are upserted by name.
pub async fn import_items(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut payload: Option<ExportPayload> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Cannot read upload: {e}")))?;
            payload = Some(serde_json::from_slice(&data).map_err(|e| {
                AppError::Core(CoreError::Validation(format!("Invalid import payload: {e}")))
            })?);
        }
    }
    let payload = payload.ok_or(AppError::Core(CoreError::Validation(
        "An import file upload is required.".into(),
    )))?;

    let mut created = 0usize;
    let mut updated = 0usize;
    for portable in &payload.items {
        let name = portable.name.trim();
        if name.is_empty() {
            return Err(AppError::Core(CoreError::Validation(
                "Import contains an item without a name".into(),
            )));
        }
        validate_definition(&portable.check_type, &portable.config)?;

        let input = CreateItem {
            name: name.to_string(),
            description: portable.description.clone(),
            check_type: portable.check_type.clone(),
            config: portable.config.clone(),
        };
        let (_, outcome) = ItemRepo::upsert_by_name(&state.pool, &input).await?;
        match outcome {
            UpsertOutcome::Created => created += 1,
            UpsertOutcome::Updated => updated += 1,
        }
    }

    engine::audit_system(
        &state.pool,
        actions::UPDATE,
        entities::INSPECTION_ITEM,
        None,
        format!(
            "Imported inspection items: {created} created, {updated} updated"
        ),
    )
    .await;

    Ok(Json(ImportSummary {
        created,
        updated,
        total: payload.items.len(),
    }))
}
