//! Handlers for the `/clusters` resource.
//!
//! Cluster creation and kubeconfig replacement go through multipart
//! uploads; every accepted kubeconfig is stored under the data directory
//! with owner-only permissions and probed immediately.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use inspect_core::audit::{actions, entities};
use inspect_core::error::CoreError;
use inspect_core::license::features;
use inspect_core::status::Executor;
use inspect_core::types::{DbId, Timestamp};
use inspect_db::models::cluster::{Cluster, CreateCluster, UpdateCluster};
use inspect_db::repositories::{AgentRepo, ClusterRepo, RunRepo};
use serde::{Deserialize, Serialize};

use crate::config::write_secret_file;
use crate::engine;
use crate::error::{AppError, AppResult};
use crate::handlers::runs::remove_report_files;
use crate::probe;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response shape
// ---------------------------------------------------------------------------

/// API view of a cluster: contexts parsed, kubeconfig path withheld.
#[derive(Debug, Serialize)]
pub struct ClusterView {
    pub id: DbId,
    pub name: String,
    pub prometheus_url: Option<String>,
    pub contexts: Vec<String>,
    pub connection_status: String,
    pub connection_message: Option<String>,
    pub kubernetes_version: Option<String>,
    pub node_count: Option<i64>,
    pub last_checked_at: Option<Timestamp>,
    pub execution_mode: String,
    pub default_agent_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Cluster> for ClusterView {
    fn from(cluster: Cluster) -> Self {
        let contexts = cluster.contexts();
        ClusterView {
            id: cluster.id,
            name: cluster.name,
            prometheus_url: cluster.prometheus_url,
            contexts,
            connection_status: cluster.connection_status,
            connection_message: cluster.connection_message,
            kubernetes_version: cluster.kubernetes_version,
            node_count: cluster.node_count,
            last_checked_at: cluster.last_checked_at,
            execution_mode: cluster.execution_mode,
            default_agent_id: cluster.default_agent_id,
            created_at: cluster.created_at,
            updated_at: cluster.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Multipart parsing
// ---------------------------------------------------------------------------

/// Fields accepted by the create/update multipart forms.
#[derive(Debug, Default)]
struct ClusterForm {
    kubeconfig: Option<(Vec<u8>, Option<String>)>,
    name: Option<String>,
    prometheus_url: Option<String>,
    execution_mode: Option<String>,
    default_agent_id: Option<String>,
}

async fn read_cluster_form(mut multipart: Multipart) -> AppResult<ClusterForm> {
    let mut form = ClusterForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let Some(field_name) = field.name().map(str::to_string) else {
            continue;
        };
        match field_name.as_str() {
            "file" => {
                let filename = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Cannot read upload: {e}")))?;
                form.kubeconfig = Some((data.to_vec(), filename));
            }
            "name" => form.name = Some(text_field(field).await?),
            "prometheus_url" => form.prometheus_url = Some(text_field(field).await?),
            "execution_mode" => form.execution_mode = Some(text_field(field).await?),
            "default_agent_id" => form.default_agent_id = Some(text_field(field).await?),
            _ => {}
        }
    }
    Ok(form)
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Cannot read form field: {e}")))
}

/// Pull the kubeconfig context names out of the uploaded YAML.
fn extract_contexts(kubeconfig_text: &str) -> Vec<String> {
    let Ok(payload) = serde_yaml::from_str::<serde_yaml::Value>(kubeconfig_text) else {
        return Vec::new();
    };
    payload
        .get("contexts")
        .and_then(|c| c.as_sequence())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("name"))
                .filter_map(|name| name.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Trim, strip trailing slashes, and validate the scheme.
fn normalize_prometheus_url(value: &str) -> AppResult<Option<String>> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(None);
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(AppError::Core(CoreError::Validation(
            "Prometheus URL must start with http:// or https://".into(),
        )));
    }
    Ok(Some(trimmed.to_string()))
}

fn decode_kubeconfig(data: &[u8]) -> AppResult<String> {
    if data.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Uploaded kubeconfig file is empty.".into(),
        )));
    }
    String::from_utf8(data.to_vec()).map_err(|_| {
        AppError::Core(CoreError::Validation(
            "Cannot parse kubeconfig file content.".into(),
        ))
    })
}

/// Canonical location of a cluster's kubeconfig blob.
fn kubeconfig_path_for(state: &AppState, cluster_id: DbId) -> std::path::PathBuf {
    state.config.configs_dir().join(format!("{cluster_id}.yaml"))
}

/// Stage a kubeconfig blob under `configs/` before the cluster id exists.
fn stage_kubeconfig(state: &AppState, data: &[u8]) -> AppResult<String> {
    let filename = format!("staging-{}.yaml", uuid::Uuid::new_v4().simple());
    let path = state.config.configs_dir().join(filename);
    write_secret_file(&path, data)
        .map_err(|e| AppError::InternalError(format!("cannot store kubeconfig: {e}")))?;
    Ok(path.to_string_lossy().into_owned())
}

fn remove_file_safely(path: Option<&str>) {
    if let Some(path) = path {
        let _ = std::fs::remove_file(path);
    }
}

async fn validate_execution_mode(
    state: &AppState,
    mode: &str,
    default_agent_id: Option<DbId>,
) -> AppResult<()> {
    if Executor::parse(mode).is_none() {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Unknown execution mode '{mode}'"
        ))));
    }
    if let Some(agent_id) = default_agent_id {
        if AgentRepo::find_by_id(&state.pool, agent_id).await?.is_none() {
            return Err(AppError::Core(CoreError::NotFound {
                entity: "Agent",
                id: agent_id,
            }));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

/// GET /clusters
pub async fn list_clusters(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let clusters: Vec<ClusterView> = ClusterRepo::list(&state.pool)
        .await?
        .into_iter()
        .map(ClusterView::from)
        .collect();
    Ok(Json(DataResponse { data: clusters }))
}

/// GET /clusters/{id}
pub async fn get_cluster(
    State(state): State<AppState>,
    Path(cluster_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cluster = ClusterRepo::find_by_id(&state.pool, cluster_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Cluster",
            id: cluster_id,
        }))?;
    Ok(Json(DataResponse {
        data: ClusterView::from(cluster),
    }))
}

/// POST /clusters
///
/// Multipart: `file` (kubeconfig, required), `name`, `prometheus_url`,
/// `execution_mode`, `default_agent_id`. The new cluster is probed before
/// the response is returned.
pub async fn create_cluster(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    state.license.require(&[features::CLUSTERS])?;

    let form = read_cluster_form(multipart).await?;
    let (data, original_name) = form.kubeconfig.ok_or(AppError::Core(
        CoreError::Validation("A kubeconfig file upload is required.".into()),
    ))?;
    let text = decode_kubeconfig(&data)?;
    let contexts = extract_contexts(&text);

    let name = form
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| contexts.first().cloned())
        .or_else(|| {
            original_name
                .as_deref()
                .and_then(|f| std::path::Path::new(f).file_stem().map(|s| s.to_string_lossy().into_owned()))
        })
        .unwrap_or_else(|| format!("cluster-{}", &uuid::Uuid::new_v4().simple().to_string()[..6]));

    if ClusterRepo::find_by_name(&state.pool, &name).await?.is_some() {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "A cluster named '{name}' already exists."
        ))));
    }

    let prometheus_url = match form.prometheus_url.as_deref() {
        Some(raw) => normalize_prometheus_url(raw)?,
        None => None,
    };

    let execution_mode = form
        .execution_mode
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(Executor::Server.as_str())
        .to_string();
    let default_agent_id = parse_agent_field(form.default_agent_id.as_deref())?;
    validate_execution_mode(&state, &execution_mode, default_agent_id).await?;

    let staged_path = stage_kubeconfig(&state, &data)?;
    let mut cluster = ClusterRepo::create(
        &state.pool,
        &CreateCluster {
            name: name.clone(),
            kubeconfig_path: staged_path.clone(),
            prometheus_url,
            contexts_json: Some(serde_json::to_string(&contexts).unwrap_or_else(|_| "[]".into())),
            execution_mode,
            default_agent_id,
        },
    )
    .await?;

    // Move the blob to its canonical `configs/<cluster-id>.yaml` location
    // now that the id exists.
    let final_path = kubeconfig_path_for(&state, cluster.id);
    if std::fs::rename(&staged_path, &final_path).is_ok() {
        cluster = ClusterRepo::update(
            &state.pool,
            cluster.id,
            &UpdateCluster {
                kubeconfig_path: Some(final_path.to_string_lossy().into_owned()),
                ..Default::default()
            },
        )
        .await?;
    }

    engine::audit_system(
        &state.pool,
        actions::CREATE,
        entities::CLUSTER,
        Some(cluster.id),
        format!("Registered cluster '{name}'."),
    )
    .await;

    let outcome = probe::probe_kubeconfig(&data, state.config.probe_timeout).await;
    log_probe(&name, &outcome);
    let cluster = ClusterRepo::record_connection(&state.pool, cluster.id, &outcome.into_record())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: ClusterView::from(cluster),
        }),
    ))
}

fn parse_agent_field(raw: Option<&str>) -> AppResult<Option<DbId>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| AppError::Core(CoreError::Validation("default_agent_id must be an integer".into()))),
    }
}

fn log_probe(cluster_name: &str, outcome: &probe::ProbeOutcome) {
    use inspect_core::status::ConnectionStatus;
    match outcome.status {
        ConnectionStatus::Connected => {
            tracing::info!(cluster = %cluster_name, "Cluster connectivity check succeeded")
        }
        ConnectionStatus::Warning => {
            tracing::warn!(cluster = %cluster_name, message = %outcome.message, "Cluster connectivity check warning")
        }
        _ => {
            tracing::error!(cluster = %cluster_name, message = %outcome.message, "Cluster connectivity check failed")
        }
    }
}

/// PUT /clusters/{id}
///
/// Multipart with any subset of the create fields; a new kubeconfig
/// triggers a fresh probe and replaces the stored blob.
pub async fn update_cluster(
    State(state): State<AppState>,
    Path(cluster_id): Path<DbId>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    state.license.require(&[features::CLUSTERS])?;

    let cluster = ClusterRepo::find_by_id(&state.pool, cluster_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Cluster",
            id: cluster_id,
        }))?;

    let form = read_cluster_form(multipart).await?;
    let mut update = UpdateCluster::default();
    let original_kubeconfig_path = cluster.kubeconfig_path.clone();
    let mut new_blob: Option<Vec<u8>> = None;

    if let Some(raw_name) = form.name.as_deref() {
        let new_name = raw_name.trim();
        if new_name.is_empty() {
            return Err(AppError::Core(CoreError::Validation(
                "Cluster name must not be empty.".into(),
            )));
        }
        if new_name != cluster.name {
            if let Some(existing) = ClusterRepo::find_by_name(&state.pool, new_name).await? {
                if existing.id != cluster.id {
                    return Err(AppError::Core(CoreError::Conflict(format!(
                        "A cluster named '{new_name}' already exists."
                    ))));
                }
            }
        }
        update.name = Some(new_name.to_string());
    }

    if let Some(raw_url) = form.prometheus_url.as_deref() {
        update.prometheus_url = Some(normalize_prometheus_url(raw_url)?);
    }

    if let Some(mode) = form.execution_mode.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        update.execution_mode = Some(mode.to_string());
    }
    if form.default_agent_id.is_some() {
        update.default_agent_id = Some(parse_agent_field(form.default_agent_id.as_deref())?);
    }
    let effective_mode = update
        .execution_mode
        .clone()
        .unwrap_or_else(|| cluster.execution_mode.clone());
    let effective_agent = update
        .default_agent_id
        .unwrap_or(cluster.default_agent_id);
    validate_execution_mode(&state, &effective_mode, effective_agent).await?;

    if let Some((data, _)) = form.kubeconfig {
        let text = decode_kubeconfig(&data)?;
        let contexts = extract_contexts(&text);
        // Replacement lands directly at the canonical location.
        let path = kubeconfig_path_for(&state, cluster_id);
        write_secret_file(&path, &data)
            .map_err(|e| AppError::InternalError(format!("cannot store kubeconfig: {e}")))?;
        update.kubeconfig_path = Some(path.to_string_lossy().into_owned());
        update.contexts_json =
            Some(serde_json::to_string(&contexts).unwrap_or_else(|_| "[]".into()));
        new_blob = Some(data);
    }

    let cluster = ClusterRepo::update(&state.pool, cluster_id, &update).await?;
    engine::audit_system(
        &state.pool,
        actions::UPDATE,
        entities::CLUSTER,
        Some(cluster.id),
        format!("Updated cluster '{}'.", cluster.name),
    )
    .await;

    let cluster = if let Some(blob) = new_blob {
        let outcome = probe::probe_kubeconfig(&blob, state.config.probe_timeout).await;
        log_probe(&cluster.name, &outcome);
        let updated =
            ClusterRepo::record_connection(&state.pool, cluster.id, &outcome.into_record()).await?;
        // A legacy staging-named blob is superseded by the canonical path.
        if original_kubeconfig_path != updated.kubeconfig_path {
            remove_file_safely(Some(&original_kubeconfig_path));
        }
        updated
    } else {
        cluster
    };

    Ok(Json(DataResponse {
        data: ClusterView::from(cluster),
    }))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DeleteClusterParams {
    #[serde(default)]
    pub delete_files: bool,
}

/// DELETE /clusters/{id}
///
/// Runs cascade in the store; `?delete_files=true` also removes the
/// kubeconfig blob and any report artefacts of the cluster's runs.
pub async fn delete_cluster(
    State(state): State<AppState>,
    Path(cluster_id): Path<DbId>,
    Query(params): Query<DeleteClusterParams>,
) -> AppResult<impl IntoResponse> {
    state.license.require(&[features::CLUSTERS])?;

    let cluster = ClusterRepo::find_by_id(&state.pool, cluster_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Cluster",
            id: cluster_id,
        }))?;

    let report_paths: Vec<Option<String>> = if params.delete_files {
        RunRepo::list(&state.pool, None)
            .await?
            .into_iter()
            .filter(|run| run.cluster_id == cluster_id)
            .map(|run| run.report_path)
            .collect()
    } else {
        Vec::new()
    };

    ClusterRepo::delete(&state.pool, cluster_id).await?;

    if params.delete_files {
        remove_file_safely(Some(&cluster.kubeconfig_path));
        for path in report_paths.iter().flatten() {
            remove_report_files(Some(path));
        }
    }

    engine::audit_system(
        &state.pool,
        actions::DELETE,
        entities::CLUSTER,
        Some(cluster_id),
        format!("Deleted cluster '{}'.", cluster.name),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// POST /clusters/{id}/test-connection
pub async fn test_connection(
    State(state): State<AppState>,
    Path(cluster_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cluster = ClusterRepo::find_by_id(&state.pool, cluster_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Cluster",
            id: cluster_id,
        }))?;

    let blob = tokio::fs::read(&cluster.kubeconfig_path)
        .await
        .map_err(|e| AppError::Core(CoreError::Dependency(format!(
            "Cluster kubeconfig unreadable: {e}"
        ))))?;

    let outcome = probe::probe_kubeconfig(&blob, state.config.probe_timeout).await;
    log_probe(&cluster.name, &outcome);
    let cluster =
        ClusterRepo::record_connection(&state.pool, cluster_id, &outcome.into_record()).await?;

    Ok(Json(DataResponse {
        data: ClusterView::from(cluster),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contexts_are_extracted_from_kubeconfig_yaml() {
        let yaml = "\
apiVersion: v1
kind: Config
contexts:
  - name: staging
    context: {cluster: a, user: b}
  - name: production
    context: {cluster: c, user: d}
";
        assert_eq!(extract_contexts(yaml), vec!["staging", "production"]);
    }

    #[test]
    fn malformed_yaml_yields_no_contexts() {
        assert!(extract_contexts(": not yaml").is_empty());
        assert!(extract_contexts("plain string").is_empty());
    }

    #[test]
    fn prometheus_url_is_normalized() {
        assert_eq!(
            normalize_prometheus_url(" http://prom:9090/ ").unwrap(),
            Some("http://prom:9090".to_string())
        );
        assert_eq!(normalize_prometheus_url("   ").unwrap(), None);
        assert!(normalize_prometheus_url("prom:9090").is_err());
    }
}
