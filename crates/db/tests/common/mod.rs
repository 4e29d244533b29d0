// Shared fixtures for the repository integration tests. Not every test
// binary uses every helper.
#![allow(dead_code)]

use inspect_core::item::ItemSnapshot;
use inspect_core::status::{AgentPhase, Executor};
use inspect_core::types::DbId;
use inspect_db::models::cluster::CreateCluster;
use inspect_db::models::item::CreateItem;
use inspect_db::models::run::CreateRun;
use inspect_db::repositories::{ClusterRepo, ItemRepo, RunRepo};
use inspect_db::DbPool;

pub async fn create_cluster(pool: &DbPool, name: &str) -> DbId {
    ClusterRepo::create(
        pool,
        &CreateCluster {
            name: name.to_string(),
            kubeconfig_path: format!("/tmp/{name}.yaml"),
            prometheus_url: None,
            contexts_json: Some("[]".into()),
            execution_mode: Executor::Server.as_str().into(),
            default_agent_id: None,
        },
    )
    .await
    .expect("create cluster")
    .id
}

pub async fn create_item(pool: &DbPool, name: &str) -> DbId {
    ItemRepo::create(
        pool,
        &CreateItem {
            name: name.to_string(),
            description: None,
            check_type: "command".into(),
            config: Some(serde_json::json!({"command": "true"})),
        },
    )
    .await
    .expect("create item")
    .id
}

/// Build a plan snapshot for the given `(id, name)` pairs.
pub fn plan_json(items: &[(DbId, &str)]) -> String {
    let plan: Vec<ItemSnapshot> = items
        .iter()
        .map(|(id, name)| ItemSnapshot {
            item_id: *id,
            name: name.to_string(),
            check_type: "command".into(),
            config: serde_json::json!({"command": "true"}),
        })
        .collect();
    serde_json::to_string(&plan).unwrap()
}

/// Create a server-executor run over the given items.
pub async fn create_server_run(pool: &DbPool, cluster_id: DbId, items: &[(DbId, &str)]) -> DbId {
    RunRepo::create(
        pool,
        &CreateRun {
            cluster_id,
            operator: None,
            executor: Executor::Server.as_str().into(),
            agent_id: None,
            agent_status: None,
            total_items: items.len() as i64,
            plan_json: plan_json(items),
        },
    )
    .await
    .expect("create run")
    .id
}

/// Create a queued agent-executor run over the given items.
pub async fn create_agent_run(
    pool: &DbPool,
    cluster_id: DbId,
    agent_id: DbId,
    items: &[(DbId, &str)],
) -> DbId {
    RunRepo::create(
        pool,
        &CreateRun {
            cluster_id,
            operator: None,
            executor: Executor::Agent.as_str().into(),
            agent_id: Some(agent_id),
            agent_status: Some(AgentPhase::Queued.as_str().into()),
            total_items: items.len() as i64,
            plan_json: plan_json(items),
        },
    )
    .await
    .expect("create agent run")
    .id
}
