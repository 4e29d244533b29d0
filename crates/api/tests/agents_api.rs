//! Integration tests for the agent plane: registration, authentication,
//! task leases, idempotent submission, and failure reports.

mod common;

use axum::http::StatusCode;
use common::{
    body_json, create_test_cluster, get_auth, install_full_license, post_empty_auth, post_json,
    post_json_auth, wait_for_run,
};
use inspect_api::engine::sweeper;
use serde_json::json;
use sqlx::SqlitePool;

/// Register an agent and return `(agent_id, token)`.
async fn register_agent(test_app: &common::TestApp, name: &str, cluster_id: i64) -> (i64, String) {
    let response = post_json(
        test_app.app.clone(),
        "/agents",
        json!({"name": name, "cluster_id": cluster_id}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    (
        json["data"]["agent"]["id"].as_i64().unwrap(),
        json["data"]["token"].as_str().unwrap().to_string(),
    )
}

/// Create an agent-executed run with the given number of command items.
async fn create_agent_run(
    test_app: &common::TestApp,
    cluster_id: i64,
    agent_id: i64,
    items: usize,
) -> (i64, Vec<i64>) {
    common::bind_cluster_to_agent(test_app, cluster_id, agent_id).await;

    let mut item_ids = Vec::new();
    for i in 0..items {
        let response = post_json(
            test_app.app.clone(),
            "/inspection-items",
            json!({
                "name": format!("Agent item {cluster_id}-{i}"),
                "check_type": "command",
                "config": {"command": "true", "shell": true, "timeout": 5}
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        item_ids.push(body_json(response).await["data"]["id"].as_i64().unwrap());
    }

    let created = body_json(
        post_json(
            test_app.app.clone(),
            "/inspection-runs",
            json!({"cluster_id": cluster_id, "item_ids": item_ids}),
        )
        .await,
    )
    .await;
    assert_eq!(created["data"]["executor"], "agent");
    assert_eq!(created["data"]["agent_status"], "queued");
    (created["data"]["id"].as_i64().unwrap(), item_ids)
}

// --- Registration ---------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn registration_returns_token_once_and_rotates_on_rereg(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "reg").await;

    let (agent_id, token) = register_agent(&test_app, "worker-a", cluster_id).await;
    assert!(!token.is_empty());

    // Same name + same cluster rotates the token, keeping the identity.
    let (same_id, new_token) = register_agent(&test_app, "worker-a", cluster_id).await;
    assert_eq!(agent_id, same_id);
    assert_ne!(token, new_token);

    // The old token no longer authenticates; the new one does.
    let stale = post_empty_auth(
        test_app.app.clone(),
        &format!("/agents/{agent_id}/heartbeat"),
        &token,
    )
    .await;
    assert_eq!(stale.status(), StatusCode::UNAUTHORIZED);

    let fresh = post_empty_auth(
        test_app.app.clone(),
        &format!("/agents/{agent_id}/heartbeat"),
        &new_token,
    )
    .await;
    assert_eq!(fresh.status(), StatusCode::OK);
    let heartbeat = body_json(fresh).await;
    assert!(heartbeat["data"]["server_time"].is_string());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn same_name_on_another_cluster_conflicts(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_a = create_test_cluster(&test_app, "conf-a").await;
    let cluster_b = create_test_cluster(&test_app, "conf-b").await;

    register_agent(&test_app, "pinned", cluster_a).await;
    let response = post_json(
        test_app.app.clone(),
        "/agents",
        json!({"name": "pinned", "cluster_id": cluster_b}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn missing_or_malformed_bearer_is_unauthenticated(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "auth").await;
    let (agent_id, _token) = register_agent(&test_app, "worker-auth", cluster_id).await;

    let no_header = common::post_empty(
        test_app.app.clone(),
        &format!("/agents/{agent_id}/heartbeat"),
    )
    .await;
    assert_eq!(no_header.status(), StatusCode::UNAUTHORIZED);

    let wrong_token = post_empty_auth(
        test_app.app.clone(),
        &format!("/agents/{agent_id}/heartbeat"),
        "definitely-not-the-token",
    )
    .await;
    assert_eq!(wrong_token.status(), StatusCode::UNAUTHORIZED);
}

// --- S3: lease reclaim ----------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn expired_lease_requeues_the_run_for_the_same_agent(pool: SqlitePool) {
    let test_app = common::build_test_app(pool.clone()).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "lease").await;
    let (agent_id, token) = register_agent(&test_app, "leaser", cluster_id).await;
    let (run_id, item_ids) = create_agent_run(&test_app, cluster_id, agent_id, 3).await;

    // First pull claims the run and reserves all three items.
    let pulled = body_json(
        get_auth(
            test_app.app.clone(),
            &format!("/agents/{agent_id}/tasks?limit=10"),
            &token,
        )
        .await,
    )
    .await;
    let tasks = pulled["data"].as_array().unwrap();
    assert_eq!(tasks.len(), 3);
    assert!(tasks.iter().all(|t| t["run_id"] == json!(run_id)));
    assert!(tasks[0]["lease_expires_at"].is_string());

    // A second pull sees nothing: the run is reserved.
    let empty = body_json(
        get_auth(
            test_app.app.clone(),
            &format!("/agents/{agent_id}/tasks?limit=10"),
            &token,
        )
        .await,
    )
    .await;
    assert_eq!(empty["data"].as_array().unwrap().len(), 0);

    // The clock advances past the lease without a single submit.
    sqlx::query("UPDATE inspection_runs SET lease_expires_at = ? WHERE id = ?")
        .bind(chrono::Utc::now() - chrono::Duration::minutes(1))
        .bind(run_id)
        .execute(&pool)
        .await
        .unwrap();

    let reclaimed = sweeper::sweep_once(&pool).await.unwrap();
    assert_eq!(reclaimed, 1);

    let run = wait_for_run(&test_app, run_id, |r| r["agent_status"] == json!("queued")).await;
    assert_eq!(run["status"], "running");

    // The same agent pulls the same three items with a fresh lease.
    let repulled = body_json(
        get_auth(
            test_app.app.clone(),
            &format!("/agents/{agent_id}/tasks?limit=10"),
            &token,
        )
        .await,
    )
    .await;
    let tasks = repulled["data"].as_array().unwrap();
    assert_eq!(tasks.len(), 3);
    let mut pulled_items: Vec<i64> = tasks
        .iter()
        .map(|t| t["item_id"].as_i64().unwrap())
        .collect();
    pulled_items.sort_unstable();
    let mut expected = item_ids.clone();
    expected.sort_unstable();
    assert_eq!(pulled_items, expected);
}

// --- S5: idempotent result submission -------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn duplicate_submit_keeps_first_row_and_counts_once(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "dup-submit").await;
    let (agent_id, token) = register_agent(&test_app, "submitter", cluster_id).await;
    let (run_id, item_ids) = create_agent_run(&test_app, cluster_id, agent_id, 2).await;

    // Claim the run first.
    get_auth(
        test_app.app.clone(),
        &format!("/agents/{agent_id}/tasks?limit=10"),
        &token,
    )
    .await;

    let first = post_json_auth(
        test_app.app.clone(),
        &format!("/agents/{agent_id}/results"),
        json!({"run_id": run_id, "results": [
            {"item_id": item_ids[0], "status": "passed", "detail": "first detail"}
        ]}),
        &token,
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);
    let first = body_json(first).await;
    assert_eq!(first["data"]["applied"], 1);
    assert_eq!(first["data"]["run"]["processed_items"], 1);

    // The duplicate carries a different detail; it must change nothing.
    let second = post_json_auth(
        test_app.app.clone(),
        &format!("/agents/{agent_id}/results"),
        json!({"run_id": run_id, "results": [
            {"item_id": item_ids[0], "status": "passed", "detail": "second detail"}
        ]}),
        &token,
    )
    .await;
    assert_eq!(second.status(), StatusCode::OK);
    let second = body_json(second).await;
    assert_eq!(second["data"]["applied"], 0);
    assert_eq!(second["data"]["run"]["processed_items"], 1);

    let run = wait_for_run(&test_app, run_id, |_| true).await;
    let results = run["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["detail"], "first detail");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn final_submit_finalises_the_run(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "agent-finish").await;
    let (agent_id, token) = register_agent(&test_app, "finisher", cluster_id).await;
    let (run_id, item_ids) = create_agent_run(&test_app, cluster_id, agent_id, 2).await;

    get_auth(
        test_app.app.clone(),
        &format!("/agents/{agent_id}/tasks?limit=10"),
        &token,
    )
    .await;

    let results: Vec<serde_json::Value> = item_ids
        .iter()
        .map(|id| json!({"item_id": id, "status": "passed", "detail": "fine"}))
        .collect();
    let response = post_json_auth(
        test_app.app.clone(),
        &format!("/agents/{agent_id}/results"),
        json!({"run_id": run_id, "results": results}),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let submitted = body_json(response).await;

    assert_eq!(submitted["data"]["run"]["status"], "completed");
    assert_eq!(submitted["data"]["run"]["agent_status"], "finished");
    assert_eq!(submitted["data"]["run"]["progress"], 100);

    let run = wait_for_run(&test_app, run_id, |r| !r["report_path"].is_null()).await;
    assert!(std::path::Path::new(run["report_path"].as_str().unwrap()).exists());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn mixed_results_finalise_as_incomplete(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "agent-mixed").await;
    let (agent_id, token) = register_agent(&test_app, "mixer", cluster_id).await;
    let (run_id, item_ids) = create_agent_run(&test_app, cluster_id, agent_id, 2).await;

    get_auth(
        test_app.app.clone(),
        &format!("/agents/{agent_id}/tasks?limit=10"),
        &token,
    )
    .await;

    let response = post_json_auth(
        test_app.app.clone(),
        &format!("/agents/{agent_id}/results"),
        json!({"run_id": run_id, "results": [
            {"item_id": item_ids[0], "status": "passed"},
            {"item_id": item_ids[1], "status": "warning", "detail": "meh"}
        ]}),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let submitted = body_json(response).await;
    assert_eq!(submitted["data"]["run"]["status"], "incomplete");
}

// --- Agent-reported fatal failure -----------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn reported_failure_fails_remaining_items(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "agent-fatal").await;
    let (agent_id, token) = register_agent(&test_app, "fatalist", cluster_id).await;
    let (run_id, item_ids) = create_agent_run(&test_app, cluster_id, agent_id, 3).await;

    get_auth(
        test_app.app.clone(),
        &format!("/agents/{agent_id}/tasks?limit=10"),
        &token,
    )
    .await;

    // One item succeeds before the agent gives up.
    post_json_auth(
        test_app.app.clone(),
        &format!("/agents/{agent_id}/results"),
        json!({"run_id": run_id, "results": [
            {"item_id": item_ids[0], "status": "passed", "detail": "done"}
        ]}),
        &token,
    )
    .await;

    let response = post_json_auth(
        test_app.app.clone(),
        &format!("/agents/{agent_id}/failures"),
        json!({"run_id": run_id, "reason": "kubeconfig unreadable"}),
        &token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let failed = body_json(response).await;
    assert_eq!(failed["data"]["status"], "incomplete");
    assert_eq!(failed["data"]["agent_status"], "failed");

    let run = wait_for_run(&test_app, run_id, |_| true).await;
    let results = run["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["status"], "passed");
    assert!(results[1]["detail"]
        .as_str()
        .unwrap()
        .contains("kubeconfig unreadable"));
    assert!(results[2]["status"] == json!("failed"));
}

// --- Task payload shape ---------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn pulled_tasks_carry_item_snapshot_and_cluster_context(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "payload").await;
    let (agent_id, token) = register_agent(&test_app, "payloader", cluster_id).await;
    let (run_id, item_ids) = create_agent_run(&test_app, cluster_id, agent_id, 1).await;

    let pulled = body_json(
        get_auth(
            test_app.app.clone(),
            &format!("/agents/{agent_id}/tasks?limit=1"),
            &token,
        )
        .await,
    )
    .await;
    let task = &pulled["data"][0];
    assert_eq!(task["run_id"], json!(run_id));
    assert_eq!(task["item_id"], json!(item_ids[0]));
    assert_eq!(task["item_snapshot"]["check_type"], "command");
    assert_eq!(task["item_snapshot"]["config"]["command"], "true");
    assert_eq!(task["cluster_context"]["cluster_id"], json!(cluster_id));
    assert_eq!(task["cluster_context"]["cluster_name"], "payload");
}
