//! Integration tests for run admission, execution, cancellation, and
//! report download.

mod common;

use axum::http::StatusCode;
use common::{
    body_bytes, body_json, create_test_cluster, get, install_full_license, install_license,
    post_empty, post_json, wait_for_run, wait_for_terminal,
};
use serde_json::json;
use sqlx::SqlitePool;

async fn create_command_item(
    test_app: &common::TestApp,
    name: &str,
    command: &str,
    success_message: Option<&str>,
) -> i64 {
    let mut config = json!({"command": command, "shell": true, "timeout": 5});
    if let Some(message) = success_message {
        config["success_message"] = json!(message);
    }
    let response = post_json(
        test_app.app.clone(),
        "/inspection-items",
        json!({"name": name, "check_type": "command", "config": config}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["id"].as_i64().unwrap()
}

// --- S1: one command item, completed run with report ----------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn command_run_completes_with_passed_result_and_report(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "s1").await;
    let item_id = create_command_item(&test_app, "Echo OK", "echo ok", Some("ok")).await;

    let response = post_json(
        test_app.app.clone(),
        "/inspection-runs",
        json!({"cluster_id": cluster_id, "item_ids": [item_id], "operator": "ops"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let run_id = created["data"]["id"].as_i64().unwrap();
    assert_eq!(created["data"]["executor"], "server");

    let run = wait_for_terminal(&test_app, run_id).await;
    assert_eq!(run["status"], "completed");
    assert_eq!(run["progress"], 100);
    assert_eq!(run["processed_items"], 1);

    let results = run["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["status"], "passed");
    assert_eq!(results[0]["detail"], "ok");

    // The report artefacts exist on disk once report_path is recorded.
    let run = wait_for_run(&test_app, run_id, |r| !r["report_path"].is_null()).await;
    let report_path = run["report_path"].as_str().unwrap();
    assert!(std::path::Path::new(report_path).exists());
    assert!(std::path::Path::new(report_path).with_extension("md").exists());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn failing_command_yields_incomplete_run(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "failing").await;
    let good = create_command_item(&test_app, "Good", "true", None).await;
    let bad = create_command_item(&test_app, "Bad", "echo doom >&2; exit 2", None).await;

    let created = body_json(
        post_json(
            test_app.app.clone(),
            "/inspection-runs",
            json!({"cluster_id": cluster_id, "item_ids": [good, bad]}),
        )
        .await,
    )
    .await;
    let run_id = created["data"]["id"].as_i64().unwrap();

    let run = wait_for_terminal(&test_app, run_id).await;
    assert_eq!(run["status"], "incomplete");
    assert_eq!(run["progress"], 100);
    let results = run["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["status"], "passed");
    assert_eq!(results[1]["status"], "failed");
    assert!(results[1]["detail"].as_str().unwrap().contains("doom"));
    assert!(run["summary"]
        .as_str()
        .unwrap()
        .contains("1 item(s) passed"));
}

// --- Admission validation -------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn empty_item_selection_is_rejected(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "empty").await;

    let response = post_json(
        test_app.app.clone(),
        "/inspection-runs",
        json!({"cluster_id": cluster_id, "item_ids": []}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn missing_cluster_is_not_found(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);

    let response = post_json(
        test_app.app.clone(),
        "/inspection-runs",
        json!({"cluster_id": 999, "item_ids": [1]}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn unknown_item_is_rejected(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "ghost-items").await;

    let response = post_json(
        test_app.app.clone(),
        "/inspection-runs",
        json!({"cluster_id": cluster_id, "item_ids": [12345]}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// --- S4 (agent-run shape): cancel fills remaining rows --------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn cancel_of_queued_agent_run_fills_all_rows(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "agent-cancel").await;

    // Register an agent and bind the cluster to it so the run queues for
    // the agent executor instead of starting on the server.
    let registered = body_json(
        post_json(
            test_app.app.clone(),
            "/agents",
            json!({"name": "canceller", "cluster_id": cluster_id}),
        )
        .await,
    )
    .await;
    let agent_id = registered["data"]["agent"]["id"].as_i64().unwrap();
    common::bind_cluster_to_agent(&test_app, cluster_id, agent_id).await;

    let mut item_ids = Vec::new();
    for i in 0..5 {
        item_ids.push(create_command_item(&test_app, &format!("Item {i}"), "true", None).await);
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
    let run_id = created["data"]["id"].as_i64().unwrap();
    assert_eq!(created["data"]["executor"], "agent");
    assert_eq!(created["data"]["status"], "queued");

    let response = post_empty(test_app.app.clone(), &format!("/inspection-runs/{run_id}/cancel")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cancelled = body_json(response).await;

    assert_eq!(cancelled["data"]["status"], "cancelled");
    assert_eq!(cancelled["data"]["agent_status"], "failed");
    assert!(!cancelled["data"]["completed_at"].is_null());
    assert_eq!(cancelled["data"]["progress"], 100);

    let results = cancelled["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 5);
    for result in results {
        assert_eq!(result["status"], "failed");
        assert!(result["detail"].as_str().unwrap().contains("cancelled"));
    }
}

#[sqlx::test(migrations = "../db/migrations")]
async fn cancel_mid_run_preserves_computed_results(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "mid-cancel").await;

    let mut item_ids = Vec::new();
    item_ids.push(create_command_item(&test_app, "Fast 1", "true", None).await);
    item_ids.push(create_command_item(&test_app, "Fast 2", "true", None).await);
    for i in 0..3 {
        item_ids.push(create_command_item(&test_app, &format!("Slow {i}"), "sleep 2", None).await);
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
    let run_id = created["data"]["id"].as_i64().unwrap();

    // Wait until the fast items are recorded, then cancel while a slow
    // item is still executing.
    wait_for_run(&test_app, run_id, |run| {
        run["processed_items"].as_i64().unwrap_or(0) >= 2
    })
    .await;
    let response = post_empty(test_app.app.clone(), &format!("/inspection-runs/{run_id}/cancel")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let run = wait_for_terminal(&test_app, run_id).await;
    assert_eq!(run["status"], "cancelled");
    assert!(!run["completed_at"].is_null());

    let results = run["results"].as_array().unwrap();
    assert_eq!(results.len(), 5);
    // The fast items keep their real outcomes.
    assert_eq!(results[0]["status"], "passed");
    assert_eq!(results[1]["status"], "passed");
    // At least the tail of the plan was skipped by the cancel.
    let cancelled_rows = results
        .iter()
        .filter(|r| {
            r["detail"]
                .as_str()
                .map(|d| d.contains("cancelled"))
                .unwrap_or(false)
        })
        .count();
    assert!(cancelled_rows >= 1, "some items must be cancelled-skipped");

    // Cancelling a terminal run is idempotent.
    let again = post_empty(test_app.app.clone(), &format!("/inspection-runs/{run_id}/cancel")).await;
    assert_eq!(again.status(), StatusCode::OK);
    let again = body_json(again).await;
    assert_eq!(again["data"]["status"], "cancelled");
}

// --- Report download ------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn report_download_in_both_formats(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "reports").await;
    let item_id = create_command_item(&test_app, "Echo", "echo ok", Some("ok")).await;

    let created = body_json(
        post_json(
            test_app.app.clone(),
            "/inspection-runs",
            json!({"cluster_id": cluster_id, "item_ids": [item_id]}),
        )
        .await,
    )
    .await;
    let run_id = created["data"]["id"].as_i64().unwrap();
    wait_for_run(&test_app, run_id, |r| !r["report_path"].is_null()).await;

    let pdf = get(
        test_app.app.clone(),
        &format!("/inspection-runs/{run_id}/report?format=pdf"),
    )
    .await;
    assert_eq!(pdf.status(), StatusCode::OK);
    assert_eq!(pdf.headers()["content-type"], "application/pdf");
    let pdf_bytes = body_bytes(pdf).await;
    assert!(pdf_bytes.starts_with(b"%PDF-1.4"));

    let md = get(
        test_app.app.clone(),
        &format!("/inspection-runs/{run_id}/report?format=md"),
    )
    .await;
    assert_eq!(md.status(), StatusCode::OK);
    let md_text = String::from_utf8(body_bytes(md).await).unwrap();
    assert!(md_text.contains("Kubernetes Inspection Report"));

    // Without the `reports` feature the download is forbidden.
    install_license(&test_app, &["clusters", "inspections"]);
    let denied = get(
        test_app.app.clone(),
        &format!("/inspection-runs/{run_id}/report?format=pdf"),
    )
    .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
}

// --- Deletion -------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn delete_run_removes_rows_and_optionally_files(pool: SqlitePool) {
    let test_app = common::build_test_app(pool).await;
    install_full_license(&test_app);
    let cluster_id = create_test_cluster(&test_app, "deletable").await;
    let item_id = create_command_item(&test_app, "Echo", "echo ok", None).await;

    let created = body_json(
        post_json(
            test_app.app.clone(),
            "/inspection-runs",
            json!({"cluster_id": cluster_id, "item_ids": [item_id]}),
        )
        .await,
    )
    .await;
    let run_id = created["data"]["id"].as_i64().unwrap();
    let run = wait_for_run(&test_app, run_id, |r| !r["report_path"].is_null()).await;
    let report_path = run["report_path"].as_str().unwrap().to_string();

    let response = common::delete(
        test_app.app.clone(),
        &format!("/inspection-runs/{run_id}?delete_files=true"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(!std::path::Path::new(&report_path).exists());
    let gone = get(test_app.app.clone(), &format!("/inspection-runs/{run_id}")).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}
