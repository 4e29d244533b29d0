// All functions in this module are shared test helpers. Not every test binary
// uses every helper, so we suppress dead_code warnings at the item level.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use inspect_api::config::ServerConfig;
use inspect_api::engine::registry::RunRegistry;
use inspect_api::router::build_app_router;
use inspect_api::state::AppState;
use inspect_core::license::{self, LicenseManager, LicensePayload};
use inspect_core::types::DbId;
use inspect_db::models::cluster::CreateCluster;
use inspect_db::repositories::ClusterRepo;
use inspect_db::DbPool;

/// HMAC secret used for licenses minted by tests.
pub const TEST_LICENSE_SECRET: &str = "integration-test-license-secret";

/// A fully wired application instance over a temporary data directory.
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    // Kept alive so the data directory survives the test.
    _data_dir: TempDir,
}

/// Build a test `ServerConfig` rooted in a private temp directory.
pub fn test_config(data_dir: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        data_dir: data_dir.path().to_path_buf(),
        database_url: String::new(),
        license_secret: Some(TEST_LICENSE_SECRET.to_string()),
        prometheus_url: None,
        agent_lease: Duration::from_secs(300),
        lease_sweep_interval: Duration::from_secs(30),
        probe_timeout: Duration::from_secs(5),
    }
}

/// Build the full application with all middleware layers over the given
/// database pool. Integration tests exercise the same stack production
/// uses.
pub async fn build_test_app(pool: DbPool) -> TestApp {
    let data_dir = TempDir::new().expect("create test data dir");
    let config = test_config(&data_dir);
    config
        .ensure_runtime_directories()
        .expect("create runtime dirs");

    let license = Arc::new(LicenseManager::new(
        config.license_path(),
        config.license_secret.clone(),
    ));

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        license,
        runs: Arc::new(RunRegistry::new()),
    };
    let app = build_app_router(state.clone(), &config);

    TestApp {
        app,
        state,
        _data_dir: data_dir,
    }
}

// ---------------------------------------------------------------------------
// License helpers
// ---------------------------------------------------------------------------

/// Mint a valid license blob with the given feature tags.
pub fn license_blob(features: &[&str]) -> String {
    let payload = LicensePayload {
        product: Some("inspection-platform".into()),
        licensee: Some("Integration Tests".into()),
        issued_at: Some(Utc::now() - chrono::Duration::days(1)),
        not_before: None,
        expires_at: Utc::now() + chrono::Duration::days(30),
        features: features.iter().map(|s| s.to_string()).collect(),
    };
    license::encode(&payload, TEST_LICENSE_SECRET)
}

/// Install a license granting the given features.
pub fn install_license(test_app: &TestApp, features: &[&str]) {
    test_app
        .state
        .license
        .install(&license_blob(features))
        .expect("install test license");
}

/// Install a license granting every gated feature.
pub fn install_full_license(test_app: &TestApp) {
    install_license(test_app, &["clusters", "inspections", "reports"]);
}

// ---------------------------------------------------------------------------
// Fixture helpers
// ---------------------------------------------------------------------------

/// Insert a cluster directly through the repository, with its kubeconfig
/// blob written under the test data directory.
pub async fn create_test_cluster(test_app: &TestApp, name: &str) -> DbId {
    let configs_dir = test_app.state.config.configs_dir();
    let kubeconfig_path = configs_dir.join(format!("{name}.yaml"));
    std::fs::write(&kubeconfig_path, b"apiVersion: v1\nkind: Config\n")
        .expect("write test kubeconfig");

    let cluster = ClusterRepo::create(
        &test_app.state.pool,
        &CreateCluster {
            name: name.to_string(),
            kubeconfig_path: kubeconfig_path.to_string_lossy().into_owned(),
            prometheus_url: None,
            contexts_json: Some("[]".into()),
            execution_mode: "server".into(),
            default_agent_id: None,
        },
    )
    .await
    .expect("create test cluster");
    cluster.id
}

/// Switch a cluster to agent mode with the given default agent.
pub async fn bind_cluster_to_agent(test_app: &TestApp, cluster_id: DbId, agent_id: DbId) {
    sqlx::query("UPDATE clusters SET execution_mode = 'agent', default_agent_id = ? WHERE id = ?")
        .bind(agent_id)
        .bind(cluster_id)
        .execute(&test_app.state.pool)
        .await
        .expect("bind cluster to agent");
}

// ---------------------------------------------------------------------------
// Shared HTTP test helpers
// ---------------------------------------------------------------------------

/// Collect the response body into a `serde_json::Value`.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Collect the response body into raw bytes.
pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

/// Send a JSON request with the given HTTP method.
pub async fn send_json(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST JSON to the given URI and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    send_json(app, Method::POST, uri, body).await
}

/// PUT JSON to the given URI and return the response.
pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> axum::response::Response {
    send_json(app, Method::PUT, uri, body).await
}

/// GET from the given URI.
pub async fn get(app: Router, uri: &str) -> axum::response::Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

/// DELETE the given URI.
pub async fn delete(app: Router, uri: &str) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST an empty body (cancel endpoints and the like).
pub async fn post_empty(app: Router, uri: &str) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

// ---------------------------------------------------------------------------
// Bearer-token HTTP helpers (agent plane)
// ---------------------------------------------------------------------------

/// Send a JSON request with the given HTTP method and a Bearer token.
pub async fn send_json_auth(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> axum::response::Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST JSON with a Bearer token.
pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> axum::response::Response {
    send_json_auth(app, Method::POST, uri, body, token).await
}

/// POST an empty body with a Bearer token.
pub async fn post_empty_auth(app: Router, uri: &str, token: &str) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// GET with a Bearer token.
pub async fn get_auth(app: Router, uri: &str, token: &str) -> axum::response::Response {
    let request = Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

// ---------------------------------------------------------------------------
// Multipart helpers
// ---------------------------------------------------------------------------

/// A single multipart form part.
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub data: &'a [u8],
}

/// POST a multipart form to the given URI.
pub async fn post_multipart(app: Router, uri: &str, parts: &[Part<'_>]) -> axum::response::Response {
    let boundary = "test-boundary-7MA4YWxkTrZu0gW";
    let mut body: Vec<u8> = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match part.filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{filename}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    part.name
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name).as_bytes(),
            ),
        }
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

// ---------------------------------------------------------------------------
// Polling helpers
// ---------------------------------------------------------------------------

/// Poll run detail until the given predicate holds or ~10 s elapse.
pub async fn wait_for_run<F>(test_app: &TestApp, run_id: i64, predicate: F) -> serde_json::Value
where
    F: Fn(&serde_json::Value) -> bool,
{
    for _ in 0..400 {
        let response = get(test_app.app.clone(), &format!("/inspection-runs/{run_id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        if predicate(&json["data"]) {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("run {run_id} did not reach the expected state in time");
}

/// Poll until the run reaches a terminal status.
pub async fn wait_for_terminal(test_app: &TestApp, run_id: i64) -> serde_json::Value {
    wait_for_run(test_app, run_id, |run| {
        matches!(
            run["status"].as_str(),
            Some("completed") | Some("incomplete") | Some("cancelled")
        )
    })
    .await
}
