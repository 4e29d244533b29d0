//! Repository-level tests of the agent task lease protocol.

mod common;

use chrono::{Duration, Utc};
use common::{create_agent_run, create_cluster, create_item};
use inspect_db::repositories::RunRepo;
use sqlx::SqlitePool;

async fn fixture_agent(pool: &SqlitePool, name: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO inspection_agents (name, token_hash, created_at, updated_at) \
         VALUES (?, 'hash', ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(Utc::now())
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
async fn claim_reserves_the_run_for_one_puller(pool: SqlitePool) {
    let cluster = create_cluster(&pool, "claim").await;
    let agent = fixture_agent(&pool, "claimer").await;
    let a = create_item(&pool, "a").await;
    let run_id = create_agent_run(&pool, cluster, agent, &[(a, "a")]).await;

    let lease = Utc::now() + Duration::minutes(5);
    let first = RunRepo::claim_queued_for_agent(&pool, agent, 10, lease).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].id, run_id);
    assert_eq!(first[0].agent_status.as_deref(), Some("running"));
    assert_eq!(first[0].status, "running");
    assert!(first[0].lease_expires_at.is_some());
    assert!(first[0].started_at.is_some());

    // The claim is exclusive until the lease lapses.
    let second = RunRepo::claim_queued_for_agent(&pool, agent, 10, lease).await.unwrap();
    assert!(second.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn claim_only_returns_runs_of_the_asking_agent(pool: SqlitePool) {
    let cluster = create_cluster(&pool, "ownership").await;
    let owner = fixture_agent(&pool, "owner").await;
    let other = fixture_agent(&pool, "other").await;
    let a = create_item(&pool, "a").await;
    create_agent_run(&pool, cluster, owner, &[(a, "a")]).await;

    let lease = Utc::now() + Duration::minutes(5);
    let stolen = RunRepo::claim_queued_for_agent(&pool, other, 10, lease).await.unwrap();
    assert!(stolen.is_empty());

    let claimed = RunRepo::claim_queued_for_agent(&pool, owner, 10, lease).await.unwrap();
    assert_eq!(claimed.len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn claim_respects_the_limit_in_creation_order(pool: SqlitePool) {
    let cluster = create_cluster(&pool, "limited").await;
    let agent = fixture_agent(&pool, "limited-agent").await;
    let a = create_item(&pool, "a").await;
    let first_run = create_agent_run(&pool, cluster, agent, &[(a, "a")]).await;
    let second_run = create_agent_run(&pool, cluster, agent, &[(a, "a")]).await;

    let lease = Utc::now() + Duration::minutes(5);
    let claimed = RunRepo::claim_queued_for_agent(&pool, agent, 1, lease).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, first_run);

    let rest = RunRepo::claim_queued_for_agent(&pool, agent, 1, lease).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].id, second_run);
}

#[sqlx::test(migrations = "./migrations")]
async fn expired_leases_are_reclaimed_and_reclaimable(pool: SqlitePool) {
    let cluster = create_cluster(&pool, "expiry").await;
    let agent = fixture_agent(&pool, "expired-agent").await;
    let a = create_item(&pool, "a").await;
    let run_id = create_agent_run(&pool, cluster, agent, &[(a, "a")]).await;

    // Claim with a lease already in the past.
    let stale_lease = Utc::now() - Duration::minutes(1);
    RunRepo::claim_queued_for_agent(&pool, agent, 10, stale_lease).await.unwrap();

    let reclaimed = RunRepo::reclaim_expired_leases(&pool, Utc::now()).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, run_id);
    assert_eq!(reclaimed[0].agent_status.as_deref(), Some("queued"));
    assert!(reclaimed[0].lease_expires_at.is_none());
    // The run itself stays `running`; only the agent reservation resets.
    assert_eq!(reclaimed[0].status, "running");

    // The same agent can claim it again with a fresh lease.
    let fresh = Utc::now() + Duration::minutes(5);
    let again = RunRepo::claim_queued_for_agent(&pool, agent, 10, fresh).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].id, run_id);
}

#[sqlx::test(migrations = "./migrations")]
async fn live_leases_are_left_alone(pool: SqlitePool) {
    let cluster = create_cluster(&pool, "alive").await;
    let agent = fixture_agent(&pool, "alive-agent").await;
    let a = create_item(&pool, "a").await;
    create_agent_run(&pool, cluster, agent, &[(a, "a")]).await;

    let lease = Utc::now() + Duration::minutes(5);
    RunRepo::claim_queued_for_agent(&pool, agent, 10, lease).await.unwrap();

    let reclaimed = RunRepo::reclaim_expired_leases(&pool, Utc::now()).await.unwrap();
    assert!(reclaimed.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn refresh_extends_a_running_lease(pool: SqlitePool) {
    let cluster = create_cluster(&pool, "refresh").await;
    let agent = fixture_agent(&pool, "refresher").await;
    let a = create_item(&pool, "a").await;
    let run_id = create_agent_run(&pool, cluster, agent, &[(a, "a")]).await;

    let short = Utc::now() + Duration::seconds(10);
    RunRepo::claim_queued_for_agent(&pool, agent, 10, short).await.unwrap();

    let extended = Utc::now() + Duration::minutes(5);
    RunRepo::refresh_lease(&pool, run_id, extended).await.unwrap();

    let run = RunRepo::find_by_id(&pool, run_id).await.unwrap().unwrap();
    let lease = run.lease_expires_at.unwrap();
    assert!(lease > Utc::now() + Duration::minutes(4));
}
