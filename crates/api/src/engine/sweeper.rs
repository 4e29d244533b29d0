//! Stale-lease sweeper.
//!
//! A silent agent must not block a run forever. Every sweep, agent runs
//! whose lease has expired are detached (`agent_status` back to `queued`,
//! lease cleared) so any puller bound to the same agent can claim them
//! again. Already-submitted results stay intact.

use std::time::Duration;

use chrono::Utc;
use inspect_core::audit::{actions, entities};
use inspect_db::repositories::RunRepo;
use inspect_db::DbPool;
use tokio_util::sync::CancellationToken;

use super::audit_system;

/// Run the sweeper loop until the cancellation token is triggered.
pub async fn run(pool: DbPool, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        "Stale-lease sweeper started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Stale-lease sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = sweep_once(&pool).await {
                    tracing::error!(error = %e, "Lease sweep failed");
                }
            }
        }
    }
}

/// One sweep cycle. Public so tests can drive it without the timer.
pub async fn sweep_once(pool: &DbPool) -> Result<usize, sqlx::Error> {
    let reclaimed = RunRepo::reclaim_expired_leases(pool, Utc::now()).await?;
    for run in &reclaimed {
        tracing::warn!(
            run_id = run.id,
            agent_id = run.agent_id,
            "Agent lease expired, run requeued"
        );
        audit_system(
            pool,
            actions::AGENT_LEASE_EXPIRED,
            entities::INSPECTION_RUN,
            Some(run.id),
            format!(
                "Lease expired for run {} held by agent {}",
                run.id,
                run.agent_id.map_or("unknown".to_string(), |id| id.to_string())
            ),
        )
        .await;
    }
    Ok(reclaimed.len())
}
