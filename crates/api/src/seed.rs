//! Default inspection item seeding.
//!
//! The nine builtin checks are inserted by name at startup when absent,
//! so a fresh installation has a usable catalogue. Seeding is idempotent
//! and never overwrites operator edits.

use inspect_db::models::item::CreateItem;
use inspect_db::repositories::ItemRepo;
use inspect_db::DbPool;

/// `(name, description, check_type)` of each seeded default.
const DEFAULT_CHECKS: &[(&str, &str, &str)] = &[
    (
        "Cluster Version",
        "Collects Kubernetes API server and kubectl client version.",
        "cluster_version",
    ),
    ("Node Health", "Verifies all nodes are Ready.", "nodes_status"),
    (
        "Pod Status",
        "Checks for non-running pods cluster-wide.",
        "pods_status",
    ),
    (
        "Recent Events",
        "Fetches latest cluster events ordered by timestamp.",
        "events_recent",
    ),
    (
        "Cluster CPU Usage",
        "Aggregated CPU utilisation via Prometheus metrics.",
        "cluster_cpu_usage",
    ),
    (
        "Cluster Memory Usage",
        "Overall memory utilisation from Prometheus.",
        "cluster_memory_usage",
    ),
    (
        "Node CPU Hotspots",
        "Highlights nodes with highest CPU usage.",
        "node_cpu_hotspots",
    ),
    (
        "Node Memory Pressure",
        "Highlights nodes with highest memory usage.",
        "node_memory_pressure",
    ),
    (
        "Cluster Disk IO",
        "Monitors node disk IO time ratio.",
        "cluster_disk_io",
    ),
];

/// Insert any missing default items. Returns how many were created.
pub async fn seed_default_items(pool: &DbPool) -> Result<usize, sqlx::Error> {
    let mut created = 0usize;
    for (name, description, check_type) in DEFAULT_CHECKS {
        if ItemRepo::find_by_name(pool, name).await?.is_some() {
            continue;
        }
        let input = CreateItem {
            name: name.to_string(),
            description: Some(description.to_string()),
            check_type: check_type.to_string(),
            config: None,
        };
        ItemRepo::create(pool, &input).await?;
        created += 1;
    }
    if created > 0 {
        tracing::info!(created, "Seeded default inspection items");
    }
    Ok(created)
}
