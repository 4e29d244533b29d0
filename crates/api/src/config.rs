//! Server configuration loaded from environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Base directory for kubeconfigs, reports, the embedded DB, and the
    /// license file (default: `/app/data`).
    pub data_dir: PathBuf,
    /// External database URL; defaults to the embedded SQLite file.
    pub database_url: String,
    /// HMAC key used to verify license blobs.
    pub license_secret: Option<String>,
    /// Default Prometheus base URL for clusters without their own.
    pub prometheus_url: Option<String>,
    /// Agent lease TTL (default: 5 minutes).
    pub agent_lease: Duration,
    /// Stale-lease sweeper cadence (default: 30 seconds).
    pub lease_sweep_interval: Duration,
    /// Cluster connection probe budget (default: 10 seconds).
    pub probe_timeout: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `HOST`                     | `0.0.0.0`               |
    /// | `PORT`                     | `8080`                  |
    /// | `CORS_ORIGINS`             | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                    |
    /// | `DATA_DIR`                 | `/app/data`             |
    /// | `DATABASE_URL`             | `sqlite://<DATA_DIR>/inspection.db` |
    /// | `LICENSE_SECRET`           | unset                   |
    /// | `PROMETHEUS_URL`           | unset                   |
    /// | `AGENT_LEASE_SECS`         | `300`                   |
    /// | `LEASE_SWEEP_INTERVAL_SECS`| `30`                    |
    /// | `PROBE_TIMEOUT_SECS`       | `10`                    |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let data_dir =
            PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "/app/data".into()));

        let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!("sqlite://{}", data_dir.join("inspection.db").display())
        });

        let license_secret = std::env::var("LICENSE_SECRET").ok().filter(|s| !s.is_empty());
        let prometheus_url = std::env::var("PROMETHEUS_URL").ok().filter(|s| !s.is_empty());

        ServerConfig {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            data_dir,
            database_url,
            license_secret,
            prometheus_url,
            agent_lease: duration_from_env("AGENT_LEASE_SECS", 300),
            lease_sweep_interval: duration_from_env("LEASE_SWEEP_INTERVAL_SECS", 30),
            probe_timeout: duration_from_env("PROBE_TIMEOUT_SECS", 10),
        }
    }

    /// Directory holding stored kubeconfig blobs.
    pub fn configs_dir(&self) -> PathBuf {
        self.data_dir.join("configs")
    }

    /// Directory holding emitted report artefacts.
    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    /// Path of the installed license blob.
    pub fn license_path(&self) -> PathBuf {
        self.data_dir.join("license").join("license.key")
    }

    /// Create the runtime directory tree. Secret-bearing directories are
    /// restricted to the server user.
    pub fn ensure_runtime_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.configs_dir())?;
        std::fs::create_dir_all(self.reports_dir())?;
        std::fs::create_dir_all(self.data_dir.join("license"))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            for dir in [self.configs_dir(), self.data_dir.join("license")] {
                std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
            }
        }
        Ok(())
    }
}

fn duration_from_env(var: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

/// Write a secret-bearing file with owner-only permissions.
pub fn write_secret_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
