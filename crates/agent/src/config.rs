//! Agent configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Why configuration loading failed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),
    #[error("{0} must be a valid integer")]
    InvalidInt(&'static str),
    #[error("cannot read token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Runtime configuration of the agent binary.
///
/// | Variable                     | Required | Default | Description                         |
/// |------------------------------|----------|---------|-------------------------------------|
/// | `INSPECT_AGENT_SERVER`       | yes      | --      | Server base URL                     |
/// | `INSPECT_AGENT_ID`           | yes      | --      | Agent id issued at registration     |
/// | `INSPECT_AGENT_TOKEN`        | yes*     | --      | Bearer token (*or token file)       |
/// | `INSPECT_AGENT_TOKEN_FILE`   | no       | --      | File holding the bearer token       |
/// | `INSPECT_AGENT_KUBECONFIG`   | no       | --      | Kubeconfig used for kubectl checks  |
/// | `INSPECT_AGENT_PROM_URL`     | no       | --      | Prometheus base URL override        |
/// | `INSPECT_AGENT_POLL_INTERVAL`| no       | `10`    | Seconds between idle polls          |
/// | `INSPECT_AGENT_BATCH_SIZE`   | no       | `1`     | Runs claimed per poll               |
/// | `INSPECT_AGENT_TIMEOUT`      | no       | `15`    | Per-request HTTP timeout in seconds |
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub server_base: String,
    pub agent_id: i64,
    pub token: String,
    pub kubeconfig_path: Option<PathBuf>,
    pub prometheus_url: Option<String>,
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub request_timeout: Duration,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_base = std::env::var("INSPECT_AGENT_SERVER")
            .map_err(|_| ConfigError::MissingVar("INSPECT_AGENT_SERVER"))?
            .trim_end_matches('/')
            .to_string();

        let agent_id: i64 = std::env::var("INSPECT_AGENT_ID")
            .map_err(|_| ConfigError::MissingVar("INSPECT_AGENT_ID"))?
            .parse()
            .map_err(|_| ConfigError::InvalidInt("INSPECT_AGENT_ID"))?;

        let token = match std::env::var("INSPECT_AGENT_TOKEN") {
            Ok(token) if !token.trim().is_empty() => token.trim().to_string(),
            _ => {
                let path = PathBuf::from(
                    std::env::var("INSPECT_AGENT_TOKEN_FILE")
                        .map_err(|_| ConfigError::MissingVar("INSPECT_AGENT_TOKEN"))?,
                );
                std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::TokenFile {
                        path: path.clone(),
                        source,
                    })?
                    .trim()
                    .to_string()
            }
        };

        let kubeconfig_path = std::env::var("INSPECT_AGENT_KUBECONFIG")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let prometheus_url = std::env::var("INSPECT_AGENT_PROM_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .map(|v| v.trim_end_matches('/').to_string());

        Ok(AgentConfig {
            server_base,
            agent_id,
            token,
            kubeconfig_path,
            prometheus_url,
            poll_interval: Duration::from_secs(int_var("INSPECT_AGENT_POLL_INTERVAL", 10)?),
            batch_size: int_var("INSPECT_AGENT_BATCH_SIZE", 1)? as i64,
            request_timeout: Duration::from_secs(int_var("INSPECT_AGENT_TIMEOUT", 15)?),
        })
    }
}

fn int_var(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::InvalidInt(var))
        }
        _ => Ok(default),
    }
}
