//! `inspect-agent` -- standalone inspection worker.
//!
//! Polls the server's agent plane for reserved tasks, evaluates them
//! against the local cluster with the shared check engine, and pushes
//! the results back. The server never dials the agent.

use inspect_agent::client::AgentClient;
use inspect_agent::config::AgentConfig;
use inspect_agent::runner::AgentRunner;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inspect_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Configuration error");
            std::process::exit(1);
        }
    };

    let client = match AgentClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Cannot build HTTP client");
            std::process::exit(1);
        }
    };

    tracing::info!(
        server = %config.server_base,
        agent_id = config.agent_id,
        "Agent configured"
    );

    AgentRunner::new(config, client).run_forever().await;
}
