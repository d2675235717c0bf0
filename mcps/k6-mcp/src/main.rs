//! k6 MCP - load test lifecycle management over MCP
//!
//! # Configuration
//! Set `K6_MCP_CONFIG_PATH` or create `~/.binks/k6.toml`.
//! `K6_BINARY` overrides the k6 executable.

use k6_mcp::{telemetry, Config, K6McpServer};
use rmcp::{transport::stdio, ServiceExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(env!("CARGO_CRATE_NAME"))?;

    tracing::info!("Starting k6 MCP Server");

    let config = Config::load()?;
    tracing::info!(
        "k6 binary: {}, control ports from {}",
        config.engine.binary,
        config.ports.base
    );

    let server = K6McpServer::new(config)?;
    let service = server.serve(stdio()).await?;

    tracing::info!("Server running, waiting for requests...");
    service.waiting().await?;

    tracing::info!("Server shutting down");
    Ok(())
}
