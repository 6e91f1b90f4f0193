mod config;
mod knowledge_base;
mod query;
mod server;

pub const USER_AGENT: &str = concat!("kb-query/", env!("CARGO_PKG_VERSION"));

use std::time::Duration;

use clap::Parser;
use reqwest::Client;
use tracing::info;

use knowledge_base::KnowledgeBaseClient;
use query::QueryOrchestrator;

/// TCP connection establishment timeout for the upstream client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kb_query=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    config::load_env_file()?;
    let config = config::Cli::parse().into_config()?;
    config.log_summary();

    let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
    let client = KnowledgeBaseClient::new(
        http,
        &config.upstream.endpoint,
        config.upstream.api_key.clone(),
        config.upstream.timeout,
        config.upstream.max_attempts,
    );
    let orchestrator = QueryOrchestrator::new(client, config.knowledge_base.clone());

    info!("starting knowledge base query service");
    server::serve(config.bind, orchestrator)
        .await
        .inspect_err(|e| tracing::error!("server failed: {e}"))?;

    info!("server stopped");
    Ok(())
}
