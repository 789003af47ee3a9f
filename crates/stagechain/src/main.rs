//! Binary entrypoint for the stagechain server.
use stagechain::{http, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Overridable through STAGECHAIN_* environment variables
    let config = ServerConfig::from_env();
    http::run(config).await?;
    Ok(())
}
