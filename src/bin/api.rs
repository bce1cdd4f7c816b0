use cardgenius_advisor::{
    agent::CardAgent,
    api::{start_server, ApiState},
    config::AppConfig,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    info!("🚀 CardGenius Advisor - API Server");
    info!("📍 Port: {}", config.port);

    let agent = Arc::new(CardAgent::from_config(&config)?);

    info!(extractor = agent.extractor_name(), "✅ Agent initialized");
    info!("📡 Starting API server...");

    start_server(ApiState::new(agent), config.port).await?;

    Ok(())
}
