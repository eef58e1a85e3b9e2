use crosswalk_engine::{agent::CrosswalkGenerator, api::start_server, config::AppConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    info!("Crosswalk Engine - API Server");
    info!("Port: {}", config.port);
    info!(store = ?config.store, "Job store");

    let store = config.store.clone().connect().await?;
    let generator = Arc::new(CrosswalkGenerator::from_config(&config, store)?);

    info!(backend = generator.backend_name(), "Generator initialized");

    start_server(generator, config.port).await?;

    Ok(())
}
