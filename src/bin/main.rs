use crosswalk_engine::{
    agent::CrosswalkGenerator,
    config::AppConfig,
    state::{self, create_job},
    UserInput,
};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

async fn run(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    let raw: serde_json::Value = serde_json::from_str(&tokio::fs::read_to_string(path).await?)?;
    let input = match UserInput::parse(raw) {
        Ok(input) => input,
        Err(violations) => {
            for violation in &violations {
                eprintln!("  - {}", violation);
            }
            return Err(format!("{} has {} invalid field(s)", path, violations.len()).into());
        }
    };

    let store = config.store.clone().connect().await?;
    let job_id = create_job(store.as_ref(), input).await?;
    info!(job_id = %job_id, "Job created");

    let generator = CrosswalkGenerator::from_config(&config, store.clone())?;
    let report = generator.run(job_id).await?;

    // Confirm the stored document reads back cleanly before reporting success.
    state::load(store.as_ref(), job_id).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: crosswalk <input.json>");
        return ExitCode::from(2);
    };

    match run(&path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Crosswalk generation failed: {}", e);
            eprintln!("Crosswalk generation failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
