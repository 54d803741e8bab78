use anyhow::Result;
use phlegon::config::Config;
use phlegon::driver::StripChargeDriver;
use phlegon::scheduler::PollScheduler;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    phlegon::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Phlegon strip-cycle charging controller starting up");

    let mut driver = StripChargeDriver::new(&config)
        .map_err(|e| anyhow::anyhow!("Failed to create driver: {}", e))?;
    let mut scheduler = PollScheduler::default();

    // Runs until the fail-safe termination path; exit code 0 is deliberate
    driver
        .run(&mut scheduler)
        .await
        .map_err(|e| anyhow::anyhow!("Control loop error: {}", e))?;

    info!("Control loop ended");
    Ok(())
}
