//! Driver Fatigue Monitor - Main Entry Point

use monitor::{init_logging, load_settings, run};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("FATIGUE_CONFIG").unwrap_or_else(|_| monitor::DEFAULT_CONFIG.to_string());
    let mut settings = load_settings(&config_path)?;
    if let Some(recording) = std::env::args().nth(1) {
        settings.replay_path = Some(recording.into());
    }

    init_logging(&settings.logging);
    info!("=== Driver Fatigue Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let report = run(settings).await?;
    println!("{}", report.summary);
    Ok(())
}
