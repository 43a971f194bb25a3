use anyhow::{Context, Result};
use pos_pipeline::config::PipelineConfig;
use pos_pipeline::pipeline;
use std::env;
use std::path::Path;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "src/configs/pipeline.toml";

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    info!("🚀 Starting POS reconciliation pipeline");

    let config_arg = env::args().skip(1).find(|arg| !arg.starts_with('-'));
    let config = match config_arg.as_deref() {
        Some(path) => PipelineConfig::load(Some(path))
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            info!("Using configuration file {}", DEFAULT_CONFIG_PATH);
            PipelineConfig::load(Some(DEFAULT_CONFIG_PATH))?
        }
        None => {
            info!("No configuration file found, using built-in defaults");
            PipelineConfig::load(None)?
        }
    };

    let loaded = pipeline::scan_and_load(&config)?;
    info!(
        "📋 Canonical frames ready: {} orders, {} line items ({} log lines)",
        loaded.report.height(),
        loaded.details.height(),
        loaded.logs.len()
    );

    let (report, details) = pipeline::enrich(&config, &loaded.report, &loaded.details)?;

    info!("\n=== Pipeline Summary ===");
    info!(
        "📊 Orders: {} rows × {} columns",
        report.height(),
        report.width()
    );
    info!(
        "📊 Line items: {} rows × {} columns",
        details.height(),
        details.width()
    );
    if let Some(d) = loaded.latest_dates.json {
        info!("🕒 Latest JSON order date: {}", d);
    }
    if let Some(d) = loaded.latest_dates.csv_report {
        info!("🕒 Latest CSV report date: {}", d);
    }
    if let Some(d) = loaded.latest_dates.csv_details {
        info!("🕒 Latest CSV details date: {}", d);
    }
    if let Some(d) = loaded.latest_dates.invoice {
        info!("🕒 Latest invoice date: {}", d);
    }

    if report.height() == 0 && details.height() == 0 {
        warn!("⚠️ No data loaded from any configured directory, scan log follows:");
        for line in &loaded.logs {
            warn!("  {}", line);
        }
    } else {
        info!("🎉 Pipeline completed successfully!");
    }

    Ok(())
}
