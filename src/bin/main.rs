use liquidity_risk_monitor::{
    audit::FileAuditStore, ledger::CsvLedger, llm::client_from_config, MonitorConfig, Supervisor,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = MonitorConfig::from_env()?;
    if !config.has_api_key() {
        warn!("GEMINI_API_KEY not set, every agent stage will use its fallback");
    }

    info!(
        data_dir = %config.data_dir.display(),
        log_dir = %config.log_dir.display(),
        currency = %config.target_currency,
        "Liquidity risk monitor starting"
    );

    let supervisor = Supervisor::new(
        Arc::new(CsvLedger::new(&config.data_dir)),
        client_from_config(&config)?,
        Arc::new(FileAuditStore::new(&config.log_dir)),
        &config,
    );

    match supervisor.run().await {
        Ok(result) => {
            println!("\n=== LIQUIDITY RISK ANALYSIS ===");
            println!("Run ID: {}", result.run_id);
            println!("Risk Level: {}", result.risk_level.as_str().to_uppercase());
            println!("Log: {}", result.log_path);

            println!("\nForecast (next {} days):", result.forecast_series.len());
            for point in &result.forecast_series.points {
                println!("  {}: ₹{:.2}", point.date, point.value);
            }

            if !result.fallbacks.is_empty() {
                println!("\nFallbacks used:");
                for note in &result.fallbacks {
                    println!("  {} ({:?}): {}", note.stage, note.kind, note.detail);
                }
            }

            println!("\n{}", result.report);

            println!("\nReasoning Trace:");
            for (i, step) in result.reasoning_trace.iter().enumerate() {
                println!("  {}: {}", i + 1, step);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Analysis failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
