use liquidity_risk_monitor::{
    api::{start_server, ApiState},
    audit::FileAuditStore,
    kyc::{InMemoryDocumentStore, KycPipeline, TesseractOcr},
    ledger::CsvLedger,
    llm::client_from_config,
    MonitorConfig, QuickAnalyzer, Supervisor,
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
        warn!("GEMINI_API_KEY not set in .env, agent stages will use their fallbacks");
    }

    info!("Liquidity Risk Monitor - API Server");
    info!("Port: {}", config.api_port);

    // Create components
    let client = client_from_config(&config)?;
    let ledger = Arc::new(CsvLedger::new(&config.data_dir));
    let audit = Arc::new(FileAuditStore::new(&config.log_dir));

    let state = ApiState {
        supervisor: Arc::new(Supervisor::new(
            ledger.clone(),
            client.clone(),
            audit.clone(),
            &config,
        )),
        quick: Arc::new(QuickAnalyzer::new(
            ledger,
            client.clone(),
            audit.clone(),
            &config,
        )),
        kyc: Arc::new(KycPipeline::new(
            Arc::new(TesseractOcr::default()),
            client,
            Arc::new(InMemoryDocumentStore::new()),
        )),
        audit,
    };

    info!("Pipelines initialized, starting API server");

    start_server(state, config.api_port).await?;

    Ok(())
}
