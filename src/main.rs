use softphone::application::{Softphone, SoftphoneDeps};
use softphone::config::Config;
use softphone::infrastructure::rest::{
    ApiClient, HttpCallHistoryRepository, HttpNumberInventory, HttpReportSubmitter,
    HttpTokenIssuer,
};
use softphone::infrastructure::signaling::GatewayDeviceFactory;
use softphone::interface::api::{build_router, init_metrics, AppState};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing; RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting softphone for agent {}", config.agent.agent_id);
    info!("Configuration loaded: {:?}", config);

    // Back-office clients
    let api = ApiClient::new(
        config.api.base_url.clone(),
        config.api.auth_token.clone(),
        config.request_timeout(),
    )?;
    let deps = SoftphoneDeps {
        identity: config.identity(),
        tokens: Arc::new(HttpTokenIssuer::new(api.clone())),
        devices: Arc::new(GatewayDeviceFactory::new(config.signaling.url.clone())),
        history: Arc::new(HttpCallHistoryRepository::new(api.clone())),
        reports: Arc::new(HttpReportSubmitter::new(api.clone())),
        numbers: Arc::new(HttpNumberInventory::new(api)),
    };

    let settings = config.softphone.settings()?;
    let history_page_size = settings.history_page_size;
    let (softphone, runtime_handle) = Softphone::start(deps, settings);
    info!("Softphone runtime started");

    // Initialize metrics exporter
    info!("Initializing Prometheus metrics exporter");
    let prometheus_handle = init_metrics()?;

    let api_state = AppState {
        softphone: softphone.clone(),
        history_page_size,
    };
    let app = build_router(api_state, prometheus_handle);
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("REST API server started on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
        })
        .await?;

    // Destroy the transport device before exiting
    softphone.teardown().await?;
    drop(softphone);
    runtime_handle.await?;
    info!("Softphone stopped");

    Ok(())
}
