//! Contract gateway entry point

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contract_gateway::{
    config::LogFormat,
    graph::{GraphStore, HttpGraphClient, InMemoryGraph},
    ledger::{HttpLedgerClient, InMemoryLedger, LedgerClient},
    readiness::spawn_preflight,
    Args, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("contract_gateway={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    match args.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!(
        "Starting contract gateway v{} (commit {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown")
    );

    let (ledger, graph): (Arc<dyn LedgerClient>, Arc<dyn GraphStore>) = if args.dev_mode {
        info!("Using in-memory ledger and graph");
        (Arc::new(InMemoryLedger::new()), Arc::new(InMemoryGraph::new()))
    } else {
        let ledger_endpoint = args.ledger_endpoint()?;
        let graph_endpoint = args.graph_endpoint()?;
        info!(
            "Ledger peer {} (chaincode {}), graph {}/{}",
            ledger_endpoint.url,
            ledger_endpoint.chaincode_id,
            graph_endpoint.api_base,
            graph_endpoint.graph_name
        );
        (
            Arc::new(HttpLedgerClient::new(ledger_endpoint, args.request_timeout())?),
            Arc::new(HttpGraphClient::new(graph_endpoint, args.request_timeout())?),
        )
    };

    let state = Arc::new(AppState::new(args, ledger, graph));

    let preflight = spawn_preflight(
        Arc::clone(&state.readiness),
        Arc::clone(&state.records),
        state.args.preflight_max_attempts,
        state.args.preflight_interval(),
    );
    tokio::spawn(async move {
        match preflight.await {
            Ok(Ok(ready)) => info!("Chaincode ready after {} attempt(s)", ready.attempts),
            Ok(Err(e)) => error!("Preflight failed, API will stay unavailable: {}", e),
            Err(e) => error!("Preflight task aborted: {}", e),
        }
    });

    contract_gateway::run(state).await?;
    Ok(())
}
