//! VPC Peering Engine
//!
//! Reconciles VPC peering connections and private-subnet routes whenever a
//! VPC existence object is written to or removed from the events bucket.
//!
//! # Usage
//! ```bash
//! # Process one notification from a file (or stdin with `-`)
//! vpc-peering-engine handle --event event.json
//!
//! # Accept notifications over HTTP
//! vpc-peering-engine serve --port 8080
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vpc_peering_engine::agents::auto_peering::{
    AutoPeeringAgent, AwsCredentials, CredentialBroker, GatewayDirectory, ReconcileReport,
};
use vpc_peering_engine::config::ConfigArgs;
use vpc_peering_engine::tools::query::http_client;
use vpc_peering_engine::tools::{QueryApiConnector, StsClient};

#[derive(Parser)]
#[command(name = "vpc-peering-engine")]
#[command(about = "Tag-driven VPC auto-peering", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a single notification envelope and print the report
    Handle {
        /// Path to the event JSON, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: String,
    },

    /// Serve notification envelopes over HTTP
    Serve {
        #[arg(long, default_value = "8080", env = "PORT")]
        port: u16,
    },
}

#[derive(Clone)]
struct AppState {
    agent: Arc<AutoPeeringAgent>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .json()
        .init();

    let cli = Cli::parse();
    let agent = Arc::new(build_agent(&cli.config).await?);

    match cli.command {
        Commands::Handle { event } => {
            let raw = read_event(&event)?;
            let event: serde_json::Value =
                serde_json::from_str(&raw).context("Event is not valid JSON")?;

            let report = agent.handle(&event).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Serve { port } => serve(agent, port).await?,
    }

    Ok(())
}

async fn build_agent(args: &ConfigArgs) -> Result<AutoPeeringAgent> {
    let home_region = args.home_region();
    let http = http_client().context("Failed to create HTTP client")?;
    let base_credentials = AwsCredentials::from_env().context("Base AWS credentials unavailable")?;

    let sts = StsClient::new(http.clone(), base_credentials, &home_region);
    let caller_account_id = sts
        .get_caller_identity()
        .await
        .context("Failed to look up caller identity")?;

    let config = args.resolve(&caller_account_id)?;
    info!(
        home_region = %config.home_region,
        account_id = %caller_account_id,
        "Starting VPC Peering Engine"
    );

    let broker = Arc::new(CredentialBroker::new(Arc::new(sts), &config.peering_role_name));
    let directory = Arc::new(GatewayDirectory::new(
        broker,
        Arc::new(QueryApiConnector::new(http)),
        config.search_accounts.clone(),
        config.search_regions.clone(),
    ));

    Ok(AutoPeeringAgent::new(directory, &config))
}

fn read_event(path: &str) -> Result<String> {
    if path == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read event from stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read event from {}", path))
    }
}

async fn serve(agent: Arc<AutoPeeringAgent>, port: u16) -> Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/events", post(handle_event))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { agent });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Engine listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "vpc-peering-engine",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn handle_event(
    State(state): State<AppState>,
    Json(event): Json<serde_json::Value>,
) -> Result<Json<ReconcileReport>, (StatusCode, Json<serde_json::Value>)> {
    state.agent.handle(&event).await.map(Json).map_err(|e| {
        error!(error = %e, "Event handling failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "status": "error",
                "message": e.to_string()
            })),
        )
    })
}
