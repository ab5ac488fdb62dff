mod api;
mod config;
mod device;
mod error;
mod generation;
mod model;
mod prompts;
mod sampling;
mod service;
mod tokenizer;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::{Args, ServiceConfig};
use crate::device::get_device;
use crate::service::InferenceService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "finma_server=info,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Starting FinMA analysis server...");

    let device = get_device(args.cpu)?;
    let service_config = ServiceConfig::from(&args);

    // Blocks until both load attempts have completed or failed
    let service = tokio::task::spawn_blocking(move || {
        InferenceService::initialize(&service_config, device)
    })
    .await?;

    if let Some(prompt) = &args.prompt {
        run_single_prompt(service, prompt, args.max_length).await
    } else {
        run_server(service, &args).await
    }
}

async fn run_single_prompt(
    service: InferenceService,
    prompt: &str,
    max_length: usize,
) -> anyhow::Result<()> {
    println!("\n📝 Prompt: {}", prompt);
    println!("{}", "─".repeat(60));

    let result = service.try_primary_then_fallback(prompt, max_length).await;
    service.shutdown();
    let outcome = result?;

    println!("\n🤖 Response ({}):\n{}", outcome.model_used, outcome.text);
    println!("{}", "─".repeat(60));

    Ok(())
}

async fn run_server(service: InferenceService, args: &Args) -> anyhow::Result<()> {
    let state = Arc::new(AppState { service });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = api::create_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::new(args.host.parse()?, args.port);

    println!(
        r#"
🚀 Server starting...
   ├─ Address: http://{}
   ├─ Primary: {} ({})
   ├─ Fallback: {} ({})
   └─ Endpoints:
      ├─ GET  /health            - Model and accelerator status
      ├─ POST /analyze           - Free-form analysis with fallback
      ├─ POST /portfolio-analyze - Portfolio insights
      └─ POST /token-analyze     - Single token analysis

Press Ctrl+C to stop the server.
"#,
        addr, args.model, args.model_label, args.fallback_model, args.fallback_label
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    match Arc::try_unwrap(state) {
        Ok(state) => state.service.shutdown(),
        Err(_) => warn!("Inference service still referenced at exit; models released with the process"),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
