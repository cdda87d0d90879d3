use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use answer_engine::api::{AppState, create_router};
use answer_engine::config::Config;

#[derive(Debug, Parser)]
#[command(name = "answer-engine", about = "Search-grounded answer streaming service")]
struct Cli {
    /// Address to listen on, overrides BIND_ADDR
    #[arg(long)]
    addr: Option<String>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber (also picks up records from the log crate)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(true)
        .init();

    let mut config = Config::from_env()?;
    if let Some(addr) = cli.addr {
        config.bind_addr = addr;
    }

    let state = AppState::from_config(&config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(
        addr = %config.bind_addr,
        model = %config.anthropic_model,
        "answer engine listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
