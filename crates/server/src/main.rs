use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use orchestrator_core::runtime::BollardRuntime;
use orchestrator_core::runtime::RuntimeAdapter;
use orchestrator_core::OrchestratorContext;
use orchestrator_server::config::{AppConfig, LogFormat, LogOutput};
use orchestrator_server::state::AppState;
use orchestrator_server::{http, metrics};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Phase 1: a minimal thread-local subscriber so config-loading errors
    // are still logged somewhere, replaced once configuration is known.
    let _basic_tracing = init_tracing_basic();

    info!("starting orchestrator v{}", env!("CARGO_PKG_VERSION"));

    let app_config = AppConfig::load().context("failed to load configuration")?;
    app_config.validate().context("configuration validation failed")?;

    let core_config = orchestrator_core::Config::from_env().context("failed to load orchestrator configuration")?;
    if core_config.api_key.is_none() {
        anyhow::bail!("API_KEY must be set: every protected route requires it");
    }

    drop(_basic_tracing);
    init_tracing_from_config(&app_config);

    info!("configuration loaded successfully");
    info!(bind_address = %app_config.server.bind_address, "server will bind here");

    let docker_socket = std::env::var("DOCKER_SOCKET").unwrap_or_default();
    let runtime: Arc<dyn RuntimeAdapter> =
        Arc::new(BollardRuntime::connect(&docker_socket).context("failed to connect to container runtime")?);
    let ctx = Arc::new(
        OrchestratorContext::new(core_config, runtime).context("failed to construct orchestrator context")?,
    );
    ctx.boot().await.context("boot sequence failed")?;

    let metrics_handle = metrics::install();
    let state = AppState { ctx: ctx.clone(), metrics_handle };

    let app = http::build_router(state, &app_config.server);

    let addr: SocketAddr = app_config.server.bind_address.parse().context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(&addr).await.context("failed to bind to address")?;

    info!("orchestrator is ready");
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    ctx.shutdown().await;
    info!("server shut down gracefully");
    Ok(())
}

fn init_tracing_basic() -> tracing::subscriber::DefaultGuard {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,orchestrator=debug"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_default(subscriber)
}

fn init_tracing_from_config(config: &AppConfig) {
    use std::sync::Arc as StdArc;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match (&config.logging.format, &config.logging.output) {
        (LogFormat::Json, LogOutput::Stdout) => {
            let layer = fmt::layer().json().with_target(true).with_thread_ids(true);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        (LogFormat::Json, LogOutput::File { path }) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .unwrap_or_else(|e| panic!("failed to open log file '{path}': {e}"));
            let layer = fmt::layer().json().with_target(true).with_thread_ids(true).with_ansi(false).with_writer(StdArc::new(file));
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        (LogFormat::Pretty, LogOutput::Stdout) => {
            let layer = fmt::layer().with_target(true).with_thread_ids(false).with_file(false).with_line_number(false);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        (LogFormat::Pretty, LogOutput::File { path }) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .unwrap_or_else(|e| panic!("failed to open log file '{path}': {e}"));
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false)
                .with_writer(StdArc::new(file));
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            warn!("received SIGTERM, initiating graceful shutdown...");
        },
    }
}
