use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use studly_agent::config::Settings;
use studly_agent::logging::{ActivityLogger, LoggerConfig, TracingSink};
use studly_agent::services::conversation::{ConversationStore, EvictionPolicy};
use studly_agent::services::{LlmService, TaskAgent};
use studly_agent::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,studly_agent=debug")),
        )
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(writer),
        )
        .init();

    info!("Starting Studly agent...");

    let settings = Arc::new(Settings::load()?);
    info!(
        "Configuration loaded: cap_turns={}, summarization={}, threshold={}, timeout={}s",
        settings.history.cap_turns,
        settings.history.enable_summarization,
        settings.history.summary_threshold,
        settings.request.timeout_seconds
    );

    let activity = ActivityLogger::new(
        Arc::new(TracingSink),
        LoggerConfig::from(&settings.activity_log),
    );

    let generator = Arc::new(LlmService::new(settings.llm.clone())?);
    let store = Arc::new(ConversationStore::new(EvictionPolicy::from_config(
        &settings.store,
    )));

    let agent = Arc::new(
        TaskAgent::new(settings.history.clone(), store, generator, activity)
            .with_timeout(settings.request.timeout()),
    );

    let app = build_router(AppState {
        settings: settings.clone(),
        agent,
    });

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
