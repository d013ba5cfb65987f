//! Voicebridge server entry point

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voicebridge_config::Settings;
use voicebridge_pipeline::stubs::{EchoAgent, EchoTts, ScriptedStt};
use voicebridge_server::{create_router, AppState, ServiceSet};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("VOICEBRIDGE_CONFIG").ok();
    let config = Settings::load(config_path.as_deref())?;

    init_tracing(&config);

    tracing::info!("Starting voicebridge server v{}", env!("CARGO_PKG_VERSION"));

    // Vendor STT/agent/TTS adapters plug in here. Without configured
    // endpoints the server runs against the loopback stubs, which is only
    // useful for development and wire-level testing.
    tracing::warn!("no vendor services configured, using loopback stubs");
    let services = ServiceSet {
        stt: Arc::new(ScriptedStt::silent()),
        agent: Arc::new(EchoAgent),
        tts: Arc::new(EchoTts::new()),
    };

    let state = AppState::new(config.clone(), services);
    let _cleanup = state.sessions.start_cleanup_task();

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Initialize tracing from the environment with a config fallback.
fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("voicebridge={level},tower_http=warn").into()
    });

    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
