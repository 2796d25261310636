// ABOUTME: Entry point for the stopmo binary.
// ABOUTME: Parses CLI arguments, initializes tracing, and runs the server or the button forwarder.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use stopmo_input::{DEFAULT_BACKEND, Forwarder, probe};
use stopmo_server::{AppState, StopmoConfig, create_router};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "stopmo", version, about = "Stop-motion capture service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Read button presses and forward them to a running server.
    Forward {
        /// Server base URL.
        #[arg(long, env = "STOPMO_BACKEND", default_value = DEFAULT_BACKEND)]
        backend: String,
        /// Bearer token for event ingress.
        #[arg(long, env = "STOPMO_EVENT_TOKEN")]
        token: Option<String>,
        /// Serial device emitting button tokens; falls back to the keyboard.
        #[arg(long, env = "STOPMO_BUTTON_DEVICE")]
        device: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stopmo=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Forward {
            backend,
            token,
            device,
        } => forward(&backend, token, device).await,
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = StopmoConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        bind = %config.bind,
        frames = %config.frames_dir.display(),
        videos = %config.videos_dir.display(),
        "stopmo starting up"
    );
    if config.event_token.is_none() {
        tracing::warn!("STOPMO_EVENT_TOKEN is not set; event ingress will reject every call");
    }

    let state = Arc::new(AppState::from_config(&config).context("failed to prepare storage")?);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind))?;
    tracing::info!("listening on http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(CancellationToken::new()))
        .await
        .context("server error")?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn forward(backend: &str, token: Option<String>, device: Option<PathBuf>) -> anyhow::Result<()> {
    let forwarder = Forwarder::new(backend, token).context("invalid forwarder settings")?;
    tracing::info!(endpoint = %forwarder.endpoint(), "forwarding button events");

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let source = probe(device.as_deref());
    tracing::info!(source = %source.name(), "input source ready");
    let stats = forwarder.run(source.tokens(cancel)).await;

    tracing::info!(
        delivered = stats.delivered,
        rejected = stats.rejected,
        failed = stats.failed,
        skipped = stats.skipped,
        "forwarder stopped"
    );
    Ok(())
}

/// Resolves on Ctrl-C (or SIGTERM on unix) and cancels `token`.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
    token.cancel();
}
