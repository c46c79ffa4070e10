//! heardlive-web - Main entry point
//!
//! Serves the "I heard this live" pages and JSON API on top of either a
//! Supabase project plus the Spotify catalog, or the in-memory backend
//! for local development.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use heardlive_common::config::{load_config, BackendKind, TomlConfig};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use heardlive_web::services::memory::{MemoryBackend, StaticCatalog};
use heardlive_web::services::spotify_client::SpotifyClient;
use heardlive_web::services::supabase::{
    SupabaseAuth, SupabaseClient, SupabaseRest, SupabaseStorage,
};
use heardlive_web::services::Backends;
use heardlive_web::{build_router, AppState};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Supabase,
    Memory,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Supabase => BackendKind::Supabase,
            BackendArg::Memory => BackendKind::Memory,
        }
    }
}

/// Command-line arguments for heardlive-web
#[derive(Parser, Debug)]
#[command(name = "heardlive-web")]
#[command(about = "I heard this live: web frontend and API")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(short, long, env = "HEARDLIVE_BIND")]
    bind: Option<String>,

    /// Backend to run against (overrides the config file)
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.bind_address = Some(bind);
    }
    if let Some(backend) = args.backend {
        config.backend = backend.into();
    }

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "heardlive_web={level},heardlive_common={level},tower_http=info",
                    level = config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting heardlive-web v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    config.validate().context("Invalid configuration")?;

    let backends = build_backends(&config)?;
    info!("Backend: {:?}", config.backend);

    let bind_address = config.bind_address().to_string();
    let state = AppState::new(backends, config);
    let sweeper = state.sessions.spawn_sweeper();

    let app = build_router(state);

    info!("Starting HTTP server on {}", bind_address);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Wire the external collaborators named by the config
fn build_backends(config: &TomlConfig) -> Result<Backends> {
    match config.backend {
        BackendKind::Memory => {
            info!("Using in-memory backend with the demo catalog");
            Ok(Backends::in_memory(
                Arc::new(MemoryBackend::new()),
                StaticCatalog::demo(),
            ))
        }
        BackendKind::Supabase => {
            let timeout = Duration::from_secs(config.http.timeout_secs);

            // validate() guarantees these are present
            let url = config.supabase.url.as_deref().unwrap_or_default();
            let anon_key = config.supabase.anon_key.as_deref().unwrap_or_default();
            let supabase = SupabaseClient::new(url, anon_key, timeout)
                .context("Failed to create Supabase client")?;

            let spotify = SpotifyClient::new(
                &config.spotify.accounts_url,
                &config.spotify.api_url,
                config.spotify.client_id.clone().unwrap_or_default(),
                config.spotify.client_secret.clone().unwrap_or_default(),
                timeout,
            )
            .context("Failed to create catalog client")?;

            info!("Supabase project: {}", supabase.base_url());

            Ok(Backends {
                catalog: Arc::new(spotify),
                identity: Arc::new(SupabaseAuth::new(supabase.clone())),
                store: Arc::new(SupabaseRest::new(supabase.clone())),
                objects: Arc::new(SupabaseStorage::new(
                    supabase,
                    config.supabase.avatar_bucket.clone(),
                )),
            })
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
