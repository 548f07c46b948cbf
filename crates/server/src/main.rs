use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reposcout_core::{
    create_authenticator, load_config, validate_config, Authenticator, Config,
    DiscoveryOrchestrator, GitHubClient, SqliteAnalysisCache, SqliteUserStateStore, UpstreamGate,
};
use reposcout_server::api::create_router;
use reposcout_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("REPOSCOUT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    // Hash of the effective config, logged so restarts can be correlated
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));

    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        "Configuration loaded successfully"
    );
    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);

    // Create authenticator
    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Using authenticator: {}", authenticator.method_name());

    let orchestrator = build_orchestrator(&config)?;

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        orchestrator,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

/// Wire stores, budget gate and upstream client into the discovery engine.
///
/// Returns `None` when no upstream is configured; the API then serves
/// health and config only.
fn build_orchestrator(config: &Config) -> Result<Option<Arc<DiscoveryOrchestrator>>> {
    let Some(github) = &config.github else {
        warn!("No [github] section configured, discovery disabled");
        return Ok(None);
    };

    // User state and analysis cache share one SQLite file
    let store = Arc::new(
        SqliteUserStateStore::new(&config.database.path)
            .context("Failed to create user state store")?,
    );
    info!("User state store initialized");

    let cache = Arc::new(
        SqliteAnalysisCache::new(&config.database.path)
            .context("Failed to create analysis cache")?,
    );
    info!("Analysis cache initialized");

    let client = GitHubClient::new(github.clone()).context("Failed to create GitHub client")?;
    info!(
        endpoint = %github.graphql_url,
        language = %github.language,
        "GitHub client initialized"
    );

    let gate = Arc::new(UpstreamGate::new(&config.budget));
    info!(
        limit = config.budget.limit,
        workers = config.budget.max_concurrent_requests,
        "Upstream gate initialized"
    );

    Ok(Some(Arc::new(DiscoveryOrchestrator::new(
        config,
        Arc::new(client),
        store,
        cache,
        gate,
    ))))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
