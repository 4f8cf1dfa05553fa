use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pagevault::api::{
    create_oauth_router, create_router, run_state_cleanup, CredentialAppState, OAuthAppState,
    StateManager,
};
use pagevault::auth::{BearerSessions, IdentityProvider};
use pagevault::cache::TokenCache;
use pagevault::config::{load_config, PagevaultConfig};
use pagevault::credentials::{CredentialStore, CredentialVault};
use pagevault::platform::{OAuthApp, PlatformClient};
use pagevault::rate_limit::run_bucket_cleanup;
use pagevault::revocation::Revocation;
use pagevault::store::{DocumentStore, RateLimitedStore, SqliteDocumentStore};
use pagevault::warmer::BulkWarmer;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// OAuth state cleanup interval
const STATE_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Idle rate limit bucket cleanup interval
const BUCKET_CLEANUP_INTERVAL_SECS: u64 = 300;

#[derive(Parser)]
#[command(name = "pagevault", version, about = "Encrypted page credential service")]
struct Cli {
    /// Path to TOML config file
    #[arg(long, env = "PAGEVAULT_CONFIG", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// List page credentials stored in the legacy (unauthenticated) layout
    LegacyScan {
        /// Owner whose pages are scanned
        #[arg(long)]
        owner: String,
        /// Delete the legacy documents found
        #[arg(long)]
        purge: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagevault=info".into()),
        )
        .init();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PagevaultConfig::default(),
    };

    let cache = build_cache(&config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, cache).await,
        Command::LegacyScan { owner, purge } => legacy_scan(cache, &owner, purge).await,
    }
}

fn build_cache(config: &PagevaultConfig) -> Result<TokenCache> {
    let encryption_key = std::env::var("PAGEVAULT_ENCRYPTION_KEY")
        .context("PAGEVAULT_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;
    let vault = CredentialVault::from_base64(&encryption_key)
        .context("Invalid PAGEVAULT_ENCRYPTION_KEY")?;

    let sqlite: Arc<dyn DocumentStore> = Arc::new(
        SqliteDocumentStore::new(&config.store.path)
            .context("Failed to initialize document store")?,
    );
    let documents: Arc<dyn DocumentStore> = if config.store.max_requests_per_minute > 0 {
        let limited = RateLimitedStore::new(sqlite, config.store.max_requests_per_minute);
        tokio::spawn(run_bucket_cleanup(
            limited.limiter(),
            BUCKET_CLEANUP_INTERVAL_SECS,
        ));
        Arc::new(limited)
    } else {
        sqlite
    };

    info!(
        path = %config.store.path,
        max_requests_per_minute = config.store.max_requests_per_minute,
        "Document store initialized"
    );

    let store = Arc::new(CredentialStore::new(
        documents,
        vault,
        config.platform.name.clone(),
    ));
    Ok(TokenCache::new(store, &config.cache))
}

async fn serve(config: PagevaultConfig, cache: TokenCache) -> Result<()> {
    info!("Pagevault starting...");

    let sessions = BearerSessions::from_config(&config.identity.sessions);
    if sessions.is_empty() {
        warn!("No identity sessions configured; every request will be rejected");
    }
    let identity: Arc<dyn IdentityProvider> = Arc::new(sessions);

    let state = CredentialAppState {
        identity: Arc::clone(&identity),
        cache: cache.clone(),
        warmer: Arc::new(BulkWarmer::new(cache.clone(), &config.warmer)),
        revocation: Arc::new(Revocation::new(cache.clone())),
    };
    let mut app = create_router(state);

    match OAuthApp::from_env(&config.platform.name) {
        Some(oauth_app) => {
            let state_manager = StateManager::new(config.platform.oauth_state_expiry_seconds);
            tokio::spawn(run_state_cleanup(
                state_manager.clone(),
                STATE_CLEANUP_INTERVAL_SECS,
            ));

            app = app.merge(create_oauth_router(OAuthAppState {
                identity,
                client: PlatformClient::new(&config.platform, oauth_app),
                cache,
                state_manager,
                callback_base_url: config.platform.callback_base_url.clone(),
            }));
            info!(platform = %config.platform.name, "OAuth connect enabled");
        }
        None => {
            warn!(
                platform = %config.platform.name,
                "OAuth client credentials not set; connect endpoints disabled"
            );
        }
    }

    let app = app.layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "HTTP server listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Pagevault stopped");

    Ok(())
}

async fn legacy_scan(cache: TokenCache, owner: &str, purge: bool) -> Result<()> {
    let revocation = Revocation::new(cache);

    let legacy = revocation.scan_legacy(owner).await?;
    for page in &legacy {
        println!("{}\t{}", page.id, page.name.as_deref().unwrap_or("-"));
    }
    info!(owner = %owner, count = legacy.len(), "Legacy scan complete");

    if purge && !legacy.is_empty() {
        let purged = revocation.purge_legacy(owner).await?;
        info!(owner = %owner, count = purged.len(), "Legacy credentials purged");
    }

    Ok(())
}
