//! Matricula Payments Server
//!
//! Reconciles enrollment fee payments against the Wompi gateway and issues
//! student identities exactly once per paid enrollment.

mod api;
mod config;
mod relay;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use matricula_core::events::notice_channel;
use matricula_core::identity::IdentityIssuer;
use matricula_core::notify::NoticeDeduper;
use matricula_core::processors::{Reconciler, Sweeper};
use matricula_core::store::PgStore;
use matricula_wompi::WompiClient;
use relay::NoticeRelay;
use server::{build_router, run_server};
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Matricula - enrollment payment reconciliation and identity issuance
#[derive(Parser, Debug)]
#[command(name = "matricula-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./matricula-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting matricula-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(&args.config, args.listen);
    let config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    // Run migrations if requested
    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    // Wire the reconciliation pipeline
    let store = Arc::new(PgStore::new(db_pool.clone()));
    let wompi = Arc::new(WompiClient::new(
        config.gateway.base_url.clone(),
        config.gateway.private_key.as_str(),
    ));
    let issuer = IdentityIssuer::new(Arc::clone(&store), config.identity.to_issuer_config());
    let deduper = Arc::new(NoticeDeduper::default());
    let (notice_tx, notice_rx) = notice_channel();
    let reconciler = Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&wompi),
        issuer,
        notice_tx,
        deduper,
    );

    // Background workers: periodic sweep and the notice relay
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Sweeper::new(
        Arc::clone(&store),
        reconciler.clone(),
        config.sweep.to_sweep_config(),
        shutdown_rx.clone(),
    );
    let sweep_handle = tokio::spawn(sweeper.clone().run(config.sweep.interval()));

    let relay = NoticeRelay::new(config.notify.callback_url.clone(), shutdown_rx.clone());
    let relay_handle = tokio::spawn(relay.run(notice_rx));

    // Create application state
    let state = AppState::new(reconciler, sweeper, wompi, store, Arc::new(config));

    // Build the router
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Stop the background workers and let in-flight work drain
    let _ = shutdown_tx.send(true);
    let _ = sweep_handle.await;
    let _ = relay_handle.await;

    // Close database connections gracefully
    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
