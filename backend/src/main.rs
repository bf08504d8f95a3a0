//! # Gold Market Backend Service
//!
//! This is the main entry point for the gold trading marketplace backend.
//! It provides:
//!
//! - REST API for user registration, buy/sell requests and the rate document
//! - Administrator approval of requests, settled against user vaults
//! - Transaction history and vault reporting
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        BACKEND SERVICE                           │
//! │                                                                  │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                     REST API (Actix)                       │  │
//! │  │  /addUser  /users  /buy  /request/{id}  /buy-sell-rate     │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │                          │                                       │
//! │  ┌───────────────────────┴───────────────────────────────────┐  │
//! │  │                    SERVICE LAYER                           │  │
//! │  │  ┌───────────┐ ┌────────────┐ ┌──────────┐ ┌──────────┐   │  │
//! │  │  │VaultLedger│ │UserRegistry│ │ RateBook │ │ Reports  │   │  │
//! │  │  └───────────┘ └────────────┘ └──────────┘ └──────────┘   │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │                          │                                       │
//! │                 Arc<dyn GoldStore>                               │
//! │         ┌────────────────┴────────────────┐                     │
//! │  ┌──────┴──────┐                   ┌──────┴──────┐              │
//! │  │  PostgreSQL │                   │  In-memory  │              │
//! │  │  (PgStore)  │                   │ (MemoryStore)│             │
//! │  └─────────────┘                   └─────────────┘              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! 1. Set up PostgreSQL and create the database
//! 2. Copy `.env.example` to `.env` and configure
//! 3. Start the server: `cargo run` (the schema is applied at startup)
//!
//! For a throwaway instance without PostgreSQL, set `STORE_BACKEND=memory`.
//!
//! ## Environment Variables
//!
//! See `.env.example` for all configuration.

use std::io;
use std::sync::Arc;
use actix_cors::Cors;
use actix_web::{web, App, HttpServer, middleware};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod db;
mod models;
mod services;
mod utils;

use config::{AppConfig, StoreBackend};
use db::{Database, GoldStore, MemoryStore, PgStore};
use services::{RateBook, ReportService, UserRegistry, VaultLedger};

/// Application state shared across all handlers.
///
/// Every service holds a clone of the same store handle, so one
/// settlement is visible to every other service immediately.
pub struct AppState {
    /// The store every service reads and writes
    pub store: Arc<dyn GoldStore>,

    /// Request submission and settlement
    pub ledger: VaultLedger,

    /// Registration and user lookup
    pub users: UserRegistry,

    /// The buy/sell rate document
    pub rates: RateBook,

    /// History and vault totals
    pub reports: ReportService,

    /// Application configuration
    pub config: AppConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn GoldStore>, config: AppConfig) -> Self {
        Self {
            ledger: VaultLedger::new(store.clone()),
            users: UserRegistry::new(store.clone()),
            rates: RateBook::new(store.clone()),
            reports: ReportService::new(store.clone()),
            store,
            config,
        }
    }
}

/// Open the store selected by `STORE_BACKEND`.
async fn open_store(config: &AppConfig) -> io::Result<Arc<dyn GoldStore>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "DATABASE_URL is required")
            })?;

            let db = Database::connect(url, config.db_pool_size)
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::ConnectionRefused, e.to_string()))?;
            info!("🗄️  Database connected");

            // Run migrations to ensure schema is up to date
            db.run_migrations()
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            info!("📦 Database migrations complete");

            Ok(Arc::new(PgStore::new(db)))
        }
        StoreBackend::Memory => {
            info!("🧪 Using in-memory store; data will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Main entry point for the backend service.
///
/// This function:
/// 1. Loads configuration from environment
/// 2. Initializes logging
/// 3. Opens the store
/// 4. Builds the services
/// 5. Launches the HTTP server
#[actix_web::main]
async fn main() -> io::Result<()> {
    // =========================================
    // STEP 1: Load Configuration
    // =========================================
    // Load from environment variables (from .env file)
    dotenvy::dotenv().ok(); // It's okay if .env doesn't exist

    let config = AppConfig::from_env()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    // =========================================
    // STEP 2: Initialize Logging
    // =========================================
    // RUST_LOG wins over LOG_LEVEL when both are set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("🚀 Starting Gold Market Backend Service");
    info!("📋 Configuration loaded");
    info!("   Store backend: {}", config.store_backend.as_str());
    info!("   DB pool size: {}", config.db_pool_size);

    // =========================================
    // STEP 3: Open Store
    // =========================================
    let store = match open_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open store: {}", e);
            return Err(e);
        }
    };

    // =========================================
    // STEP 4: Create Application State
    // =========================================
    let app_state = Arc::new(AppState::new(store.clone(), config.clone()));

    info!("🔧 Services initialized");

    // =========================================
    // STEP 5: Start HTTP Server
    // =========================================
    let server_host = config.server_host.clone();
    let server_port = config.server_port;

    info!("🌐 Starting HTTP server on {}:{}", server_host, server_port);

    let result = HttpServer::new(move || {
        App::new()
            // Attach shared application state
            .app_data(web::Data::new(app_state.clone()))

            // Browser clients call from another origin
            .wrap(Cors::permissive())

            // Add logging middleware
            .wrap(middleware::Logger::default())

            // Configure API routes
            .configure(api::configure_routes)
    })
    .bind(format!("{}:{}", server_host, server_port))?
    .run()
    .await;

    store.close().await;
    info!("👋 Server stopped");

    result
}
