//! # Database Module
//!
//! This module handles all storage for the Gold Market backend.
//! PostgreSQL holds:
//!
//! - Users and their gold vault balance
//! - The current buy/sell rate
//! - Buy and sell requests with their settlement status
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      DATABASE LAYER                              │
//! │                                                                  │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │              GoldStore trait (store.rs)                   │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! │              │                              │                    │
//! │              ▼                              ▼                    │
//! │  ┌──────────────────────┐       ┌──────────────────────┐        │
//! │  │      PgStore         │       │     MemoryStore      │        │
//! │  │ (deadpool-postgres)  │       │  (tests, local dev)  │        │
//! │  └──────────────────────┘       └──────────────────────┘        │
//! │              │                                                   │
//! │   ┌──────────┼──────────┐                                        │
//! │   ▼          ▼          ▼                                        │
//! │ users      rates     requests                                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod memory;
pub mod models;
pub mod queries;
pub mod store;

use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::{NoTls, Config as TokioConfig};
use thiserror::Error;
use tracing::{info, warn, error};

/// Schema applied at startup. Every statement is idempotent.
const INITIAL_SCHEMA: &str = include_str!("../../migrations/001_initial_schema.sql");

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// Database-related errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to connect to the database
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryError(tokio_postgres::Error),

    /// A unique constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Migration failed
    #[error("Migration failed: {0}")]
    MigrationError(String),

    /// A row held a value the models cannot represent
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl From<tokio_postgres::Error> for DatabaseError {
    fn from(err: tokio_postgres::Error) -> Self {
        let unique = err
            .code()
            .map(|code| code.code() == UNIQUE_VIOLATION)
            .unwrap_or(false);

        if unique {
            let constraint = err
                .as_db_error()
                .and_then(|db_err| db_err.constraint())
                .unwrap_or("unknown")
                .to_string();
            DatabaseError::UniqueViolation(constraint)
        } else {
            DatabaseError::QueryError(err)
        }
    }
}

impl From<deadpool_postgres::PoolError> for DatabaseError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        DatabaseError::ConnectionError(err.to_string())
    }
}

/// Database connection wrapper.
///
/// Wraps the connection pool. Cloning is cheap; all clones share one pool.
///
/// ## Usage
///
/// ```rust,ignore
/// let db = Database::connect("postgres://...", 10).await?;
/// let user = queries::get_user_by_email(db.pool(), "a@b.com").await?;
/// ```
#[derive(Clone)]
pub struct Database {
    /// The connection pool
    pool: Pool,
}

impl Database {
    /// Connect to the PostgreSQL database.
    ///
    /// ## Arguments
    ///
    /// * `database_url` - PostgreSQL connection string
    /// * `max_size` - Maximum pooled connections
    ///
    /// ## Returns
    ///
    /// * `Ok(Database)` - Connected successfully
    /// * `Err(DatabaseError)` - Connection failed
    pub async fn connect(database_url: &str, max_size: usize) -> Result<Self, DatabaseError> {
        info!("Connecting to database...");

        // Parse the connection string using tokio_postgres::Config
        let tokio_config = database_url.parse::<TokioConfig>()
            .map_err(|e| DatabaseError::ConfigError(format!("Invalid database URL: {}", e)))?;

        // Convert to deadpool config
        let mut config = Config::new();

        if let Some(dbname) = tokio_config.get_dbname() {
            config.dbname = Some(dbname.to_string());
        }
        if let Some(user) = tokio_config.get_user() {
            config.user = Some(user.to_string());
        }
        if let Some(password) = tokio_config.get_password() {
            // Password is &[u8], convert to String
            config.password = Some(String::from_utf8_lossy(password).to_string());
        }
        if let Some(tokio_postgres::config::Host::Tcp(host)) = tokio_config.get_hosts().first() {
            config.host = Some(host.clone());
        }
        if let Some(port) = tokio_config.get_ports().first() {
            config.port = Some(*port);
        }

        config.pool = Some(deadpool_postgres::PoolConfig {
            max_size,
            ..Default::default()
        });

        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        let db = Self { pool };
        db.ping().await?;

        info!("Database connection established (pool size {})", max_size);

        Ok(db)
    }

    /// Run a trivial query to prove a connection can be checked out.
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        let client = self.pool.get().await?;
        client.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    /// Apply the schema in `migrations/001_initial_schema.sql`.
    ///
    /// The file is embedded at compile time and uses `IF NOT EXISTS`
    /// throughout, so running it on every start is safe.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        info!("Running database migrations...");

        let client = self.pool.get().await?;

        match client.batch_execute(INITIAL_SCHEMA).await {
            Ok(()) => {
                info!("Migrations completed successfully");
                Ok(())
            }
            Err(e) => {
                let detail = e.as_db_error()
                    .and_then(|db_err| db_err.detail())
                    .unwrap_or("No detail available")
                    .to_string();

                // 42P07 = duplicate_table, 42710 = duplicate_object. Concurrent
                // starts can race past IF NOT EXISTS.
                let is_duplicate = e.code()
                    .map(|code| code.code() == "42P07" || code.code() == "42710")
                    .unwrap_or(false);

                if is_duplicate {
                    warn!("Schema objects already exist: {}", detail);
                    Ok(())
                } else {
                    error!("Migration execution error: {} ({})", e, detail);
                    Err(DatabaseError::MigrationError(format!("{}: {}", e, detail)))
                }
            }
        }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Close the pool. Checked-out connections are dropped when returned.
    pub fn close(&self) {
        self.pool.close();
        info!("Database pool closed");
    }
}

// Re-export commonly used items
pub use models::*;
pub use memory::MemoryStore;
pub use store::{GoldStore, PgStore};
