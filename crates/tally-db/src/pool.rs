//! # Store Handle
//!
//! Opens the SQLite file behind the fulfillment store and hands out one
//! repository per table group.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DbConfig::new("tally.db").max_connections(5)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config)   WAL, foreign keys, busy timeout, migrations    │
//! │       │                                                                 │
//! │       ├── orders()      orders, items, status history                   │
//! │       ├── refunds()     refunds, refund items, refunded total           │
//! │       ├── shipments()   shipment rows (never deleted)                   │
//! │       ├── inventory()   products, batches, adjustment ledger            │
//! │       └── pickups()     pickup reservations                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Status changes and refund recording are conditional writes inside a
//! transaction, so concurrent writers wait on `busy_timeout` instead of
//! failing immediately with `SQLITE_BUSY`.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::inventory::InventoryRepository;
use crate::repository::order::OrderRepository;
use crate::repository::pickup::PickupRepository;
use crate::repository::refund::RefundRepository;
use crate::repository::shipment::ShipmentRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Where the store lives and how many connections it may open.
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    /// SQLite file, created on first open. `None` is a private in-memory store.
    pub database_path: Option<PathBuf>,
    pub max_connections: u32,
    /// How long a writer waits for the lock held by another writer.
    pub busy_timeout: Duration,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: Some(path.into()),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// A throwaway store for tests and the seed tool's dry runs.
    ///
    /// Every connection to `:memory:` is its own database, so the pool is
    /// pinned to one connection that is never reaped.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: None,
            max_connections: 1,
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = match &self.database_path {
            Some(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
            None => SqliteConnectOptions::new().in_memory(true),
        };
        options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout)
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the fulfillment store. Clones share one pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and applies pending migrations.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let location = config
            .database_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string());

        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if config.database_path.is_none() {
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(config.connect_options())
            .await
            .map_err(|e| DbError::ConnectionFailed(format!("{}: {}", location, e)))?;

        migrations::run_migrations(&pool).await?;

        info!(
            path = %location,
            max_connections = config.max_connections,
            "Fulfillment store opened"
        );
        Ok(Database { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone())
    }

    pub fn refunds(&self) -> RefundRepository {
        RefundRepository::new(self.pool.clone())
    }

    pub fn shipments(&self) -> ShipmentRepository {
        ShipmentRepository::new(self.pool.clone())
    }

    pub fn inventory(&self) -> InventoryRepository {
        InventoryRepository::new(self.pool.clone())
    }

    pub fn pickups(&self) -> PickupRepository {
        PickupRepository::new(self.pool.clone())
    }

    /// Waits for in-flight queries, then closes every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert_eq!(db.orders().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_store_refuses_queries() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(db.orders().count().await.is_err());
    }

    #[test]
    fn test_file_config() {
        let config = DbConfig::new("/var/lib/tally/tally.db")
            .max_connections(8)
            .busy_timeout(Duration::from_secs(1));

        assert_eq!(config.database_path, Some(PathBuf::from("/var/lib/tally/tally.db")));
        assert_eq!(config.max_connections, 8);
        assert_eq!(DbConfig::in_memory().database_path, None);
    }
}
