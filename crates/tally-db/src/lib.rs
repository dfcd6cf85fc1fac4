//! # tally-db: Database Layer for Tally
//!
//! This crate is the backing data store of the fulfillment core.
//! It uses SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Data Flow                                  │
//! │                                                                         │
//! │  tally-ops service (RefundService::compute_and_submit)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │◄───│ OrderRepo      │   │  (embedded)  │   │   │
//! │  │   │  SqlitePool   │    │ RefundRepo     │   │ 001_init.sql │   │   │
//! │  │   │               │    │ ShipmentRepo   │   │              │   │   │
//! │  │   │               │    │ InventoryRepo  │   │              │   │   │
//! │  │   │               │    │ PickupRepo     │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL mode)                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write Guarantees
//! - Status changes are conditional on the status that was read and are
//!   committed together with their history row
//! - Recording a refund recomputes `refunded_total_cents` from the refund
//!   rows in the same transaction
//! - Stock updates clamp at zero in SQL (`MAX(0, q + delta)`)
//!
//! ## Usage
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./tally.db")).await?;
//! let detail = db.orders().get_detail("order-id").await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::inventory::InventoryRepository;
pub use repository::order::{NewOrder, OrderRepository};
pub use repository::pickup::PickupRepository;
pub use repository::refund::RefundRepository;
pub use repository::shipment::ShipmentRepository;
