//! # Repository Module
//!
//! Database repository implementations for Tally.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Service                                                                │
//! │       │  db.shipments().latest_for_order(order_id)                     │
//! │       ▼                                                                 │
//! │  ShipmentRepository                                                    │
//! │  ├── latest_for_order(&self, order_id)                                 │
//! │  ├── insert(&self, shipment)                                           │
//! │  └── mark_voided(&self, shipment_id)                                   │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`order::OrderRepository`] - Orders, items and the status trail
//! - [`refund::RefundRepository`] - Refunds, refund items, refunded totals
//! - [`shipment::ShipmentRepository`] - Shipment rows per order
//! - [`inventory::InventoryRepository`] - Products, batches and the adjustment ledger
//! - [`pickup::PickupRepository`] - Pickup reservations

pub mod inventory;
pub mod order;
pub mod pickup;
pub mod refund;
pub mod shipment;
