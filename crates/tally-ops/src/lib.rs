//! # tally-ops: Fulfillment Services for Tally
//!
//! This crate applies the rules of `tally-core` against the backing store
//! and the two external collaborators: the carrier label service and the
//! payment processor.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Order Detail Screen                             │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │               OrderDetailOrchestrator (load / dispatch)          │  │
//! │  └───────┬──────────────────┬───────────────────┬───────────────────┘  │
//! │          ▼                  ▼                   ▼                       │
//! │  ┌──────────────┐  ┌────────────────┐  ┌─────────────────────┐         │
//! │  │ OrderStatus  │  │ RefundService  │  │ ShipmentLabel       │         │
//! │  │ Service      │  │                │  │ Manager             │         │
//! │  └──────┬───────┘  └───────┬────────┘  └──────────┬──────────┘         │
//! │         │                  │                      │                     │
//! │         │          PaymentProcessor         CarrierClient               │
//! │         │          (HTTP or fake)           (HTTP or fake)              │
//! │         ▼                  ▼                      ▼                     │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │          OrderStore / ShipmentStore / InventoryStore             │  │
//! │  │                    (tally_db::Database)                          │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │         ▲                                                               │
//! │  ┌──────┴───────┐                                                       │
//! │  │ Inventory    │  adjustments, bulk stock save, stock release          │
//! │  │ Ledger       │                                                       │
//! │  └──────────────┘                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`orchestrator`] - Composed order view and action dispatch
//! - [`status`] - Status transitions, cancel, pickup completion
//! - [`refunds`] - Refund planning and submission
//! - [`labels`] - Shipping label purchase and void
//! - [`ledger`] - Inventory adjustments and bulk stock edits
//! - [`carrier`] / [`payments`] - External service clients
//! - [`store`] - Store seams over `tally_db::Database`
//! - [`config`] - TOML + environment configuration
//! - [`telemetry`] - tracing subscriber setup
//! - [`error`] - Service errors and panel errors
//! - [`testing`] - In-memory collaborators
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_ops::{OpsConfig, OrderAction, OrderDetailOrchestrator};
//!
//! let config = OpsConfig::load_or_default(None);
//! tally_ops::telemetry::init_tracing(&config.logging);
//!
//! let orders = OrderDetailOrchestrator::connect(&config).await?;
//! let report = orders
//!     .dispatch("ord_1001", OrderAction::CreateLabel, &actor)
//!     .await?;
//! if let Err(panel_error) = &report.outcome {
//!     println!("{:?}: {}", report.panel, panel_error.message);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod carrier;
pub mod config;
pub mod error;
pub mod labels;
pub mod ledger;
pub mod orchestrator;
pub mod payments;
pub mod refunds;
pub mod status;
pub mod store;
pub mod telemetry;
pub mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use carrier::{CarrierClient, HttpCarrierClient, PurchasedLabel, VoidDecision};
pub use config::{ConfigError, OpsConfig};
pub use error::{ErrorCategory, ErrorCode, OpsError, OpsResult, PanelError};
pub use labels::{ShipmentLabelManager, VoidOutcome};
pub use ledger::{AdjustmentResult, InventoryLedger};
pub use orchestrator::{
    ActionGuards, ActionOutcome, DispatchReport, OrderAction, OrderDetailOrchestrator, OrderView,
    Panel,
};
pub use payments::{HttpPaymentProcessor, PaymentProcessor, RefundSubmission};
pub use refunds::RefundService;
pub use status::{AppliedTransition, OrderStatusService, PickupCompleted};
pub use store::{InventoryStore, OrderStore, ShipmentStore};
