//! Infrastructure layer: stores, per-product locking, and the stock services.
//!
//! The domain rules live in `bazaar-inventory`; this crate serializes access
//! to each stock record and persists the results.

pub mod cancel;
pub mod carts;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod locks;
pub mod reservations;
pub mod store;
pub mod sweeper;

pub use cancel::CancellationFlag;
pub use carts::{AbandonedCart, CartActivityTracker, CartLine};
pub use config::{ConfigError, InventoryConfig};
pub use engine::{InventoryEngine, StockAlert};
pub use ledger::StockLedger;
pub use locks::{ProductGuard, ProductLocks};
pub use reservations::ReservationManager;
pub use sweeper::{AbandonedHoldSweeper, SweepReport, SweeperConfig, SweeperHandle, SweeperStats};
