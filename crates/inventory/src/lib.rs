//! Inventory stock-control domain.
//!
//! This crate contains business rules for stock records and holds, implemented
//! purely as deterministic domain logic (no IO, no locking, no storage).

pub mod anomaly;
pub mod health;
pub mod mutation;
pub mod operation;
pub mod reservation;
pub mod stock;
pub mod validation;

pub use anomaly::{StockAnomaly, StockAnomalyDetector};
pub use health::{StockHealth, StockHealthEvaluator, StockStatus, TurnoverMetrics};
pub use mutation::{StockMutation, verify_chain};
pub use operation::{StockOperationRequest, StockOperationType};
pub use reservation::{
    HoldReason, ReleaseReason, Reservation, ReservationContext, ReservationStatus,
    default_reservation_ttl,
};
pub use stock::{DEFAULT_MIN_LEVEL, StockLevels, StockRecord, StockThresholds};
pub use validation::{MAX_QUANTITY_PER_REQUEST, StockOperationValidator};
