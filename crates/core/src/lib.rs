//! `bazaar-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod clock;
pub mod error;
pub mod id;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{CartId, OrderId, ProductId, ReservationId, StockKey, StoreId, UserId};
pub use validation::{FieldError, ValidationErrors};
