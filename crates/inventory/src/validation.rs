//! Request-shape and business-rule checks run before a mutation reaches the ledger.

use bazaar_core::ValidationErrors;

use crate::operation::{StockOperationRequest, StockOperationType};

/// Largest absolute quantity a single request may move.
pub const MAX_QUANTITY_PER_REQUEST: i64 = 100_000;

pub mod codes {
    pub const REQUIRED: &str = "required";
    pub const NON_ZERO: &str = "non_zero";
    pub const NON_POSITIVE: &str = "non_positive";
    pub const OUT_OF_RANGE: &str = "out_of_range";
    pub const UNKNOWN_OPERATION: &str = "unknown_operation";
}

/// Pure validator for stock mutation requests.
///
/// Every rule is evaluated; the result carries all violations, not just the first.
#[derive(Debug, Clone)]
pub struct StockOperationValidator {
    max_quantity: i64,
}

impl Default for StockOperationValidator {
    fn default() -> Self {
        Self {
            max_quantity: MAX_QUANTITY_PER_REQUEST,
        }
    }
}

impl StockOperationValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_quantity(&self) -> i64 {
        self.max_quantity
    }

    pub fn validate(&self, request: &StockOperationRequest) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let op = request.operation;

        if !request.product_id.is_valid() {
            errors.push("productId", codes::REQUIRED, "productId must be greater than zero");
        }

        if op == StockOperationType::Unknown {
            errors.push(
                "operationType",
                codes::UNKNOWN_OPERATION,
                "operationType is not a recognised stock operation",
            );
        }

        if request.quantity == 0 {
            errors.push("quantity", codes::NON_ZERO, "quantity must be non-zero");
        } else if op.requires_positive_quantity() && request.quantity < 0 {
            errors.push(
                "quantity",
                codes::NON_POSITIVE,
                format!("quantity must be positive for {op}"),
            );
        }

        // unsigned_abs: i64::MIN has no positive counterpart.
        if request.quantity.unsigned_abs() > self.max_quantity as u64 {
            errors.push(
                "quantity",
                codes::OUT_OF_RANGE,
                format!("quantity must not exceed {} units per request", self.max_quantity),
            );
        }

        if op.requires_reason() && is_blank(request.reason.as_deref()) {
            errors.push("reason", codes::REQUIRED, format!("reason is required for {op}"));
        }

        if op.requires_user() && request.user_id.is_none() {
            errors.push("userId", codes::REQUIRED, format!("userId is required for {op}"));
        }

        if op.requires_order() && request.order_id.is_none() {
            errors.push("orderId", codes::REQUIRED, format!("orderId is required for {op}"));
        }

        if op.requires_transaction_reference()
            && request.order_id.is_none()
            && request.cart_id.is_none()
        {
            errors.push(
                "orderId",
                codes::REQUIRED,
                format!("orderId or cartId is required for {op}"),
            );
        }

        errors.into_result()
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |s| s.trim().is_empty())
}
