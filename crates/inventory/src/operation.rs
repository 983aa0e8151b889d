use serde::{Deserialize, Serialize};

use bazaar_core::{CartId, OrderId, ProductId, UserId};

/// Kind of stock mutation a caller asks for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockOperationType {
    /// Goods received.
    Addition,
    /// Goods removed for a reason other than sale/damage/expiry.
    Subtraction,
    /// Signed correction after a count.
    Adjustment,
    /// Hold against a cart or order.
    Reservation,
    /// Hold given back.
    Release,
    Sale,
    Return,
    Damage,
    Expiry,
    /// Anything a caller sent that we do not recognise. Always rejected.
    #[serde(other)]
    Unknown,
}

impl StockOperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Addition => "addition",
            Self::Subtraction => "subtraction",
            Self::Adjustment => "adjustment",
            Self::Reservation => "reservation",
            Self::Release => "release",
            Self::Sale => "sale",
            Self::Return => "return",
            Self::Damage => "damage",
            Self::Expiry => "expiry",
            Self::Unknown => "unknown",
        }
    }

    /// Operations that must carry a positive quantity.
    pub fn requires_positive_quantity(self) -> bool {
        !matches!(self, Self::Adjustment | Self::Unknown)
    }

    /// Financially or audit sensitive operations that must explain themselves.
    pub fn requires_reason(self) -> bool {
        matches!(self, Self::Adjustment | Self::Damage | Self::Expiry)
    }

    /// Back-office operations that must name the operator.
    pub fn requires_user(self) -> bool {
        matches!(self, Self::Adjustment | Self::Damage | Self::Expiry)
    }

    /// Operations that must trace back to an order.
    pub fn requires_order(self) -> bool {
        matches!(self, Self::Sale | Self::Return)
    }

    /// Hold operations that trace back to an order or a cart.
    pub fn requires_transaction_reference(self) -> bool {
        matches!(self, Self::Reservation | Self::Release)
    }

    /// Signed effect on on-hand for a validated quantity, or `None` for
    /// operations that only touch the reserved counter.
    pub fn on_hand_delta(self, quantity: i64) -> Option<i64> {
        match self {
            Self::Addition | Self::Return => Some(quantity),
            Self::Subtraction | Self::Sale | Self::Damage | Self::Expiry => Some(-quantity),
            Self::Adjustment => Some(quantity),
            Self::Reservation | Self::Release | Self::Unknown => None,
        }
    }
}

impl core::fmt::Display for StockOperationType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incoming stock mutation request, as submitted by cart/order/admin callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOperationRequest {
    pub product_id: ProductId,
    pub operation: StockOperationType,
    pub quantity: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub cart_id: Option<CartId>,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

impl StockOperationRequest {
    pub fn new(product_id: ProductId, operation: StockOperationType, quantity: i64) -> Self {
        Self {
            product_id,
            operation,
            quantity,
            reason: None,
            reference: None,
            order_id: None,
            cart_id: None,
            user_id: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_cart(mut self, cart_id: CartId) -> Self {
        self.cart_id = Some(cart_id);
        self
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Audit reference: explicit reference, else the order, else the cart.
    pub fn audit_reference(&self) -> Option<String> {
        self.reference
            .clone()
            .or_else(|| self.order_id.map(|o| format!("order:{o}")))
            .or_else(|| self.cart_id.map(|c| format!("cart:{c}")))
    }
}
