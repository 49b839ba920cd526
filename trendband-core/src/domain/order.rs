//! Order types and the one-way order status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::OrderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

/// What kind of order and its price parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OrderType {
    /// Fill immediately at the venue's current price.
    Market,
    /// Fill at limit price or better.
    Limit { price: f64 },
}

impl OrderType {
    pub fn limit_price(&self) -> Option<f64> {
        match self {
            OrderType::Market => None,
            OrderType::Limit { price } => Some(*price),
        }
    }
}

/// Order lifecycle states.
///
/// `Pending` is the only non-terminal state. The only legal edges are
/// `Pending -> Filled`, `Pending -> Rejected` and `Pending -> Cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Filled { price: f64 },
    Rejected { reason: String },
    Cancelled { reason: String },
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Filled { .. } => "filled",
            OrderStatus::Rejected { .. } => "rejected",
            OrderStatus::Cancelled { .. } => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("order {order_id}: illegal transition {from} -> {to}")]
pub struct OrderTransitionError {
    pub order_id: OrderId,
    pub from: &'static str,
    pub to: &'static str,
}

/// A single order as tracked by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Reference price at creation (last close for market orders).
    pub price: f64,
    pub quantity: f64,
    pub leverage: u32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        id: OrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        price: f64,
        quantity: f64,
        leverage: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            side,
            order_type,
            price,
            quantity,
            leverage,
            status: OrderStatus::Pending,
            created_at,
        }
    }

    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn fill(&mut self, price: f64) -> Result<(), OrderTransitionError> {
        self.transition(OrderStatus::Filled { price })
    }

    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), OrderTransitionError> {
        self.transition(OrderStatus::Rejected {
            reason: reason.into(),
        })
    }

    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), OrderTransitionError> {
        self.transition(OrderStatus::Cancelled {
            reason: reason.into(),
        })
    }

    fn transition(&mut self, next: OrderStatus) -> Result<(), OrderTransitionError> {
        if self.status.is_terminal() || next == OrderStatus::Pending {
            return Err(OrderTransitionError {
                order_id: self.id.clone(),
                from: self.status.label(),
                to: next.label(),
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pending_order() -> Order {
        Order::new(
            OrderId::new("ord-1"),
            "BTC/USDT",
            OrderSide::Buy,
            OrderType::Market,
            50_000.0,
            0.5,
            10,
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn new_order_is_pending() {
        let order = pending_order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.is_active());
        assert_eq!(order.notional(), 25_000.0);
    }

    #[test]
    fn pending_to_filled() {
        let mut order = pending_order();
        order.fill(50_010.0).unwrap();
        assert_eq!(order.status, OrderStatus::Filled { price: 50_010.0 });
        assert!(!order.is_active());
    }

    #[test]
    fn filled_cannot_be_rejected() {
        let mut order = pending_order();
        order.fill(50_000.0).unwrap();
        let err = order.reject("late").unwrap_err();
        assert_eq!(err.from, "filled");
        assert_eq!(err.to, "rejected");
    }

    #[test]
    fn rejected_cannot_be_filled() {
        let mut order = pending_order();
        order.reject("insufficient margin").unwrap();
        assert!(order.fill(50_000.0).is_err());
        assert!(order.cancel("again").is_err());
    }

    #[test]
    fn cancelled_is_terminal() {
        let mut order = pending_order();
        order.cancel("shutdown").unwrap();
        assert!(order.status.is_terminal());
        assert!(order.fill(1.0).is_err());
    }

    #[test]
    fn side_helpers() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.sign(), -1.0);
    }

    #[test]
    fn order_type_limit_price() {
        assert_eq!(OrderType::Market.limit_price(), None);
        assert_eq!(OrderType::Limit { price: 99.5 }.limit_price(), Some(99.5));
    }
}
