//! Exchange capability interface consumed by the orchestrator.
//!
//! One concrete implementation per venue, selected at construction time and
//! handed around as `Arc<dyn Exchange>`. The paper venue is the only one
//! shipped here.

pub mod paper;
pub mod registry;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use trendband_core::domain::{
    Candle, OrderId, OrderSide, OrderStatus, OrderType, PositionSide, Timeframe,
};

pub use paper::{PaperConfig, PaperExchange};
pub use registry::{ExchangeRegistry, RegistryError, Venue};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("rejected by venue: {0}")]
    Rejected(String),
    #[error("exchange is not connected")]
    NotConnected,
    #[error("unknown order {0}")]
    UnknownOrder(String),
    #[error("{0} is not supported by this venue")]
    Unsupported(&'static str),
}

impl ExchangeError {
    /// Transport failures and deadline expiry may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Transport(_) | ExchangeError::Timeout { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub free: f64,
    pub used: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last: f64,
    pub bid: f64,
    pub ask: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOrderRequest {
    /// Caller-side id, echoed back in the snapshot.
    pub client_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    /// Closing orders must only shrink an existing position.
    pub reduce_only: bool,
}

impl ExchangeOrderRequest {
    pub fn market(client_id: OrderId, symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            client_id,
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            reduce_only: false,
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }
}

/// The venue's view of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub exchange_id: String,
    pub client_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub filled: f64,
    pub average_price: Option<f64>,
    pub fee: f64,
    pub status: OrderStatus,
    pub updated_at: DateTime<Utc>,
}

impl OrderSnapshot {
    pub fn is_filled(&self) -> bool {
        matches!(self.status, OrderStatus::Filled { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: String,
    pub side: PositionSide,
    pub size: f64,
    pub entry_price: f64,
    pub leverage: u32,
}

#[async_trait]
pub trait Exchange: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Returns false when the venue refused the session.
    async fn connect(&self) -> Result<bool, ExchangeError>;

    async fn disconnect(&self) -> Result<(), ExchangeError>;

    fn is_connected(&self) -> bool;

    /// `None` selects the venue's quote currency.
    async fn get_balance(&self, currency: Option<&str>) -> Result<Balance, ExchangeError>;

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;

    /// Most recent `limit` candles, oldest first.
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn create_order(&self, request: &ExchangeOrderRequest)
        -> Result<OrderSnapshot, ExchangeError>;

    async fn cancel_order(&self, exchange_id: &str, symbol: &str)
        -> Result<OrderSnapshot, ExchangeError>;

    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderSnapshot>, ExchangeError>;

    async fn get_positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ExchangeError::Transport("reset".into()).is_retryable());
        assert!(ExchangeError::Timeout {
            operation: "get_ticker",
            after: Duration::from_secs(5)
        }
        .is_retryable());
        assert!(!ExchangeError::Rejected("margin".into()).is_retryable());
        assert!(!ExchangeError::NotConnected.is_retryable());
        assert!(!ExchangeError::Unsupported("limit orders").is_retryable());
    }
}
