//! Position sizer: converts balance, price and risk parameters into an order plan.
//!
//! # Formula
//! ```text
//! leverage       = tier(balance) clamped to [min_leverage, max_leverage]
//! risk_amount    = balance * risk_per_trade
//! position_value = risk_amount / stop_loss_percent * leverage
//! capped         = min(position_value, balance * max_position_size * leverage)
//! quantity       = capped / price
//! ```
//!
//! Leverage tiers: balance <= 10,000 → max leverage, < 100,000 → 10x, else 5x.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::risk::config::RiskConfig;

pub const SMALL_ACCOUNT_CEILING: f64 = 10_000.0;
pub const MEDIUM_ACCOUNT_CEILING: f64 = 100_000.0;
pub const MEDIUM_ACCOUNT_LEVERAGE: u32 = 10;
pub const LARGE_ACCOUNT_LEVERAGE: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionPlan {
    pub leverage: u32,
    pub quantity: f64,
    /// Leveraged notional after the exposure cap.
    pub position_value: f64,
    pub risk_amount: f64,
    /// True when the exposure cap reduced the position.
    pub capped: bool,
    pub entry_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_1_price: f64,
    pub take_profit_2_price: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizingError {
    #[error("balance must be positive, got {0}")]
    NonPositiveBalance(f64),
    #[error("price must be positive, got {0}")]
    NonPositivePrice(f64),
    #[error("order too small: quantity {quantity} below minimum {min_quantity}")]
    BelowMinimum { quantity: f64, min_quantity: f64 },
}

#[derive(Debug, Clone)]
pub struct PositionSizer {
    config: RiskConfig,
}

impl PositionSizer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn leverage_for(&self, balance: f64) -> u32 {
        let tier = if balance <= SMALL_ACCOUNT_CEILING {
            self.config.max_leverage
        } else if balance < MEDIUM_ACCOUNT_CEILING {
            MEDIUM_ACCOUNT_LEVERAGE
        } else {
            LARGE_ACCOUNT_LEVERAGE
        };
        tier.clamp(self.config.min_leverage, self.config.max_leverage)
    }

    pub fn size(&self, balance: f64, price: f64) -> Result<PositionPlan, SizingError> {
        if !(balance > 0.0) {
            return Err(SizingError::NonPositiveBalance(balance));
        }
        if !(price > 0.0) {
            return Err(SizingError::NonPositivePrice(price));
        }

        let leverage = self.leverage_for(balance);
        let risk_amount = balance * self.config.risk_per_trade;
        let uncapped = risk_amount / self.config.stop_loss_percent * leverage as f64;
        let max_value = balance * self.config.max_position_size * leverage as f64;

        let capped = uncapped > max_value;
        let position_value = if capped {
            warn!(
                requested = uncapped,
                cap = max_value,
                leverage,
                "position value exceeds exposure cap, reducing"
            );
            max_value
        } else {
            uncapped
        };

        let quantity = position_value / price;
        let min_quantity = self.config.min_order_size / price;
        if quantity < min_quantity {
            return Err(SizingError::BelowMinimum {
                quantity,
                min_quantity,
            });
        }

        Ok(PositionPlan {
            leverage,
            quantity,
            position_value,
            risk_amount,
            capped,
            entry_price: price,
            stop_loss_price: price * (1.0 - self.config.stop_loss_percent),
            take_profit_1_price: price * self.config.take_profit_1,
            take_profit_2_price: price * self.config.take_profit_2,
        })
    }
}
