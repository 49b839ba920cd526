//! Synchronous order parameter checks. Failures are never retried.

use thiserror::Error;

use crate::domain::{OrderSide, OrderType};
use crate::risk::config::RiskConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{symbol}: quantity must be positive, got {quantity}")]
    NonPositiveQuantity { symbol: String, quantity: f64 },
    #[error("{symbol}: price must be positive, got {price}")]
    NonPositivePrice { symbol: String, price: f64 },
    #[error("{symbol}: order value {value:.2} below minimum {minimum:.2}")]
    BelowMinimumValue {
        symbol: String,
        value: f64,
        minimum: f64,
    },
    #[error("{symbol}: required margin {required:.2} exceeds available {available:.2}")]
    InsufficientMargin {
        symbol: String,
        required: f64,
        available: f64,
    },
    #[error("leverage {leverage}x outside [{min}x, {max}x]")]
    LeverageOutOfRange { leverage: u32, min: u32, max: u32 },
}

#[derive(Debug, Clone)]
pub struct OrderValidator {
    config: RiskConfig,
}

impl OrderValidator {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Notional must reach `min_order_size`; margin (notional / leverage) must fit the balance.
    pub fn validate_market(
        &self,
        symbol: &str,
        _side: OrderSide,
        quantity: f64,
        price: f64,
        balance: f64,
        leverage: u32,
    ) -> Result<(), ValidationError> {
        if !(quantity > 0.0) {
            return Err(ValidationError::NonPositiveQuantity {
                symbol: symbol.to_string(),
                quantity,
            });
        }
        if !(price > 0.0) {
            return Err(ValidationError::NonPositivePrice {
                symbol: symbol.to_string(),
                price,
            });
        }

        let value = quantity * price;
        if value < self.config.min_order_size {
            return Err(ValidationError::BelowMinimumValue {
                symbol: symbol.to_string(),
                value,
                minimum: self.config.min_order_size,
            });
        }

        let required = value / leverage.max(1) as f64;
        if required > balance {
            return Err(ValidationError::InsufficientMargin {
                symbol: symbol.to_string(),
                required,
                available: balance,
            });
        }
        Ok(())
    }

    pub fn validate_limit(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        limit_price: f64,
        balance: f64,
        leverage: u32,
    ) -> Result<(), ValidationError> {
        if !(limit_price > 0.0) {
            return Err(ValidationError::NonPositivePrice {
                symbol: symbol.to_string(),
                price: limit_price,
            });
        }
        self.validate_market(symbol, side, quantity, limit_price, balance, leverage)
    }

    pub fn validate_leverage(&self, leverage: u32) -> Result<(), ValidationError> {
        if leverage < self.config.min_leverage || leverage > self.config.max_leverage {
            return Err(ValidationError::LeverageOutOfRange {
                leverage,
                min: self.config.min_leverage,
                max: self.config.max_leverage,
            });
        }
        Ok(())
    }

    /// Dispatch on order type, then check leverage.
    pub fn validate(
        &self,
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        quantity: f64,
        reference_price: f64,
        balance: f64,
        leverage: u32,
    ) -> Result<(), ValidationError> {
        match order_type {
            OrderType::Market => {
                self.validate_market(symbol, side, quantity, reference_price, balance, leverage)?
            }
            OrderType::Limit { price } => {
                self.validate_limit(symbol, side, quantity, price, balance, leverage)?
            }
        }
        self.validate_leverage(leverage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> OrderValidator {
        OrderValidator::new(RiskConfig::default())
    }

    #[test]
    fn accepts_sized_order_within_margin() {
        // 1.2 @ 50,000 = 60,000 notional, 3,000 margin at 20x
        validator()
            .validate_market("BTC/USDT", OrderSide::Buy, 1.2, 50_000.0, 10_000.0, 20)
            .unwrap();
    }

    #[test]
    fn rejects_insufficient_margin() {
        let err = validator()
            .validate_market("BTC/USDT", OrderSide::Buy, 1.2, 50_000.0, 1_000.0, 20)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InsufficientMargin { .. }));
    }

    #[test]
    fn rejects_dust() {
        let err = validator()
            .validate_market("BTC/USDT", OrderSide::Sell, 0.0001, 50_000.0, 10_000.0, 20)
            .unwrap_err();
        assert!(matches!(err, ValidationError::BelowMinimumValue { .. }));
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let err = validator()
            .validate_market("BTC/USDT", OrderSide::Buy, 0.0, 50_000.0, 10_000.0, 20)
            .unwrap_err();
        assert!(matches!(err, ValidationError::NonPositiveQuantity { .. }));
    }

    #[test]
    fn limit_requires_positive_price() {
        let err = validator()
            .validate_limit("BTC/USDT", OrderSide::Buy, 1.0, 0.0, 10_000.0, 20)
            .unwrap_err();
        assert!(matches!(err, ValidationError::NonPositivePrice { .. }));
    }

    #[test]
    fn leverage_bounds() {
        let v = validator();
        assert!(v.validate_leverage(3).is_ok());
        assert!(v.validate_leverage(20).is_ok());
        assert!(v.validate_leverage(2).is_err());
        assert!(v.validate_leverage(21).is_err());
    }

    #[test]
    fn validate_dispatches_on_type() {
        let v = validator();
        let err = v
            .validate(
                "BTC/USDT",
                OrderSide::Buy,
                OrderType::Limit { price: -5.0 },
                1.0,
                50_000.0,
                10_000.0,
                20,
            )
            .unwrap_err();
        assert!(matches!(err, ValidationError::NonPositivePrice { .. }));
        assert!(v
            .validate("BTC/USDT", OrderSide::Buy, OrderType::Market, 0.1, 50_000.0, 10_000.0, 25)
            .is_err());
    }
}
