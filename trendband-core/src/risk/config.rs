//! Risk parameters, validated once at construction.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_leverage: u32,
    pub min_leverage: u32,
    /// Max exposure per symbol as a fraction of balance (before leverage).
    pub max_position_size: f64,
    pub risk_per_trade: f64,
    pub stop_loss_percent: f64,
    /// First take-profit, as a multiple of the stop distance.
    pub take_profit_1: f64,
    pub take_profit_2: f64,
    /// Retracement from the high-water mark that closes the runner.
    pub trailing_stop: f64,
    pub max_consecutive_losses: u32,
    /// Daily loss ceiling as a fraction of balance.
    pub max_daily_loss: f64,
    /// Minimum order notional in quote currency.
    pub min_order_size: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_leverage: 20,
            min_leverage: 3,
            max_position_size: 0.3,
            risk_per_trade: 0.02,
            stop_loss_percent: 0.02,
            take_profit_1: 1.5,
            take_profit_2: 2.0,
            trailing_stop: 0.03,
            max_consecutive_losses: 3,
            max_daily_loss: 0.05,
            min_order_size: 10.0,
        }
    }
}

fn fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(field, "within (0, 1]", value))
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_leverage == 0 {
            return Err(ConfigError::out_of_range("min_leverage", ">= 1", 0.0));
        }
        if self.max_leverage < self.min_leverage {
            return Err(ConfigError::Inconsistent(format!(
                "max_leverage ({}) is below min_leverage ({})",
                self.max_leverage, self.min_leverage
            )));
        }
        fraction("max_position_size", self.max_position_size)?;
        fraction("risk_per_trade", self.risk_per_trade)?;
        fraction("stop_loss_percent", self.stop_loss_percent)?;
        fraction("trailing_stop", self.trailing_stop)?;
        fraction("max_daily_loss", self.max_daily_loss)?;
        if !(self.take_profit_1 > 0.0) {
            return Err(ConfigError::out_of_range(
                "take_profit_1",
                "> 0",
                self.take_profit_1,
            ));
        }
        if self.take_profit_2 < self.take_profit_1 {
            return Err(ConfigError::Inconsistent(format!(
                "take_profit_2 ({}) is below take_profit_1 ({})",
                self.take_profit_2, self.take_profit_1
            )));
        }
        if self.max_consecutive_losses == 0 {
            return Err(ConfigError::out_of_range(
                "max_consecutive_losses",
                ">= 1",
                0.0,
            ));
        }
        if !(self.min_order_size >= 0.0 && self.min_order_size.is_finite()) {
            return Err(ConfigError::out_of_range(
                "min_order_size",
                ">= 0",
                self.min_order_size,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RiskConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_inverted_leverage() {
        let config = RiskConfig {
            min_leverage: 25,
            ..RiskConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Inconsistent(_))));
    }

    #[test]
    fn rejects_zero_stop_loss() {
        let config = RiskConfig {
            stop_loss_percent: 0.0,
            ..RiskConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "stop_loss_percent",
                ..
            })
        ));
    }

    #[test]
    fn rejects_inverted_targets() {
        let config = RiskConfig {
            take_profit_1: 2.5,
            ..RiskConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_partial_override_keeps_defaults() {
        let config: RiskConfig = serde_json::from_str(r#"{"max_leverage": 10}"#).unwrap();
        assert_eq!(config.max_leverage, 10);
        assert_eq!(config.min_leverage, 3);
        assert_eq!(config.trailing_stop, 0.03);
    }
}
