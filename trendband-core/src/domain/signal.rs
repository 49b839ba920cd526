//! Trading signal produced by the signal generator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order::OrderSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

impl SignalDirection {
    pub fn order_side(self) -> Option<OrderSide> {
        match self {
            SignalDirection::Buy => Some(OrderSide::Buy),
            SignalDirection::Sell => Some(OrderSide::Sell),
            SignalDirection::Hold => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalDirection::Buy => "buy",
            SignalDirection::Sell => "sell",
            SignalDirection::Hold => "hold",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: SignalDirection,
    pub price: f64,
    /// Always within [0, 1].
    pub confidence: f64,
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Timestamp of the candle the signal was computed on.
    pub as_of: DateTime<Utc>,
}

impl Signal {
    pub fn hold(
        symbol: impl Into<String>,
        price: f64,
        confidence: f64,
        as_of: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            direction: SignalDirection::Hold,
            price,
            confidence: confidence.clamp(0.0, 1.0),
            metadata: BTreeMap::new(),
            as_of,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.direction != SignalDirection::Hold
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hold_is_not_actionable() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let sig = Signal::hold("BTC/USDT", 100.0, 0.0, ts).with_meta("reason", "warmup");
        assert!(!sig.is_actionable());
        assert_eq!(sig.direction.order_side(), None);
        assert_eq!(sig.metadata["reason"], "warmup");
    }

    #[test]
    fn direction_maps_to_order_side() {
        assert_eq!(SignalDirection::Buy.order_side(), Some(OrderSide::Buy));
        assert_eq!(SignalDirection::Sell.as_str(), "sell");
    }
}
