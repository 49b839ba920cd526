//! Market regime classification and timeframe recommendation.

use serde::{Deserialize, Serialize};

use crate::components::indicator::Indicator;
use crate::domain::{Candle, Timeframe};
use crate::indicators::adx::Adx;
use crate::indicators::volatility::{sample_std, simple_returns, DEFAULT_VOLATILITY_WINDOW};

/// Below this many candles the classifier reports `Trend`.
pub const MIN_REGIME_HISTORY: usize = 20;
pub const RANGE_VOLATILITY_THRESHOLD: f64 = 0.02;
pub const RANGE_ADX_THRESHOLD: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketRegime {
    Range,
    Trend,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::Range => "range",
            MarketRegime::Trend => "trend",
        }
    }
}

/// "range" iff volatility < 0.02 and ADX(14) < 25, otherwise "trend".
#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    adx: Adx,
}

impl RegimeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, candles: &[Candle]) -> MarketRegime {
        if candles.len() < MIN_REGIME_HISTORY {
            return MarketRegime::Trend;
        }
        let volatility = recent_volatility(candles);
        let adx = self.latest_adx(candles);
        if volatility < RANGE_VOLATILITY_THRESHOLD && adx < RANGE_ADX_THRESHOLD {
            MarketRegime::Range
        } else {
            MarketRegime::Trend
        }
    }

    /// Latest ADX, with warmup NaN read as 0.
    pub fn latest_adx(&self, candles: &[Candle]) -> f64 {
        let v = self.adx.compute(candles).last().copied().unwrap_or(f64::NAN);
        if v.is_nan() {
            0.0
        } else {
            v
        }
    }
}

/// Sample std of up to the last 20 simple returns; 0 when fewer than two exist.
pub fn recent_volatility(candles: &[Candle]) -> f64 {
    let returns = simple_returns(candles);
    let valid: Vec<f64> = returns.into_iter().filter(|r| !r.is_nan()).collect();
    let start = valid.len().saturating_sub(DEFAULT_VOLATILITY_WINDOW);
    let std = sample_std(&valid[start..]);
    if std.is_nan() {
        0.0
    } else {
        std
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingFrequency {
    Low,
    #[default]
    Medium,
    High,
}

/// Picks a candle timeframe from volatility, capital and desired trading frequency.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeframeOptimizer;

impl TimeframeOptimizer {
    pub fn recommend(
        &self,
        volatility: f64,
        capital: f64,
        frequency: TradingFrequency,
    ) -> Timeframe {
        let base = if volatility > 0.05 {
            Timeframe::M15
        } else if volatility > 0.02 {
            Timeframe::M30
        } else {
            Timeframe::H1
        };

        let capital_adj = if capital < 10_000.0 {
            1
        } else if capital < 100_000.0 {
            0
        } else {
            -1
        };
        let frequency_adj = match frequency {
            TradingFrequency::High => 1,
            TradingFrequency::Medium => 0,
            TradingFrequency::Low => -1,
        };

        match capital_adj + frequency_adj {
            total if total > 0 => base.shift(-1),
            total if total < 0 => base.shift(1),
            _ => base,
        }
    }
}
