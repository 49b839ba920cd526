//! Signal generator: dual moving-average crossover confirmed by the trend band.
//!
//! Buy iff fast > slow, the band points up and price is above the band.
//! Sell is the mirror image. Everything else is a hold at confidence 0.5.
//! A buy or sell scoring below `min_confidence` is downgraded to hold with
//! confidence floored at 0.5; the undowngraded score is kept in the
//! `raw_confidence` metadata entry.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::components::indicator::{Indicator, IndicatorValues};
use crate::domain::{ensure_chronological, Candle, CandleError, Signal, SignalDirection};
use crate::error::ConfigError;
use crate::indicators::crossover::{crossover_state, CrossoverState};
use crate::indicators::rsi::{Rsi, DEFAULT_RSI_PERIOD};
use crate::indicators::sma::Sma;
use crate::indicators::trend_band::{TrendBand, TrendDirection};
use crate::indicators::volatility::{RealizedVolatility, DEFAULT_VOLATILITY_WINDOW};

pub const BASE_CONFIDENCE: f64 = 0.6;
pub const HOLD_CONFIDENCE: f64 = 0.5;
pub const MAX_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub fast_window: usize,
    pub slow_window: usize,
    pub band_period: usize,
    pub band_multiplier: f64,
    pub min_confidence: f64,
    pub rsi_period: usize,
    pub volatility_window: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            fast_window: 9,
            slow_window: 21,
            band_period: 10,
            band_multiplier: 3.0,
            min_confidence: 0.6,
            rsi_period: DEFAULT_RSI_PERIOD,
            volatility_window: DEFAULT_VOLATILITY_WINDOW,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fast_window == 0 {
            return Err(ConfigError::out_of_range("fast_window", ">= 1", 0.0));
        }
        if self.slow_window == 0 {
            return Err(ConfigError::out_of_range("slow_window", ">= 1", 0.0));
        }
        if self.band_period == 0 {
            return Err(ConfigError::out_of_range("band_period", ">= 1", 0.0));
        }
        if !(self.band_multiplier > 0.0 && self.band_multiplier.is_finite()) {
            return Err(ConfigError::out_of_range(
                "band_multiplier",
                "> 0",
                self.band_multiplier,
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::out_of_range(
                "min_confidence",
                "within [0, 1]",
                self.min_confidence,
            ));
        }
        if self.rsi_period == 0 {
            return Err(ConfigError::out_of_range("rsi_period", ">= 1", 0.0));
        }
        if self.volatility_window < 2 {
            return Err(ConfigError::out_of_range(
                "volatility_window",
                ">= 2",
                self.volatility_window as f64,
            ));
        }
        Ok(())
    }

    /// Minimum history for a non-trivial signal.
    pub fn min_history(&self) -> usize {
        self.fast_window.max(self.slow_window).max(self.band_period)
    }

    /// History the strategy wants fetched per cycle.
    pub fn required_history(&self) -> usize {
        self.min_history() + 50
    }
}

/// Latest indicator readings the confidence score is built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub fast_ma: f64,
    pub slow_ma: f64,
    pub band: f64,
    pub band_direction: Option<TrendDirection>,
    pub rsi: f64,
    pub volatility: f64,
}

impl IndicatorSnapshot {
    pub fn crossover(&self) -> CrossoverState {
        crossover_state(self.fast_ma, self.slow_ma)
    }

    /// |fast - slow| / slow.
    pub fn trend_strength(&self) -> f64 {
        (self.fast_ma - self.slow_ma).abs() / self.slow_ma
    }
}

#[derive(Debug, Clone)]
pub struct SignalGenerator {
    config: StrategyConfig,
    fast: Sma,
    slow: Sma,
    band: TrendBand,
    rsi: Rsi,
    volatility: RealizedVolatility,
}

impl SignalGenerator {
    pub fn new(config: StrategyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            fast: Sma::new(config.fast_window),
            slow: Sma::new(config.slow_window),
            band: TrendBand::new(config.band_period, config.band_multiplier),
            rsi: Rsi::new(config.rsi_period),
            volatility: RealizedVolatility::new(config.volatility_window),
            config,
        })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Compute the latest indicator readings over `candles`.
    pub fn snapshot(&self, candles: &[Candle]) -> Result<IndicatorSnapshot, CandleError> {
        let band = self.band.series(candles)?;
        let values =
            IndicatorValues::compute_all(&[&self.fast, &self.slow, &self.rsi, &self.volatility], candles);
        let (band_level, band_direction) = match band.last() {
            Some((level, dir)) => (level, Some(dir)),
            None => (f64::NAN, None),
        };
        Ok(IndicatorSnapshot {
            fast_ma: values.latest(self.fast.name()),
            slow_ma: values.latest(self.slow.name()),
            band: band_level,
            band_direction,
            rsi: values.latest(self.rsi.name()),
            volatility: values.latest(self.volatility.name()),
        })
    }

    /// Evaluate the latest candle. Price is the last close.
    pub fn generate(&self, symbol: &str, candles: &[Candle]) -> Result<Signal, CandleError> {
        let last = candles.last().ok_or(CandleError::Empty)?;
        ensure_chronological(candles)?;

        let price = last.close;
        if candles.len() < self.config.min_history() {
            return Ok(Signal::hold(symbol, price, 0.0, last.timestamp)
                .with_meta("reason", "insufficient_history")
                .with_meta("history", candles.len()));
        }

        let snap = self.snapshot(candles)?;
        let crossover = snap.crossover();

        let (direction, raw) = match (crossover, snap.band_direction) {
            (CrossoverState::Golden, Some(TrendDirection::Up)) if price > snap.band => (
                SignalDirection::Buy,
                score(SignalDirection::Buy, &snap, price),
            ),
            (CrossoverState::Dead, Some(TrendDirection::Down)) if price < snap.band => (
                SignalDirection::Sell,
                score(SignalDirection::Sell, &snap, price),
            ),
            _ => (SignalDirection::Hold, HOLD_CONFIDENCE),
        };

        let (direction, confidence) = if raw < self.config.min_confidence {
            (SignalDirection::Hold, raw.max(HOLD_CONFIDENCE))
        } else {
            (direction, raw)
        };

        debug!(
            symbol,
            direction = direction.as_str(),
            confidence,
            raw_confidence = raw,
            "signal evaluated"
        );

        let mut signal = Signal {
            symbol: symbol.to_string(),
            direction,
            price,
            confidence,
            metadata: Default::default(),
            as_of: last.timestamp,
        };
        signal.metadata.insert("fast_ma".into(), json!(snap.fast_ma));
        signal.metadata.insert("slow_ma".into(), json!(snap.slow_ma));
        signal.metadata.insert("band".into(), json!(snap.band));
        signal.metadata.insert(
            "band_direction".into(),
            json!(snap.band_direction.map(|d| match d {
                TrendDirection::Up => "up",
                TrendDirection::Down => "down",
            })),
        );
        signal.metadata.insert("crossover".into(), json!(crossover.as_i8()));
        signal
            .metadata
            .insert("trend_strength".into(), json!(snap.trend_strength()));
        signal.metadata.insert("rsi".into(), json!(snap.rsi));
        signal.metadata.insert("volatility".into(), json!(snap.volatility));
        signal.metadata.insert("raw_confidence".into(), json!(raw));
        Ok(signal)
    }
}

/// Confidence of a buy or sell, clamped to [0, 0.95].
pub fn score(direction: SignalDirection, snap: &IndicatorSnapshot, price: f64) -> f64 {
    let mut confidence = BASE_CONFIDENCE;

    let strength = snap.trend_strength();
    if strength > 0.02 {
        confidence += 0.15;
    } else if strength > 0.01 {
        confidence += 0.08;
    }

    let rsi = snap.rsi;
    let (favorable, unfavorable) = match direction {
        SignalDirection::Sell => (rsi >= 70.0, rsi <= 30.0),
        _ => (rsi <= 30.0, rsi >= 70.0),
    };
    if rsi > 30.0 && rsi < 70.0 {
        confidence += 0.10;
    } else if favorable {
        confidence += 0.15;
    } else if unfavorable {
        confidence -= 0.10;
    }

    let distance = match direction {
        SignalDirection::Sell => (snap.band - price) / snap.band,
        _ => (price - snap.band) / snap.band,
    };
    if distance > 0.01 {
        confidence += 0.05;
    }

    let vol = snap.volatility;
    if vol > 0.01 && vol < 0.05 {
        confidence += 0.05;
    } else if vol > 0.08 {
        confidence -= 0.10;
    }

    confidence.clamp(0.0, MAX_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_candles, make_ohlc_candles};

    fn snapshot(rsi: f64, vol: f64, band: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            fast_ma: 103.0,
            slow_ma: 100.0,
            band,
            band_direction: Some(TrendDirection::Up),
            rsi,
            volatility: vol,
        }
    }

    #[test]
    fn score_components_add_up() {
        // strength 0.03 → +0.15, rsi 50 → +0.10, distance 0.05 → +0.05, vol 0.02 → +0.05
        let s = score(SignalDirection::Buy, &snapshot(50.0, 0.02, 100.0), 105.0);
        assert!((s - 0.95).abs() < 1e-12);
    }

    #[test]
    fn score_penalizes_unfavorable_rsi_and_high_vol() {
        // 0.6 + 0.15 - 0.10 + 0.05 - 0.10 = 0.60
        let s = score(SignalDirection::Buy, &snapshot(80.0, 0.10, 100.0), 105.0);
        assert!((s - 0.60).abs() < 1e-12);
    }

    #[test]
    fn score_mirrors_for_sell() {
        let mut snap = snapshot(75.0, 0.02, 110.0);
        snap.band_direction = Some(TrendDirection::Down);
        // 0.6 + 0.15 + 0.15 (favorable) + 0.05 + 0.05 = 1.0 → clamped
        let s = score(SignalDirection::Sell, &snap, 105.0);
        assert_eq!(s, MAX_CONFIDENCE);
    }

    #[test]
    fn insufficient_history_is_hold_zero() {
        let gen = SignalGenerator::new(StrategyConfig::default()).unwrap();
        let candles = make_candles(&[100.0; 10]);
        let sig = gen.generate("BTC/USDT", &candles).unwrap();
        assert_eq!(sig.direction, SignalDirection::Hold);
        assert_eq!(sig.confidence, 0.0);
        assert_eq!(sig.metadata["reason"], "insufficient_history");
    }

    #[test]
    fn empty_history_is_error() {
        let gen = SignalGenerator::new(StrategyConfig::default()).unwrap();
        assert_eq!(gen.generate("BTC/USDT", &[]), Err(CandleError::Empty));
    }

    #[test]
    fn steady_uptrend_buys() {
        let data: Vec<_> = (0..80)
            .map(|i| {
                let base = 100.0 * 1.02f64.powi(i);
                (base * 0.995, base * 1.01, base * 0.99, base * 1.005)
            })
            .collect();
        let candles = make_ohlc_candles(&data);
        let gen = SignalGenerator::new(StrategyConfig::default()).unwrap();
        let sig = gen.generate("BTC/USDT", &candles).unwrap();
        assert_eq!(sig.direction, SignalDirection::Buy);
        assert!(sig.confidence >= 0.6 && sig.confidence <= MAX_CONFIDENCE);
        assert_eq!(sig.metadata["crossover"], 1);
    }

    #[test]
    fn flat_market_holds_at_half() {
        let gen = SignalGenerator::new(StrategyConfig::default()).unwrap();
        let candles = make_candles(&[100.0; 60]);
        let sig = gen.generate("BTC/USDT", &candles).unwrap();
        assert_eq!(sig.direction, SignalDirection::Hold);
        assert_eq!(sig.confidence, HOLD_CONFIDENCE);
    }

    #[test]
    fn low_score_is_downgraded_but_raw_kept() {
        let config = StrategyConfig {
            min_confidence: 0.99,
            ..StrategyConfig::default()
        };
        let data: Vec<_> = (0..80)
            .map(|i| {
                let base = 100.0 * 1.02f64.powi(i);
                (base * 0.995, base * 1.01, base * 0.99, base * 1.005)
            })
            .collect();
        let gen = SignalGenerator::new(config).unwrap();
        let sig = gen.generate("BTC/USDT", &make_ohlc_candles(&data)).unwrap();
        assert_eq!(sig.direction, SignalDirection::Hold);
        assert!(sig.confidence >= HOLD_CONFIDENCE);
        let raw = sig.metadata["raw_confidence"].as_f64().unwrap();
        assert!(raw >= 0.6);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = StrategyConfig {
            band_multiplier: 0.0,
            ..StrategyConfig::default()
        };
        assert!(SignalGenerator::new(config).is_err());
    }

    #[test]
    fn required_history_adds_margin() {
        assert_eq!(StrategyConfig::default().required_history(), 71);
    }
}
