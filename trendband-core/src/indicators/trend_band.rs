//! Trend band: ATR-based flip-and-hold trailing band.
//!
//! mid = (high + low) / 2, upper = mid + k·ATR, lower = mid - k·ATR, with ATR the
//! rolling mean of true range. The band is seeded at the first bar with a valid
//! ATR (direction up, band = lower). After that:
//!
//! - up:   band = max(lower, prev_band); close < band flips down, band = upper
//! - down: band = min(upper, prev_band); close > band flips up,   band = lower
//!
//! Inherently sequential: each value depends on the previous one, so candles
//! must be processed in chronological order from the seed.
//!
//! Lookback: period - 1.

use serde::{Deserialize, Serialize};

use crate::components::indicator::Indicator;
use crate::domain::{ensure_chronological, Candle, CandleError};
use crate::indicators::atr::Atr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
}

/// Band level and direction per candle. Warmup entries are NaN / `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrendBandSeries {
    pub band: Vec<f64>,
    pub direction: Vec<Option<TrendDirection>>,
}

impl TrendBandSeries {
    pub fn len(&self) -> usize {
        self.band.len()
    }

    pub fn is_empty(&self) -> bool {
        self.band.is_empty()
    }

    pub fn last(&self) -> Option<(f64, TrendDirection)> {
        let band = *self.band.last()?;
        let direction = (*self.direction.last()?)?;
        Some((band, direction))
    }
}

#[derive(Debug, Clone)]
pub struct TrendBand {
    period: usize,
    multiplier: f64,
    atr: Atr,
    name: String,
}

impl TrendBand {
    pub fn new(period: usize, multiplier: f64) -> Self {
        assert!(period >= 1, "trend band period must be >= 1");
        assert!(
            multiplier > 0.0 && multiplier.is_finite(),
            "trend band multiplier must be positive"
        );
        Self {
            period,
            multiplier,
            atr: Atr::new(period),
            name: format!("trend_band_{period}_{multiplier}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Run the recurrence, rejecting candles that are not strictly chronological.
    pub fn series(&self, candles: &[Candle]) -> Result<TrendBandSeries, CandleError> {
        ensure_chronological(candles)?;
        Ok(self.run(candles))
    }

    fn run(&self, candles: &[Candle]) -> TrendBandSeries {
        let n = candles.len();
        let mut out = TrendBandSeries {
            band: vec![f64::NAN; n],
            direction: vec![None; n],
        };

        let atr = self.atr.compute(candles);
        let Some(start) = atr.iter().position(|v| !v.is_nan()) else {
            return out;
        };

        let (_, lower) = self.bands(&candles[start], atr[start]);
        let mut band = lower;
        let mut direction = TrendDirection::Up;
        out.band[start] = band;
        out.direction[start] = Some(direction);

        for i in (start + 1)..n {
            if !atr[i].is_nan() {
                let (upper, lower) = self.bands(&candles[i], atr[i]);
                let close = candles[i].close;
                match direction {
                    TrendDirection::Up => {
                        band = lower.max(band);
                        if close < band {
                            direction = TrendDirection::Down;
                            band = upper;
                        }
                    }
                    TrendDirection::Down => {
                        band = upper.min(band);
                        if close > band {
                            direction = TrendDirection::Up;
                            band = lower;
                        }
                    }
                }
            }
            out.band[i] = band;
            out.direction[i] = Some(direction);
        }

        out
    }

    fn bands(&self, candle: &Candle, atr: f64) -> (f64, f64) {
        let mid = candle.mid();
        (mid + self.multiplier * atr, mid - self.multiplier * atr)
    }
}

impl Indicator for TrendBand {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.atr.lookback()
    }

    /// Band level only. Callers needing the direction or ordering checks use `series`.
    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        self.run(candles).band
    }
}
