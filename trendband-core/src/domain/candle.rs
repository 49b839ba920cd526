//! Candle: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV candle for a single instrument and timeframe.
///
/// Candles are immutable once produced and arrive in strictly increasing
/// timestamp order. Every stateful indicator relies on that ordering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
            && self.volume >= 0.0
    }

    /// Midpoint of the candle's range, (high + low) / 2.
    pub fn mid(&self) -> f64 {
        (self.high + self.low) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleError {
    #[error("candle at index {index} is out of order: {received} is not after {previous}")]
    OutOfOrder {
        index: usize,
        previous: DateTime<Utc>,
        received: DateTime<Utc>,
    },
    #[error("candle at {timestamp} failed OHLC sanity checks")]
    Malformed { timestamp: DateTime<Utc> },
    #[error("no candles supplied")]
    Empty,
}

/// Verify that timestamps strictly increase across the slice.
pub fn ensure_chronological(candles: &[Candle]) -> Result<(), CandleError> {
    for (i, pair) in candles.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(CandleError::OutOfOrder {
                index: i + 1,
                previous: pair[0].timestamp,
                received: pair[1].timestamp,
            });
        }
    }
    Ok(())
}

/// Append-only candle history that refuses out-of-order and malformed input.
#[derive(Debug, Clone, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from an existing vector, validating every candle.
    pub fn from_candles(candles: Vec<Candle>) -> Result<Self, CandleError> {
        if let Some(bad) = candles.iter().find(|c| !c.is_sane()) {
            return Err(CandleError::Malformed {
                timestamp: bad.timestamp,
            });
        }
        ensure_chronological(&candles)?;
        Ok(Self { candles })
    }

    pub fn push(&mut self, candle: Candle) -> Result<(), CandleError> {
        if !candle.is_sane() {
            return Err(CandleError::Malformed {
                timestamp: candle.timestamp,
            });
        }
        if let Some(last) = self.candles.last() {
            if candle.timestamp <= last.timestamp {
                return Err(CandleError::OutOfOrder {
                    index: self.candles.len(),
                    previous: last.timestamp,
                    received: candle.timestamp,
                });
            }
        }
        self.candles.push(candle);
        Ok(())
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn into_vec(self) -> Vec<Candle> {
        self.candles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_candle(minutes: i64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn candle_is_sane() {
        assert!(sample_candle(0).is_sane());
    }

    #[test]
    fn candle_detects_void() {
        let mut candle = sample_candle(0);
        candle.open = f64::NAN;
        assert!(candle.is_void());
        assert!(!candle.is_sane());
    }

    #[test]
    fn candle_detects_insane_high_low() {
        let mut candle = sample_candle(0);
        candle.high = 97.0;
        assert!(!candle.is_sane());
    }

    #[test]
    fn series_rejects_out_of_order() {
        let mut series = CandleSeries::new();
        series.push(sample_candle(60)).unwrap();
        let err = series.push(sample_candle(0)).unwrap_err();
        assert!(matches!(err, CandleError::OutOfOrder { index: 1, .. }));
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn series_rejects_duplicate_timestamp() {
        let mut series = CandleSeries::new();
        series.push(sample_candle(0)).unwrap();
        assert!(series.push(sample_candle(0)).is_err());
    }

    #[test]
    fn ensure_chronological_reports_index() {
        let candles = vec![sample_candle(0), sample_candle(1), sample_candle(1)];
        match ensure_chronological(&candles) {
            Err(CandleError::OutOfOrder { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected out-of-order error, got {other:?}"),
        }
    }

    #[test]
    fn from_candles_rejects_malformed() {
        let mut bad = sample_candle(1);
        bad.low = 200.0;
        let result = CandleSeries::from_candles(vec![sample_candle(0), bad]);
        assert!(matches!(result, Err(CandleError::Malformed { .. })));
    }

    #[test]
    fn candle_serialization_roundtrip() {
        let candle = sample_candle(0);
        let json = serde_json::to_string(&candle).unwrap();
        let deser: Candle = serde_json::from_str(&json).unwrap();
        assert_eq!(candle, deser);
    }
}
