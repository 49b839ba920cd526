//! Indicator trait and computed indicator values container.
//!
//! Indicators are pure functions: candle history in, numeric series out.
//! The signal generator computes each one over the whole history and reads
//! the latest value.

use crate::domain::Candle;
use std::collections::HashMap;

/// Trait for indicators.
///
/// Indicators take a full candle series and produce a numeric output series of
/// the same length. The first `lookback()` values are `f64::NAN` (warmup).
///
/// # Look-ahead guard
/// No indicator value at index t may depend on candles at t+1 or later.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_9", "atr_10").
    fn name(&self) -> &str;

    /// Number of candles needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire candle series.
    fn compute(&self, candles: &[Candle]) -> Vec<f64>;
}

/// Container for computed indicator series, keyed by indicator name.
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: HashMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute every indicator over `candles` and store it under its name.
    pub fn compute_all(indicators: &[&dyn Indicator], candles: &[Candle]) -> Self {
        let mut values = Self::new();
        for ind in indicators {
            values.insert(ind.name(), ind.compute(candles));
        }
        values
    }

    /// Insert a named indicator series.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Get the indicator value at a specific index.
    pub fn get(&self, name: &str, index: usize) -> Option<f64> {
        self.series.get(name).and_then(|v| v.get(index).copied())
    }

    /// Latest value of a series; NaN when the series is missing or empty.
    pub fn latest(&self, name: &str) -> f64 {
        self.series
            .get(name)
            .and_then(|v| v.last().copied())
            .unwrap_or(f64::NAN)
    }

    /// Get the full series for a named indicator.
    pub fn get_series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    /// Number of indicator series stored.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_candles, Sma};

    #[test]
    fn indicator_values_insert_and_get() {
        let mut iv = IndicatorValues::new();
        iv.insert(
            "sma_20",
            vec![f64::NAN; 19].into_iter().chain(vec![100.0, 101.0]).collect(),
        );
        assert!(iv.get("sma_20", 0).unwrap().is_nan());
        assert_eq!(iv.get("sma_20", 19), Some(100.0));
        assert_eq!(iv.get("sma_20", 21), None);
        assert_eq!(iv.latest("sma_20"), 101.0);
    }

    #[test]
    fn missing_series_is_nan() {
        let iv = IndicatorValues::new();
        assert_eq!(iv.get("nonexistent", 0), None);
        assert!(iv.latest("nonexistent").is_nan());
    }

    #[test]
    fn compute_all_keys_by_name() {
        let fast = Sma::new(2);
        let slow = Sma::new(3);
        let candles = make_candles(&[1.0, 2.0, 3.0, 4.0]);
        let iv = IndicatorValues::compute_all(&[&fast, &slow], &candles);
        assert_eq!(iv.len(), 2);
        assert_eq!(iv.latest("sma_2"), 3.5);
        assert_eq!(iv.latest("sma_3"), 3.0);
    }
}
