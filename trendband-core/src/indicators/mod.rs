//! Concrete indicator implementations.
//!
//! Every indicator implements the `Indicator` trait from `components::indicator`
//! and is computed over the full candle history in one pass. The trend band also
//! exposes its direction series, which a single `Vec<f64>` cannot carry.

pub mod adx;
pub mod atr;
pub mod crossover;
pub mod rsi;
pub mod sma;
pub mod trend_band;
pub mod volatility;

pub use adx::Adx;
pub use atr::Atr;
pub use crossover::{crossover_state, CrossoverState};
pub use rsi::Rsi;
pub use sma::Sma;
pub use trend_band::{TrendBand, TrendBandSeries, TrendDirection};
pub use volatility::RealizedVolatility;

/// Create synthetic candles from close prices for testing.
///
/// Generates plausible OHLCV: open = prev_close (or close for first candle),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<crate::domain::Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let high = open.max(close) + 1.0;
            let low = open.min(close) - 1.0;
            make_candle(i, open, high, low, close)
        })
        .collect()
}

/// Create candles from explicit (open, high, low, close) tuples, one hour apart.
#[cfg(test)]
pub fn make_ohlc_candles(data: &[(f64, f64, f64, f64)]) -> Vec<crate::domain::Candle> {
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| make_candle(i, open, high, low, close))
        .collect()
}

#[cfg(test)]
fn make_candle(i: usize, open: f64, high: f64, low: f64, close: f64) -> crate::domain::Candle {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    crate::domain::Candle {
        timestamp: base + chrono::Duration::hours(i as i64),
        open,
        high,
        low,
        close,
        volume: 1000.0,
    }
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
