//! Realized volatility: rolling sample standard deviation of simple returns.
//!
//! return[t] = close[t] / close[t-1] - 1
//! vol[t] = std(return[t-window+1..=t]), ddof = 1.
//! Lookback: window.

use crate::components::indicator::Indicator;
use crate::domain::Candle;

pub const DEFAULT_VOLATILITY_WINDOW: usize = 20;

#[derive(Debug, Clone)]
pub struct RealizedVolatility {
    window: usize,
    name: String,
}

impl RealizedVolatility {
    pub fn new(window: usize) -> Self {
        assert!(window >= 2, "volatility window must be >= 2");
        Self {
            window,
            name: format!("volatility_{window}"),
        }
    }
}

impl Default for RealizedVolatility {
    fn default() -> Self {
        Self::new(DEFAULT_VOLATILITY_WINDOW)
    }
}

/// Simple returns; index 0 is NaN.
pub fn simple_returns(candles: &[Candle]) -> Vec<f64> {
    let mut out = vec![f64::NAN; candles.len()];
    for i in 1..candles.len() {
        let prev = candles[i - 1].close;
        if prev != 0.0 {
            out[i] = candles[i].close / prev - 1.0;
        }
    }
    out
}

/// Sample standard deviation (ddof = 1). NaN for fewer than two values.
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

impl Indicator for RealizedVolatility {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let returns = simple_returns(candles);
        let mut result = vec![f64::NAN; candles.len()];
        for i in self.window..candles.len() {
            let window = &returns[i + 1 - self.window..=i];
            if window.iter().any(|r| r.is_nan()) {
                continue;
            }
            result[i] = sample_std(window);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn constant_growth_has_zero_volatility() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let result = RealizedVolatility::default().compute(&make_candles(&closes));
        assert!(result[19].is_nan());
        assert_approx(result[20], 0.0, 1e-9);
    }

    #[test]
    fn alternating_returns() {
        // Returns alternate +10%, -10%-ish; check against sample_std directly.
        let closes = [100.0, 110.0, 99.0, 108.9, 98.01];
        let candles = make_candles(&closes);
        let result = RealizedVolatility::new(4).compute(&candles);
        let returns = simple_returns(&candles);
        assert_approx(result[4], sample_std(&returns[1..=4]), DEFAULT_EPSILON);
    }

    #[test]
    fn sample_std_uses_ddof_1() {
        assert_approx(sample_std(&[1.0, 2.0, 3.0, 4.0]), (5.0f64 / 3.0).sqrt(), DEFAULT_EPSILON);
        assert!(sample_std(&[1.0]).is_nan());
    }

    #[test]
    fn lookback() {
        assert_eq!(RealizedVolatility::default().lookback(), 20);
    }
}
