//! ADX: Average Directional Index (Wilder).
//!
//! Steps:
//! 1. Compute +DM and -DM from consecutive candles
//! 2. Smooth +DM, -DM, and TR using Wilder smoothing (alpha = 1/period)
//! 3. +DI = 100 * smoothed(+DM) / smoothed(TR)
//! 4. -DI = 100 * smoothed(-DM) / smoothed(TR)
//! 5. DX = 100 * |+DI - -DI| / (+DI + -DI)
//! 6. ADX = Wilder-smoothed DX
//!
//! Every 0/0 (flat market) is taken as 0, so a flat tape reads ADX = 0.
//! Lookback: 2 * period - 1.

use crate::components::indicator::Indicator;
use crate::domain::Candle;
use crate::indicators::atr::{true_range, wilder_smooth};

pub const DEFAULT_ADX_PERIOD: usize = 14;

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    name: String,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ADX period must be >= 1");
        Self {
            period,
            name: format!("adx_{period}"),
        }
    }
}

impl Default for Adx {
    fn default() -> Self {
        Self::new(DEFAULT_ADX_PERIOD)
    }
}

fn ratio_or_zero(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        2 * self.period - 1
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let n = candles.len();
        if n < 2 {
            return vec![f64::NAN; n];
        }

        let mut plus_dm = vec![f64::NAN; n];
        let mut minus_dm = vec![f64::NAN; n];
        for i in 1..n {
            let up = candles[i].high - candles[i - 1].high;
            let down = candles[i - 1].low - candles[i].low;
            plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
            minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
        }

        // TR[0] has no previous close; start TR at index 1 alongside DM.
        let mut tr = true_range(candles);
        tr[0] = f64::NAN;

        let smooth_tr = wilder_smooth(&tr, self.period);
        let smooth_plus = wilder_smooth(&plus_dm, self.period);
        let smooth_minus = wilder_smooth(&minus_dm, self.period);

        let dx: Vec<f64> = (0..n)
            .map(|i| {
                if smooth_tr[i].is_nan() || smooth_plus[i].is_nan() || smooth_minus[i].is_nan() {
                    return f64::NAN;
                }
                let plus_di = 100.0 * ratio_or_zero(smooth_plus[i], smooth_tr[i]);
                let minus_di = 100.0 * ratio_or_zero(smooth_minus[i], smooth_tr[i]);
                100.0 * ratio_or_zero((plus_di - minus_di).abs(), plus_di + minus_di)
            })
            .collect();

        wilder_smooth(&dx, self.period)
    }
}
