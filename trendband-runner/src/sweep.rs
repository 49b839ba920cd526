//! Parameter sweep over the signal generator.
//!
//! Each combination replays the generator over every candle prefix past the
//! warm-up and is scored on how often and how confidently it signals. No
//! fills or PnL are simulated.

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use trendband_core::domain::{ensure_chronological, Candle};
use trendband_core::strategy::{SignalGenerator, StrategyConfig};

/// Bars added to the longest window before the first evaluated prefix.
pub const WARMUP_MARGIN: usize = 50;
/// Signal count at which the frequency component of the score saturates.
pub const SIGNAL_SATURATION: f64 = 50.0;
const CONFIDENCE_WEIGHT: f64 = 0.7;
const FREQUENCY_WEIGHT: f64 = 0.3;

/// Values to sweep for each generator parameter.
#[derive(Debug, Clone)]
pub struct ParamGrid {
    pub fast_windows: Vec<usize>,
    pub slow_windows: Vec<usize>,
    pub band_periods: Vec<usize>,
    pub band_multipliers: Vec<f64>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            fast_windows: vec![5, 9, 12],
            slow_windows: vec![21, 26, 50],
            band_periods: vec![7, 10, 14],
            band_multipliers: vec![2.0, 3.0],
        }
    }
}

impl ParamGrid {
    /// Upper bound on the number of combinations, before skipping.
    pub fn size(&self) -> usize {
        self.fast_windows.len()
            * self.slow_windows.len()
            * self.band_periods.len()
            * self.band_multipliers.len()
    }

    /// Every combination with slow > fast, layered over `base`.
    pub fn generate_configs(&self, base: &StrategyConfig) -> Vec<StrategyConfig> {
        let mut configs = Vec::new();
        for &fast in &self.fast_windows {
            for &slow in &self.slow_windows {
                if slow <= fast {
                    continue;
                }
                for &band_period in &self.band_periods {
                    for &band_multiplier in &self.band_multipliers {
                        configs.push(StrategyConfig {
                            fast_window: fast,
                            slow_window: slow,
                            band_period,
                            band_multiplier,
                            ..base.clone()
                        });
                    }
                }
            }
        }
        configs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepResult {
    pub config: StrategyConfig,
    pub signal_count: usize,
    pub avg_confidence: f64,
    pub score: f64,
}

pub fn score(avg_confidence: f64, signal_count: usize) -> f64 {
    let frequency = (signal_count as f64 / SIGNAL_SATURATION).min(1.0);
    avg_confidence * CONFIDENCE_WEIGHT + frequency * FREQUENCY_WEIGHT
}

/// Replay one configuration over `candles`.
pub fn evaluate(config: &StrategyConfig, candles: &[Candle]) -> Result<SweepResult> {
    let generator = SignalGenerator::new(config.clone())
        .with_context(|| format!("invalid strategy parameters {config:?}"))?;
    let warmup = config
        .fast_window
        .max(config.slow_window)
        .max(config.band_period)
        + WARMUP_MARGIN;

    let mut signal_count = 0usize;
    let mut confidence_sum = 0.0;
    for end in warmup..=candles.len() {
        let signal = generator.generate("sweep", &candles[..end])?;
        if signal.is_actionable() {
            signal_count += 1;
            confidence_sum += signal.confidence;
        }
    }

    let avg_confidence = if signal_count == 0 {
        0.0
    } else {
        confidence_sum / signal_count as f64
    };
    Ok(SweepResult {
        config: config.clone(),
        signal_count,
        avg_confidence,
        score: score(avg_confidence, signal_count),
    })
}

pub struct ParamSweep {
    parallel: bool,
}

impl Default for ParamSweep {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamSweep {
    pub fn new() -> Self {
        Self { parallel: true }
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Evaluate every combination in `grid`, best score first.
    pub fn sweep(
        &self,
        grid: &ParamGrid,
        base: &StrategyConfig,
        candles: &[Candle],
    ) -> Result<SweepResults> {
        ensure_chronological(candles)?;
        let configs = grid.generate_configs(base);
        if configs.is_empty() {
            bail!("parameter grid has no combination with slow > fast");
        }
        info!(
            combinations = configs.len(),
            bars = candles.len(),
            parallel = self.parallel,
            "starting parameter sweep"
        );

        let results: Vec<SweepResult> = if self.parallel {
            configs
                .par_iter()
                .map(|config| evaluate(config, candles))
                .collect::<Result<Vec<_>>>()?
        } else {
            configs
                .iter()
                .map(|config| evaluate(config, candles))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(SweepResults::new(results))
    }
}

/// Sweep output, sorted by descending score.
#[derive(Debug, Clone, Serialize)]
pub struct SweepResults {
    results: Vec<SweepResult>,
}

impl SweepResults {
    fn new(mut results: Vec<SweepResult>) -> Self {
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        if let Some(best) = results.first() {
            debug!(score = best.score, signals = best.signal_count, "best combination");
        }
        Self { results }
    }

    pub fn all(&self) -> &[SweepResult] {
        &self.results
    }

    pub fn best(&self) -> Option<&SweepResult> {
        self.results.first()
    }

    pub fn top_n(&self, n: usize) -> &[SweepResult] {
        &self.results[..n.min(self.results.len())]
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
