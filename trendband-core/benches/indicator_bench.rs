//! Criterion benchmarks for the indicator engine and signal generation.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use trendband_core::components::indicator::Indicator;
use trendband_core::domain::Candle;
use trendband_core::indicators::{Adx, Atr, RealizedVolatility, Rsi, Sma, TrendBand};
use trendband_core::strategy::{SignalGenerator, StrategyConfig};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_candles(n: usize) -> Vec<Candle> {
    let base = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            Candle::new(
                base + Duration::hours(i as i64),
                close - 0.3,
                close + 1.5,
                close - 1.5,
                close,
                1_000_000.0,
            )
        })
        .collect()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_indicators(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicators");
    for n in [500usize, 5_000] {
        let candles = make_candles(n);
        let indicators: Vec<Box<dyn Indicator>> = vec![
            Box::new(Sma::new(21)),
            Box::new(Atr::new(10)),
            Box::new(TrendBand::new(10, 3.0)),
            Box::new(Rsi::new(14)),
            Box::new(RealizedVolatility::new(20)),
            Box::new(Adx::new(14)),
        ];
        for ind in &indicators {
            group.bench_with_input(BenchmarkId::new(ind.name(), n), &candles, |b, candles| {
                b.iter(|| ind.compute(black_box(candles)))
            });
        }
    }
    group.finish();
}

fn bench_signal(c: &mut Criterion) {
    let candles = make_candles(200);
    let gen = SignalGenerator::new(StrategyConfig::default()).unwrap();
    c.bench_function("signal_generate_200", |b| {
        b.iter(|| gen.generate("BTC/USDT", black_box(&candles)))
    });
}

criterion_group!(benches, bench_indicators, bench_signal);
criterion_main!(benches);
