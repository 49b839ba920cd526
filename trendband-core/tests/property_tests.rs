//! Property tests for core invariants.
//!
//! Uses proptest to verify:
//! 1. Trend band determinism and no look-ahead (prefix consistency)
//! 2. Confidence bounds and the hold floor
//! 3. Sizer never approves an order below the minimum
//! 4. Order status only leaves Pending once
//! 5. Position size never goes negative through the exit ladder

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use trendband_core::clock::ManualClock;
use trendband_core::domain::{Candle, Order, OrderId, OrderSide, OrderType, SignalDirection};
use trendband_core::indicators::TrendBand;
use trendband_core::risk::{RiskConfig, RiskSupervisor};
use trendband_core::sizers::PositionSizer;
use trendband_core::strategy::{SignalGenerator, StrategyConfig, MAX_CONFIDENCE};

// ── Strategies (proptest) ────────────────────────────────────────────

/// Random walk of log returns turned into sane candles.
fn arb_candles(min: usize, max: usize) -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec((-0.04..0.04_f64, 0.0..0.02_f64), min..max).prop_map(|steps| {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut close = 100.0;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (ret, wick))| {
                let open = close;
                close = open * (1.0 + ret);
                Candle::new(
                    base + Duration::hours(i as i64),
                    open,
                    open.max(close) * (1.0 + wick),
                    open.min(close) * (1.0 - wick),
                    close,
                    1_000.0,
                )
            })
            .collect()
    })
}

// ── 1. Trend band ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn trend_band_is_deterministic_and_causal(
        candles in arb_candles(15, 120),
        cut in 1usize..120,
    ) {
        let band = TrendBand::new(10, 3.0);
        let full = band.series(&candles).unwrap();
        let again = band.series(&candles).unwrap();
        prop_assert_eq!(&full.direction, &again.direction);

        let cut = cut.min(candles.len());
        let prefix = band.series(&candles[..cut]).unwrap();
        for i in 0..cut {
            prop_assert_eq!(prefix.direction[i], full.direction[i]);
            prop_assert!(
                prefix.band[i].to_bits() == full.band[i].to_bits(),
                "band differs at {}", i
            );
        }
    }
}

// ── 2. Confidence ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn confidence_is_bounded(candles in arb_candles(1, 100), min_conf in 0.5..0.95_f64) {
        let config = StrategyConfig { min_confidence: min_conf, ..StrategyConfig::default() };
        let gen = SignalGenerator::new(config).unwrap();
        let sig = gen.generate("BTC/USDT", &candles).unwrap();
        prop_assert!(sig.confidence >= 0.0 && sig.confidence <= MAX_CONFIDENCE);
        match sig.direction {
            SignalDirection::Hold => {
                if candles.len() >= gen.config().min_history() {
                    prop_assert!(sig.confidence >= 0.5);
                }
            }
            _ => prop_assert!(sig.confidence >= min_conf),
        }
    }
}

// ── 3. Sizer ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn sizer_never_approves_dust(
        balance in 1.0..1_000_000.0_f64,
        price in 0.01..100_000.0_f64,
        min_order in 0.0..5_000.0_f64,
    ) {
        let config = RiskConfig { min_order_size: min_order, ..RiskConfig::default() };
        let sizer = PositionSizer::new(config.clone());
        if let Ok(plan) = sizer.size(balance, price) {
            prop_assert!(plan.quantity >= min_order / price);
            prop_assert!(plan.leverage >= config.min_leverage && plan.leverage <= config.max_leverage);
            prop_assert!(plan.position_value <= balance * config.max_position_size * plan.leverage as f64 + 1e-6);
        }
    }
}

// ── 4. Order transitions ─────────────────────────────────────────────

proptest! {
    #[test]
    fn order_leaves_pending_once(first in 0u8..3, second in 0u8..3) {
        let mut order = Order::new(
            OrderId::new("ord-1"),
            "BTC/USDT",
            OrderSide::Buy,
            OrderType::Market,
            100.0,
            1.0,
            10,
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        );
        let apply = |order: &mut Order, op: u8| match op {
            0 => order.fill(100.0),
            1 => order.reject("no"),
            _ => order.cancel("no"),
        };
        prop_assert!(apply(&mut order, first).is_ok());
        let terminal = order.status.clone();
        prop_assert!(apply(&mut order, second).is_err());
        prop_assert_eq!(order.status, terminal);
    }
}

// ── 5. Exit ladder ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn position_size_never_negative(prices in prop::collection::vec(90.0..115.0_f64, 1..60)) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        let mut sup = RiskSupervisor::new(RiskConfig::default(), Arc::new(clock)).unwrap();
        sup.open_position("BTC/USDT", OrderSide::Buy, 10.0, 100.0, 20);
        for price in prices {
            if let Some(exit) = sup.evaluate_exits("BTC/USDT", price) {
                sup.apply_exit(&exit, exit.quantity, price, 0.0);
            }
            match sup.position("BTC/USDT") {
                Some(pos) => prop_assert!(pos.size > 0.0),
                None => break,
            }
        }
    }
}
