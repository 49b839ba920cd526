//! trendband core: candles, indicators, signal generation, sizing and risk supervision.
//!
//! Everything in this crate is synchronous and deterministic:
//! - Domain types (candles, orders, positions, trades, signals, timeframes)
//! - Indicator engine (moving averages, trend band, RSI, volatility, ADX)
//! - Regime classifier and timeframe recommender
//! - Signal generator with confidence scoring
//! - Position sizer, order validator and the risk supervisor state machine
//! - Injectable clock for calendar-day rollover

pub mod clock;
pub mod components;
pub mod domain;
pub mod error;
pub mod indicators;
pub mod regime;
pub mod risk;
pub mod sizers;
pub mod strategy;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ConfigError;
