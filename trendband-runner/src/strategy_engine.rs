//! Strategy engine: turns MarketData events into Signal events.
//!
//! Each candle window is classified (range or trend), a timeframe is
//! recommended from recent volatility and capital, and the signal generator
//! is run on the window. Actionable signals are published with the regime and
//! timeframe recorded in their metadata; holds are only logged.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use trendband_core::domain::{CandleError, Signal, Timeframe};
use trendband_core::regime::{
    recent_volatility, MarketRegime, RegimeClassifier, TimeframeOptimizer, TradingFrequency,
    MIN_REGIME_HISTORY,
};
use trendband_core::strategy::{SignalGenerator, StrategyConfig};
use trendband_core::ConfigError;

use crate::bus::{EventBus, EventHandler, HandlerResult, Publisher, SubscriptionId};
use crate::events::{Event, EventKind, EventPayload, MarketData};

pub const SOURCE: &str = "strategy_engine";

/// Latest view of the market as seen by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineState {
    pub regime: MarketRegime,
    pub timeframe: Timeframe,
    pub windows_processed: u64,
    pub signals_published: u64,
    pub last_signal: Option<Signal>,
}

#[derive(Debug)]
pub struct StrategyEngine {
    generator: SignalGenerator,
    classifier: RegimeClassifier,
    optimizer: TimeframeOptimizer,
    capital: f64,
    frequency: TradingFrequency,
    publisher: Publisher,
    state: Mutex<EngineState>,
}

impl StrategyEngine {
    pub fn new(
        config: StrategyConfig,
        timeframe: Timeframe,
        capital: f64,
        frequency: TradingFrequency,
        publisher: Publisher,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            generator: SignalGenerator::new(config)?,
            classifier: RegimeClassifier::new(),
            optimizer: TimeframeOptimizer,
            capital,
            frequency,
            publisher,
            state: Mutex::new(EngineState {
                regime: MarketRegime::Trend,
                timeframe,
                windows_processed: 0,
                signals_published: 0,
                last_signal: None,
            }),
        })
    }

    /// Subscribe the engine to MarketData on `bus`.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> SubscriptionId {
        bus.subscribe(EventKind::MarketData, Arc::clone(self) as Arc<dyn EventHandler>)
    }

    pub fn generator(&self) -> &SignalGenerator {
        &self.generator
    }

    pub fn state(&self) -> EngineState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Evaluate one window. Returns the signal, annotated with regime and
    /// timeframe, whether or not it was published.
    pub fn process(&self, data: &MarketData) -> Result<Signal, CandleError> {
        let candles = &data.candles[..];
        let mut signal = self.generator.generate(&data.symbol, candles)?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.windows_processed += 1;
        if candles.len() >= MIN_REGIME_HISTORY {
            let regime = self.classifier.classify(candles);
            if regime != state.regime {
                info!(symbol = %data.symbol, regime = regime.as_str(), "market regime changed");
            }
            state.regime = regime;
        }

        let volatility = recent_volatility(candles);
        let recommended = self
            .optimizer
            .recommend(volatility, self.capital, self.frequency);
        if recommended != state.timeframe {
            debug!(
                from = %state.timeframe,
                to = %recommended,
                volatility,
                "recommended timeframe changed"
            );
        }
        state.timeframe = recommended;

        signal = signal
            .with_meta("market_state", state.regime.as_str())
            .with_meta("timeframe", state.timeframe.as_str())
            .with_meta("source_timeframe", data.timeframe.as_str())
            .with_meta("source", SOURCE);

        if signal.is_actionable() {
            state.signals_published += 1;
            state.last_signal = Some(signal.clone());
            drop(state);

            info!(
                symbol = %signal.symbol,
                direction = signal.direction.as_str(),
                confidence = signal.confidence,
                price = signal.price,
                "signal generated"
            );
            self.publisher
                .publish(Event::new(SOURCE, EventPayload::Signal(signal.clone())));
        }
        Ok(signal)
    }
}

#[async_trait]
impl EventHandler for StrategyEngine {
    async fn handle(&self, event: &Event) -> HandlerResult {
        if let EventPayload::MarketData(data) = &event.payload {
            self.process(data)?;
        }
        Ok(())
    }
}
