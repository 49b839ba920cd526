//! trendband runner: the async runtime around `trendband-core`.
//!
//! This crate provides:
//! - Typed event model and the in-process event bus
//! - Exchange capability trait, the paper venue and the exchange registry
//! - Retry with back-off, per-call deadlines and the cancellable scheduler
//! - Strategy engine (MarketData in, Signal out)
//! - Orchestrator control loop with pause/resume/shutdown handle
//! - TOML system configuration, candle loading and the parameter sweep

pub mod bus;
pub mod config;
pub mod data;
pub mod events;
pub mod exchange;
pub mod orchestrator;
pub mod retry;
pub mod scheduler;
pub mod strategy_engine;
pub mod sweep;

pub use bus::{handler_fn, BusStats, Delivery, EventBus, EventHandler, HandlerResult, Publisher};
pub use config::{ConfigError, SystemConfig};
pub use data::{load_candles_csv, synthetic_candles, write_candles_csv, DataError};
pub use events::{Event, EventKind, EventPayload, MarketData, SystemNoticeKind, TradeFill};
pub use exchange::{
    Exchange, ExchangeError, ExchangeRegistry, PaperConfig, PaperExchange, RegistryError, Venue,
};
pub use orchestrator::{
    Orchestrator, OrchestratorError, OrchestratorHandle, RunState, RunSummary, SystemStatus,
};
pub use retry::{with_deadline, with_retry, RetryConfig};
pub use scheduler::Scheduler;
pub use strategy_engine::{EngineState, StrategyEngine};
pub use sweep::{ParamGrid, ParamSweep, SweepResult, SweepResults};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn shared_runtime_types_are_send_sync() {
        assert_send::<EventBus>();
        assert_sync::<EventBus>();
        assert_send::<Publisher>();
        assert_sync::<Publisher>();
        assert_send::<Event>();
        assert_sync::<Event>();
        assert_send::<PaperExchange>();
        assert_sync::<PaperExchange>();
        assert_send::<ExchangeRegistry>();
        assert_sync::<ExchangeRegistry>();
        assert_send::<StrategyEngine>();
        assert_sync::<StrategyEngine>();
        assert_send::<OrchestratorHandle>();
        assert_sync::<OrchestratorHandle>();
    }

    #[test]
    fn orchestrator_run_future_is_send() {
        fn assert_send_future<F: std::future::Future + Send>(_: F) {}
        fn check(orchestrator: Orchestrator) {
            assert_send_future(orchestrator.run());
        }
        let _ = check;
    }
}
