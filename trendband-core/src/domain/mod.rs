//! Domain types for trendband

pub mod candle;
pub mod ids;
pub mod order;
pub mod position;
pub mod signal;
pub mod timeframe;
pub mod trade;

pub use candle::{ensure_chronological, Candle, CandleError, CandleSeries};
pub use ids::{OrderId, OrderIdGenerator};
pub use order::{Order, OrderSide, OrderStatus, OrderTransitionError, OrderType};
pub use position::{ExitStage, Position, PositionSide};
pub use signal::{Signal, SignalDirection};
pub use timeframe::{Timeframe, UnknownTimeframe};
pub use trade::{ExitReason, TradeHistory, TradeRecord, TRADE_HISTORY_CAPACITY};

/// Symbol type alias
pub type Symbol = String;
