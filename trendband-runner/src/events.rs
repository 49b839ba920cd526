//! Event model carried by the [`EventBus`](crate::bus::EventBus).
//!
//! Every event has a timestamp, a source tag and exactly one payload. The
//! payload enum is the discriminant, so handlers match exhaustively instead of
//! probing loosely-typed maps.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trendband_core::domain::{
    Candle, Order, OrderId, OrderSide, Position, Signal, Timeframe, TradeRecord,
};
use trendband_core::risk::RiskAlert;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MarketData,
    Signal,
    Order,
    Trade,
    Position,
    Risk,
    System,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::MarketData,
        EventKind::Signal,
        EventKind::Order,
        EventKind::Trade,
        EventKind::Position,
        EventKind::Risk,
        EventKind::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MarketData => "market_data",
            EventKind::Signal => "signal",
            EventKind::Order => "order",
            EventKind::Trade => "trade",
            EventKind::Position => "position",
            EventKind::Risk => "risk",
            EventKind::System => "system",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fresh candle window for one symbol. The slice is shared, not copied,
/// between subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketData {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Arc<[Candle]>,
}

impl MarketData {
    pub fn last_close(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }
}

/// An executed fill. Closing fills carry the realized trade record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeFill {
    pub order_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub fee: f64,
    pub realized: Option<TradeRecord>,
}

impl TradeFill {
    pub fn realized_pnl(&self) -> f64 {
        self.realized.as_ref().map_or(0.0, |r| r.pnl)
    }
}

/// Position state after a fill. `position` is `None` once the symbol is flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub symbol: String,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemNoticeKind {
    Start,
    Stop,
    Pause,
    Resume,
    Error,
    ConfigUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemNotice {
    pub kind: SystemNoticeKind,
    pub message: String,
}

impl SystemNotice {
    pub fn new(kind: SystemNoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    MarketData(MarketData),
    Signal(Signal),
    Order(Order),
    Trade(TradeFill),
    Position(PositionUpdate),
    Risk(RiskAlert),
    System(SystemNotice),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::MarketData(_) => EventKind::MarketData,
            EventPayload::Signal(_) => EventKind::Signal,
            EventPayload::Order(_) => EventKind::Order,
            EventPayload::Trade(_) => EventKind::Trade,
            EventPayload::Position(_) => EventKind::Position,
            EventPayload::Risk(_) => EventKind::Risk,
            EventPayload::System(_) => EventKind::System,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp the event with the current wall-clock time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self::at(Utc::now(), source, payload)
    }

    pub fn at(timestamp: DateTime<Utc>, source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            timestamp,
            source: source.into(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn market_data(
        source: impl Into<String>,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> Self {
        Self::new(
            source,
            EventPayload::MarketData(MarketData {
                symbol: symbol.into(),
                timeframe,
                candles: candles.into(),
            }),
        )
    }

    pub fn system(source: impl Into<String>, kind: SystemNoticeKind, message: impl Into<String>) -> Self {
        Self::new(source, EventPayload::System(SystemNotice::new(kind, message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use trendband_core::domain::OrderType;

    #[test]
    fn payload_determines_kind() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let signal = Signal::hold("BTC/USDT", 100.0, 0.5, at);
        let order = Order::new(
            OrderId::new("ord-1"),
            "BTC/USDT",
            OrderSide::Buy,
            OrderType::Market,
            100.0,
            1.0,
            10,
            at,
        );

        assert_eq!(
            Event::at(at, "test", EventPayload::Signal(signal)).kind(),
            EventKind::Signal
        );
        assert_eq!(
            Event::at(at, "test", EventPayload::Order(order)).kind(),
            EventKind::Order
        );
        assert_eq!(
            Event::system("test", SystemNoticeKind::Start, "up").kind(),
            EventKind::System
        );
    }

    #[test]
    fn market_data_shares_candles() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let candle = Candle::new(at, 100.0, 101.0, 99.0, 100.5, 10.0);
        let event = Event::market_data("feed", "BTC/USDT", Timeframe::H1, vec![candle]);
        let copy = event.clone();
        match (&event.payload, &copy.payload) {
            (EventPayload::MarketData(a), EventPayload::MarketData(b)) => {
                assert!(Arc::ptr_eq(&a.candles, &b.candles));
                assert_eq!(a.last_close(), Some(100.5));
            }
            _ => panic!("expected market data"),
        }
    }

    #[test]
    fn kind_names_are_snake_case() {
        let names: Vec<&str> = EventKind::ALL.iter().map(EventKind::as_str).collect();
        assert_eq!(
            names,
            vec!["market_data", "signal", "order", "trade", "position", "risk", "system"]
        );
    }
}
