//! TradeRecord and the bounded trade history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::position::PositionSide;

/// Default capacity of [`TradeHistory`].
pub const TRADE_HISTORY_CAPACITY: usize = 100;

/// Why a position was reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    FirstTarget,
    SecondTarget,
    TrailingStop,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::FirstTarget => "take_profit_1",
            ExitReason::SecondTarget => "take_profit_2",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::Manual => "manual",
        }
    }
}

/// A realized exit (full or partial) of a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub fee: f64,
    /// Realized PnL net of fee.
    pub pnl: f64,
    pub reason: ExitReason,
    pub closed_at: DateTime<Utc>,
}

impl TradeRecord {
    /// Return on the trade as a fraction of entry cost.
    pub fn return_pct(&self) -> f64 {
        if self.entry_price == 0.0 || self.quantity == 0.0 {
            return 0.0;
        }
        self.pnl / (self.entry_price * self.quantity)
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}

/// Append-only ring buffer keeping the most recent trades.
#[derive(Debug, Clone)]
pub struct TradeHistory {
    records: VecDeque<TradeRecord>,
    capacity: usize,
}

impl TradeHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity >= 1, "trade history capacity must be >= 1");
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: TradeRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&TradeRecord> {
        self.records.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter()
    }

    pub fn to_vec(&self) -> Vec<TradeRecord> {
        self.records.iter().cloned().collect()
    }
}

impl Default for TradeHistory {
    fn default() -> Self {
        Self::with_capacity(TRADE_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(pnl: f64) -> TradeRecord {
        TradeRecord {
            symbol: "BTC/USDT".into(),
            side: PositionSide::Long,
            entry_price: 100.0,
            exit_price: 100.0 + pnl,
            quantity: 1.0,
            fee: 0.0,
            pnl,
            reason: ExitReason::Manual,
            closed_at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn return_pct_uses_entry_cost() {
        let trade = record(5.0);
        assert!((trade.return_pct() - 0.05).abs() < 1e-12);
        assert!(trade.is_winner());
    }

    #[test]
    fn history_drops_oldest_beyond_capacity() {
        let mut history = TradeHistory::default();
        for i in 0..150 {
            history.push(record(i as f64));
        }
        assert_eq!(history.len(), TRADE_HISTORY_CAPACITY);
        assert_eq!(history.iter().next().unwrap().pnl, 50.0);
        assert_eq!(history.last().unwrap().pnl, 149.0);
    }

    #[test]
    fn exit_reason_labels() {
        assert_eq!(ExitReason::FirstTarget.as_str(), "take_profit_1");
        assert_eq!(ExitReason::TrailingStop.as_str(), "trailing_stop");
    }
}
