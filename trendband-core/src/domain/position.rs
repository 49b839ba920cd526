//! Open position state. Owned and mutated only by the risk supervisor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order::OrderSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
    Flat,
}

impl PositionSide {
    /// +1 for long, -1 for short, 0 for flat.
    pub fn sign(self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
            PositionSide::Flat => 0.0,
        }
    }

    /// Side of the order that opens a position on this side.
    pub fn entry_side(self) -> Option<OrderSide> {
        match self {
            PositionSide::Long => Some(OrderSide::Buy),
            PositionSide::Short => Some(OrderSide::Sell),
            PositionSide::Flat => None,
        }
    }

    /// Side of the order that reduces a position on this side.
    pub fn exit_side(self) -> Option<OrderSide> {
        self.entry_side().map(OrderSide::opposite)
    }
}

impl From<OrderSide> for PositionSide {
    fn from(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        }
    }
}

/// How far the staged take-profit ladder has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStage {
    Open,
    FirstTargetTaken,
    SecondTargetTaken,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    /// Remaining size; never negative.
    pub size: f64,
    /// Size at entry, the base for every tranche.
    pub initial_size: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    /// Best price seen since the second tranche was taken.
    pub high_water_mark: Option<f64>,
    pub unrealized_pnl: f64,
    pub leverage: u32,
    pub stage: ExitStage,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn open(
        symbol: impl Into<String>,
        side: PositionSide,
        size: f64,
        entry_price: f64,
        leverage: u32,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            initial_size: size,
            entry_price,
            mark_price: entry_price,
            high_water_mark: None,
            unrealized_pnl: 0.0,
            leverage,
            stage: ExitStage::Open,
            opened_at,
        }
    }

    /// Signed PnL as a fraction of entry price (positive = in profit).
    pub fn pnl_pct(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        self.side.sign() * (price - self.entry_price) / self.entry_price
    }

    /// Unrealized PnL of the remaining size at `price`.
    pub fn pnl_at(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) * self.size
    }

    pub fn notional(&self) -> f64 {
        self.size * self.entry_price
    }

    pub fn mark(&mut self, price: f64) {
        self.mark_price = price;
        self.unrealized_pnl = self.pnl_at(price);
    }

    pub fn is_closed(&self) -> bool {
        self.size <= f64::EPSILON
    }
}
