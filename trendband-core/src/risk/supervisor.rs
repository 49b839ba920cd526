//! Risk supervisor: the single owner of position state and breaker counters.
//!
//! Per symbol: none → open(long|short) → partially closed* → closed → none.
//! Globally: armed → tripped (consecutive losses or daily loss ceiling) → armed
//! again only through an explicit `resume()`.
//!
//! A tripped breaker blocks new entries; exits are always evaluated.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::domain::{
    ExitReason, ExitStage, OrderSide, Position, PositionSide, TradeHistory, TradeRecord,
};
use crate::error::ConfigError;
use crate::risk::alert::{AlertLevel, RiskAlert, RiskAlertKind};
use crate::risk::config::RiskConfig;
use crate::sizers::{PositionPlan, PositionSizer, SizingError};

/// Fraction of the initial size closed at each take-profit target.
pub const TRANCHE_FRACTION: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum TripReason {
    ConsecutiveLosses { count: u32 },
    DailyLoss { loss: f64, ceiling: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BreakerState {
    Armed,
    Tripped { reason: TripReason },
}

/// An entry the strategy wants to take. Quantity and leverage come from sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovedOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: f64,
    pub leverage: u32,
    pub plan: PositionPlan,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskRejection {
    #[error("circuit breaker tripped: {0:?}")]
    BreakerTripped(TripReason),
    #[error("daily loss {loss:.2} reached ceiling {ceiling:.2}")]
    DailyLossCeiling { loss: f64, ceiling: f64 },
    #[error("{symbol}: exposure {total:.2} would exceed limit {limit:.2}")]
    ExposureExceeded {
        symbol: String,
        total: f64,
        limit: f64,
    },
    #[error("{symbol}: opposite-side position already open")]
    OppositePosition { symbol: String },
    #[error(transparent)]
    Sizing(#[from] SizingError),
}

/// A closing order the supervisor wants placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitOrder {
    pub symbol: String,
    /// Side of the closing order.
    pub side: OrderSide,
    pub quantity: f64,
    /// Price that triggered the exit.
    pub trigger_price: f64,
    pub reason: ExitReason,
    /// True when the order flattens the position.
    pub full_close: bool,
}

/// Point-in-time copy of the supervisor state for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskStatus {
    pub consecutive_losses: u32,
    pub daily_loss: f64,
    pub breaker: BreakerState,
    pub open_positions: usize,
    pub total_trades: usize,
    pub last_reset_date: NaiveDate,
}

impl RiskStatus {
    pub fn trading_paused(&self) -> bool {
        matches!(self.breaker, BreakerState::Tripped { .. })
    }
}

#[derive(Debug)]
pub struct RiskSupervisor {
    config: RiskConfig,
    sizer: PositionSizer,
    clock: Arc<dyn Clock>,
    positions: BTreeMap<String, Position>,
    history: TradeHistory,
    consecutive_losses: u32,
    daily_loss: f64,
    last_reset_date: NaiveDate,
    breaker: BreakerState,
    alerts: Vec<RiskAlert>,
}

impl RiskSupervisor {
    pub fn new(config: RiskConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        let today = clock.today();
        Ok(Self {
            sizer: PositionSizer::new(config.clone()),
            config,
            clock,
            positions: BTreeMap::new(),
            history: TradeHistory::default(),
            consecutive_losses: 0,
            daily_loss: 0.0,
            last_reset_date: today,
            breaker: BreakerState::Armed,
            alerts: Vec::new(),
        })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn is_tripped(&self) -> bool {
        matches!(self.breaker, BreakerState::Tripped { .. })
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Cloned snapshot of every open position.
    pub fn positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    pub fn history(&self) -> &TradeHistory {
        &self.history
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    pub fn daily_loss(&self) -> f64 {
        self.daily_loss
    }

    /// Reset the daily loss accumulator when the calendar date changed.
    pub fn roll_day(&mut self) {
        let today = self.clock.today();
        if today != self.last_reset_date {
            info!(
                previous = %self.last_reset_date,
                today = %today,
                daily_loss = self.daily_loss,
                "resetting daily loss"
            );
            self.daily_loss = 0.0;
            self.last_reset_date = today;
        }
    }

    pub fn check_order(
        &mut self,
        request: &OrderRequest,
        balance: f64,
    ) -> Result<ApprovedOrder, RiskRejection> {
        self.roll_day();

        if let BreakerState::Tripped { reason } = &self.breaker {
            return Err(RiskRejection::BreakerTripped(reason.clone()));
        }

        let ceiling = self.config.max_daily_loss * balance;
        if self.daily_loss >= ceiling {
            let loss = self.daily_loss;
            self.trip(TripReason::DailyLoss { loss, ceiling });
            return Err(RiskRejection::DailyLossCeiling { loss, ceiling });
        }

        let existing = self.positions.get(&request.symbol);
        if let Some(pos) = existing {
            if pos.side != PositionSide::from(request.side) {
                return Err(RiskRejection::OppositePosition {
                    symbol: request.symbol.clone(),
                });
            }
        }

        let plan = self.sizer.size(balance, request.price)?;

        let existing_value = existing.map(Position::notional).unwrap_or(0.0);
        let total = existing_value + plan.position_value;
        let limit = self.config.max_position_size * plan.leverage as f64 * balance;
        if existing.is_some() && total > limit {
            let alert = RiskAlert::new(
                RiskAlertKind::Breach,
                AlertLevel::Warning,
                format!("{} exposure would exceed limit", request.symbol),
                self.clock.now(),
            )
            .detail("symbol", request.symbol.as_str())
            .detail("total_value", total)
            .detail("limit", limit);
            self.raise(alert);
            return Err(RiskRejection::ExposureExceeded {
                symbol: request.symbol.clone(),
                total,
                limit,
            });
        }

        debug!(
            symbol = %request.symbol,
            quantity = plan.quantity,
            leverage = plan.leverage,
            "order approved"
        );
        Ok(ApprovedOrder {
            symbol: request.symbol.clone(),
            side: request.side,
            price: request.price,
            quantity: plan.quantity,
            leverage: plan.leverage,
            plan,
        })
    }

    /// Record a filled entry. Same-side fills average into the open position.
    pub fn open_position(
        &mut self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        fill_price: f64,
        leverage: u32,
    ) -> &Position {
        let now = self.clock.now();
        let side = PositionSide::from(side);
        let pos = self
            .positions
            .entry(symbol.to_string())
            .and_modify(|pos| {
                let total = pos.size + quantity;
                pos.entry_price = (pos.entry_price * pos.size + fill_price * quantity) / total;
                pos.size = total;
                pos.initial_size += quantity;
            })
            .or_insert_with(|| Position::open(symbol, side, quantity, fill_price, leverage, now));
        pos.mark(fill_price);
        info!(
            symbol,
            side = ?pos.side,
            size = pos.size,
            entry = pos.entry_price,
            "position opened"
        );
        pos
    }

    /// Update mark price and unrealized PnL.
    pub fn mark(&mut self, symbol: &str, price: f64) {
        if let Some(pos) = self.positions.get_mut(symbol) {
            pos.mark(price);
        }
    }

    /// Full close when signed PnL% <= -stop_loss_percent.
    pub fn check_stop_loss(&mut self, symbol: &str, price: f64) -> Option<ExitOrder> {
        let pos = self.positions.get(symbol)?;
        let pnl_pct = pos.pnl_pct(price);
        if pnl_pct > -self.config.stop_loss_percent {
            return None;
        }

        let exit = ExitOrder {
            symbol: symbol.to_string(),
            side: pos.side.exit_side()?,
            quantity: pos.size,
            trigger_price: price,
            reason: ExitReason::StopLoss,
            full_close: true,
        };
        let alert = RiskAlert::new(
            RiskAlertKind::StopLoss,
            AlertLevel::Critical,
            format!("{symbol} stop loss hit at {price}"),
            self.clock.now(),
        )
        .detail("entry_price", pos.entry_price)
        .detail("current_price", price)
        .detail("pnl_pct", pnl_pct);
        self.raise(alert);
        Some(exit)
    }

    /// Staged take-profit ladder. At most one tranche per call:
    ///
    /// - `Open` and multiple >= tp1: close 30% of the initial size
    /// - `FirstTargetTaken` and multiple >= tp2: close another 30%
    /// - `SecondTargetTaken`: track the high-water mark, close the remainder
    ///   once retracement from it reaches `trailing_stop`
    pub fn check_take_profit(&mut self, symbol: &str, price: f64) -> Option<ExitOrder> {
        let sl = self.config.stop_loss_percent;
        let tp1 = self.config.take_profit_1;
        let tp2 = self.config.take_profit_2;
        let trailing = self.config.trailing_stop;

        let pos = self.positions.get_mut(symbol)?;
        let sign = pos.side.sign();
        let exit_side = pos.side.exit_side()?;
        let multiple = sign * (price - pos.entry_price) / (pos.entry_price * sl);
        let tranche = (pos.initial_size * TRANCHE_FRACTION).min(pos.size);

        let (reason, quantity, full_close, detail) = match pos.stage {
            ExitStage::Open if multiple >= tp1 => {
                (ExitReason::FirstTarget, tranche, false, multiple)
            }
            ExitStage::FirstTargetTaken if multiple >= tp2 => {
                (ExitReason::SecondTarget, tranche, false, multiple)
            }
            ExitStage::SecondTargetTaken => {
                let hwm = pos.high_water_mark.unwrap_or(price);
                let best = if sign > 0.0 { hwm.max(price) } else { hwm.min(price) };
                pos.high_water_mark = Some(best);
                let retracement = sign * (best - price) / best;
                if retracement < trailing {
                    return None;
                }
                (ExitReason::TrailingStop, pos.size, true, retracement)
            }
            _ => return None,
        };

        let full_close = full_close || quantity >= pos.size;
        let exit = ExitOrder {
            symbol: symbol.to_string(),
            side: exit_side,
            quantity,
            trigger_price: price,
            reason,
            full_close,
        };
        let alert = RiskAlert::new(
            RiskAlertKind::TakeProfit,
            AlertLevel::Info,
            format!("{symbol} {} at {price}", reason.as_str()),
            self.clock.now(),
        )
        .detail("quantity", quantity)
        .detail(
            if reason == ExitReason::TrailingStop {
                "retracement"
            } else {
                "pnl_multiple"
            },
            detail,
        );
        self.raise(alert);
        Some(exit)
    }

    /// Mark, then stop loss first, then the take-profit ladder.
    pub fn evaluate_exits(&mut self, symbol: &str, price: f64) -> Option<ExitOrder> {
        self.mark(symbol, price);
        self.check_stop_loss(symbol, price)
            .or_else(|| self.check_take_profit(symbol, price))
    }

    /// Apply a filled exit: shrink the position by the venue's filled
    /// quantity, advance its stage, record the realized trade and drop the
    /// position once flat. A short fill on a full close leaves the remainder
    /// open for the next evaluation.
    pub fn apply_exit(
        &mut self,
        exit: &ExitOrder,
        filled: f64,
        fill_price: f64,
        fee: f64,
    ) -> Option<TradeRecord> {
        let now = self.clock.now();
        let pos = self.positions.get_mut(&exit.symbol)?;

        let quantity = filled.min(pos.size);
        if !(quantity > 0.0) {
            return None;
        }
        let gross = pos.side.sign() * (fill_price - pos.entry_price) * quantity;
        let record = TradeRecord {
            symbol: exit.symbol.clone(),
            side: pos.side,
            entry_price: pos.entry_price,
            exit_price: fill_price,
            quantity,
            fee,
            pnl: gross - fee,
            reason: exit.reason,
            closed_at: now,
        };

        pos.size -= quantity;
        match exit.reason {
            ExitReason::FirstTarget => pos.stage = ExitStage::FirstTargetTaken,
            ExitReason::SecondTarget => {
                pos.stage = ExitStage::SecondTargetTaken;
                pos.high_water_mark = Some(fill_price);
            }
            _ => {}
        }

        if pos.is_closed() {
            info!(symbol = %exit.symbol, reason = exit.reason.as_str(), "position closed");
            self.positions.remove(&exit.symbol);
        } else {
            pos.mark(fill_price);
        }

        self.record_trade(record.clone());
        Some(record)
    }

    /// Append to history and update the loss counters.
    pub fn record_trade(&mut self, record: TradeRecord) {
        self.roll_day();
        let pnl = record.pnl;
        self.history.push(record);

        if pnl < 0.0 {
            self.consecutive_losses += 1;
            self.daily_loss += pnl.abs();
            if self.consecutive_losses >= self.config.max_consecutive_losses && !self.is_tripped()
            {
                self.trip(TripReason::ConsecutiveLosses {
                    count: self.consecutive_losses,
                });
            }
        } else if pnl > 0.0 {
            self.consecutive_losses = 0;
        }
    }

    /// Re-arm a tripped breaker. The daily accumulator is left alone.
    pub fn resume(&mut self) {
        if self.is_tripped() {
            info!(
                consecutive_losses = self.consecutive_losses,
                "circuit breaker re-armed"
            );
        }
        self.breaker = BreakerState::Armed;
        self.consecutive_losses = 0;
    }

    pub fn status(&self) -> RiskStatus {
        RiskStatus {
            consecutive_losses: self.consecutive_losses,
            daily_loss: self.daily_loss,
            breaker: self.breaker.clone(),
            open_positions: self.positions.len(),
            total_trades: self.history.len(),
            last_reset_date: self.last_reset_date,
        }
    }

    /// Take every alert raised since the last drain, oldest first.
    pub fn drain_alerts(&mut self) -> Vec<RiskAlert> {
        std::mem::take(&mut self.alerts)
    }

    fn trip(&mut self, reason: TripReason) {
        let mut alert = RiskAlert::new(
            RiskAlertKind::Breach,
            AlertLevel::Critical,
            "circuit breaker tripped, new entries halted",
            self.clock.now(),
        );
        match &reason {
            TripReason::ConsecutiveLosses { count } => {
                alert = alert.detail("consecutive_losses", *count);
            }
            TripReason::DailyLoss { loss, ceiling } => {
                alert = alert.detail("daily_loss", *loss).detail("ceiling", *ceiling);
            }
        }
        self.breaker = BreakerState::Tripped { reason };
        self.raise(alert);
    }

    fn raise(&mut self, alert: RiskAlert) {
        alert.log();
        self.alerts.push(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn supervisor() -> (RiskSupervisor, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap());
        let sup = RiskSupervisor::new(RiskConfig::default(), Arc::new(clock.clone())).unwrap();
        (sup, clock)
    }

    fn buy(price: f64) -> OrderRequest {
        OrderRequest {
            symbol: "BTC/USDT".into(),
            side: OrderSide::Buy,
            price,
        }
    }

    #[test]
    fn approves_and_sizes() {
        let (mut sup, _) = supervisor();
        let approved = sup.check_order(&buy(50_000.0), 10_000.0).unwrap();
        assert_eq!(approved.leverage, 20);
        assert!((approved.quantity - 1.2).abs() < 1e-12);
    }

    #[test]
    fn rejects_opposite_side() {
        let (mut sup, _) = supervisor();
        sup.open_position("BTC/USDT", OrderSide::Buy, 1.0, 100.0, 20);
        let req = OrderRequest {
            side: OrderSide::Sell,
            ..buy(100.0)
        };
        assert!(matches!(
            sup.check_order(&req, 10_000.0),
            Err(RiskRejection::OppositePosition { .. })
        ));
    }

    #[test]
    fn rejects_added_exposure_with_warning() {
        let (mut sup, _) = supervisor();
        sup.open_position("BTC/USDT", OrderSide::Buy, 1.2, 50_000.0, 20);
        let err = sup.check_order(&buy(50_000.0), 10_000.0).unwrap_err();
        assert!(matches!(err, RiskRejection::ExposureExceeded { .. }));
        let alerts = sup.drain_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Warning);
        assert!(!alerts[0].is_critical_breach());
    }

    #[test]
    fn averaging_into_same_side() {
        let (mut sup, _) = supervisor();
        sup.open_position("ETH/USDT", OrderSide::Buy, 1.0, 100.0, 10);
        let pos = sup.open_position("ETH/USDT", OrderSide::Buy, 1.0, 110.0, 10);
        assert_eq!(pos.size, 2.0);
        assert_eq!(pos.initial_size, 2.0);
        assert!((pos.entry_price - 105.0).abs() < 1e-12);
    }

    #[test]
    fn short_stop_loss_uses_signed_pnl() {
        let (mut sup, _) = supervisor();
        sup.open_position("BTC/USDT", OrderSide::Sell, 1.0, 100.0, 20);
        assert!(sup.check_stop_loss("BTC/USDT", 101.0).is_none());
        let exit = sup.check_stop_loss("BTC/USDT", 102.0).unwrap();
        assert_eq!(exit.side, OrderSide::Buy);
        assert!(exit.full_close);
    }

    #[test]
    fn trailing_requires_both_tranches() {
        let (mut sup, _) = supervisor();
        sup.open_position("BTC/USDT", OrderSide::Buy, 10.0, 100.0, 20);
        // A retracement before any target was taken is not a trailing exit.
        assert!(sup.check_take_profit("BTC/USDT", 101.0).is_none());
        assert_eq!(sup.position("BTC/USDT").unwrap().high_water_mark, None);
    }

    #[test]
    fn status_is_a_snapshot() {
        let (mut sup, _) = supervisor();
        sup.open_position("BTC/USDT", OrderSide::Buy, 1.0, 100.0, 20);
        let status = sup.status();
        sup.open_position("ETH/USDT", OrderSide::Buy, 1.0, 100.0, 20);
        assert_eq!(status.open_positions, 1);
        assert_eq!(sup.status().open_positions, 2);
        assert!(!status.trading_paused());
    }

    #[test]
    fn unknown_symbol_has_no_exit() {
        let (mut sup, _) = supervisor();
        assert!(sup.evaluate_exits("DOGE/USDT", 1.0).is_none());
    }
}
