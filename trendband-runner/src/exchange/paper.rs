//! Paper venue: replays a fixed candle set and fills orders against it.
//!
//! Every `get_candles` call reveals one more bar. Market orders fill at the
//! latest visible close; limit orders rest until a revealed bar trades
//! through their price. Positions are tracked as signed net quantities with
//! an average entry, and realized PnL and fees settle into the quote balance.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use trendband_core::domain::{
    ensure_chronological, Candle, CandleError, OrderSide, OrderStatus, OrderType, PositionSide,
    Timeframe,
};

use super::{
    Balance, Exchange, ExchangeError, ExchangeOrderRequest, ExchangePosition, OrderSnapshot,
    Ticker,
};

const QTY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub initial_balance: f64,
    /// Taker fee as a fraction of notional.
    pub fee_rate: f64,
    pub quote_currency: String,
    /// Quoted bid/ask spread in basis points around the last close.
    pub spread_bps: f64,
    /// Bars already visible before the first `get_candles` call.
    pub warmup_bars: usize,
    pub default_leverage: u32,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            fee_rate: 0.001,
            quote_currency: "USDT".to_string(),
            spread_bps: 2.0,
            warmup_bars: 100,
            default_leverage: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct NetPosition {
    /// Positive long, negative short.
    qty: f64,
    avg_price: f64,
}

#[derive(Debug)]
struct PaperState {
    candles: Vec<Candle>,
    /// Number of visible bars, always >= 1.
    cursor: usize,
    cash: f64,
    positions: BTreeMap<String, NetPosition>,
    leverage: BTreeMap<String, u32>,
    orders: Vec<OrderSnapshot>,
    injected: VecDeque<ExchangeError>,
    next_order: u64,
}

impl PaperState {
    fn last_bar(&self) -> &Candle {
        &self.candles[self.cursor - 1]
    }

    fn last_price(&self) -> f64 {
        self.last_bar().close
    }

    fn leverage_for(&self, symbol: &str, default: u32) -> u32 {
        self.leverage.get(symbol).copied().unwrap_or(default).max(1)
    }

    fn unrealized(&self) -> f64 {
        let price = self.last_price();
        self.positions
            .values()
            .map(|p| (price - p.avg_price) * p.qty)
            .sum()
    }

    fn used_margin(&self, default_leverage: u32) -> f64 {
        self.positions
            .iter()
            .map(|(symbol, p)| {
                p.qty.abs() * p.avg_price / self.leverage_for(symbol, default_leverage) as f64
            })
            .sum()
    }

    fn equity(&self) -> f64 {
        self.cash + self.unrealized()
    }

    /// Signed quantity currently held in `symbol`.
    fn net_qty(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).map_or(0.0, |p| p.qty)
    }

    fn check_margin(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
        config: &PaperConfig,
    ) -> Result<(), ExchangeError> {
        let net = self.net_qty(symbol);
        let reduces = net != 0.0 && net.signum() != side.sign() && quantity <= net.abs() + QTY_EPSILON;
        if reduces {
            return Ok(());
        }
        let leverage = self.leverage_for(symbol, config.default_leverage) as f64;
        let required = quantity * price / leverage + quantity * price * config.fee_rate;
        let free = self.equity() - self.used_margin(config.default_leverage);
        if required > free {
            return Err(ExchangeError::Rejected(format!(
                "insufficient margin: required {required:.2}, free {free:.2}"
            )));
        }
        Ok(())
    }

    /// Apply a fill to cash and the net position. Returns the fee charged.
    fn settle(&mut self, symbol: &str, side: OrderSide, quantity: f64, price: f64, fee_rate: f64) -> f64 {
        let fee = quantity * price * fee_rate;
        self.cash -= fee;

        let signed = side.sign() * quantity;
        let pos = self.positions.entry(symbol.to_string()).or_insert(NetPosition {
            qty: 0.0,
            avg_price: 0.0,
        });

        if pos.qty == 0.0 || pos.qty.signum() == signed.signum() {
            let total = pos.qty.abs() + quantity;
            pos.avg_price = (pos.avg_price * pos.qty.abs() + price * quantity) / total;
            pos.qty += signed;
        } else {
            let closing = quantity.min(pos.qty.abs());
            self.cash += pos.qty.signum() * (price - pos.avg_price) * closing;
            pos.qty += signed;
            if pos.qty.abs() > QTY_EPSILON && pos.qty.signum() == signed.signum() {
                // Flipped through zero: the remainder is a fresh position.
                pos.avg_price = price;
            }
        }

        if pos.qty.abs() <= QTY_EPSILON {
            self.positions.remove(symbol);
        }
        fee
    }

    /// Reveal the next bar and fill any resting limit order it trades through.
    fn advance(&mut self, config: &PaperConfig) {
        if self.cursor >= self.candles.len() {
            return;
        }
        self.cursor += 1;
        let bar = *self.last_bar();

        for i in 0..self.orders.len() {
            let order = &self.orders[i];
            if order.status != OrderStatus::Pending {
                continue;
            }
            let Some(limit) = order.order_type.limit_price() else {
                continue;
            };
            let crossed = match order.side {
                OrderSide::Buy => bar.low <= limit,
                OrderSide::Sell => bar.high >= limit,
            };
            if !crossed {
                continue;
            }

            let (symbol, side, quantity) = (order.symbol.clone(), order.side, order.quantity);
            let outcome = self.check_margin(&symbol, side, quantity, limit, config);
            let fee = match outcome {
                Ok(()) => Some(self.settle(&symbol, side, quantity, limit, config.fee_rate)),
                Err(_) => None,
            };

            let order = &mut self.orders[i];
            order.updated_at = bar.timestamp;
            match (fee, outcome) {
                (Some(fee), _) => {
                    order.filled = quantity;
                    order.average_price = Some(limit);
                    order.fee = fee;
                    order.status = OrderStatus::Filled { price: limit };
                    debug!(order = %order.exchange_id, price = limit, "paper limit order filled");
                }
                (None, Err(err)) => {
                    order.status = OrderStatus::Rejected {
                        reason: err.to_string(),
                    };
                }
                (None, Ok(())) => {}
            }
        }
    }
}

#[derive(Debug)]
pub struct PaperExchange {
    config: PaperConfig,
    connected: AtomicBool,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    pub fn new(config: PaperConfig, candles: Vec<Candle>) -> Result<Self, CandleError> {
        if candles.is_empty() {
            return Err(CandleError::Empty);
        }
        ensure_chronological(&candles)?;

        let cursor = config.warmup_bars.clamp(1, candles.len());
        let cash = config.initial_balance;
        Ok(Self {
            config,
            connected: AtomicBool::new(false),
            state: Mutex::new(PaperState {
                candles,
                cursor,
                cash,
                positions: BTreeMap::new(),
                leverage: BTreeMap::new(),
                orders: Vec::new(),
                injected: VecDeque::new(),
                next_order: 1,
            }),
        })
    }

    pub fn config(&self) -> &PaperConfig {
        &self.config
    }

    /// Make the next call fail with `err`. Queued failures are consumed in
    /// order, one per call.
    pub fn fail_next(&self, err: ExchangeError) {
        self.lock().injected.push_back(err);
    }

    /// Bars not yet revealed.
    pub fn bars_remaining(&self) -> usize {
        let state = self.lock();
        state.candles.len() - state.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.bars_remaining() == 0
    }

    fn lock(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Consume an injected failure, then require a live session.
    fn begin(&self) -> Result<MutexGuard<'_, PaperState>, ExchangeError> {
        let mut state = self.lock();
        if let Some(err) = state.injected.pop_front() {
            return Err(err);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ExchangeError::NotConnected);
        }
        Ok(state)
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    async fn connect(&self) -> Result<bool, ExchangeError> {
        if let Some(err) = self.lock().injected.pop_front() {
            return Err(err);
        }
        self.connected.store(true, Ordering::SeqCst);
        info!(balance = self.config.initial_balance, "paper exchange connected");
        Ok(true)
    }

    async fn disconnect(&self) -> Result<(), ExchangeError> {
        self.connected.store(false, Ordering::SeqCst);
        info!("paper exchange disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_balance(&self, currency: Option<&str>) -> Result<Balance, ExchangeError> {
        let state = self.begin()?;
        let currency = currency.unwrap_or(&self.config.quote_currency);
        if currency != self.config.quote_currency {
            return Ok(Balance {
                currency: currency.to_string(),
                free: 0.0,
                used: 0.0,
                total: 0.0,
            });
        }
        let total = state.equity();
        let used = state.used_margin(self.config.default_leverage);
        Ok(Balance {
            currency: currency.to_string(),
            free: (total - used).max(0.0),
            used,
            total,
        })
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let state = self.begin()?;
        let bar = state.last_bar();
        let half_spread = bar.close * self.config.spread_bps / 20_000.0;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last: bar.close,
            bid: bar.close - half_spread,
            ask: bar.close + half_spread,
            volume: bar.volume,
            timestamp: bar.timestamp,
        })
    }

    async fn get_candles(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let mut state = self.begin()?;
        state.advance(&self.config);
        let end = state.cursor;
        let start = end.saturating_sub(limit);
        Ok(state.candles[start..end].to_vec())
    }

    async fn create_order(
        &self,
        request: &ExchangeOrderRequest,
    ) -> Result<OrderSnapshot, ExchangeError> {
        let mut state = self.begin()?;
        if !(request.quantity > 0.0) {
            return Err(ExchangeError::Rejected(format!(
                "quantity must be positive, got {}",
                request.quantity
            )));
        }

        let net = state.net_qty(&request.symbol);
        if request.reduce_only
            && (net == 0.0
                || net.signum() == request.side.sign()
                || request.quantity > net.abs() + QTY_EPSILON)
        {
            return Err(ExchangeError::Rejected(
                "reduce-only order would open or grow a position".to_string(),
            ));
        }

        let exchange_id = format!("paper-{}", state.next_order);
        state.next_order += 1;
        let updated_at = state.last_bar().timestamp;

        let snapshot = match request.order_type {
            OrderType::Market => {
                let price = state.last_price();
                state.check_margin(
                    &request.symbol,
                    request.side,
                    request.quantity,
                    price,
                    &self.config,
                )?;
                let fee = state.settle(
                    &request.symbol,
                    request.side,
                    request.quantity,
                    price,
                    self.config.fee_rate,
                );
                debug!(
                    order = %exchange_id,
                    side = ?request.side,
                    quantity = request.quantity,
                    price,
                    fee,
                    "paper market order filled"
                );
                OrderSnapshot {
                    exchange_id,
                    client_id: request.client_id.clone(),
                    symbol: request.symbol.clone(),
                    side: request.side,
                    order_type: request.order_type,
                    quantity: request.quantity,
                    filled: request.quantity,
                    average_price: Some(price),
                    fee,
                    status: OrderStatus::Filled { price },
                    updated_at,
                }
            }
            OrderType::Limit { price } => {
                if !(price > 0.0) {
                    return Err(ExchangeError::Rejected(format!(
                        "limit price must be positive, got {price}"
                    )));
                }
                OrderSnapshot {
                    exchange_id,
                    client_id: request.client_id.clone(),
                    symbol: request.symbol.clone(),
                    side: request.side,
                    order_type: request.order_type,
                    quantity: request.quantity,
                    filled: 0.0,
                    average_price: None,
                    fee: 0.0,
                    status: OrderStatus::Pending,
                    updated_at,
                }
            }
        };

        state.orders.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn cancel_order(
        &self,
        exchange_id: &str,
        _symbol: &str,
    ) -> Result<OrderSnapshot, ExchangeError> {
        let mut state = self.begin()?;
        let updated_at = state.last_bar().timestamp;
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.exchange_id == exchange_id)
            .ok_or_else(|| ExchangeError::UnknownOrder(exchange_id.to_string()))?;
        if order.status != OrderStatus::Pending {
            return Err(ExchangeError::Rejected(format!(
                "order {exchange_id} is already final"
            )));
        }
        order.status = OrderStatus::Cancelled {
            reason: "cancelled by client".to_string(),
        };
        order.updated_at = updated_at;
        Ok(order.clone())
    }

    async fn get_open_orders(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<OrderSnapshot>, ExchangeError> {
        let state = self.begin()?;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Pending)
            .filter(|o| symbol.map_or(true, |s| o.symbol == s))
            .cloned()
            .collect())
    }

    async fn get_positions(&self) -> Result<Vec<ExchangePosition>, ExchangeError> {
        let state = self.begin()?;
        Ok(state
            .positions
            .iter()
            .map(|(symbol, p)| ExchangePosition {
                symbol: symbol.clone(),
                side: if p.qty > 0.0 {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                },
                size: p.qty.abs(),
                entry_price: p.avg_price,
                leverage: state.leverage_for(symbol, self.config.default_leverage),
            })
            .collect())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        let mut state = self.begin()?;
        if leverage == 0 {
            return Err(ExchangeError::Rejected("leverage must be at least 1".to_string()));
        }
        state.leverage.insert(symbol.to_string(), leverage);
        Ok(())
    }
}
