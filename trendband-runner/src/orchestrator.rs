//! Orchestrator: the control loop binding exchange, bus, strategy and risk.
//!
//! Each cycle fetches candles, publishes them as MarketData and polls open
//! positions for exits. The strategy engine answers asynchronously on the
//! bus; actionable signals and critical breach alerts are forwarded to the
//! orchestrator task through an inbox, so the risk supervisor is only ever
//! touched from that one task.
//!
//! While paused, new signals are dropped but position monitoring continues.
//! Shutdown is ordered: the running cycle finishes, the bus queue is
//! discarded, then the exchange connection is released.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use trendband_core::domain::{Candle, Order, OrderIdGenerator, OrderType, Position, Signal};
use trendband_core::risk::{
    ExitOrder, OrderRequest, OrderValidator, RiskAlert, RiskStatus, RiskSupervisor,
};
use trendband_core::Clock;

use crate::bus::{EventBus, EventHandler, HandlerResult, SubscriptionId};
use crate::config::{ConfigError, DataSettings, SystemConfig};
use crate::data::{load_candles_csv, synthetic_candles, DataError};
use crate::events::{
    Event, EventKind, EventPayload, PositionUpdate, SystemNotice, SystemNoticeKind, TradeFill,
};
use crate::exchange::registry::RegistryKey;
use crate::exchange::{
    Exchange, ExchangeError, ExchangeOrderRequest, ExchangeRegistry, PaperExchange, RegistryError,
    Venue,
};
use crate::retry::{with_deadline, with_retry};
use crate::scheduler::Scheduler;
use crate::strategy_engine::{EngineState, StrategyEngine};

pub const SOURCE: &str = "orchestrator";

/// Signals below this confidence are never traded.
pub const MIN_SIGNAL_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid strategy or risk parameters: {0}")]
    Parameters(#[from] trendband_core::ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("exchange connection failed: {0}")]
    Connect(#[source] ExchangeError),
    #[error("exchange {venue} refused the connection")]
    ConnectRefused { venue: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    Starting,
    Running,
    Paused,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleCounters {
    pub cycles: u64,
    pub signals_received: u64,
    /// Dropped while paused or below the confidence floor.
    pub signals_skipped: u64,
    pub entries_filled: u64,
    pub exits_filled: u64,
    pub orders_rejected: u64,
    pub errors: u64,
}

/// Snapshot published on every state change. Never shares live state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub state: RunState,
    pub symbol: String,
    pub counters: CycleCounters,
    pub risk: RiskStatus,
    pub positions: Vec<Position>,
    pub engine: EngineState,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SystemStatus {
    pub fn is_paused(&self) -> bool {
        self.state == RunState::Paused
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub status: SystemStatus,
    /// Bus events discarded at shutdown.
    pub discarded_events: usize,
    /// Signals still in the inbox when a cancellation arrived.
    pub dropped_signals: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Pause,
    Resume,
}

/// Cloneable control surface. Pause and resume are applied on the
/// orchestrator task, between steps.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    status: watch::Receiver<SystemStatus>,
}

impl OrchestratorHandle {
    /// Returns false once the orchestrator has exited.
    pub fn pause(&self) -> bool {
        self.commands.send(Command::Pause).is_ok()
    }

    /// Re-arms the circuit breaker and unpauses. Returns false once the
    /// orchestrator has exited.
    pub fn resume(&self) -> bool {
        self.commands.send(Command::Resume).is_ok()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn status(&self) -> SystemStatus {
        self.status.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SystemStatus> {
        self.status.clone()
    }
}

#[derive(Debug)]
enum InboxMessage {
    Signal(Signal),
    Breach(RiskAlert),
}

/// Bus subscriber forwarding what the orchestrator acts on.
struct Inbox {
    tx: mpsc::UnboundedSender<InboxMessage>,
}

#[async_trait]
impl EventHandler for Inbox {
    async fn handle(&self, event: &Event) -> HandlerResult {
        let message = match &event.payload {
            EventPayload::Signal(signal) => InboxMessage::Signal(signal.clone()),
            EventPayload::Risk(alert) if alert.is_critical_breach() => {
                InboxMessage::Breach(alert.clone())
            }
            _ => return Ok(()),
        };
        self.tx
            .send(message)
            .map_err(|_| anyhow::anyhow!("orchestrator inbox closed"))
    }
}

/// Candles backing the paper venue: the configured CSV, else a synthetic walk.
pub fn paper_candles(data: &DataSettings) -> Result<Vec<Candle>, DataError> {
    match &data.candles_csv {
        Some(path) => load_candles_csv(path),
        None => Ok(synthetic_candles(
            data.synthetic_bars,
            data.seed,
            data.start_price,
        )),
    }
}

/// Resolve the configured venue through `registry`.
pub fn open_exchange(
    registry: &ExchangeRegistry,
    config: &SystemConfig,
) -> Result<(RegistryKey, Arc<dyn Exchange>), OrchestratorError> {
    let settings = &config.exchange;
    match settings.venue {
        Venue::Paper => {
            let fingerprint = (&settings.paper, &config.data);
            let opened = registry.get_or_create(Venue::Paper, &fingerprint, || {
                let candles = paper_candles(&config.data)
                    .map_err(|err| RegistryError::Build(err.to_string()))?;
                let exchange = PaperExchange::new(settings.paper.clone(), candles)
                    .map_err(|err| RegistryError::Build(err.to_string()))?;
                Ok(Arc::new(exchange) as Arc<dyn Exchange>)
            })?;
            Ok(opened)
        }
        venue => Err(RegistryError::Unsupported(venue).into()),
    }
}

pub struct Orchestrator {
    core: Core,
    inbox: mpsc::UnboundedReceiver<InboxMessage>,
    commands: mpsc::UnboundedReceiver<Command>,
}

struct Core {
    config: SystemConfig,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    registry: Arc<ExchangeRegistry>,
    exchange_key: RegistryKey,
    exchange: Arc<dyn Exchange>,
    engine: Arc<StrategyEngine>,
    supervisor: RiskSupervisor,
    validator: OrderValidator,
    order_ids: OrderIdGenerator,
    inbox_tx: mpsc::UnboundedSender<InboxMessage>,
    commands_tx: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    status_tx: watch::Sender<SystemStatus>,
    subscriptions: Vec<SubscriptionId>,
    state: RunState,
    paused: bool,
    counters: CycleCounters,
    last_error: Option<String>,
}

impl Orchestrator {
    /// Validate `config` and open its venue through `registry`.
    pub fn new(
        config: SystemConfig,
        registry: Arc<ExchangeRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let (key, exchange) = open_exchange(&registry, &config)?;
        Self::assemble(config, registry, key, exchange, clock)
    }

    /// Run against an exchange built by the caller.
    pub fn with_exchange(
        config: SystemConfig,
        exchange: Arc<dyn Exchange>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let registry = Arc::new(ExchangeRegistry::new());
        let fingerprint = (exchange.name().to_string(), &config.exchange.paper);
        let (key, exchange) =
            registry.get_or_create(config.exchange.venue, &fingerprint, || Ok(exchange))?;
        Self::assemble(config, registry, key, exchange, clock)
    }

    fn assemble(
        config: SystemConfig,
        registry: Arc<ExchangeRegistry>,
        exchange_key: RegistryKey,
        exchange: Arc<dyn Exchange>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, OrchestratorError> {
        let bus = EventBus::new();
        let engine = Arc::new(StrategyEngine::new(
            config.strategy.clone(),
            config.market.timeframe,
            config.market.capital,
            config.market.frequency,
            bus.publisher(),
        )?);
        let supervisor = RiskSupervisor::new(config.risk.clone(), Arc::clone(&clock))?;
        let validator = OrderValidator::new(config.risk.clone());

        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let initial = SystemStatus {
            state: RunState::Created,
            symbol: config.market.symbol.clone(),
            counters: CycleCounters::default(),
            risk: supervisor.status(),
            positions: Vec::new(),
            engine: engine.state(),
            last_error: None,
            updated_at: clock.now(),
        };
        let (status_tx, _) = watch::channel(initial);

        Ok(Self {
            core: Core {
                config,
                clock,
                bus,
                registry,
                exchange_key,
                exchange,
                engine,
                supervisor,
                validator,
                order_ids: OrderIdGenerator::new("tb"),
                inbox_tx,
                commands_tx,
                cancel: CancellationToken::new(),
                status_tx,
                subscriptions: Vec::new(),
                state: RunState::Created,
                paused: false,
                counters: CycleCounters::default(),
                last_error: None,
            },
            inbox,
            commands,
        })
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            commands: self.core.commands_tx.clone(),
            cancel: self.core.cancel.clone(),
            status: self.core.status_tx.subscribe(),
        }
    }

    /// The bus this orchestrator drives. Subscribe observers before `run`.
    pub fn bus(&self) -> EventBus {
        self.core.bus.clone()
    }

    pub fn exchange(&self) -> Arc<dyn Exchange> {
        Arc::clone(&self.core.exchange)
    }

    /// Connect, then cycle until cancelled or the cycle limit is reached.
    ///
    /// Only a failed startup returns an error; failures inside a cycle are
    /// logged, published as System error events and the loop continues.
    pub async fn run(self) -> Result<RunSummary, OrchestratorError> {
        let Self {
            mut core,
            mut inbox,
            mut commands,
        } = self;

        if let Err(err) = core.startup().await {
            error!(error = %err, "startup failed");
            core.last_error = Some(err.to_string());
            core.release_exchange().await;
            core.set_state(RunState::Stopped);
            return Err(err);
        }

        let mut scheduler = Scheduler::new(core.config.runtime.loop_interval(), core.cancel.clone());
        if let Some(limit) = core.config.runtime.max_cycles {
            scheduler = scheduler.with_limit(limit);
        }

        loop {
            tokio::select! {
                biased;
                Some(command) = commands.recv() => core.apply(command),
                Some(message) = inbox.recv() => core.on_message(message).await,
                tick = scheduler.tick() => match tick {
                    Some(cycle) => core.run_cycle(cycle).await,
                    None => break,
                },
            }
        }

        let dropped_signals = if core.cancel.is_cancelled() {
            let mut dropped = 0;
            while inbox.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                info!(dropped, "discarding in-flight signals");
            }
            dropped
        } else {
            core.settle(&mut inbox).await;
            0
        };

        Ok(core.shutdown(dropped_signals).await)
    }
}

impl Core {
    async fn startup(&mut self) -> Result<(), OrchestratorError> {
        self.set_state(RunState::Starting);
        let venue = self.exchange.name().to_string();

        let connected = self
            .call("connect", || self.exchange.connect())
            .await
            .map_err(OrchestratorError::Connect)?;
        if !connected {
            return Err(OrchestratorError::ConnectRefused { venue });
        }
        let quote = self.config.exchange.paper.quote_currency.clone();
        let balance = self
            .call("get_balance", || self.exchange.get_balance(Some(&quote)))
            .await
            .map_err(OrchestratorError::Connect)?;
        info!(
            venue = %venue,
            symbol = %self.config.market.symbol,
            timeframe = %self.config.market.timeframe,
            balance = balance.total,
            "exchange connected"
        );

        self.subscriptions.push(self.engine.attach(&self.bus));
        let inbox = Arc::new(Inbox {
            tx: self.inbox_tx.clone(),
        });
        self.subscriptions
            .push(self.bus.subscribe(EventKind::Signal, inbox.clone()));
        self.subscriptions
            .push(self.bus.subscribe(EventKind::Risk, inbox));
        self.bus.start();

        self.set_state(RunState::Running);
        self.notify(
            SystemNoticeKind::Start,
            format!(
                "trading {} on {} via {venue}",
                self.config.market.symbol, self.config.market.timeframe
            ),
        );
        Ok(())
    }

    /// Exchange call bounded by the per-call deadline and retried with back-off.
    async fn call<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T, ExchangeError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ExchangeError>>,
    {
        let deadline = self.config.exchange.call_timeout();
        with_retry(&self.config.exchange.retry, || {
            with_deadline(operation, deadline, f())
        })
        .await
    }

    async fn run_cycle(&mut self, cycle: u64) {
        self.counters.cycles = cycle;
        debug!(cycle, paused = self.paused, "cycle started");

        let symbol = self.config.market.symbol.clone();
        let timeframe = self.config.market.timeframe;
        let limit = self.config.market.candle_limit;
        match self
            .call("get_candles", || {
                self.exchange.get_candles(&symbol, timeframe, limit)
            })
            .await
        {
            Ok(candles) if candles.is_empty() => {
                debug!(cycle, "no candles returned");
            }
            Ok(candles) => {
                let event = Event::market_data(SOURCE, symbol, timeframe, candles);
                self.bus.publish(event);
            }
            Err(err) => self.report_error("fetch candles", &err),
        }

        self.check_positions().await;
        self.publish_alerts();
        self.push_status();
    }

    /// At most one exit per open position per cycle.
    async fn check_positions(&mut self) {
        let symbols: Vec<String> = self
            .supervisor
            .positions()
            .into_iter()
            .map(|p| p.symbol)
            .collect();

        for symbol in symbols {
            let ticker = match self
                .call("get_ticker", || self.exchange.get_ticker(&symbol))
                .await
            {
                Ok(ticker) => ticker,
                Err(err) => {
                    self.report_error("position check", &err);
                    continue;
                }
            };
            if let Some(exit) = self.supervisor.evaluate_exits(&symbol, ticker.last) {
                self.execute_exit(exit).await;
            }
        }
    }

    async fn on_message(&mut self, message: InboxMessage) {
        match message {
            InboxMessage::Signal(signal) => {
                self.process_signal(signal).await;
                self.publish_alerts();
            }
            InboxMessage::Breach(alert) => self.pause(&alert.message),
        }
        self.push_status();
    }

    async fn process_signal(&mut self, signal: Signal) {
        self.counters.signals_received += 1;
        if self.paused {
            self.counters.signals_skipped += 1;
            debug!(symbol = %signal.symbol, "trading paused, signal dropped");
            return;
        }
        if signal.confidence < MIN_SIGNAL_CONFIDENCE {
            self.counters.signals_skipped += 1;
            debug!(confidence = signal.confidence, "signal confidence too low");
            return;
        }
        let Some(side) = signal.direction.order_side() else {
            return;
        };

        let quote = self.config.exchange.paper.quote_currency.clone();
        let balance = match self
            .call("get_balance", || self.exchange.get_balance(Some(&quote)))
            .await
        {
            Ok(balance) => balance.free,
            Err(err) => {
                self.report_error("balance check", &err);
                return;
            }
        };
        if balance < self.config.risk.min_order_size {
            warn!(balance, "insufficient balance for a new entry");
            return;
        }

        let request = OrderRequest {
            symbol: signal.symbol.clone(),
            side,
            price: signal.price,
        };
        let approved = match self.supervisor.check_order(&request, balance) {
            Ok(approved) => approved,
            Err(rejection) => {
                self.counters.orders_rejected += 1;
                warn!(symbol = %request.symbol, reason = %rejection, "risk check rejected entry");
                return;
            }
        };
        if let Err(err) = self.validator.validate(
            &approved.symbol,
            side,
            OrderType::Market,
            approved.quantity,
            approved.price,
            balance,
            approved.leverage,
        ) {
            self.counters.orders_rejected += 1;
            warn!(symbol = %approved.symbol, reason = %err, "order validation failed");
            return;
        }

        let mut order = Order::new(
            self.order_ids.next_id(),
            approved.symbol.as_str(),
            side,
            OrderType::Market,
            approved.price,
            approved.quantity,
            approved.leverage,
            self.clock.now(),
        );
        self.publish(EventPayload::Order(order.clone()));
        info!(
            order = %order.id,
            side = ?side,
            quantity = order.quantity,
            leverage = order.leverage,
            price = order.price,
            "placing entry order"
        );

        if let Err(err) = self
            .call("set_leverage", || {
                self.exchange.set_leverage(&order.symbol, order.leverage)
            })
            .await
        {
            self.reject(&mut order, &err);
            return;
        }

        let exchange_request = ExchangeOrderRequest::market(
            order.id.clone(),
            order.symbol.as_str(),
            side,
            order.quantity,
        );
        // Order placement is never retried: a timed-out request may still fill.
        let placed = with_deadline(
            "create_order",
            self.config.exchange.call_timeout(),
            self.exchange.create_order(&exchange_request),
        )
        .await;

        match placed {
            Ok(snapshot) if snapshot.is_filled() => {
                let price = snapshot.average_price.unwrap_or(order.price);
                if let Err(err) = order.fill(price) {
                    warn!(error = %err, "order status out of sync");
                }
                self.publish(EventPayload::Order(order.clone()));

                let position = self
                    .supervisor
                    .open_position(&order.symbol, side, snapshot.filled, price, order.leverage)
                    .clone();
                self.counters.entries_filled += 1;
                self.publish(EventPayload::Trade(TradeFill {
                    order_id: order.id.clone(),
                    symbol: order.symbol.clone(),
                    side,
                    quantity: snapshot.filled,
                    price,
                    fee: snapshot.fee,
                    realized: None,
                }));
                self.publish(EventPayload::Position(PositionUpdate {
                    symbol: order.symbol.clone(),
                    position: Some(position),
                }));
            }
            Ok(snapshot) => {
                warn!(order = %order.id, status = ?snapshot.status, "market order not filled");
                if let Err(err) = order.cancel("not filled") {
                    warn!(error = %err, "order status out of sync");
                }
                self.counters.orders_rejected += 1;
                self.publish(EventPayload::Order(order));
            }
            Err(err) => self.reject(&mut order, &err),
        }
    }

    fn reject(&mut self, order: &mut Order, err: &ExchangeError) {
        self.counters.orders_rejected += 1;
        warn!(order = %order.id, error = %err, "entry order rejected");
        if let Err(transition) = order.reject(err.to_string()) {
            warn!(error = %transition, "order status out of sync");
        }
        self.publish(EventPayload::Order(order.clone()));
    }

    async fn execute_exit(&mut self, exit: ExitOrder) {
        let request = ExchangeOrderRequest::market(
            self.order_ids.next_id(),
            exit.symbol.as_str(),
            exit.side,
            exit.quantity,
        )
        .reduce_only();
        let placed = with_deadline(
            "create_order",
            self.config.exchange.call_timeout(),
            self.exchange.create_order(&request),
        )
        .await;

        let snapshot = match placed {
            Ok(snapshot) if snapshot.is_filled() => snapshot,
            Ok(snapshot) => {
                warn!(symbol = %exit.symbol, status = ?snapshot.status, "exit order not filled");
                return;
            }
            Err(err) => {
                self.report_error("exit order", &err);
                return;
            }
        };

        let price = snapshot.average_price.unwrap_or(exit.trigger_price);
        let record = self
            .supervisor
            .apply_exit(&exit, snapshot.filled, price, snapshot.fee);
        self.counters.exits_filled += 1;
        info!(
            symbol = %exit.symbol,
            reason = exit.reason.as_str(),
            quantity = snapshot.filled,
            price,
            pnl = record.as_ref().map_or(0.0, |r| r.pnl),
            "exit filled"
        );
        self.publish(EventPayload::Trade(TradeFill {
            order_id: request.client_id,
            symbol: exit.symbol.clone(),
            side: exit.side,
            quantity: snapshot.filled,
            price,
            fee: snapshot.fee,
            realized: record,
        }));
        self.publish(EventPayload::Position(PositionUpdate {
            position: self.supervisor.position(&exit.symbol).cloned(),
            symbol: exit.symbol,
        }));
    }

    /// Log and publish every alert the supervisor raised since the last call.
    fn publish_alerts(&mut self) {
        for alert in self.supervisor.drain_alerts() {
            alert.log();
            self.publish(EventPayload::Risk(alert));
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Pause => self.pause("paused by operator"),
            Command::Resume => self.resume(),
        }
        self.push_status();
    }

    fn pause(&mut self, reason: &str) {
        if self.paused {
            return;
        }
        self.paused = true;
        warn!(reason, "trading paused");
        self.set_state(RunState::Paused);
        self.notify(SystemNoticeKind::Pause, reason);
    }

    fn resume(&mut self) {
        if !self.paused && !self.supervisor.is_tripped() {
            return;
        }
        self.supervisor.resume();
        self.paused = false;
        info!("trading resumed");
        self.set_state(RunState::Running);
        self.notify(SystemNoticeKind::Resume, "trading resumed");
    }

    /// Handle signals still arriving from the last cycle, until the inbox
    /// stays quiet for the grace period.
    async fn settle(&mut self, inbox: &mut mpsc::UnboundedReceiver<InboxMessage>) {
        let grace = self.config.runtime.signal_wait();
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                received = tokio::time::timeout(grace, inbox.recv()) => match received {
                    Ok(Some(message)) => self.on_message(message).await,
                    _ => break,
                },
            }
        }
    }

    async fn shutdown(mut self, dropped_signals: usize) -> RunSummary {
        self.set_state(RunState::Stopping);
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }

        let notice = Event::at(
            self.clock.now(),
            SOURCE,
            EventPayload::System(SystemNotice::new(
                SystemNoticeKind::Stop,
                format!("stopped after {} cycles", self.counters.cycles),
            )),
        );
        self.bus.emit(&notice).await;
        let discarded_events = self.bus.stop().await;

        self.release_exchange().await;
        self.set_state(RunState::Stopped);
        info!(
            cycles = self.counters.cycles,
            entries = self.counters.entries_filled,
            exits = self.counters.exits_filled,
            discarded_events,
            "orchestrator stopped"
        );
        RunSummary {
            status: self.snapshot(),
            discarded_events,
            dropped_signals,
        }
    }

    async fn release_exchange(&self) {
        match self.registry.close(&self.exchange_key).await {
            Ok(_) => {}
            Err(err) => warn!(error = %err, "failed to release exchange"),
        }
    }

    fn report_error(&mut self, step: &'static str, err: &dyn Display) {
        self.counters.errors += 1;
        warn!(step, error = %err, "cycle step failed, continuing");
        let message = format!("{step}: {err}");
        self.last_error = Some(message.clone());
        self.notify(SystemNoticeKind::Error, message);
    }

    fn publish(&self, payload: EventPayload) {
        self.bus
            .publish(Event::at(self.clock.now(), SOURCE, payload));
    }

    fn notify(&self, kind: SystemNoticeKind, message: impl Into<String>) {
        self.publish(EventPayload::System(SystemNotice::new(kind, message)));
    }

    fn set_state(&mut self, state: RunState) {
        self.state = state;
        self.push_status();
    }

    fn snapshot(&self) -> SystemStatus {
        SystemStatus {
            state: self.state,
            symbol: self.config.market.symbol.clone(),
            counters: self.counters,
            risk: self.supervisor.status(),
            positions: self.supervisor.positions(),
            engine: self.engine.state(),
            last_error: self.last_error.clone(),
            updated_at: self.clock.now(),
        }
    }

    fn push_status(&self) {
        self.status_tx.send_replace(self.snapshot());
    }
}
