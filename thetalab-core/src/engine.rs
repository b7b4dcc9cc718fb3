//! The replay engine.
//!
//! One strictly sequential pass over the event tape. Each event advances
//! the market state, re-checks queued limit intents, lets every strategy
//! speak (exits before entries), then applies the universal risk rules to
//! whatever is still open. Day boundaries drain the intent queue and
//! settle stragglers at intrinsic value, so no position ever survives its
//! expiry day.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::calendar::settlement_ts;
use crate::clock::{EventTape, MarketEvent};
use crate::config::RunConfig;
use crate::domain::{
    ExitReason, Fill, IntentIds, IntentKind, OrderIntent, OrderKind, Position, PositionId,
};
use crate::error::EngineError;
use crate::fills::{CommissionConfig, Execution, FillSimulator};
use crate::ledger::Ledger;
use crate::market::MarketState;
use crate::positions::{MarkSummary, PositionBook};
use crate::strategy::{Strategy, StrategyContext};
use crate::valuation::{ImpliedMove, PricingModel, TickValuation, Valuator};

/// Everything a run leaves behind.
#[derive(Debug)]
pub struct BacktestReport {
    pub ledger: Ledger,
    /// Every position the run opened, all closed by the end.
    pub positions: Vec<Position>,
    /// First chain-implied move observed each day.
    pub daily_implied_move: Vec<(NaiveDate, ImpliedMove)>,
}

/// Replay the tape with the configured strategy.
pub fn run_backtest(config: &RunConfig, tape: &EventTape) -> Result<BacktestReport, EngineError> {
    run_with_strategies(config, tape, vec![config.strategy.build()])
}

/// Replay with caller-supplied strategies. Lets tests drive the loop with
/// probes; `run_backtest` is this with the one configured strategy.
pub fn run_with_strategies(
    config: &RunConfig,
    tape: &EventTape,
    strategies: Vec<Box<dyn Strategy>>,
) -> Result<BacktestReport, EngineError> {
    config.validate()?;
    tape.verify_coverage(config.start_date, config.end_date)?;
    let mut engine = Engine::new(config, strategies);
    engine.replay(tape)?;
    Ok(engine.into_report())
}

struct Engine<'c> {
    config: &'c RunConfig,
    strategies: Vec<Box<dyn Strategy>>,
    market: MarketState,
    valuator: Valuator,
    state: RunState,
}

/// The mutable half of the engine, split out so a tick can hold the
/// valuation view (which borrows the market) while fills mutate the rest.
struct RunState {
    simulator: FillSimulator,
    book: PositionBook,
    ledger: Ledger,
    ids: IntentIds,
    commission: CommissionConfig,
    entries_today: HashMap<String, u32>,
    current_day: Option<NaiveDate>,
    move_recorded: bool,
    daily_implied_move: Vec<(NaiveDate, ImpliedMove)>,
}

impl<'c> Engine<'c> {
    fn new(config: &'c RunConfig, strategies: Vec<Box<dyn Strategy>>) -> Self {
        let model = PricingModel::new(config.risk_free_rate, config.dividend_yield);
        Self {
            config,
            strategies,
            market: MarketState::new(),
            valuator: Valuator::new(model, config.max_quote_age_secs),
            state: RunState {
                simulator: FillSimulator::new(
                    config.slippage,
                    config.commission,
                    config.contract_multiplier,
                    config.intent_ttl_secs,
                ),
                book: PositionBook::new(
                    config.contract_multiplier,
                    config.risk,
                    config.cutoff_time,
                ),
                ledger: Ledger::new(config.initial_capital, config.contract_multiplier),
                ids: IntentIds::new(),
                commission: config.commission,
                entries_today: HashMap::new(),
                current_day: None,
                move_recorded: false,
                daily_implied_move: Vec::new(),
            },
        }
    }

    fn replay(&mut self, tape: &EventTape) -> Result<(), EngineError> {
        info!(
            underlying = %self.config.underlying,
            events = tape.len(),
            days = tape.days().len(),
            "replay started"
        );
        for event in tape.events() {
            self.on_event(event)?;
        }
        self.close_day();
        info!(
            trades = self.state.ledger.trades().len(),
            net = self.state.ledger.realized_net(),
            "replay finished"
        );
        Ok(())
    }

    fn on_event(&mut self, event: &MarketEvent) -> Result<(), EngineError> {
        let date = event.date();
        if self.state.current_day != Some(date) {
            self.close_day();
            self.start_day(date);
        }
        self.market.apply(event);
        self.tick(event.ts())
    }

    fn start_day(&mut self, date: NaiveDate) {
        self.state.current_day = Some(date);
        self.state.entries_today.clear();
        self.state.move_recorded = false;
        for strategy in self.strategies.iter_mut() {
            strategy.on_day_start(date);
        }
        debug!(%date, "trading day started");
    }

    /// End the current day: queued same-day intents can never fill again,
    /// and anything still open settles at intrinsic value.
    fn close_day(&mut self) {
        let Some(day) = self.state.current_day else {
            return;
        };
        let now = settlement_ts(day);
        for (_, rejection) in self.state.simulator.drain_pending(now) {
            self.state.ledger.record_rejection(rejection);
        }
        if self.state.book.has_open() {
            match self.market.last_bar().map(|b| b.close) {
                Some(spot) => {
                    let commission = self.state.commission;
                    let settlements = self.state.book.settle_all_open(
                        spot,
                        &commission,
                        &mut self.state.ids,
                        now,
                    );
                    for settlement in settlements {
                        for fill in &settlement.fills {
                            self.state.ledger.apply_fill(fill);
                        }
                        self.state.ledger.record_trade(settlement.trade);
                    }
                }
                // positions cannot open before the first bar prints
                None => debug_assert!(false, "open positions but no underlying print"),
            }
        }
        // flat by construction here, so equity is pure cash
        self.state.ledger.sample_equity(now, &MarkSummary::default());
        debug!(
            %day,
            cash = self.state.ledger.cash(),
            trades = self.state.ledger.trades().len(),
            "day settled"
        );
    }

    fn tick(&mut self, now: NaiveDateTime) -> Result<(), EngineError> {
        let Self {
            market,
            valuator,
            strategies,
            state,
            ..
        } = self;
        let market: &MarketState = market;
        let tick = valuator.at(market, now);
        state.note_implied_move(&tick);

        let mut closed = 0usize;

        // queued limit intents see the new book first
        let outcome = state.simulator.poll(market, now);
        for (intent, rejection) in outcome.expired {
            debug!(intent = intent.id.0, "limit intent expired");
            state.ledger.record_rejection(rejection);
        }
        for report in outcome.filled {
            closed += state.route_fills(&report.intent, &report.fills, now);
        }

        // strategies: each sees only its own positions and pending entries
        for strategy in strategies.iter_mut() {
            let intents = {
                let open = state.book.open_for(strategy.name());
                let ctx = StrategyContext {
                    market,
                    tick: &tick,
                    open: &open,
                    pending_open: state.pending_open(strategy.name()),
                    entries_today: state.entries(strategy.name()),
                    now,
                };
                strategy.evaluate(&ctx, &mut state.ids)?
            };
            for intent in intents {
                closed += state.submit_and_route(intent, market, now);
            }
        }

        state.risk_exits(&tick, market, now, &mut closed)?;

        if closed > 0 {
            let mark = state.book.mark_open(&tick)?;
            state.ledger.sample_equity(now, &mark);
        }
        Ok(())
    }

    fn into_report(self) -> BacktestReport {
        BacktestReport {
            positions: self.state.book.positions().to_vec(),
            ledger: self.state.ledger,
            daily_implied_move: self.state.daily_implied_move,
        }
    }
}

impl RunState {
    fn entries(&self, strategy: &str) -> u32 {
        self.entries_today.get(strategy).copied().unwrap_or(0)
    }

    fn pending_open(&self, strategy: &str) -> bool {
        self.simulator
            .pending()
            .any(|i| matches!(&i.kind, IntentKind::Open { strategy: s } if s == strategy))
    }

    fn note_implied_move(&mut self, tick: &TickValuation<'_>) {
        if self.move_recorded {
            return;
        }
        let Some(day) = self.current_day else {
            return;
        };
        if let Some(mv) = tick.implied_move() {
            self.daily_implied_move.push((day, mv));
            self.move_recorded = true;
        }
    }

    fn submit_and_route(
        &mut self,
        intent: OrderIntent,
        market: &MarketState,
        now: NaiveDateTime,
    ) -> usize {
        match self.simulator.submit(intent.clone(), market, now) {
            Execution::Filled(fills) => self.route_fills(&intent, &fills, now),
            Execution::Queued => 0,
            Execution::Rejected(rejection) => {
                debug!(intent = intent.id.0, reason = %rejection.reason, "intent rejected");
                self.ledger.record_rejection(rejection);
                0
            }
        }
    }

    /// Apply fills to cash and route them to the book. Returns how many
    /// trades the fills completed.
    fn route_fills(&mut self, intent: &OrderIntent, fills: &[Fill], now: NaiveDateTime) -> usize {
        for fill in fills {
            self.ledger.apply_fill(fill);
        }
        match &intent.kind {
            IntentKind::Open { strategy } => {
                self.book.open_position(strategy, fills, now);
                *self.entries_today.entry(strategy.clone()).or_insert(0) += 1;
                0
            }
            IntentKind::Close { position, reason } => {
                match self.book.apply_close_fills(*position, fills, *reason, now) {
                    Some(trade) => {
                        self.ledger.record_trade(trade);
                        1
                    }
                    None => 0,
                }
            }
        }
    }

    /// Mark the book, then apply the universal exits. A cutoff close that
    /// finds no liquidity settles at intrinsic on the spot; other exits
    /// simply retry next tick.
    fn risk_exits(
        &mut self,
        tick: &TickValuation<'_>,
        market: &MarketState,
        now: NaiveDateTime,
        closed: &mut usize,
    ) -> Result<(), EngineError> {
        self.book.mark_open(tick)?;
        let pending_close: HashSet<PositionId> =
            self.simulator.pending().filter_map(|i| i.closes()).collect();
        for (position_id, reason) in self.book.check_exits(tick) {
            if pending_close.contains(&position_id) {
                continue;
            }
            let Some(position) = self.book.get(position_id) else {
                continue;
            };
            let intent = OrderIntent {
                id: self.ids.next(),
                kind: IntentKind::Close {
                    position: position_id,
                    reason,
                },
                legs: position.closing_legs(),
                order: OrderKind::Market,
                issued_at: now,
            };
            match self.simulator.submit(intent.clone(), market, now) {
                Execution::Filled(fills) => {
                    *closed += self.route_fills(&intent, &fills, now);
                }
                Execution::Queued => {}
                Execution::Rejected(rejection) => {
                    self.ledger.record_rejection(rejection);
                    if reason == ExitReason::ForcedExpiry {
                        if let Some(spot) = market.last_bar().map(|b| b.close) {
                            let commission = self.commission;
                            if let Some(settlement) = self.book.settle_position(
                                position_id,
                                spot,
                                &commission,
                                &mut self.ids,
                                now,
                            ) {
                                for fill in &settlement.fills {
                                    self.ledger.apply_fill(fill);
                                }
                                self.ledger.record_trade(settlement.trade);
                                *closed += 1;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::EventTape;
    use crate::config::StrategyConfig;
    use crate::domain::{Bar, ChainSnapshot, OptionQuote, Right};
    use crate::strategy::StrangleParams;
    use chrono::{NaiveDate, NaiveTime};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, 0).unwrap()
    }

    fn quote(strike: f64, right: Right, bid: f64, ask: f64, at: NaiveDateTime) -> OptionQuote {
        OptionQuote {
            contract: crate::domain::OptionContract::new(day(), strike, right),
            ts: at,
            bid,
            ask,
            iv: Some(0.25),
        }
    }

    /// Flat tape: five-minute bars at 5000 all date, one rich chain
    /// snapshot at 10:00 whose quotes stay in the book all day.
    fn flat_tape() -> EventTape {
        let mut bars = Vec::new();
        let mut t = ts(9, 30);
        while t <= ts(15, 50) {
            bars.push(Bar {
                ts: t,
                open: 5000.0,
                high: 5001.0,
                low: 4999.0,
                close: 5000.0,
                volume: 1_000,
            });
            t += chrono::Duration::minutes(5);
        }
        // the in-the-money sides at 5020/4980 only exist so the implied
        // move sees two-sided strikes; the strangle ignores them
        let chain = ChainSnapshot {
            ts: ts(10, 0),
            quotes: vec![
                quote(5020.0, Right::Call, 2.5, 2.7, ts(10, 0)),
                quote(5020.0, Right::Put, 22.0, 22.4, ts(10, 0)),
                quote(5040.0, Right::Call, 1.0, 1.2, ts(10, 0)),
                quote(4980.0, Right::Call, 22.0, 22.4, ts(10, 0)),
                quote(4980.0, Right::Put, 2.4, 2.6, ts(10, 0)),
                quote(4960.0, Right::Put, 0.9, 1.1, ts(10, 0)),
            ],
        };
        EventTape::build(bars, vec![chain]).unwrap()
    }

    fn strangle_config() -> RunConfig {
        RunConfig {
            underlying: "SPX".into(),
            start_date: day(),
            end_date: day(),
            strategy: StrategyConfig::ShortStrangle(StrangleParams::default()),
            commission: CommissionConfig::default(),
            slippage: crate::fills::SlippageConfig::None,
            risk: crate::positions::RiskConfig::default(),
            cutoff_time: NaiveTime::from_hms_opt(15, 45, 0).unwrap(),
            risk_free_rate: 0.05,
            dividend_yield: 0.01,
            intent_ttl_secs: 120,
            max_quote_age_secs: 300,
            initial_capital: 100_000.0,
            contract_multiplier: 100.0,
        }
    }

    #[test]
    fn strangle_runs_to_forced_expiry() {
        let report = run_backtest(&strangle_config(), &flat_tape()).unwrap();
        assert_eq!(report.ledger.trades().len(), 1);
        let trade = &report.ledger.trades()[0];
        assert_eq!(trade.strategy, "SHORT_STRANGLE");
        assert_eq!(trade.exit_reason, ExitReason::ForcedExpiry);
        // every position closed by cutoff
        assert!(report.positions.iter().all(|p| !p.is_open()));
        // cash moved exactly by the trade's net result
        let drift = report.ledger.cash() - 100_000.0 - trade.net_pnl;
        assert!(drift.abs() < 1e-6, "cash drift {drift}");
    }

    #[test]
    fn implied_move_is_recorded_once_per_day() {
        let report = run_backtest(&strangle_config(), &flat_tape()).unwrap();
        assert_eq!(report.daily_implied_move.len(), 1);
        assert_eq!(report.daily_implied_move[0].0, day());
        let mv = report.daily_implied_move[0].1;
        assert!(mv.dollars > 0.0);
        assert!((mv.fraction - mv.dollars / 5000.0).abs() < 1e-12);
    }

    #[test]
    fn runs_are_deterministic() {
        let cfg = strangle_config();
        let a = run_backtest(&cfg, &flat_tape()).unwrap();
        let b = run_backtest(&cfg, &flat_tape()).unwrap();
        assert_eq!(a.ledger.digest().unwrap(), b.ledger.digest().unwrap());
    }

    #[test]
    fn missing_trading_day_aborts() {
        // tape only covers Friday; the range starts Thursday
        let cfg = RunConfig {
            start_date: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            ..strangle_config()
        };
        let err = run_backtest(&cfg, &flat_tape()).unwrap_err();
        match err {
            EngineError::DataGap { date } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
            }
            other => panic!("expected DataGap, got {other}"),
        }
    }
}
