//! Full-loop replay tests on synthetic tapes.
//!
//! These drive the engine end to end and pin the run-level invariants:
//! nothing a strategy sees can change when future days are redacted,
//! every position is flat by the daily cutoff, cash reconciles against
//! the raw fill stream, and identical inputs produce identical ledgers.

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thetalab_core::clock::EventTape;
use thetalab_core::config::{RunConfig, StrategyConfig};
use thetalab_core::domain::{ExitReason, IntentIds, OrderIntent};
use thetalab_core::engine::{run_backtest, run_with_strategies};
use thetalab_core::error::EngineError;
use thetalab_core::fills::{CommissionConfig, SlippageConfig};
use thetalab_core::positions::RiskConfig;
use thetalab_core::strategy::{StrangleParams, Strategy, StrategyContext};
use thetalab_core::synth::{self, SynthConfig};

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn tape(start: NaiveDate, end: NaiveDate) -> EventTape {
    synth::generate(&SynthConfig::default(), start, end)
        .unwrap()
        .into_tape()
        .unwrap()
}

fn config(start: NaiveDate, end: NaiveDate) -> RunConfig {
    RunConfig {
        underlying: "SPX".into(),
        start_date: start,
        end_date: end,
        strategy: StrategyConfig::ShortStrangle(StrangleParams::default()),
        commission: CommissionConfig::default(),
        slippage: SlippageConfig::default(),
        risk: RiskConfig::default(),
        cutoff_time: NaiveTime::from_hms_opt(15, 45, 0).unwrap(),
        risk_free_rate: 0.05,
        dividend_yield: 0.01,
        intent_ttl_secs: 120,
        max_quote_age_secs: 300,
        initial_capital: 100_000.0,
        contract_multiplier: 100.0,
    }
}

/// Records what the evaluator was shown at each tick; never trades.
struct Probe {
    seen: Arc<Mutex<Vec<(NaiveDateTime, f64, usize)>>>,
}

impl Strategy for Probe {
    fn name(&self) -> &str {
        "PROBE"
    }

    fn on_day_start(&mut self, _date: NaiveDate) {}

    fn evaluate(
        &mut self,
        ctx: &StrategyContext<'_>,
        _ids: &mut IntentIds,
    ) -> Result<Vec<OrderIntent>, EngineError> {
        let close = ctx.market.last_bar().map(|b| b.close).unwrap_or(0.0);
        let mut seen = self.seen.lock().unwrap();
        seen.push((ctx.now, close, ctx.market.book_len()));
        Ok(Vec::new())
    }
}

// Wed Mar 13 through Fri Mar 15 2024; the two-day range is its prefix.

#[test]
fn redacting_future_days_leaves_the_prefix_untouched() {
    let full_seen = Arc::new(Mutex::new(Vec::new()));
    let short_seen = Arc::new(Mutex::new(Vec::new()));

    run_with_strategies(
        &config(date(13), date(15)),
        &tape(date(13), date(15)),
        vec![Box::new(Probe {
            seen: Arc::clone(&full_seen),
        })],
    )
    .unwrap();
    run_with_strategies(
        &config(date(13), date(14)),
        &tape(date(13), date(14)),
        vec![Box::new(Probe {
            seen: Arc::clone(&short_seen),
        })],
    )
    .unwrap();

    let full = full_seen.lock().unwrap();
    let short = short_seen.lock().unwrap();
    assert!(!short.is_empty());
    assert!(full.len() > short.len());
    assert_eq!(&full[..short.len()], &short[..]);
}

#[test]
fn trades_in_the_prefix_are_unchanged_by_later_days() {
    let full = run_backtest(&config(date(13), date(15)), &tape(date(13), date(15))).unwrap();
    let short = run_backtest(&config(date(13), date(14)), &tape(date(13), date(14))).unwrap();

    assert_eq!(short.ledger.trades().len(), 2);
    assert_eq!(full.ledger.trades().len(), 3);
    assert_eq!(&full.ledger.trades()[..2], short.ledger.trades());

    let shared: Vec<_> = full
        .ledger
        .equity_curve()
        .iter()
        .filter(|p| p.ts.date() <= date(14))
        .copied()
        .collect();
    assert_eq!(shared, short.ledger.equity_curve());
}

#[test]
fn every_position_is_flat_by_the_cutoff() {
    let report = run_backtest(&config(date(13), date(15)), &tape(date(13), date(15))).unwrap();
    let cutoff = NaiveTime::from_hms_opt(15, 45, 0).unwrap();

    assert!(report.positions.iter().all(|p| !p.is_open()));
    assert_eq!(report.ledger.trades().len(), 3);
    for trade in report.ledger.trades() {
        assert_eq!(trade.closed_at.date(), trade.opened_at.date());
        assert_eq!(trade.exit_reason, ExitReason::ForcedExpiry);
        assert!(trade.closed_at.time() >= cutoff);
    }
}

#[test]
fn cash_reconciles_with_the_raw_fill_stream() {
    let report = run_backtest(&config(date(13), date(15)), &tape(date(13), date(15))).unwrap();
    let ledger = &report.ledger;

    let replayed: f64 = ledger.fills().iter().map(|f| f.cash_delta(100.0)).sum();
    assert!((ledger.cash() - (100_000.0 + replayed)).abs() < 1e-6);

    // flat at the end, so everything realized sits in cash
    let trade_net: f64 = ledger.trades().iter().map(|t| t.net_pnl).sum();
    assert!((ledger.cash() - 100_000.0 - trade_net).abs() < 1e-6);
    assert!((ledger.realized_net() - trade_net).abs() < 1e-9);
}

#[test]
fn commissions_accumulate_per_contract() {
    let report = run_backtest(&config(date(13), date(15)), &tape(date(13), date(15))).unwrap();
    let ledger = &report.ledger;

    // default schedule: 0.65 per contract, no per-order clamps; legs that
    // settle out of the money at expiry are the only free fills
    for fill in ledger.fills() {
        let per_contract = 0.65 * fill.quantity.unsigned_abs() as f64;
        assert!(
            fill.commission == 0.0 || (fill.commission - per_contract).abs() < 1e-9,
            "unexpected commission {} on {} contracts",
            fill.commission,
            fill.quantity
        );
    }

    let from_fills: f64 = ledger.fills().iter().map(|f| f.commission).sum();
    assert!((ledger.total_commission() - from_fills).abs() < 1e-9);

    let from_trades: f64 = ledger.trades().iter().map(|t| t.commission).sum();
    assert!((from_trades - from_fills).abs() < 1e-9);
}

#[test]
fn equity_curve_is_ordered_and_ends_flat() {
    let report = run_backtest(&config(date(13), date(15)), &tape(date(13), date(15))).unwrap();
    let curve = report.ledger.equity_curve();

    assert!(curve.len() >= 3);
    assert!(curve.windows(2).all(|w| w[0].ts <= w[1].ts));
    for point in curve {
        assert!((point.equity - (point.cash + point.open_value)).abs() < 1e-9);
    }

    let last = curve.last().unwrap();
    assert_eq!(last.open_value, 0.0);
    assert!((last.equity - report.ledger.cash()).abs() < 1e-9);

    // at least the day-end sample lands on each trading day
    for d in [date(13), date(14), date(15)] {
        assert!(curve.iter().any(|p| p.ts.date() == d));
    }
}

#[test]
fn identical_inputs_yield_identical_ledgers() {
    let cfg = config(date(13), date(15));
    let a = run_backtest(&cfg, &tape(date(13), date(15))).unwrap();
    let b = run_backtest(&cfg, &tape(date(13), date(15))).unwrap();

    assert_eq!(a.ledger.digest().unwrap(), b.ledger.digest().unwrap());
    assert_eq!(a.ledger.trades(), b.ledger.trades());
    assert_eq!(a.ledger.equity_curve(), b.ledger.equity_curve());
    assert_eq!(a.daily_implied_move, b.daily_implied_move);
}

#[test]
fn implied_move_lands_once_per_day() {
    let report = run_backtest(&config(date(13), date(15)), &tape(date(13), date(15))).unwrap();
    let days: Vec<NaiveDate> = report.daily_implied_move.iter().map(|(d, _)| *d).collect();
    assert_eq!(days, vec![date(13), date(14), date(15)]);
    assert!(report
        .daily_implied_move
        .iter()
        .all(|(_, m)| m.dollars > 0.0 && m.fraction > 0.0));
}
