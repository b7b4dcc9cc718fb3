//! Iron condor — four-leg credit structure with a searched wing width.
//!
//! Both short strikes sit on the grid strike nearest spot; the wings are
//! placed symmetrically at the width whose credit-to-max-loss ratio lands
//! closest to the target. Entry waits for the quiet-market gate inside the
//! daily window.

use chrono::NaiveDateTime;

use crate::domain::{
    grid_strike, IntentIds, IntentKind, LegSpec, OptionContract, OrderIntent, OrderKind, Right,
};
use crate::error::EngineError;
use crate::market::MarketState;

use super::signals::QuietMarketGate;
use super::{close_position_intent, premium_exit, EntryGate, Strategy, StrategyContext};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IronCondorParams {
    pub contracts: i64,
    pub strike_step: f64,
    pub wing_min: f64,
    pub wing_max: f64,
    pub target_ratio: f64,
    pub ratio_tolerance: f64,
    pub profit_target_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub gate: EntryGate,
    pub quiet: QuietMarketGate,
}

impl Default for IronCondorParams {
    fn default() -> Self {
        Self {
            contracts: 1,
            strike_step: 5.0,
            wing_min: 15.0,
            wing_max: 70.0,
            target_ratio: 1.5,
            ratio_tolerance: 0.03,
            profit_target_pct: None,
            stop_loss_pct: None,
            gate: EntryGate::default(),
            quiet: QuietMarketGate::default(),
        }
    }
}

/// A candidate structure found by the wing search.
#[derive(Debug, Clone, PartialEq)]
struct CondorStructure {
    atm: f64,
    width: f64,
    credit: f64,
}

pub struct IronCondor {
    params: IronCondorParams,
}

impl IronCondor {
    pub fn new(params: IronCondorParams) -> Self {
        assert!(params.contracts >= 1, "contracts must be >= 1");
        assert!(params.strike_step > 0.0, "strike_step must be positive");
        assert!(
            params.wing_min > 0.0 && params.wing_min <= params.wing_max,
            "wing bounds must satisfy 0 < min <= max"
        );
        assert!(params.target_ratio > 0.0, "target_ratio must be positive");
        Self { params }
    }

    pub fn default_params() -> Self {
        Self::new(IronCondorParams::default())
    }

    /// Credit and credit/max-loss ratio for one wing width, short legs at
    /// bid and long legs at ask. `None` when any leg is unquoted or the
    /// structure carries no positive credit.
    fn try_width(&self, market: &MarketState, atm: f64, width: f64) -> Option<(f64, f64)> {
        let expiry = market.day()?;
        let legs = [
            (atm, Right::Call),
            (atm, Right::Put),
            (atm + width, Right::Call),
            (atm - width, Right::Put),
        ];
        let mut quotes = legs.iter().map(|(strike, right)| {
            market
                .quote(&OptionContract::new(expiry, *strike, *right))
                .filter(|q| q.is_tradeable())
        });
        let sc = quotes.next()??;
        let sp = quotes.next()??;
        let lc = quotes.next()??;
        let lp = quotes.next()??;
        let credit = sc.bid + sp.bid - lc.ask - lp.ask;
        let max_loss = width - credit;
        if credit <= 0.0 || max_loss <= 0.0 {
            return None;
        }
        Some((credit / max_loss, credit))
    }

    /// Scan widths from narrow to wide, keeping the ratio closest to the
    /// target and stopping early once inside the tolerance band.
    fn find_structure(&self, market: &MarketState) -> Option<CondorStructure> {
        let spot = market.underlying()?;
        let atm = grid_strike(spot, self.params.strike_step);
        let mut best: Option<(f64, CondorStructure)> = None;
        let mut width = self.params.wing_min;
        while width <= self.params.wing_max + f64::EPSILON {
            if let Some((ratio, credit)) = self.try_width(market, atm, width) {
                let miss = (ratio - self.params.target_ratio).abs();
                if best.as_ref().map_or(true, |(m, _)| miss < *m) {
                    best = Some((miss, CondorStructure { atm, width, credit }));
                }
                if miss <= self.params.ratio_tolerance {
                    break;
                }
            }
            width += self.params.strike_step;
        }
        let (miss, structure) = best?;
        if miss <= self.params.ratio_tolerance {
            Some(structure)
        } else {
            None
        }
    }

    fn open_intent(
        &self,
        market: &MarketState,
        s: &CondorStructure,
        ids: &mut IntentIds,
        now: NaiveDateTime,
    ) -> Option<OrderIntent> {
        let expiry = market.day()?;
        let q = self.params.contracts;
        Some(OrderIntent {
            id: ids.next(),
            kind: IntentKind::Open {
                strategy: self.name().to_string(),
            },
            legs: vec![
                LegSpec::sell(OptionContract::new(expiry, s.atm, Right::Call), q),
                LegSpec::sell(OptionContract::new(expiry, s.atm, Right::Put), q),
                LegSpec::buy(OptionContract::new(expiry, s.atm + s.width, Right::Call), q),
                LegSpec::buy(OptionContract::new(expiry, s.atm - s.width, Right::Put), q),
            ],
            order: OrderKind::Market,
            issued_at: now,
        })
    }
}

impl Strategy for IronCondor {
    fn name(&self) -> &str {
        "IRON_CONDOR"
    }

    fn on_day_start(&mut self, _date: chrono::NaiveDate) {}

    fn evaluate(
        &mut self,
        ctx: &StrategyContext<'_>,
        ids: &mut IntentIds,
    ) -> Result<Vec<OrderIntent>, EngineError> {
        let mut intents = Vec::new();
        for pos in ctx.open {
            if let Some(reason) = premium_exit(
                pos,
                ctx.tick,
                self.params.profit_target_pct,
                self.params.stop_loss_pct,
            ) {
                intents.push(close_position_intent(pos, reason, ids, ctx.now));
            }
        }
        if self.params.gate.admits(ctx) && self.params.quiet.is_quiet(ctx.market.bars_today()) {
            if let Some(structure) = self.find_structure(ctx.market) {
                if let Some(intent) = self.open_intent(ctx.market, &structure, ids, ctx.now) {
                    intents.push(intent);
                }
            }
        }
        Ok(intents)
    }
}
