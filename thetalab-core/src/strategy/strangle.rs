//! Short strangle — sells the call and put nearest a target delta.
//!
//! Strikes come from the live chain: among quoted, tradeable strikes out of
//! the money on each side, the leg whose model delta magnitude lands closest
//! to the target is sold. Entries go out as a package limit at the currently
//! quoted credit, so a book that fades before the fill expires the intent
//! instead of chasing.

use crate::domain::{
    IntentIds, IntentKind, LegSpec, OptionContract, OrderIntent, OrderKind, Right,
};
use crate::error::EngineError;

use super::signals::QuietMarketGate;
use super::{close_position_intent, premium_exit, EntryGate, Strategy, StrategyContext};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrangleParams {
    pub contracts: i64,
    pub target_delta: f64,
    /// Submit entries as a package limit at the quoted credit. Market
    /// entries skip the pending queue entirely.
    pub limit_entry: bool,
    pub require_quiet: bool,
    pub profit_target_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub gate: EntryGate,
    pub quiet: QuietMarketGate,
}

impl Default for StrangleParams {
    fn default() -> Self {
        Self {
            contracts: 1,
            target_delta: 0.15,
            limit_entry: true,
            require_quiet: false,
            profit_target_pct: None,
            stop_loss_pct: None,
            gate: EntryGate::default(),
            quiet: QuietMarketGate::default(),
        }
    }
}

pub struct ShortStrangle {
    params: StrangleParams,
}

impl ShortStrangle {
    pub fn new(params: StrangleParams) -> Self {
        assert!(params.contracts >= 1, "contracts must be >= 1");
        assert!(
            params.target_delta > 0.0 && params.target_delta < 0.5,
            "target_delta must be in (0, 0.5)"
        );
        Self { params }
    }

    pub fn default_params() -> Self {
        Self::new(StrangleParams::default())
    }

    /// OTM strike on `right`'s side whose delta magnitude is nearest the
    /// target. Only tradeable quotes count.
    fn pick_strike(&self, ctx: &StrategyContext<'_>, right: Right) -> Option<OptionContract> {
        let spot = ctx.market.underlying()?;
        let expiry = ctx.market.day()?;
        let mut best: Option<(f64, OptionContract)> = None;
        for q in ctx.market.quotes_for_right(right) {
            if !q.is_tradeable() {
                continue;
            }
            let strike = q.contract.strike();
            let otm = match right {
                Right::Call => strike > spot,
                Right::Put => strike < spot,
            };
            if !otm {
                continue;
            }
            let contract = OptionContract::new(expiry, strike, right);
            let delta = match ctx.tick.delta(&contract) {
                Some(d) => d,
                None => continue,
            };
            let miss = (delta.abs() - self.params.target_delta).abs();
            if best.as_ref().map_or(true, |(m, _)| miss < *m) {
                best = Some((miss, contract));
            }
        }
        best.map(|(_, c)| c)
    }

    fn entry_intent(
        &self,
        ctx: &StrategyContext<'_>,
        ids: &mut IntentIds,
    ) -> Option<OrderIntent> {
        let call = self.pick_strike(ctx, Right::Call)?;
        let put = self.pick_strike(ctx, Right::Put)?;
        let order = if self.params.limit_entry {
            let credit = ctx.market.quote(&call)?.bid + ctx.market.quote(&put)?.bid;
            // net package cost: a credit is negative
            OrderKind::Limit {
                limit: -credit * self.params.contracts as f64,
            }
        } else {
            OrderKind::Market
        };
        Some(OrderIntent {
            id: ids.next(),
            kind: IntentKind::Open {
                strategy: self.name().to_string(),
            },
            legs: vec![
                LegSpec::sell(call, self.params.contracts),
                LegSpec::sell(put, self.params.contracts),
            ],
            order,
            issued_at: ctx.now,
        })
    }
}

impl Strategy for ShortStrangle {
    fn name(&self) -> &str {
        "SHORT_STRANGLE"
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
        let quiet_ok = !self.params.require_quiet
            || self.params.quiet.is_quiet(ctx.market.bars_today());
        if self.params.gate.admits(ctx) && quiet_ok {
            if let Some(intent) = self.entry_intent(ctx, ids) {
                intents.push(intent);
            }
        }
        Ok(intents)
    }
}
