//! Position & risk manager.
//!
//! Owns every position in the run, open and closed. Routes closing fills to
//! their legs, applies the universal exit rules in fixed priority order
//! (stop, target, max hold, 0DTE cutoff), and settles anything that cannot
//! be closed against a quote at intrinsic value. Partial closes realize
//! P&L immediately but the `Trade` record is only emitted once the last
//! leg goes flat.

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{
    ExitReason, Fill, IntentIds, IntentKind, LegSpec, OrderIntent, OrderKind, Position,
    PositionId, Trade,
};
use crate::error::EngineError;
use crate::fills::CommissionConfig;
use crate::valuation::{intrinsic, Provenance, TickValuation};

/// Universal exit rules, applied to every open position regardless of
/// which strategy opened it. Evaluated after the strategies' own exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Close at `ProfitTarget` when P&L reaches this fraction of the entry
    /// premium.
    pub profit_target_pct: Option<f64>,
    /// Close at `StopLoss` when P&L falls to minus this fraction.
    pub stop_loss_pct: Option<f64>,
    /// Close at `MaxHold` once the position has been open this long.
    pub max_hold_minutes: Option<i64>,
}

/// Aggregate mark of all open positions at one tick, with the provenance
/// split the ledger records on every equity sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarkSummary {
    /// Liquidation value of all open legs at current marks, in cash.
    pub open_value: f64,
    /// `open_value` minus the entry premium of the open legs.
    pub unrealized: f64,
    pub observed: usize,
    pub modeled: usize,
}

/// A position force-closed at intrinsic value, with the synthetic intent
/// and fills so the tape stays complete.
#[derive(Debug)]
pub struct Settlement {
    pub intent: OrderIntent,
    pub fills: Vec<Fill>,
    pub trade: Trade,
}

pub struct PositionBook {
    multiplier: f64,
    risk: RiskConfig,
    cutoff: NaiveTime,
    positions: Vec<Position>,
    next_id: u64,
}

impl PositionBook {
    pub fn new(multiplier: f64, risk: RiskConfig, cutoff: NaiveTime) -> Self {
        Self {
            multiplier,
            risk,
            cutoff,
            positions: Vec::new(),
            next_id: 0,
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn cutoff(&self) -> NaiveTime {
        self.cutoff
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn get(&self, id: PositionId) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.is_open())
    }

    pub fn has_open(&self) -> bool {
        self.open_positions().next().is_some()
    }

    /// Open positions belonging to one strategy, for its evaluation context.
    pub fn open_for(&self, strategy: &str) -> Vec<&Position> {
        self.open_positions()
            .filter(|p| p.strategy == strategy)
            .collect()
    }

    /// Create a position from the fills of an opening intent.
    pub fn open_position(&mut self, strategy: &str, fills: &[Fill], at: NaiveDateTime) -> PositionId {
        let id = PositionId(self.next_id);
        self.next_id += 1;
        let position = Position::open(id, strategy, fills, self.multiplier, at);
        debug!(
            position = id.0,
            strategy,
            legs = position.legs.len(),
            basis = position.entry_basis(self.multiplier),
            "position opened"
        );
        self.positions.push(position);
        id
    }

    /// Route closing fills to a position. Returns the finished `Trade` when
    /// the fills flatten the last leg; a partial close returns `None` and
    /// leaves the position open with its realized P&L accrued.
    pub fn apply_close_fills(
        &mut self,
        id: PositionId,
        fills: &[Fill],
        reason: ExitReason,
        at: NaiveDateTime,
    ) -> Option<Trade> {
        let multiplier = self.multiplier;
        let position = self.positions.iter_mut().find(|p| p.id == id)?;
        if !position.is_open() {
            debug_assert!(false, "closing fills for already-closed position {}", id.0);
            return None;
        }
        for fill in fills {
            position.apply_closing_fill(fill, multiplier);
        }
        if position.is_flat() {
            position.finalize(reason, at);
            let trade = position.to_trade();
            info!(
                position = id.0,
                strategy = %trade.strategy,
                reason = %trade.exit_reason,
                net = trade.net_pnl,
                "position closed"
            );
            Some(trade)
        } else {
            debug!(position = id.0, realized = position.gross_realized, "partial close");
            None
        }
    }

    /// Universal exits for every open position, in book order. Per
    /// position the rules run stop, target, max hold, then cutoff; the
    /// first hit wins.
    pub fn check_exits(&self, tick: &TickValuation<'_>) -> Vec<(PositionId, ExitReason)> {
        let past_cutoff = tick.now().time() >= self.cutoff;
        self.open_positions()
            .filter_map(|p| self.exit_for(p, tick, past_cutoff).map(|r| (p.id, r)))
            .collect()
    }

    fn exit_for(
        &self,
        position: &Position,
        tick: &TickValuation<'_>,
        past_cutoff: bool,
    ) -> Option<ExitReason> {
        if let Some(frac) = self.pnl_fraction(position, tick) {
            if let Some(stop) = self.risk.stop_loss_pct {
                if frac <= -stop {
                    return Some(ExitReason::StopLoss);
                }
            }
            if let Some(target) = self.risk.profit_target_pct {
                if frac >= target {
                    return Some(ExitReason::ProfitTarget);
                }
            }
        }
        if let Some(max_hold) = self.risk.max_hold_minutes {
            if (tick.now() - position.opened_at).num_minutes() >= max_hold {
                return Some(ExitReason::MaxHold);
            }
        }
        if past_cutoff {
            return Some(ExitReason::ForcedExpiry);
        }
        None
    }

    /// P&L on the still-open quantity as a fraction of its entry premium.
    /// `None` when a leg cannot be marked this tick; the time-based rules
    /// still apply in that case.
    fn pnl_fraction(&self, position: &Position, tick: &TickValuation<'_>) -> Option<f64> {
        let mut basis = 0.0;
        let mut value = 0.0;
        for leg in position.legs.iter().filter(|l| !l.is_flat()) {
            let mark = tick.value(&leg.contract).ok()?.mark;
            basis += leg.entry_price * leg.open_quantity as f64;
            value += mark * leg.open_quantity as f64;
        }
        if basis.abs() < f64::EPSILON {
            return None;
        }
        Some((value - basis) / basis.abs())
    }

    /// Mark every open leg through the valuation bridge. A leg that cannot
    /// be marked is fatal: the run must not continue on a fictional equity
    /// curve.
    pub fn mark_open(&self, tick: &TickValuation<'_>) -> Result<MarkSummary, EngineError> {
        let mut summary = MarkSummary::default();
        for position in self.open_positions() {
            for leg in position.legs.iter().filter(|l| !l.is_flat()) {
                let valuation = tick.value(&leg.contract)?;
                let open = leg.open_quantity as f64 * self.multiplier;
                summary.open_value += valuation.mark * open;
                summary.unrealized += (valuation.mark - leg.entry_price) * open;
                match valuation.provenance {
                    Provenance::Observed => summary.observed += 1,
                    Provenance::Modeled => summary.modeled += 1,
                }
            }
        }
        Ok(summary)
    }

    /// Intent closing `fraction` of every open leg, rounded to whole
    /// contracts, at least one per leg. The realized part lands in cash
    /// when the fills come back; no `Trade` until fully flat.
    pub fn scale_close_intent(
        &self,
        id: PositionId,
        fraction: f64,
        ids: &mut IntentIds,
        now: NaiveDateTime,
    ) -> Option<OrderIntent> {
        let position = self.positions.iter().find(|p| p.id == id && p.is_open())?;
        let legs: Vec<LegSpec> = position
            .legs
            .iter()
            .filter(|l| !l.is_flat())
            .map(|l| {
                let open = l.open_quantity.abs();
                let close = ((open as f64) * fraction).round() as i64;
                LegSpec {
                    contract: l.contract.clone(),
                    quantity: -l.open_quantity.signum() * close.clamp(1, open),
                }
            })
            .collect();
        if legs.is_empty() {
            return None;
        }
        Some(OrderIntent {
            id: ids.next(),
            kind: IntentKind::Close {
                position: id,
                reason: ExitReason::StrategyExit,
            },
            legs,
            order: OrderKind::Market,
            issued_at: now,
        })
    }

    /// Force-close a position at intrinsic value against the settlement
    /// spot. Used when the quote book cannot fill the closing order, and
    /// for anything still open when a day's events run out. Commission is
    /// charged only on legs that settle in the money.
    pub fn settle_position(
        &mut self,
        id: PositionId,
        settlement_spot: f64,
        commission: &CommissionConfig,
        ids: &mut IntentIds,
        at: NaiveDateTime,
    ) -> Option<Settlement> {
        let specs = self
            .positions
            .iter()
            .find(|p| p.id == id && p.is_open())
            .map(|p| p.closing_legs())?;
        if specs.is_empty() {
            return None;
        }
        let payoffs: Vec<f64> = specs
            .iter()
            .map(|s| intrinsic(settlement_spot, s.contract.strike(), s.contract.right))
            .collect();
        let itm_contracts: i64 = specs
            .iter()
            .zip(&payoffs)
            .filter(|(_, payoff)| **payoff > 0.0)
            .map(|(s, _)| s.quantity.abs())
            .sum();
        let order_commission = commission.order_commission(itm_contracts);
        let intent = OrderIntent {
            id: ids.next(),
            kind: IntentKind::Close {
                position: id,
                reason: ExitReason::ForcedExpiry,
            },
            legs: specs.clone(),
            order: OrderKind::Market,
            issued_at: at,
        };
        let fills: Vec<Fill> = specs
            .iter()
            .zip(&payoffs)
            .map(|(spec, payoff)| Fill {
                intent_id: intent.id,
                contract: spec.contract.clone(),
                price: *payoff,
                quantity: spec.quantity,
                commission: if *payoff > 0.0 && itm_contracts > 0 {
                    order_commission * spec.quantity.unsigned_abs() as f64 / itm_contracts as f64
                } else {
                    0.0
                },
                slippage: 0.0,
                ts: at,
            })
            .collect();
        warn!(
            position = id.0,
            spot = settlement_spot,
            "settling at intrinsic value"
        );
        let trade = self.apply_close_fills(id, &fills, ExitReason::ForcedExpiry, at)?;
        Some(Settlement {
            intent,
            fills,
            trade,
        })
    }

    /// Settle every open position. End-of-day backstop.
    pub fn settle_all_open(
        &mut self,
        settlement_spot: f64,
        commission: &CommissionConfig,
        ids: &mut IntentIds,
        at: NaiveDateTime,
    ) -> Vec<Settlement> {
        let open: Vec<PositionId> = self.open_positions().map(|p| p.id).collect();
        open.into_iter()
            .filter_map(|id| self.settle_position(id, settlement_spot, commission, ids, at))
            .collect()
    }
}
