//! Strategy evaluation — turns market state into order intents.
//!
//! Strategies are position-aware but ledger-blind: they see the market view,
//! the valuation context, and their own open positions, and they answer with
//! intents. Fills, risk exits, and accounting belong to the engine. A
//! strategy never sees another strategy's positions.

pub mod iron_condor;
pub mod signals;
pub mod straddle;
pub mod strangle;

pub use iron_condor::{IronCondor, IronCondorParams};
pub use signals::QuietMarketGate;
pub use straddle::{LongStraddle, StraddleParams};
pub use strangle::{ShortStrangle, StrangleParams};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::domain::{ExitReason, IntentIds, IntentKind, OrderIntent, OrderKind, Position};
use crate::error::EngineError;
use crate::market::MarketState;
use crate::valuation::TickValuation;

/// Read-only view handed to a strategy on each evaluation tick.
pub struct StrategyContext<'a> {
    pub market: &'a MarketState,
    pub tick: &'a TickValuation<'a>,
    /// This strategy's open positions, nobody else's.
    pub open: &'a [&'a Position],
    /// An entry intent from this strategy is still pending in the queue.
    pub pending_open: bool,
    /// Entries already filled for this strategy today.
    pub entries_today: u32,
    pub now: NaiveDateTime,
}

/// A tradeable idea evaluated once per event.
///
/// `evaluate` must be pure with respect to the market: implementations may
/// keep per-day internal state (scale-out flags, counters) but must never
/// peek past `ctx.now`, which the context makes structurally impossible.
pub trait Strategy: Send {
    /// Stable name used for position attribution and reporting.
    fn name(&self) -> &str;

    /// Reset per-day state. Called once before the first event of each day.
    fn on_day_start(&mut self, date: NaiveDate);

    /// Emit intents for the current tick. Exit intents for existing
    /// positions come first in the returned vector.
    fn evaluate(
        &mut self,
        ctx: &StrategyContext<'_>,
        ids: &mut IntentIds,
    ) -> Result<Vec<OrderIntent>, EngineError>;
}

/// Shared entry discipline: a daily window and an entry cap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryGate {
    pub not_before: NaiveTime,
    pub not_after: NaiveTime,
    pub max_entries_per_day: u32,
}

impl Default for EntryGate {
    fn default() -> Self {
        Self {
            not_before: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            not_after: NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
            max_entries_per_day: 1,
        }
    }
}

impl EntryGate {
    /// Whether a new entry is admissible at this tick. One position per
    /// strategy at a time; pending entries count as occupied.
    pub fn admits(&self, ctx: &StrategyContext<'_>) -> bool {
        let t = ctx.now.time();
        t >= self.not_before
            && t <= self.not_after
            && ctx.entries_today < self.max_entries_per_day
            && !ctx.pending_open
            && ctx.open.is_empty()
    }
}

/// Family-level premium exit shared by strategies that declare their own
/// target/stop. Fractions are measured against the absolute open entry
/// premium; the contract multiplier cancels out. Returns `None` when any
/// open leg cannot be marked this tick.
pub(crate) fn premium_exit(
    position: &Position,
    tick: &TickValuation<'_>,
    profit_target_pct: Option<f64>,
    stop_loss_pct: Option<f64>,
) -> Option<ExitReason> {
    if profit_target_pct.is_none() && stop_loss_pct.is_none() {
        return None;
    }
    let mut basis = 0.0;
    let mut value = 0.0;
    for leg in position.legs.iter().filter(|l| !l.is_flat()) {
        basis += leg.entry_price * leg.open_quantity as f64;
        let mark = tick.value(&leg.contract).ok()?.mark;
        value += mark * leg.open_quantity as f64;
    }
    if basis.abs() < f64::EPSILON {
        return None;
    }
    let pnl_frac = (value - basis) / basis.abs();
    if let Some(stop) = stop_loss_pct {
        if pnl_frac <= -stop {
            return Some(ExitReason::StopLoss);
        }
    }
    if let Some(target) = profit_target_pct {
        if pnl_frac >= target {
            return Some(ExitReason::ProfitTarget);
        }
    }
    None
}

/// Market intent that flattens everything still open in `position`.
pub(crate) fn close_position_intent(
    position: &Position,
    reason: ExitReason,
    ids: &mut IntentIds,
    now: NaiveDateTime,
) -> OrderIntent {
    OrderIntent {
        id: ids.next(),
        kind: IntentKind::Close {
            position: position.id,
            reason,
        },
        legs: position.closing_legs(),
        order: OrderKind::Market,
        issued_at: now,
    }
}
