//! Positions — multi-leg holdings with per-leg open quantity.
//!
//! A position is created from the fills of an opening intent and mutated by
//! closing fills. Scale-outs reduce a single leg's open quantity; the
//! position as a whole stays open until every leg is flat. Realized P&L
//! accrues leg by leg as closing fills land, so the ledger identity
//! `realized + unrealized = total` holds at every tick.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::contract::OptionContract;
use super::fill::Fill;
use super::ids::PositionId;
use super::trade::{ExitReason, Trade, TradeLeg};

/// One leg of a position. `quantity` is the signed entered size and never
/// changes; `open_quantity` shrinks toward zero as closing fills arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub contract: OptionContract,
    pub quantity: i64,
    pub open_quantity: i64,
    pub entry_price: f64,
    /// Sum of `price * |contracts|` over closing fills, for average exit price.
    exit_notional: f64,
    /// True once a partial scale-out has fired for this leg.
    pub scaled_out: bool,
}

impl Leg {
    pub fn new(contract: OptionContract, quantity: i64, entry_price: f64) -> Self {
        Self {
            contract,
            quantity,
            open_quantity: quantity,
            entry_price,
            exit_notional: 0.0,
            scaled_out: false,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.open_quantity == 0
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0
    }

    /// Contracts already closed, unsigned.
    pub fn closed_quantity(&self) -> i64 {
        (self.quantity - self.open_quantity).abs()
    }

    /// Volume-weighted average exit price over closing fills so far.
    pub fn avg_exit_price(&self) -> Option<f64> {
        let closed = self.closed_quantity();
        if closed == 0 {
            None
        } else {
            Some(self.exit_notional / closed as f64)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// A live (or just-closed) multi-leg position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub strategy: String,
    pub legs: Vec<Leg>,
    pub opened_at: NaiveDateTime,
    pub status: PositionStatus,
    pub closed_at: Option<NaiveDateTime>,
    pub exit_reason: Option<ExitReason>,
    /// Realized premium P&L from closing fills, before commission.
    pub gross_realized: f64,
    pub commission_paid: f64,
    pub slippage_paid: f64,
    /// Cash committed at entry: premium paid plus entry commission, floored
    /// at commission for pure-credit entries. Feeds capital-usage metrics.
    pub capital_used: f64,
}

impl Position {
    /// Build a position from the fills of an opening intent. Every fill
    /// becomes one leg at its executed price.
    pub fn open(
        id: PositionId,
        strategy: &str,
        fills: &[Fill],
        multiplier: f64,
        opened_at: NaiveDateTime,
    ) -> Self {
        let legs = fills
            .iter()
            .map(|f| Leg::new(f.contract.clone(), f.quantity, f.price))
            .collect();
        let commission: f64 = fills.iter().map(|f| f.commission).sum();
        let slippage: f64 = fills.iter().map(|f| f.slippage).sum();
        let premium: f64 = fills
            .iter()
            .map(|f| f.price * f.quantity as f64 * multiplier)
            .sum();
        Self {
            id,
            strategy: strategy.to_string(),
            legs,
            opened_at,
            status: PositionStatus::Open,
            closed_at: None,
            exit_reason: None,
            gross_realized: 0.0,
            commission_paid: commission,
            slippage_paid: slippage,
            capital_used: premium.max(0.0) + commission,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn leg(&self, contract: &OptionContract) -> Option<&Leg> {
        self.legs.iter().find(|l| &l.contract == contract)
    }

    /// Signed entry premium of the still-open portion, in cash terms.
    /// Debit positions are positive, credit positions negative. This is the
    /// basis against which unrealized P&L and risk thresholds are measured.
    pub fn open_basis(&self, multiplier: f64) -> f64 {
        self.legs
            .iter()
            .map(|l| l.entry_price * l.open_quantity as f64 * multiplier)
            .sum()
    }

    /// Entry premium of the full entered size, signed.
    pub fn entry_basis(&self, multiplier: f64) -> f64 {
        self.legs
            .iter()
            .map(|l| l.entry_price * l.quantity as f64 * multiplier)
            .sum()
    }

    /// Apply one closing fill to its leg. The fill quantity must oppose the
    /// leg's remaining open quantity and may not overshoot flat.
    ///
    /// In debug builds a fill that targets no leg of this position trips a
    /// debug_assert. In release it is ignored.
    pub fn apply_closing_fill(&mut self, fill: &Fill, multiplier: f64) {
        let leg = match self.legs.iter_mut().find(|l| l.contract == fill.contract) {
            Some(leg) => leg,
            None => {
                debug_assert!(false, "closing fill for unknown leg {}", fill.contract);
                return;
            }
        };
        debug_assert!(
            fill.quantity.signum() == -leg.open_quantity.signum(),
            "closing fill must oppose the open leg"
        );
        debug_assert!(
            fill.quantity.abs() <= leg.open_quantity.abs(),
            "closing fill overshoots flat"
        );
        leg.open_quantity += fill.quantity;
        leg.exit_notional += fill.price * fill.quantity.unsigned_abs() as f64;
        if !leg.is_flat() {
            leg.scaled_out = true;
        }
        // (entry - exec) * closing_qty works for both directions: selling a
        // long below entry loses, buying a short back above entry loses.
        self.gross_realized += (leg.entry_price - fill.price) * fill.quantity as f64 * multiplier;
        self.commission_paid += fill.commission;
        self.slippage_paid += fill.slippage;
    }

    /// True once every leg has been closed out.
    pub fn is_flat(&self) -> bool {
        self.legs.iter().all(Leg::is_flat)
    }

    /// Leg specs that would flatten everything still open, for building a
    /// full-close intent.
    pub fn closing_legs(&self) -> Vec<super::order::LegSpec> {
        self.legs
            .iter()
            .filter(|l| !l.is_flat())
            .map(|l| super::order::LegSpec {
                contract: l.contract.clone(),
                quantity: -l.open_quantity,
            })
            .collect()
    }

    /// Mark the position closed. Call only when [`Self::is_flat`] holds.
    pub fn finalize(&mut self, reason: ExitReason, at: NaiveDateTime) {
        debug_assert!(self.is_flat(), "finalize on a position with open legs");
        self.status = PositionStatus::Closed;
        self.exit_reason = Some(reason);
        self.closed_at = Some(at);
    }

    /// Summarize a finalized position as a trade record.
    pub fn to_trade(&self) -> Trade {
        let legs = self
            .legs
            .iter()
            .map(|l| TradeLeg {
                contract: l.contract.clone(),
                quantity: l.quantity,
                entry_price: l.entry_price,
                exit_price: l.avg_exit_price().unwrap_or(l.entry_price),
            })
            .collect();
        let net = self.gross_realized - self.commission_paid;
        Trade {
            position_id: self.id,
            strategy: self.strategy.clone(),
            legs,
            opened_at: self.opened_at,
            closed_at: self.closed_at.unwrap_or(self.opened_at),
            exit_reason: self.exit_reason.unwrap_or(ExitReason::StrategyExit),
            gross_pnl: self.gross_realized,
            commission: self.commission_paid,
            slippage: self.slippage_paid,
            net_pnl: net,
            capital_used: self.capital_used,
        }
    }
}
