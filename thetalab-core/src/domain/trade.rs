//! Closed-trade records and exit reasons.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::contract::OptionContract;
use super::ids::PositionId;

/// Why a position was closed. Recorded on every trade and used by the
/// risk layer to rank concurrent exit conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    /// Unrealized gain reached the profit-target fraction.
    ProfitTarget,
    /// Unrealized loss reached the stop-loss fraction.
    StopLoss,
    /// Position age reached the maximum holding time.
    MaxHold,
    /// Same-day cutoff: everything is flattened before expiry.
    ForcedExpiry,
    /// The strategy itself requested the close (signal exit, scale-out).
    StrategyExit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::ProfitTarget => "profit_target",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::MaxHold => "max_hold",
            ExitReason::ForcedExpiry => "forced_expiry",
            ExitReason::StrategyExit => "strategy_exit",
        };
        f.write_str(s)
    }
}

/// One leg of a completed trade, with averaged exit price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLeg {
    pub contract: OptionContract,
    pub quantity: i64,
    pub entry_price: f64,
    pub exit_price: f64,
}

/// A fully closed position, summarized for the ledger and reporting.
/// `net_pnl = gross_pnl - commission`; slippage is already embedded in the
/// entry/exit prices and reported separately for attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub position_id: PositionId,
    pub strategy: String,
    pub legs: Vec<TradeLeg>,
    pub opened_at: NaiveDateTime,
    pub closed_at: NaiveDateTime,
    pub exit_reason: ExitReason,
    pub gross_pnl: f64,
    pub commission: f64,
    pub slippage: f64,
    pub net_pnl: f64,
    pub capital_used: f64,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }

    /// Minutes between entry and exit.
    pub fn holding_minutes(&self) -> i64 {
        (self.closed_at - self.opened_at).num_minutes()
    }
}
