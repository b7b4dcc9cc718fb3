//! Order intents — the strategy-to-fill-simulator contract.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::contract::OptionContract;
use super::ids::{IntentId, PositionId};
use super::trade::ExitReason;

/// One contract within an intent, with the signed quantity requested
/// (positive = buy, negative = sell).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegSpec {
    pub contract: OptionContract,
    pub quantity: i64,
}

impl LegSpec {
    pub fn buy(contract: OptionContract, quantity: i64) -> Self {
        Self {
            contract,
            quantity: quantity.abs(),
        }
    }

    pub fn sell(contract: OptionContract, quantity: i64) -> Self {
        Self {
            contract,
            quantity: -quantity.abs(),
        }
    }
}

/// Market, or limit on the net package cost.
///
/// For multi-leg intents the limit applies to the signed net cost per
/// contract set (debit positive, credit negative): the intent fills when the
/// quoted net cost is at or below `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit { limit: f64 },
}

/// Whether the intent opens a new position or unwinds an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntentKind {
    Open { strategy: String },
    Close { position: PositionId, reason: ExitReason },
}

/// An order intent: produced by the strategy evaluator or the position
/// manager, consumed exactly once by the fill simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub id: IntentId,
    pub kind: IntentKind,
    pub legs: Vec<LegSpec>,
    pub order: OrderKind,
    pub issued_at: NaiveDateTime,
}

impl OrderIntent {
    /// Total contracts across legs, unsigned.
    pub fn total_contracts(&self) -> i64 {
        self.legs.iter().map(|l| l.quantity.abs()).sum()
    }

    pub fn is_close(&self) -> bool {
        matches!(self.kind, IntentKind::Close { .. })
    }

    pub fn closes(&self) -> Option<PositionId> {
        match &self.kind {
            IntentKind::Close { position, .. } => Some(*position),
            IntentKind::Open { .. } => None,
        }
    }
}

/// Hands out sequential intent ids. One per run, shared by every intent
/// producer so ids stay unique and replay-stable.
#[derive(Debug, Default)]
pub struct IntentIds {
    next: u64,
}

impl IntentIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> IntentId {
        let id = IntentId(self.next);
        self.next += 1;
        id
    }
}
