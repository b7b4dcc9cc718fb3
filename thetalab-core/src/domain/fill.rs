//! Fills — executed legs of an order intent.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::contract::OptionContract;
use super::ids::IntentId;

/// One executed leg. Immutable once created; appended to the owning position
/// and to the ledger's fill tape.
///
/// `quantity` is signed (positive = bought, negative = sold). `slippage` is
/// the signed cash cost of the execution price relative to the opposite side
/// of the quoted spread (negative = price improvement); it is already
/// embedded in `price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub intent_id: IntentId,
    pub contract: OptionContract,
    pub price: f64,
    pub quantity: i64,
    pub commission: f64,
    pub slippage: f64,
    pub ts: NaiveDateTime,
}

impl Fill {
    /// Signed cash impact of this fill: premium paid or received, net of
    /// commission. Buys consume cash, sells raise it.
    pub fn cash_delta(&self, multiplier: f64) -> f64 {
        -self.price * self.quantity as f64 * multiplier - self.commission
    }
}
