//! Option quotes and chain snapshots.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::contract::OptionContract;

/// One side-quoted option price observation.
///
/// Immutable; keyed by `(contract, ts)`. `iv` is carried when the source
/// supplies it; otherwise the valuation bridge derives one from the mid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub contract: OptionContract,
    pub ts: NaiveDateTime,
    pub bid: f64,
    pub ask: f64,
    pub iv: Option<f64>,
}

impl OptionQuote {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    /// A quote is tradeable when both sides are positive and not crossed.
    pub fn is_tradeable(&self) -> bool {
        self.bid > 0.0 && self.ask > 0.0 && self.ask >= self.bid
    }
}

/// All quotes observed at one chain timestamp.
///
/// Quotes inside a snapshot share `ts`; the clock delivers snapshots after
/// any bar carrying the same timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub ts: NaiveDateTime,
    pub quotes: Vec<OptionQuote>,
}
