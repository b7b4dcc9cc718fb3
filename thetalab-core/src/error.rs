//! Engine error types.
//!
//! Fatal conditions abort the run and carry enough context (timestamp,
//! contract) to reproduce the failure. Recoverable fill outcomes are values
//! (`RejectReason`), not errors: the offending intent is dropped and the run
//! continues.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{IntentId, OptionContract};

/// Fatal engine errors. Any of these aborts the run before or during replay;
/// none of them may be swallowed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A trading day inside the configured range produced no market events.
    #[error("no market events for trading day {date}")]
    DataGap { date: NaiveDate },

    /// The valuation bridge has no quotes to build a surface from.
    #[error("no volatility surface for {contract} at {at}")]
    SurfaceUnavailable {
        contract: OptionContract,
        at: NaiveDateTime,
    },

    /// Configuration rejected before the first tick.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Event streams handed to the clock were not time-ordered.
    #[error("event stream out of order at {at}: {detail}")]
    UnorderedEvents { at: NaiveDateTime, detail: String },
}

/// Why a fill attempt was refused. Recoverable: the intent is dropped and
/// recorded, the tick loop continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// A leg had no quote, or a zero bid/ask on the side we needed.
    NoLiquidity { contract: OptionContract },
    /// A limit intent sat unfilled past its configured expiry.
    IntentExpired,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NoLiquidity { contract } => write!(f, "no liquidity for {contract}"),
            RejectReason::IntentExpired => write!(f, "intent expired"),
        }
    }
}

/// A dropped order intent, kept for the run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub intent_id: IntentId,
    pub reason: RejectReason,
    pub at: NaiveDateTime,
}
