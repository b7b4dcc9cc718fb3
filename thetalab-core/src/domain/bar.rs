//! Bar — one interval of underlying price history.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Intraday OHLCV bar for the underlying index.
///
/// `ts` is the bar's open timestamp in exchange-local time. Bars are
/// immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn date(&self) -> NaiveDate {
        self.ts.date()
    }

    /// True when the bar moved up over its interval.
    pub fn is_up(&self) -> bool {
        self.close > self.open
    }

    /// High-to-low span of the interval.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Basic OHLC sanity: high bounds everything, low bounds everything,
    /// prices positive, no NaNs.
    pub fn is_sane(&self) -> bool {
        let finite = self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite();
        finite
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}
