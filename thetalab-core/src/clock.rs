//! Event tape — the merged, monotonic stream the engine replays.
//!
//! Bars and chain snapshots arrive as two per-day streams. The tape merges
//! them into one timestamp-ordered sequence with a fixed tie-break: when a
//! bar and a snapshot share a timestamp, the bar is replayed first, so the
//! underlying price a strategy sees is never newer than the option quotes.
//! Out-of-order input is rejected at build time rather than surfacing as a
//! silent look-ahead during the run.

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::{Bar, ChainSnapshot};
use crate::error::EngineError;

/// One replayable market event.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Bar(Bar),
    Chain(ChainSnapshot),
}

impl MarketEvent {
    pub fn ts(&self) -> NaiveDateTime {
        match self {
            MarketEvent::Bar(b) => b.ts,
            MarketEvent::Chain(c) => c.ts,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.ts().date()
    }
}

/// The full merged event stream for a run. Immutable once built.
#[derive(Debug, Clone)]
pub struct EventTape {
    events: Vec<MarketEvent>,
}

impl EventTape {
    /// Merge bar and snapshot streams into one tape.
    ///
    /// Each input stream must be strictly increasing in timestamp; a
    /// violation is fatal. Ties across streams replay the bar first.
    pub fn build(bars: Vec<Bar>, chains: Vec<ChainSnapshot>) -> Result<Self, EngineError> {
        verify_strictly_increasing(bars.iter().map(|b| b.ts), "bar stream")?;
        verify_strictly_increasing(chains.iter().map(|c| c.ts), "chain stream")?;

        let mut events = Vec::with_capacity(bars.len() + chains.len());
        let mut bars = bars.into_iter().peekable();
        let mut chains = chains.into_iter().peekable();
        loop {
            match (bars.peek(), chains.peek()) {
                (Some(b), Some(c)) => {
                    if b.ts <= c.ts {
                        events.push(MarketEvent::Bar(bars.next().unwrap()));
                    } else {
                        events.push(MarketEvent::Chain(chains.next().unwrap()));
                    }
                }
                (Some(_), None) => events.push(MarketEvent::Bar(bars.next().unwrap())),
                (None, Some(_)) => events.push(MarketEvent::Chain(chains.next().unwrap())),
                (None, None) => break,
            }
        }
        Ok(Self { events })
    }

    pub fn events(&self) -> &[MarketEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Distinct dates present on the tape, in replay order.
    pub fn days(&self) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = Vec::new();
        for e in &self.events {
            if days.last() != Some(&e.date()) {
                days.push(e.date());
            }
        }
        days
    }

    /// Check that every trading day in `[start, end]` has at least one event.
    /// The first uncovered day is reported as a data gap.
    pub fn verify_coverage(&self, start: NaiveDate, end: NaiveDate) -> Result<(), EngineError> {
        let present = self.days();
        for day in crate::calendar::trading_days(start, end) {
            if !present.contains(&day) {
                return Err(EngineError::DataGap { date: day });
            }
        }
        Ok(())
    }
}

fn verify_strictly_increasing(
    mut ts_iter: impl Iterator<Item = NaiveDateTime>,
    stream: &str,
) -> Result<(), EngineError> {
    let mut prev = match ts_iter.next() {
        Some(t) => t,
        None => return Ok(()),
    };
    for ts in ts_iter {
        if ts <= prev {
            return Err(EngineError::UnorderedEvents {
                at: ts,
                detail: format!("{stream} not strictly increasing (previous {prev})"),
            });
        }
        prev = ts;
    }
    Ok(())
}
