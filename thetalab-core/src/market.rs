//! Rolling view of the market as of the last replayed event.
//!
//! Strategies and the risk layer only ever read this state, so nothing
//! downstream can observe data the tape has not yet delivered. The quote
//! book is keyed by contract and keeps the latest snapshot quote; it is
//! cleared on day roll because same-day expiries do not survive overnight.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::clock::MarketEvent;
use crate::domain::{Bar, ChainSnapshot, OptionContract, OptionQuote, Right};

#[derive(Debug, Clone, Default)]
pub struct MarketState {
    day: Option<NaiveDate>,
    last_ts: Option<NaiveDateTime>,
    bars_today: Vec<Bar>,
    book: BTreeMap<OptionContract, OptionQuote>,
}

impl MarketState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the state. Day rolls clear per-day context.
    pub fn apply(&mut self, event: &MarketEvent) {
        let date = event.date();
        if self.day != Some(date) {
            self.day = Some(date);
            self.bars_today.clear();
            self.book.clear();
        }
        self.last_ts = Some(event.ts());
        match event {
            MarketEvent::Bar(bar) => self.bars_today.push(bar.clone()),
            MarketEvent::Chain(chain) => self.absorb_chain(chain),
        }
    }

    fn absorb_chain(&mut self, chain: &ChainSnapshot) {
        for quote in &chain.quotes {
            self.book.insert(quote.contract.clone(), quote.clone());
        }
    }

    pub fn day(&self) -> Option<NaiveDate> {
        self.day
    }

    pub fn last_ts(&self) -> Option<NaiveDateTime> {
        self.last_ts
    }

    /// Latest underlying close, if any bar has been seen today.
    pub fn underlying(&self) -> Option<f64> {
        self.bars_today.last().map(|b| b.close)
    }

    pub fn last_bar(&self) -> Option<&Bar> {
        self.bars_today.last()
    }

    pub fn bars_today(&self) -> &[Bar] {
        &self.bars_today
    }

    /// Average high-low range over all of today's bars so far.
    pub fn avg_range_today(&self) -> Option<f64> {
        if self.bars_today.is_empty() {
            return None;
        }
        let total: f64 = self.bars_today.iter().map(Bar::range).sum();
        Some(total / self.bars_today.len() as f64)
    }

    pub fn quote(&self, contract: &OptionContract) -> Option<&OptionQuote> {
        self.book.get(contract)
    }

    /// All booked quotes for one side of the chain, in strike order.
    pub fn quotes_for_right(&self, right: Right) -> impl Iterator<Item = &OptionQuote> {
        self.book
            .values()
            .filter(move |q| q.contract.right == right)
    }

    /// Every quoted strike across both sides, in ascending order.
    pub fn quoted_strikes(&self) -> Vec<f64> {
        let mut strikes: Vec<i64> = self.book.keys().map(|c| c.strike_millis).collect();
        strikes.sort_unstable();
        strikes.dedup();
        strikes.into_iter().map(|m| m as f64 / 1_000.0).collect()
    }

    pub fn book_len(&self) -> usize {
        self.book.len()
    }
}
