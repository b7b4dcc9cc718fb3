//! Fill simulation — turns intents into fills against the quote book.
//!
//! Market packages execute atomically at the touch adjusted by the slippage
//! schedule; if any leg lacks a tradeable quote the whole package is
//! rejected with `NoLiquidity`. Limit packages wait in a queue and fill at
//! the touch (no slippage) once the quoted net cost reaches the limit, or
//! expire after the configured time-to-live.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::{Fill, OptionQuote, OrderIntent, OrderKind};
use crate::error::{RejectReason, Rejection};
use crate::market::MarketState;

// ─── Slippage ────────────────────────────────────────────────────────────

/// How far into the spread a market fill lands. Fractions are of the
/// quoted spread, measured from the passive side: 1.0 pays the touch,
/// 0.5 the mid. Wider structures fill closer to the mid because each leg
/// is worked, which is what the per-leg-count defaults encode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlippageConfig {
    None,
    FixedOffset {
        offset: f64,
    },
    SpreadPct {
        fill_pct_1: f64,
        fill_pct_2: f64,
        fill_pct_3: f64,
        fill_pct_4: f64,
    },
}

impl Default for SlippageConfig {
    fn default() -> Self {
        Self::SpreadPct {
            fill_pct_1: 0.75,
            fill_pct_2: 0.66,
            fill_pct_3: 0.56,
            fill_pct_4: 0.53,
        }
    }
}

impl SlippageConfig {
    fn spread_fraction(&self, legs: usize) -> Option<f64> {
        match self {
            Self::SpreadPct {
                fill_pct_1,
                fill_pct_2,
                fill_pct_3,
                fill_pct_4,
            } => Some(match legs {
                0 | 1 => *fill_pct_1,
                2 => *fill_pct_2,
                3 => *fill_pct_3,
                _ => *fill_pct_4,
            }),
            _ => None,
        }
    }

    /// Execution price for a market fill of `quantity` (signed) against a
    /// quote, for a package of `legs` legs total.
    pub fn execution_price(&self, quote: &OptionQuote, quantity: i64, legs: usize) -> f64 {
        let buying = quantity > 0;
        match self {
            Self::None => {
                if buying {
                    quote.ask
                } else {
                    quote.bid
                }
            }
            Self::FixedOffset { offset } => {
                if buying {
                    quote.ask + offset
                } else {
                    (quote.bid - offset).max(0.0)
                }
            }
            Self::SpreadPct { .. } => {
                let frac = self.spread_fraction(legs).unwrap_or(1.0);
                let spread = quote.spread();
                if buying {
                    quote.bid + frac * spread
                } else {
                    quote.ask - frac * spread
                }
            }
        }
    }
}

// ─── Commission ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionConfig {
    None,
    PerContract {
        rate: f64,
        #[serde(default)]
        min_per_order: f64,
        #[serde(default)]
        max_per_order: Option<f64>,
    },
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self::PerContract {
            rate: 0.65,
            min_per_order: 0.0,
            max_per_order: None,
        }
    }
}

impl CommissionConfig {
    /// Commission for one order touching `contracts` contracts in total.
    pub fn order_commission(&self, contracts: i64) -> f64 {
        match self {
            Self::None => 0.0,
            Self::PerContract {
                rate,
                min_per_order,
                max_per_order,
            } => {
                let raw = rate * contracts.unsigned_abs() as f64;
                let floored = raw.max(*min_per_order);
                match max_per_order {
                    Some(cap) => floored.min(*cap),
                    None => floored,
                }
            }
        }
    }
}

// ─── Simulator ───────────────────────────────────────────────────────────

/// Outcome of submitting one intent.
#[derive(Debug)]
pub enum Execution {
    Filled(Vec<Fill>),
    /// Limit intent parked in the queue.
    Queued,
    Rejected(Rejection),
}

/// A filled intent, reunited with the intent so the caller can route it.
#[derive(Debug)]
pub struct FillReport {
    pub intent: OrderIntent,
    pub fills: Vec<Fill>,
}

/// What a queue poll produced.
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub filled: Vec<FillReport>,
    pub expired: Vec<(OrderIntent, Rejection)>,
}

pub struct FillSimulator {
    slippage: SlippageConfig,
    commission: CommissionConfig,
    multiplier: f64,
    intent_ttl: Duration,
    pending: Vec<OrderIntent>,
}

impl FillSimulator {
    pub fn new(
        slippage: SlippageConfig,
        commission: CommissionConfig,
        multiplier: f64,
        intent_ttl_secs: i64,
    ) -> Self {
        Self {
            slippage,
            commission,
            multiplier,
            intent_ttl: Duration::seconds(intent_ttl_secs),
            pending: Vec::new(),
        }
    }

    pub fn commission_config(&self) -> &CommissionConfig {
        &self.commission
    }

    /// Queued limit intents, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &OrderIntent> {
        self.pending.iter()
    }

    /// Submit one intent against the current book.
    pub fn submit(
        &mut self,
        intent: OrderIntent,
        market: &MarketState,
        now: NaiveDateTime,
    ) -> Execution {
        match intent.order {
            OrderKind::Market => match self.fill_market(&intent, market, now) {
                Ok(fills) => Execution::Filled(fills),
                Err(reason) => Execution::Rejected(Rejection {
                    intent_id: intent.id,
                    reason,
                    at: now,
                }),
            },
            OrderKind::Limit { limit } => {
                if self.limit_is_executable(&intent, market, limit) {
                    let fills = self.fill_limit(&intent, market, now);
                    Execution::Filled(fills)
                } else {
                    self.pending.push(intent);
                    Execution::Queued
                }
            }
        }
    }

    /// Re-check every queued intent against the book. Fillable intents
    /// fill at the touch; the rest expire once past their time-to-live.
    pub fn poll(&mut self, market: &MarketState, now: NaiveDateTime) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        let mut keep = Vec::with_capacity(self.pending.len());
        for intent in std::mem::take(&mut self.pending) {
            let limit = match intent.order {
                OrderKind::Limit { limit } => limit,
                OrderKind::Market => unreachable!("only limit intents are queued"),
            };
            if self.limit_is_executable(&intent, market, limit) {
                let fills = self.fill_limit(&intent, market, now);
                outcome.filled.push(FillReport { intent, fills });
            } else if now - intent.issued_at >= self.intent_ttl {
                let rejection = Rejection {
                    intent_id: intent.id,
                    reason: RejectReason::IntentExpired,
                    at: now,
                };
                outcome.expired.push((intent, rejection));
            } else {
                keep.push(intent);
            }
        }
        self.pending = keep;
        outcome
    }

    /// Expire everything still queued, regardless of age. Used at the end
    /// of a trading day when same-day intents can no longer fill.
    pub fn drain_pending(&mut self, now: NaiveDateTime) -> Vec<(OrderIntent, Rejection)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|intent| {
                let rejection = Rejection {
                    intent_id: intent.id,
                    reason: RejectReason::IntentExpired,
                    at: now,
                };
                (intent, rejection)
            })
            .collect()
    }

    fn fill_market(
        &self,
        intent: &OrderIntent,
        market: &MarketState,
        now: NaiveDateTime,
    ) -> Result<Vec<Fill>, RejectReason> {
        let legs = intent.legs.len();
        // all-or-nothing: verify every leg before pricing any
        let mut quotes = Vec::with_capacity(legs);
        for leg in &intent.legs {
            let quote = market
                .quote(&leg.contract)
                .filter(|q| q.is_tradeable())
                .ok_or_else(|| RejectReason::NoLiquidity {
                    contract: leg.contract.clone(),
                })?;
            quotes.push(quote);
        }
        let commissions = self.split_commission(intent);
        let fills = intent
            .legs
            .iter()
            .zip(quotes)
            .zip(commissions)
            .map(|((leg, quote), commission)| {
                let price = self.slippage.execution_price(quote, leg.quantity, legs);
                let touch = if leg.quantity > 0 { quote.ask } else { quote.bid };
                Fill {
                    intent_id: intent.id,
                    contract: leg.contract.clone(),
                    price,
                    quantity: leg.quantity,
                    commission,
                    slippage: (price - touch) * leg.quantity as f64 * self.multiplier,
                    ts: now,
                }
            })
            .collect();
        Ok(fills)
    }

    /// Net package cost at the touch: buys at ask, sells at bid, per unit
    /// scaled by leg quantity. Debits are positive.
    fn package_cost(&self, intent: &OrderIntent, market: &MarketState) -> Option<f64> {
        let mut cost = 0.0;
        for leg in &intent.legs {
            let quote = market.quote(&leg.contract).filter(|q| q.is_tradeable())?;
            let px = if leg.quantity > 0 { quote.ask } else { quote.bid };
            cost += px * leg.quantity as f64;
        }
        Some(cost)
    }

    fn limit_is_executable(&self, intent: &OrderIntent, market: &MarketState, limit: f64) -> bool {
        match self.package_cost(intent, market) {
            Some(cost) => cost <= limit + 1e-9,
            None => false,
        }
    }

    /// Limit fills take the touch with no slippage; the limit already
    /// bounded the package cost.
    fn fill_limit(
        &self,
        intent: &OrderIntent,
        market: &MarketState,
        now: NaiveDateTime,
    ) -> Vec<Fill> {
        let commissions = self.split_commission(intent);
        intent
            .legs
            .iter()
            .zip(commissions)
            .map(|(leg, commission)| {
                // quotes were verified by limit_is_executable
                let quote = market.quote(&leg.contract).unwrap();
                let price = if leg.quantity > 0 { quote.ask } else { quote.bid };
                Fill {
                    intent_id: intent.id,
                    contract: leg.contract.clone(),
                    price,
                    quantity: leg.quantity,
                    commission,
                    slippage: 0.0,
                    ts: now,
                }
            })
            .collect()
    }

    /// Order-level commission split across legs in proportion to size.
    fn split_commission(&self, intent: &OrderIntent) -> Vec<f64> {
        let total_contracts = intent.total_contracts();
        let order_commission = self.commission.order_commission(total_contracts);
        if total_contracts == 0 {
            return vec![0.0; intent.legs.len()];
        }
        intent
            .legs
            .iter()
            .map(|leg| {
                order_commission * leg.quantity.unsigned_abs() as f64 / total_contracts as f64
            })
            .collect()
    }
}
