//! Option valuation bridge.
//!
//! Every mark the engine produces is stamped with its provenance: `Observed`
//! when a fresh tradeable quote backs it, `Modeled` when it came out of the
//! Black-Scholes fallback driven by the interpolated IV surface. The split
//! keeps synthetic prices auditable in the ledger.

pub mod black_scholes;
pub mod surface;

pub use black_scholes::{intrinsic, PricingModel};
pub use surface::IvSurface;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::calendar::year_fraction_to_settlement;
use crate::domain::{OptionContract, Right};
use crate::error::EngineError;
use crate::market::MarketState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    Observed,
    Modeled,
}

/// One mark: a per-share price and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub mark: f64,
    pub provenance: Provenance,
}

/// Model Greeks at the interpolated surface vol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    /// Per calendar day.
    pub theta: f64,
    /// Per percentage point of volatility.
    pub vega: f64,
}

/// Day's expected move priced off the ATM straddle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpliedMove {
    /// Absolute move in underlying points.
    pub dollars: f64,
    /// The same move as a fraction of spot.
    pub fraction: f64,
}

/// Run-wide valuation parameters.
#[derive(Debug, Clone)]
pub struct Valuator {
    model: PricingModel,
    max_quote_age: Duration,
}

impl Valuator {
    pub fn new(model: PricingModel, max_quote_age_secs: i64) -> Self {
        Self {
            model,
            max_quote_age: Duration::seconds(max_quote_age_secs),
        }
    }

    pub fn model(&self) -> &PricingModel {
        &self.model
    }

    /// Freeze a per-tick view: the surface is built once and reused for
    /// every contract valued at this timestamp.
    pub fn at<'a>(&'a self, market: &'a MarketState, now: NaiveDateTime) -> TickValuation<'a> {
        TickValuation {
            valuator: self,
            market,
            now,
            surface: IvSurface::from_market(market, &self.model, now),
        }
    }
}

/// Valuation context for a single tick.
pub struct TickValuation<'a> {
    valuator: &'a Valuator,
    market: &'a MarketState,
    now: NaiveDateTime,
    surface: IvSurface,
}

impl TickValuation<'_> {
    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    fn quote_is_fresh(&self, ts: NaiveDateTime) -> bool {
        self.now - ts <= self.valuator.max_quote_age
    }

    /// Mark one contract. Prefers the live book; falls back to the model.
    pub fn value(&self, contract: &OptionContract) -> Result<Valuation, EngineError> {
        if let Some(q) = self.market.quote(contract) {
            if q.is_tradeable() && self.quote_is_fresh(q.ts) {
                return Ok(Valuation {
                    mark: q.mid(),
                    provenance: Provenance::Observed,
                });
            }
        }
        self.model_value(contract)
    }

    fn model_value(&self, contract: &OptionContract) -> Result<Valuation, EngineError> {
        let spot = self.market.underlying().ok_or_else(|| self.unavailable(contract))?;
        let t = year_fraction_to_settlement(self.now, contract.expiry);
        if t <= 0.0 {
            return Ok(Valuation {
                mark: intrinsic(spot, contract.strike(), contract.right),
                provenance: Provenance::Modeled,
            });
        }
        let iv = self
            .surface
            .iv_at(contract.strike(), contract.right)
            .ok_or_else(|| self.unavailable(contract))?;
        let mark = self
            .valuator
            .model
            .price(spot, contract.strike(), t, iv, contract.right)
            .max(0.0);
        Ok(Valuation {
            mark,
            provenance: Provenance::Modeled,
        })
    }

    /// Model delta at the surface IV. `None` when neither side of the
    /// chain yields a vol or no bar has printed yet.
    pub fn delta(&self, contract: &OptionContract) -> Option<f64> {
        let spot = self.market.underlying()?;
        let t = year_fraction_to_settlement(self.now, contract.expiry);
        let iv = self.surface.iv_at(contract.strike(), contract.right)?;
        Some(
            self.valuator
                .model
                .delta(spot, contract.strike(), t, iv, contract.right),
        )
    }

    /// Full Greek set at the surface IV, same availability rules as
    /// [`TickValuation::delta`].
    pub fn greeks(&self, contract: &OptionContract) -> Option<Greeks> {
        let spot = self.market.underlying()?;
        let t = year_fraction_to_settlement(self.now, contract.expiry);
        let iv = self.surface.iv_at(contract.strike(), contract.right)?;
        let model = &self.valuator.model;
        let strike = contract.strike();
        Some(Greeks {
            delta: model.delta(spot, strike, t, iv, contract.right),
            gamma: model.gamma(spot, strike, t, iv),
            theta: model.theta(spot, strike, t, iv, contract.right),
            vega: model.vega(spot, strike, t, iv),
        })
    }

    /// ATM straddle mid, interpolated between the strikes bracketing spot,
    /// reported both in underlying points and as a fraction of spot.
    pub fn implied_move(&self) -> Option<ImpliedMove> {
        let spot = self.market.underlying()?;
        // strikes quoted tradeable on both sides
        let mut straddles: Vec<(f64, f64)> = Vec::new();
        for cq in self.market.quotes_for_right(Right::Call) {
            if !cq.is_tradeable() {
                continue;
            }
            let put = OptionContract {
                right: Right::Put,
                ..cq.contract.clone()
            };
            if let Some(pq) = self.market.quote(&put) {
                if pq.is_tradeable() {
                    straddles.push((cq.contract.strike(), cq.mid() + pq.mid()));
                }
            }
        }
        if straddles.is_empty() {
            return None;
        }
        let below = straddles
            .iter()
            .filter(|(k, _)| *k <= spot)
            .last()
            .copied();
        let above = straddles.iter().find(|(k, _)| *k >= spot).copied();
        let dollars = match (below, above) {
            (Some((lo_k, lo_v)), Some((hi_k, hi_v))) => {
                if (hi_k - lo_k).abs() < f64::EPSILON {
                    lo_v
                } else {
                    let w = (spot - lo_k) / (hi_k - lo_k);
                    lo_v + w * (hi_v - lo_v)
                }
            }
            (Some((_, v)), None) | (None, Some((_, v))) => v,
            (None, None) => return None,
        };
        Some(ImpliedMove {
            dollars,
            fraction: dollars / spot,
        })
    }

    fn unavailable(&self, contract: &OptionContract) -> EngineError {
        EngineError::SurfaceUnavailable {
            contract: contract.clone(),
            at: self.now,
        }
    }
}
