//! Per-tick implied-volatility surface bootstrapped from the quote book.
//!
//! Each side of the chain becomes a strike-sorted polyline of implied vols.
//! Quotes that carry a vendor IV use it as-is; the rest are inverted from
//! their mid. Lookups interpolate linearly between bracketing strikes and
//! extrapolate flat beyond the wings. A side with no usable points borrows
//! the other side's curve, which is the standard same-expiry fallback.

use chrono::NaiveDateTime;

use crate::calendar::year_fraction_to_settlement;
use crate::domain::Right;
use crate::market::MarketState;

use super::black_scholes::PricingModel;

#[derive(Debug, Clone, Default)]
pub struct IvSurface {
    calls: Vec<(f64, f64)>,
    puts: Vec<(f64, f64)>,
}

impl IvSurface {
    /// Build both sides from the current quote book. Quotes without a
    /// usable IV (untradeable, or inversion fails) are skipped.
    pub fn from_market(market: &MarketState, model: &PricingModel, now: NaiveDateTime) -> Self {
        let spot = match market.underlying() {
            Some(s) => s,
            None => return Self::default(),
        };
        let mut surface = Self::default();
        for right in [Right::Call, Right::Put] {
            let side = match right {
                Right::Call => &mut surface.calls,
                Right::Put => &mut surface.puts,
            };
            // BTreeMap iteration keeps strikes ascending within a side
            for q in market.quotes_for_right(right) {
                if !q.is_tradeable() {
                    continue;
                }
                let iv = match q.iv {
                    Some(v) if v.is_finite() && v > 0.0 => Some(v),
                    _ => {
                        let t = year_fraction_to_settlement(now, q.contract.expiry);
                        model.implied_vol(spot, q.contract.strike(), t, q.mid(), right)
                    }
                };
                if let Some(iv) = iv {
                    side.push((q.contract.strike(), iv));
                }
            }
        }
        surface
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.puts.is_empty()
    }

    /// Interpolated IV at `strike` for `right`, falling back to the other
    /// side when this one has no points.
    pub fn iv_at(&self, strike: f64, right: Right) -> Option<f64> {
        let (own, other) = match right {
            Right::Call => (&self.calls, &self.puts),
            Right::Put => (&self.puts, &self.calls),
        };
        interp(own, strike).or_else(|| interp(other, strike))
    }
}

/// Linear interpolation over a strike-ascending polyline; flat beyond ends.
fn interp(points: &[(f64, f64)], strike: f64) -> Option<f64> {
    let (first, last) = match (points.first(), points.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return None,
    };
    if strike <= first.0 {
        return Some(first.1);
    }
    if strike >= last.0 {
        return Some(last.1);
    }
    // idx points at the first strike >= target, idx-1 at the last below
    let idx = points.partition_point(|(k, _)| *k < strike);
    let (lo_k, lo_v) = points[idx - 1];
    let (hi_k, hi_v) = points[idx];
    if (hi_k - lo_k).abs() < f64::EPSILON {
        return Some(lo_v);
    }
    let w = (strike - lo_k) / (hi_k - lo_k);
    Some(lo_v + w * (hi_v - lo_v))
}
