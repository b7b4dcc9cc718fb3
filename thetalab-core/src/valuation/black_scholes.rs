//! Black-Scholes pricing with continuous dividend yield.
//!
//! Time is a year fraction to same-day settlement, so `t` is tiny (a few
//! hours) and expires to zero intraday; every entry point degrades to
//! intrinsic value at `t == 0` instead of dividing by zero.

use std::f64::consts::PI;

use statrs::distribution::{ContinuousCDF, Normal};

use crate::domain::Right;

const MIN_VOL: f64 = 1e-9;

/// Pricing parameters shared by every valuation in a run.
#[derive(Debug, Clone, Copy)]
pub struct PricingModel {
    pub rate: f64,
    pub dividend: f64,
}

impl Default for PricingModel {
    fn default() -> Self {
        Self {
            rate: 0.05,
            dividend: 0.01,
        }
    }
}

impl PricingModel {
    pub fn new(rate: f64, dividend: f64) -> Self {
        Self { rate, dividend }
    }

    fn d1(&self, spot: f64, strike: f64, t: f64, vol: f64) -> f64 {
        ((spot / strike).ln() + (self.rate - self.dividend + 0.5 * vol * vol) * t)
            / (vol * t.sqrt())
    }

    fn norm_cdf(x: f64) -> f64 {
        let normal = Normal::new(0.0, 1.0).unwrap();
        normal.cdf(x)
    }

    fn norm_pdf(x: f64) -> f64 {
        (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
    }

    /// Theoretical value of one contract (per-share price, not multiplied).
    pub fn price(&self, spot: f64, strike: f64, t: f64, vol: f64, right: Right) -> f64 {
        if t <= 0.0 {
            return intrinsic(spot, strike, right);
        }
        if vol <= MIN_VOL {
            // zero-vol limit: discounted forward intrinsic
            let fwd = spot * ((self.rate - self.dividend) * t).exp();
            return intrinsic(fwd, strike, right) * (-self.rate * t).exp();
        }
        let d1 = self.d1(spot, strike, t, vol);
        let d2 = d1 - vol * t.sqrt();
        let df_div = (-self.dividend * t).exp();
        let df_rate = (-self.rate * t).exp();
        match right {
            Right::Call => spot * df_div * Self::norm_cdf(d1) - strike * df_rate * Self::norm_cdf(d2),
            Right::Put => strike * df_rate * Self::norm_cdf(-d2) - spot * df_div * Self::norm_cdf(-d1),
        }
    }

    pub fn delta(&self, spot: f64, strike: f64, t: f64, vol: f64, right: Right) -> f64 {
        if t <= 0.0 || vol <= MIN_VOL {
            return match right {
                Right::Call => {
                    if spot > strike {
                        1.0
                    } else {
                        0.0
                    }
                }
                Right::Put => {
                    if spot < strike {
                        -1.0
                    } else {
                        0.0
                    }
                }
            };
        }
        let d1 = self.d1(spot, strike, t, vol);
        let df_div = (-self.dividend * t).exp();
        match right {
            Right::Call => df_div * Self::norm_cdf(d1),
            Right::Put => df_div * (Self::norm_cdf(d1) - 1.0),
        }
    }

    /// Gamma, identical for both rights.
    pub fn gamma(&self, spot: f64, strike: f64, t: f64, vol: f64) -> f64 {
        if t <= 0.0 || vol <= MIN_VOL {
            return 0.0;
        }
        let d1 = self.d1(spot, strike, t, vol);
        (-self.dividend * t).exp() * Self::norm_pdf(d1) / (spot * vol * t.sqrt())
    }

    /// Vega per one percentage point of volatility.
    pub fn vega(&self, spot: f64, strike: f64, t: f64, vol: f64) -> f64 {
        if t <= 0.0 || vol <= MIN_VOL {
            return 0.0;
        }
        self.vega_raw(spot, strike, t, vol) / 100.0
    }

    /// Theta per calendar day. Steep for 0DTE: an ATM contract sheds its
    /// whole premium within the session.
    pub fn theta(&self, spot: f64, strike: f64, t: f64, vol: f64, right: Right) -> f64 {
        if t <= 0.0 || vol <= MIN_VOL {
            return 0.0;
        }
        let d1 = self.d1(spot, strike, t, vol);
        let d2 = d1 - vol * t.sqrt();
        let df_div = (-self.dividend * t).exp();
        let df_rate = (-self.rate * t).exp();
        let decay = -spot * df_div * Self::norm_pdf(d1) * vol / (2.0 * t.sqrt());
        let carry = match right {
            Right::Call => {
                self.dividend * spot * df_div * Self::norm_cdf(d1)
                    - self.rate * strike * df_rate * Self::norm_cdf(d2)
            }
            Right::Put => {
                self.rate * strike * df_rate * Self::norm_cdf(-d2)
                    - self.dividend * spot * df_div * Self::norm_cdf(-d1)
            }
        };
        (decay + carry) / 365.0
    }

    /// Raw (unscaled) vega, the Newton step denominator for implied vol.
    fn vega_raw(&self, spot: f64, strike: f64, t: f64, vol: f64) -> f64 {
        spot * (-self.dividend * t).exp() * Self::norm_pdf(self.d1(spot, strike, t, vol)) * t.sqrt()
    }

    /// Newton-Raphson implied volatility, seeded with the
    /// Brenner-Subrahmanyam approximation. `None` when the iteration
    /// stalls (deep ITM/OTM with vanishing vega) or the inputs are junk.
    pub fn implied_vol(
        &self,
        spot: f64,
        strike: f64,
        t: f64,
        price: f64,
        right: Right,
    ) -> Option<f64> {
        if t <= 0.0 || price <= 0.0 || spot <= 0.0 || strike <= 0.0 {
            return None;
        }
        let mut vol = ((price / spot) * (2.0 * PI / t).sqrt()).clamp(0.01, 5.0);
        for _ in 0..100 {
            let diff = self.price(spot, strike, t, vol, right) - price;
            if diff.abs() < 1e-6 {
                return Some(vol);
            }
            let vega = self.vega_raw(spot, strike, t, vol);
            if vega.abs() < 1e-10 {
                break;
            }
            vol = (vol - diff / vega).clamp(0.001, 10.0);
        }
        None
    }
}

/// Exercise value of one contract at `spot`.
pub fn intrinsic(spot: f64, strike: f64, right: Right) -> f64 {
    match right {
        Right::Call => (spot - strike).max(0.0),
        Right::Put => (strike - spot).max(0.0),
    }
}
