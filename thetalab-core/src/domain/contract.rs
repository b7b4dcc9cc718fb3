//! Option contract identity: expiry, strike, right.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Right {
    Call,
    Put,
}

impl Right {
    pub fn occ_code(self) -> char {
        match self {
            Right::Call => 'C',
            Right::Put => 'P',
        }
    }

    pub fn other(self) -> Right {
        match self {
            Right::Call => Right::Put,
            Right::Put => Right::Call,
        }
    }
}

/// A single option contract.
///
/// Strikes are stored in thousandths of a point (the OCC symbol unit) so the
/// key is exact and hashable; `strike()` converts back to points. Ordering is
/// (expiry, strike, right), which gives chain books a deterministic iteration
/// order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OptionContract {
    pub expiry: NaiveDate,
    pub strike_millis: i64,
    pub right: Right,
}

impl OptionContract {
    pub fn new(expiry: NaiveDate, strike: f64, right: Right) -> Self {
        Self {
            expiry,
            strike_millis: (strike * 1000.0).round() as i64,
            right,
        }
    }

    /// Strike in index points.
    pub fn strike(&self) -> f64 {
        self.strike_millis as f64 / 1000.0
    }

    /// Intrinsic value at a given underlying price.
    pub fn intrinsic(&self, underlying: f64) -> f64 {
        match self.right {
            Right::Call => (underlying - self.strike()).max(0.0),
            Right::Put => (self.strike() - underlying).max(0.0),
        }
    }

    /// OCC-style weekly symbol, e.g. `O:SPXW240315P04950000`.
    pub fn occ_symbol(&self, root: &str) -> String {
        format!(
            "O:{root}{}{}{:08}",
            self.expiry.format("%y%m%d"),
            self.right.occ_code(),
            self.strike_millis,
        )
    }
}

impl std::fmt::Display for OptionContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let right = match self.right {
            Right::Call => "C",
            Right::Put => "P",
        };
        write!(f, "{} {}{}", self.expiry, self.strike(), right)
    }
}

/// Round a price to the nearest strike on the listing grid.
pub fn grid_strike(price: f64, increment: f64) -> f64 {
    (price / increment).round() * increment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn occ_symbol_format() {
        let c = OptionContract::new(expiry(), 4950.0, Right::Put);
        assert_eq!(c.occ_symbol("SPXW"), "O:SPXW240315P04950000");

        let c = OptionContract::new(expiry(), 5002.5, Right::Call);
        assert_eq!(c.occ_symbol("SPXW"), "O:SPXW240315C05002500");
    }

    #[test]
    fn strike_roundtrips_through_millis() {
        let c = OptionContract::new(expiry(), 4817.5, Right::Call);
        assert_eq!(c.strike_millis, 4_817_500);
        assert!((c.strike() - 4817.5).abs() < 1e-12);
    }

    #[test]
    fn intrinsic_values() {
        let call = OptionContract::new(expiry(), 5000.0, Right::Call);
        let put = OptionContract::new(expiry(), 5000.0, Right::Put);
        assert_eq!(call.intrinsic(5025.0), 25.0);
        assert_eq!(call.intrinsic(4980.0), 0.0);
        assert_eq!(put.intrinsic(4980.0), 20.0);
        assert_eq!(put.intrinsic(5025.0), 0.0);
    }

    #[test]
    fn grid_rounding() {
        assert_eq!(grid_strike(5002.4, 5.0), 5000.0);
        assert_eq!(grid_strike(5002.6, 5.0), 5005.0);
        assert_eq!(grid_strike(4997.5, 5.0), 5000.0);
    }

    #[test]
    fn ordering_is_expiry_strike_right() {
        let a = OptionContract::new(expiry(), 4950.0, Right::Call);
        let b = OptionContract::new(expiry(), 4955.0, Right::Call);
        let c = OptionContract::new(expiry(), 4950.0, Right::Put);
        assert!(a < b);
        assert!(a < c); // Call sorts before Put at the same strike
    }
}
