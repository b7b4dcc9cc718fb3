//! Entry signals shared by the premium-selling strategies.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;

/// Quiet-market gate: fires when the tape has gone dull enough to sell or
/// position for a drift. Three conditions, all required:
///
/// 1. volume fade: each of the last three bars traded at or below a
///    fraction of the opening bar's volume
/// 2. mixed direction: the last four bars did not all close the same way
/// 3. range contraction: the last two bars' average range sits below a
///    fraction of the day's average range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuietMarketGate {
    pub volume_fraction: f64,
    pub range_fraction: f64,
}

impl Default for QuietMarketGate {
    fn default() -> Self {
        Self {
            volume_fraction: 0.5,
            range_fraction: 0.8,
        }
    }
}

impl QuietMarketGate {
    /// Evaluate against today's bars. Needs at least four bars of history.
    pub fn is_quiet(&self, bars_today: &[Bar]) -> bool {
        if bars_today.len() < 4 {
            return false;
        }
        let first_volume = bars_today[0].volume as f64;
        if first_volume <= 0.0 {
            return false;
        }

        let last3 = &bars_today[bars_today.len() - 3..];
        let volume_faded = last3
            .iter()
            .all(|b| b.volume as f64 <= first_volume * self.volume_fraction);

        let last4 = &bars_today[bars_today.len() - 4..];
        let all_up = last4.iter().all(Bar::is_up);
        let all_down = last4.iter().all(|b| !b.is_up());
        let mixed_direction = !(all_up || all_down);

        let day_avg_range =
            bars_today.iter().map(Bar::range).sum::<f64>() / bars_today.len() as f64;
        let last2 = &bars_today[bars_today.len() - 2..];
        let recent_range = last2.iter().map(Bar::range).sum::<f64>() / 2.0;
        let range_contracted = recent_range < day_avg_range * self.range_fraction;

        volume_faded && mixed_direction && range_contracted
    }
}
