//! Synthetic market data for tests, benches, and offline experiments.
//!
//! A seeded geometric random walk produces minute bars over one or more
//! trading sessions, plus chain snapshots on a fixed interval. Quotes are
//! priced from a single reference vol with a flat half-spread, so far
//! wings decay to a zero bid and become untradeable the way thin real
//! chains do. The same seed always yields the same tape; the engine
//! itself consumes no randomness.

use chrono::{Duration, NaiveDate};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use crate::calendar::{session_close, session_open, trading_days, year_fraction_to_settlement};
use crate::clock::EventTape;
use crate::domain::{grid_strike, Bar, ChainSnapshot, OptionContract, OptionQuote, Right};
use crate::error::EngineError;
use crate::valuation::PricingModel;

/// Trading seconds in a year, for annualizing per-bar vol.
const TRADING_SECONDS_PER_YEAR: f64 = 252.0 * 6.5 * 3600.0;

/// Knobs for the generator. All fields have serde defaults so a partial
/// TOML table works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub seed: u64,
    /// Spot at the first bar of the first day; the walk carries across days.
    pub start_spot: f64,
    /// Annualized vol of the walk, also quoted back as each option's IV.
    pub vol: f64,
    pub bar_interval_secs: i64,
    pub quote_interval_secs: i64,
    /// Strikes quoted this many grid steps either side of spot.
    pub strike_span: u32,
    pub strike_step: f64,
    /// Half the bid/ask spread, in option price terms.
    pub half_spread: f64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            start_spot: 5000.0,
            vol: 0.18,
            bar_interval_secs: 60,
            quote_interval_secs: 300,
            strike_span: 12,
            strike_step: 5.0,
            half_spread: 0.05,
        }
    }
}

impl SynthConfig {
    fn validate(&self) -> Result<(), EngineError> {
        let mut problems = Vec::new();
        if !(self.start_spot.is_finite() && self.start_spot > 0.0) {
            problems.push("start_spot must be positive");
        }
        if !(self.vol.is_finite() && self.vol > 0.0) {
            problems.push("vol must be positive");
        }
        if self.bar_interval_secs <= 0 {
            problems.push("bar_interval_secs must be positive");
        }
        if self.quote_interval_secs < self.bar_interval_secs {
            problems.push("quote_interval_secs must be at least one bar");
        }
        if !(self.strike_step.is_finite() && self.strike_step > 0.0) {
            problems.push("strike_step must be positive");
        }
        if !(self.half_spread.is_finite() && self.half_spread >= 0.0) {
            problems.push("half_spread must be non-negative");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(EngineError::InvalidConfiguration(problems.join("; ")))
        }
    }
}

/// Generated bars and chains, kept separate so callers can export them
/// as two streams or merge them into a tape.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthData {
    pub bars: Vec<Bar>,
    pub chains: Vec<ChainSnapshot>,
}

impl SynthData {
    pub fn into_tape(self) -> Result<EventTape, EngineError> {
        EventTape::build(self.bars, self.chains)
    }
}

/// Generate bars and chain snapshots for every trading day in the range.
///
/// Quotes are priced with the default pricing model at the walk's own
/// vol, centered on the bar close the snapshot shares a timestamp with.
pub fn generate(
    config: &SynthConfig,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<SynthData, EngineError> {
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let gauss = Normal::new(0.0, 1.0).unwrap();
    let model = PricingModel::default();

    let dt = config.bar_interval_secs as f64 / TRADING_SECONDS_PER_YEAR;
    let sigma_bar = config.vol * dt.sqrt();

    let mut bars = Vec::new();
    let mut chains = Vec::new();
    let mut spot = config.start_spot;

    for day in trading_days(start, end) {
        let open_ts = day.and_time(session_open());
        let close_ts = day.and_time(session_close());
        let mut ts = open_ts;
        while ts < close_ts {
            let open = spot;
            let z: f64 = gauss.sample(&mut rng);
            let ret = sigma_bar * z - 0.5 * sigma_bar * sigma_bar;
            let close = open * ret.exp();
            let wick_up: f64 = rng.gen_range(0.0..=sigma_bar / 2.0);
            let wick_down: f64 = rng.gen_range(0.0..=sigma_bar / 2.0);
            let high = open.max(close) * (1.0 + wick_up);
            let low = open.min(close) * (1.0 - wick_down);
            bars.push(Bar {
                ts,
                open,
                high,
                low,
                close,
                volume: rng.gen_range(50_000..250_000),
            });
            spot = close;

            let elapsed = (ts - open_ts).num_seconds();
            if elapsed % config.quote_interval_secs == 0 {
                chains.push(snapshot(config, &model, ts, day, spot));
            }

            ts += Duration::seconds(config.bar_interval_secs);
        }
    }

    Ok(SynthData { bars, chains })
}

/// One chain snapshot: both rights on a strike ladder centered at spot.
fn snapshot(
    config: &SynthConfig,
    model: &PricingModel,
    ts: chrono::NaiveDateTime,
    expiry: NaiveDate,
    spot: f64,
) -> ChainSnapshot {
    let t = year_fraction_to_settlement(ts, expiry);
    let center = grid_strike(spot, config.strike_step);
    let span = config.strike_span as f64 * config.strike_step;
    let mut quotes = Vec::with_capacity((config.strike_span as usize * 2 + 1) * 2);

    let mut strike = center - span;
    while strike <= center + span + 1e-9 {
        for right in [Right::Call, Right::Put] {
            let theo = model.price(spot, strike, t, config.vol, right);
            quotes.push(OptionQuote {
                contract: OptionContract::new(expiry, strike, right),
                ts,
                bid: (theo - config.half_spread).max(0.0),
                ask: theo + config.half_spread,
                iv: Some(config.vol),
            });
        }
        strike += config.strike_step;
    }
    ChainSnapshot { ts, quotes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar;

    fn one_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn same_seed_reproduces_the_tape() {
        let config = SynthConfig::default();
        let a = generate(&config, one_day(), one_day()).unwrap();
        let b = generate(&config, one_day(), one_day()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_diverge() {
        let base = SynthConfig::default();
        let other = SynthConfig {
            seed: base.seed + 1,
            ..base.clone()
        };
        let a = generate(&base, one_day(), one_day()).unwrap();
        let b = generate(&other, one_day(), one_day()).unwrap();
        assert_ne!(a.bars, b.bars);
    }

    #[test]
    fn one_session_of_minute_bars() {
        let data = generate(&SynthConfig::default(), one_day(), one_day()).unwrap();
        // 9:30 through 15:59 inclusive.
        assert_eq!(data.bars.len(), 390);
        assert!(data.bars.iter().all(|b| b.is_sane()));
        assert!(data
            .bars
            .iter()
            .all(|b| calendar::in_session(b.ts)));
        // Five-minute quote interval over the same session.
        assert_eq!(data.chains.len(), 78);
    }

    #[test]
    fn chains_cover_the_grid_around_spot() {
        let config = SynthConfig::default();
        let data = generate(&config, one_day(), one_day()).unwrap();
        let first = &data.chains[0];
        assert_eq!(first.quotes.len(), (12 * 2 + 1) * 2);

        let spot_bar = data.bars.iter().find(|b| b.ts == first.ts).unwrap();
        let center = grid_strike(spot_bar.close, config.strike_step);
        let atm_call = first
            .quotes
            .iter()
            .find(|q| q.contract.right == Right::Call && q.contract.strike() == center)
            .unwrap();
        assert!(atm_call.is_tradeable());
        assert!((atm_call.spread() - 2.0 * config.half_spread).abs() < 1e-9);
        assert_eq!(atm_call.iv, Some(config.vol));
    }

    #[test]
    fn far_wings_lose_their_bid_near_expiry() {
        let data = generate(&SynthConfig::default(), one_day(), one_day()).unwrap();
        let last = data.chains.last().unwrap();
        let far_call = last
            .quotes
            .iter()
            .filter(|q| q.contract.right == Right::Call)
            .max_by(|a, b| a.contract.strike().total_cmp(&b.contract.strike()))
            .unwrap();
        // 60 points OTM with minutes to settlement: worthless, one-sided.
        assert_eq!(far_call.bid, 0.0);
        assert!(!far_call.is_tradeable());
    }

    #[test]
    fn weekend_days_are_skipped() {
        // Friday through Monday.
        let start = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 18).unwrap();
        let data = generate(&SynthConfig::default(), start, end).unwrap();
        let days: std::collections::BTreeSet<_> =
            data.bars.iter().map(|b| b.date()).collect();
        assert_eq!(days.len(), 2);
        assert!(!days.contains(&NaiveDate::from_ymd_opt(2024, 3, 16).unwrap()));
    }

    #[test]
    fn tape_builds_and_replays_in_order() {
        let data = generate(&SynthConfig::default(), one_day(), one_day()).unwrap();
        let tape = data.into_tape().unwrap();
        assert!(!tape.is_empty());
        let mut last = None;
        for event in tape.events() {
            if let Some(prev) = last {
                assert!(event.ts() >= prev);
            }
            last = Some(event.ts());
        }
    }

    #[test]
    fn bad_knobs_are_rejected() {
        let config = SynthConfig {
            vol: 0.0,
            ..SynthConfig::default()
        };
        assert!(matches!(
            generate(&config, one_day(), one_day()),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }
}
