//! Run configuration.
//!
//! One `RunConfig` fully determines a run: same config plus same event tape
//! means the same ledger digest. Unknown keys are ignored so configs stay
//! forward-compatible; everything required is checked by `validate()`
//! before the first event is processed.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::calendar::{session_close, session_open};
use crate::domain::RunId;
use crate::error::EngineError;
use crate::fills::{CommissionConfig, SlippageConfig};
use crate::positions::RiskConfig;
use crate::strategy::{
    IronCondor, IronCondorParams, LongStraddle, ShortStrangle, StraddleParams, StrangleParams,
    Strategy,
};

/// Strategy family selector. The tag picks the family, the flattened
/// fields are that family's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyConfig {
    IronCondor(IronCondorParams),
    ShortStrangle(StrangleParams),
    LongStraddle(StraddleParams),
}

impl StrategyConfig {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::IronCondor(_) => "IRON_CONDOR",
            Self::ShortStrangle(_) => "SHORT_STRANGLE",
            Self::LongStraddle(_) => "LONG_STRADDLE",
        }
    }

    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            Self::IronCondor(p) => Box::new(IronCondor::new(p.clone())),
            Self::ShortStrangle(p) => Box::new(ShortStrangle::new(p.clone())),
            Self::LongStraddle(p) => Box::new(LongStraddle::new(p.clone())),
        }
    }

    /// The same bounds the strategy constructors assert, phrased as a
    /// recoverable error so bad config files fail fast instead of panicking.
    fn validate(&self) -> Result<(), String> {
        match self {
            Self::IronCondor(p) => {
                ensure(p.contracts >= 1, "iron condor: contracts must be >= 1")?;
                ensure(p.strike_step > 0.0, "iron condor: strike_step must be positive")?;
                ensure(
                    p.wing_min > 0.0 && p.wing_min <= p.wing_max,
                    "iron condor: wing bounds must satisfy 0 < min <= max",
                )?;
                ensure(p.target_ratio > 0.0, "iron condor: target_ratio must be positive")?;
                ensure(
                    p.ratio_tolerance >= 0.0,
                    "iron condor: ratio_tolerance must not be negative",
                )?;
                validate_window(p.gate.not_before, p.gate.not_after, "iron condor")
            }
            Self::ShortStrangle(p) => {
                ensure(p.contracts >= 1, "short strangle: contracts must be >= 1")?;
                ensure(
                    p.target_delta > 0.0 && p.target_delta < 0.5,
                    "short strangle: target_delta must be in (0, 0.5)",
                )?;
                validate_window(p.gate.not_before, p.gate.not_after, "short strangle")
            }
            Self::LongStraddle(p) => {
                ensure(p.contracts >= 1, "long straddle: contracts must be >= 1")?;
                ensure(p.strike_step > 0.0, "long straddle: strike_step must be positive")?;
                ensure(
                    p.offset_multiplier > 0.0,
                    "long straddle: offset_multiplier must be positive",
                )?;
                ensure(
                    p.scale_out_fraction > 0.0 && p.scale_out_fraction < 1.0,
                    "long straddle: scale_out_fraction must be in (0, 1)",
                )?;
                ensure(
                    p.scale_out_mult > 1.0,
                    "long straddle: scale_out_mult must exceed 1",
                )?;
                validate_window(p.gate.not_before, p.gate.not_after, "long straddle")
            }
        }
    }
}

fn ensure(cond: bool, msg: &str) -> Result<(), String> {
    if cond {
        Ok(())
    } else {
        Err(msg.to_string())
    }
}

fn validate_window(not_before: NaiveTime, not_after: NaiveTime, who: &str) -> Result<(), String> {
    ensure(
        not_before < not_after,
        &format!("{who}: entry window must satisfy not_before < not_after"),
    )
}

fn default_cutoff() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 45, 0).unwrap()
}

fn default_risk_free_rate() -> f64 {
    0.05
}

fn default_dividend_yield() -> f64 {
    0.01
}

fn default_intent_ttl() -> i64 {
    120
}

fn default_quote_age() -> i64 {
    300
}

fn default_capital() -> f64 {
    100_000.0
}

fn default_multiplier() -> f64 {
    100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub underlying: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub commission: CommissionConfig,
    #[serde(default)]
    pub slippage: SlippageConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    /// Mandatory same-day close. Anything still open at this time of day
    /// is force-closed.
    #[serde(default = "default_cutoff")]
    pub cutoff_time: NaiveTime,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default = "default_dividend_yield")]
    pub dividend_yield: f64,
    /// Seconds an unfilled limit intent survives in the queue.
    #[serde(default = "default_intent_ttl")]
    pub intent_ttl_secs: i64,
    /// Seconds before a book quote is considered stale for marking.
    #[serde(default = "default_quote_age")]
    pub max_quote_age_secs: i64,
    #[serde(default = "default_capital")]
    pub initial_capital: f64,
    #[serde(default = "default_multiplier")]
    pub contract_multiplier: f64,
}

impl RunConfig {
    /// Reject an ill-formed configuration before any event is replayed.
    pub fn validate(&self) -> Result<(), EngineError> {
        let fail = |msg: String| Err(EngineError::InvalidConfiguration(msg));
        if self.underlying.trim().is_empty() {
            return fail("underlying must not be empty".into());
        }
        if self.start_date > self.end_date {
            return fail(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            ));
        }
        if !(self.initial_capital > 0.0) {
            return fail("initial_capital must be positive".into());
        }
        if !(self.contract_multiplier > 0.0) {
            return fail("contract_multiplier must be positive".into());
        }
        if self.intent_ttl_secs <= 0 {
            return fail("intent_ttl_secs must be positive".into());
        }
        if self.max_quote_age_secs <= 0 {
            return fail("max_quote_age_secs must be positive".into());
        }
        if !self.risk_free_rate.is_finite() || !self.dividend_yield.is_finite() {
            return fail("rates must be finite".into());
        }
        if self.cutoff_time < session_open() || self.cutoff_time > session_close() {
            return fail(format!(
                "cutoff_time {} must fall inside the trading session",
                self.cutoff_time
            ));
        }
        self.validate_risk()?;
        self.validate_costs()?;
        self.strategy
            .validate()
            .map_err(EngineError::InvalidConfiguration)
    }

    fn validate_risk(&self) -> Result<(), EngineError> {
        let check = |name: &str, v: Option<f64>| {
            if let Some(pct) = v {
                if !(pct > 0.0) || !pct.is_finite() {
                    return Err(EngineError::InvalidConfiguration(format!(
                        "risk.{name} must be positive"
                    )));
                }
            }
            Ok(())
        };
        check("profit_target_pct", self.risk.profit_target_pct)?;
        check("stop_loss_pct", self.risk.stop_loss_pct)?;
        if let Some(minutes) = self.risk.max_hold_minutes {
            if minutes <= 0 {
                return Err(EngineError::InvalidConfiguration(
                    "risk.max_hold_minutes must be positive".into(),
                ));
            }
        }
        Ok(())
    }

    fn validate_costs(&self) -> Result<(), EngineError> {
        let fail = |msg: &str| Err(EngineError::InvalidConfiguration(msg.to_string()));
        match self.slippage {
            SlippageConfig::FixedOffset { offset } => {
                if !(offset >= 0.0) {
                    return fail("slippage.offset must not be negative");
                }
            }
            SlippageConfig::SpreadPct {
                fill_pct_1,
                fill_pct_2,
                fill_pct_3,
                fill_pct_4,
            } => {
                for pct in [fill_pct_1, fill_pct_2, fill_pct_3, fill_pct_4] {
                    if !(0.0..=1.0).contains(&pct) {
                        return fail("slippage fill percentages must be in [0, 1]");
                    }
                }
            }
            SlippageConfig::None => {}
        }
        if let CommissionConfig::PerContract {
            rate,
            min_per_order,
            max_per_order,
        } = self.commission
        {
            if !(rate >= 0.0) || !(min_per_order >= 0.0) {
                return fail("commission rate and minimum must not be negative");
            }
            if let Some(max) = max_per_order {
                if max < min_per_order {
                    return fail("commission max_per_order must be >= min_per_order");
                }
            }
        }
        Ok(())
    }

    /// Stable identity of this configuration: BLAKE3 over the canonical
    /// JSON serialization.
    pub fn run_id(&self) -> Result<RunId, serde_json::Error> {
        Ok(RunId::from_bytes(&serde_json::to_vec(self)?))
    }
}
