//! ThetaLab Core — deterministic same-day options backtesting engine.
//!
//! This crate contains the heart of the backtester:
//! - Domain types (bars, chain snapshots, contracts, intents, fills,
//!   positions, trades)
//! - Time-ordered event tape and strictly sequential replay loop
//! - Option valuation bridge: quoted mids first, interpolated-vol
//!   Black-Scholes fallback, every mark tagged with its provenance
//! - Strategy families (iron condor, short strangle, long straddle)
//!   behind one evaluator trait
//! - Fill simulation with slippage and commission schedules and a
//!   pending-intent queue for package limits
//! - Position & risk management with the mandatory same-day close
//! - Append-only ledger with a BLAKE3 digest for reproducibility checks

pub mod calendar;
pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fills;
pub mod ledger;
pub mod market;
pub mod positions;
pub mod strategy;
pub mod synth;
pub mod valuation;
