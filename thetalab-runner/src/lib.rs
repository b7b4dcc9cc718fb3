//! ThetaLab Runner — orchestration around the core replay engine.
//!
//! This crate builds on `thetalab-core` to provide:
//! - Job files: one TOML document naming the run parameters and the event
//!   source (CSV files or the synthetic generator)
//! - CSV event loading via polars, finished before the first tick
//! - Single-run execution assembling a schema-versioned `BacktestResult`
//! - Performance metrics as pure functions over trades and equity
//! - Rayon-parallel parameter sweeps with a CSV leaderboard
//! - Artifact export/import (JSON manifest plus CSV tapes)

pub mod config;
pub mod data;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod sweep;

pub use config::{ConfigError, DataConfig, JobConfig};
pub use data::{load_events, DataError, LoadedEvents, SourceKind};
pub use export::{export_events_csv, generate_report, load_artifacts, save_artifacts};
pub use metrics::{PerformanceMetrics, StrategyBreakdown};
pub use runner::{run_job, run_on_tape, BacktestResult, DataProvenance, RunError, SCHEMA_VERSION};
pub use sweep::{run_sweep, ParamGrid, RankMetric, SweepResults};
