//! Single-run orchestration: job in, schema-versioned result out.
//!
//! `run_job` is the whole pipeline (validate, load, build tape, replay).
//! `run_on_tape` skips the loading so sweeps can share one tape across
//! many configurations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thetalab_core::clock::EventTape;
use thetalab_core::config::RunConfig;
use thetalab_core::domain::Trade;
use thetalab_core::engine::{self, BacktestReport};
use thetalab_core::error::{EngineError, Rejection};
use thetalab_core::ledger::EquityPoint;
use thetalab_core::valuation::ImpliedMove;
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, JobConfig};
use crate::data::{self, DataError, SourceKind};
use crate::metrics::PerformanceMetrics;

/// Current result schema. Bump when `BacktestResult`'s serialized shape
/// changes incompatibly.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to serialize run output")]
    Serialize(#[from] serde_json::Error),
}

/// Which events fed the run, pinned by digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataProvenance {
    pub source: SourceKind,
    pub dataset_digest: String,
}

/// Everything a single run produces, in one serializable document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// blake3 hex of the run configuration.
    pub run_id: String,
    pub config: RunConfig,
    pub provenance: DataProvenance,
    pub metrics: PerformanceMetrics,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub rejections: Vec<Rejection>,
    /// First chain-implied move observed each day.
    pub daily_implied_move: Vec<(NaiveDate, ImpliedMove)>,
    pub final_cash: f64,
    /// blake3 hex over the ledger outcome, for determinism checks.
    pub ledger_digest: String,
}

/// Run one job end to end.
///
/// The config is validated before any data is touched, so a bad job fails
/// fast instead of after a long load.
pub fn run_job(job: &JobConfig) -> Result<BacktestResult, RunError> {
    job.run.validate()?;
    let loaded = data::load_events(&job.data, job.run.start_date, job.run.end_date)?;
    let provenance = DataProvenance {
        source: loaded.source,
        dataset_digest: loaded.digest.clone(),
    };
    let tape = EventTape::build(loaded.bars, loaded.chains)?;
    run_on_tape(&job.run, &tape, &provenance)
}

/// Replay one configuration against an already-built tape.
pub fn run_on_tape(
    config: &RunConfig,
    tape: &EventTape,
    provenance: &DataProvenance,
) -> Result<BacktestResult, RunError> {
    let id = config.run_id()?;
    info!(
        run_id = %id.short(),
        strategy = config.strategy.tag(),
        events = tape.len(),
        "starting backtest"
    );

    let BacktestReport {
        ledger,
        daily_implied_move,
        ..
    } = engine::run_backtest(config, tape)?;

    let metrics = PerformanceMetrics::compute(
        ledger.trades(),
        ledger.equity_curve(),
        ledger.initial_capital(),
    );
    let ledger_digest = ledger.digest()?;
    info!(
        run_id = %id.short(),
        trades = metrics.trade_count,
        net = ledger.realized_net(),
        "backtest finished"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id: id.to_hex(),
        config: config.clone(),
        provenance: provenance.clone(),
        metrics,
        trades: ledger.trades().to_vec(),
        equity_curve: ledger.equity_curve().to_vec(),
        rejections: ledger.rejections().to_vec(),
        daily_implied_move,
        final_cash: ledger.cash(),
        ledger_digest,
    })
}
