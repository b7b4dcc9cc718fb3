//! Parameter sweep utilities for grid search over strategy knobs.
//!
//! A grid cross-products entry delta with the exit thresholds, every
//! combination replays the same shared tape in parallel, and the results
//! rank by a chosen metric.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::Context;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thetalab_core::clock::EventTape;
use thetalab_core::config::{RunConfig, StrategyConfig};
use tracing::info;

use crate::metrics::PerformanceMetrics;
use crate::runner::{run_on_tape, BacktestResult, DataProvenance, RunError};

/// Axes of a parameter sweep.
///
/// An empty axis means "leave the base value alone"; a non-empty axis
/// replaces the base value with each listed one in turn. The delta axis
/// only applies when the base strategy takes a target delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamGrid {
    /// Entry deltas to test (short strangle only).
    #[serde(default)]
    pub target_deltas: Vec<f64>,

    /// Profit targets to test, as a fraction of entry credit.
    #[serde(default)]
    pub profit_target_pcts: Vec<f64>,

    /// Stop losses to test, as a multiple of entry credit.
    #[serde(default)]
    pub stop_loss_pcts: Vec<f64>,
}

impl ParamGrid {
    /// A starter grid for short strangles.
    ///
    /// Deltas 10/15/20, take-profit at 25% or 50% of credit, stop at 1x
    /// or 2x of credit: 12 combinations.
    pub fn strangle_default() -> Self {
        Self {
            target_deltas: vec![0.10, 0.15, 0.20],
            profit_target_pcts: vec![0.25, 0.50],
            stop_loss_pcts: vec![1.0, 2.0],
        }
    }

    /// Grid cardinality before invalid combinations are dropped.
    pub fn size(&self) -> usize {
        axis(&self.target_deltas).len()
            * axis(&self.profit_target_pcts).len()
            * axis(&self.stop_loss_pcts).len()
    }

    /// Generates all configurations in the grid.
    ///
    /// Combinations that fail `RunConfig::validate` are skipped, so a grid
    /// can mix aggressive values without aborting the whole sweep.
    pub fn generate_configs(&self, base: &RunConfig) -> Vec<RunConfig> {
        let deltas = match &base.strategy {
            StrategyConfig::ShortStrangle(_) => axis(&self.target_deltas),
            _ => vec![None],
        };
        let targets = axis(&self.profit_target_pcts);
        let stops = axis(&self.stop_loss_pcts);

        let mut configs = Vec::with_capacity(deltas.len() * targets.len() * stops.len());
        for &delta in &deltas {
            for &target in &targets {
                for &stop in &stops {
                    let mut config = base.clone();
                    if let Some(d) = delta {
                        if let StrategyConfig::ShortStrangle(params) = &mut config.strategy {
                            params.target_delta = d;
                        }
                    }
                    if let Some(t) = target {
                        config.risk.profit_target_pct = Some(t);
                    }
                    if let Some(s) = stop {
                        config.risk.stop_loss_pct = Some(s);
                    }
                    if config.validate().is_ok() {
                        configs.push(config);
                    }
                }
            }
        }
        configs
    }
}

fn axis(values: &[f64]) -> Vec<Option<f64>> {
    if values.is_empty() {
        vec![None]
    } else {
        values.iter().copied().map(Some).collect()
    }
}

/// Which metric a leaderboard ranks by. Higher is always better; drawdown
/// is deliberately not offered as a rank key on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankMetric {
    TotalReturn,
    WinRate,
    ProfitFactor,
    Sharpe,
}

impl RankMetric {
    pub fn value(&self, metrics: &PerformanceMetrics) -> f64 {
        match self {
            Self::TotalReturn => metrics.total_return,
            Self::WinRate => metrics.win_rate,
            Self::ProfitFactor => metrics.profit_factor,
            Self::Sharpe => metrics.sharpe,
        }
    }
}

impl FromStr for RankMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "total_return" | "return" => Ok(Self::TotalReturn),
            "win_rate" => Ok(Self::WinRate),
            "profit_factor" => Ok(Self::ProfitFactor),
            "sharpe" => Ok(Self::Sharpe),
            other => Err(format!(
                "unknown rank metric {other:?} (expected total_return, win_rate, profit_factor, or sharpe)"
            )),
        }
    }
}

/// Executes a sweep over the grid, sharing one tape across all runs.
///
/// Runs execute in parallel; the first failure aborts the sweep.
pub fn run_sweep(
    base: &RunConfig,
    grid: &ParamGrid,
    tape: &EventTape,
    provenance: &DataProvenance,
) -> Result<SweepResults, RunError> {
    let configs = grid.generate_configs(base);
    info!(
        configs = configs.len(),
        grid_size = grid.size(),
        "starting parameter sweep"
    );

    let results: Vec<BacktestResult> = configs
        .par_iter()
        .map(|config| run_on_tape(config, tape, provenance))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SweepResults::new(results))
}

/// Results from a parameter sweep.
#[derive(Debug)]
pub struct SweepResults {
    results: Vec<BacktestResult>,
    by_run_id: HashMap<String, BacktestResult>,
}

impl SweepResults {
    fn new(results: Vec<BacktestResult>) -> Self {
        let by_run_id = results
            .iter()
            .map(|r| (r.run_id.clone(), r.clone()))
            .collect();

        Self { results, by_run_id }
    }

    /// Returns all results in grid order.
    pub fn all(&self) -> &[BacktestResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Gets a result by run id.
    pub fn get(&self, run_id: &str) -> Option<&BacktestResult> {
        self.by_run_id.get(run_id)
    }

    /// Returns results sorted by the metric, best first.
    pub fn sorted_by(&self, metric: RankMetric) -> Vec<&BacktestResult> {
        let mut sorted: Vec<_> = self.results.iter().collect();
        sorted.sort_by(|a, b| {
            metric
                .value(&b.metrics)
                .partial_cmp(&metric.value(&a.metrics))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted
    }

    /// Returns the top N results by the metric.
    pub fn top_n(&self, n: usize, metric: RankMetric) -> Vec<&BacktestResult> {
        self.sorted_by(metric).into_iter().take(n).collect()
    }

    /// Returns the best result by the metric.
    pub fn best(&self, metric: RankMetric) -> Option<&BacktestResult> {
        self.sorted_by(metric).into_iter().next()
    }

    /// Renders a ranked leaderboard as CSV text.
    ///
    /// Parameter columns are blank when the combination left the base
    /// value untouched (for example delta on a non-strangle base).
    pub fn leaderboard_csv(&self, metric: RankMetric) -> anyhow::Result<String> {
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.write_record([
            "rank",
            "run_id",
            "strategy",
            "target_delta",
            "profit_target_pct",
            "stop_loss_pct",
            "trades",
            "total_return",
            "win_rate",
            "profit_factor",
            "sharpe",
            "max_drawdown",
            "final_cash",
        ])?;

        for (i, result) in self.sorted_by(metric).iter().enumerate() {
            let delta = strangle_delta(&result.config);
            writer.write_record([
                (i + 1).to_string(),
                result.run_id[..12].to_string(),
                result.config.strategy.tag().to_string(),
                opt_cell(delta),
                opt_cell(result.config.risk.profit_target_pct),
                opt_cell(result.config.risk.stop_loss_pct),
                result.metrics.trade_count.to_string(),
                format!("{:.6}", result.metrics.total_return),
                format!("{:.4}", result.metrics.win_rate),
                format!("{:.4}", result.metrics.profit_factor),
                format!("{:.4}", result.metrics.sharpe),
                format!("{:.6}", result.metrics.max_drawdown),
                format!("{:.2}", result.final_cash),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .context("failed to flush leaderboard csv")?;
        String::from_utf8(bytes).context("leaderboard csv is not valid utf-8")
    }
}

fn strangle_delta(config: &RunConfig) -> Option<f64> {
    match &config.strategy {
        StrategyConfig::ShortStrangle(p) => Some(p.target_delta),
        _ => None,
    }
}

fn opt_cell(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v}"),
        None => String::new(),
    }
}
