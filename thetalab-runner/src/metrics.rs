//! Performance metrics — pure functions over the trade tape and equity curve.
//!
//! Every metric is a pure function: trades and/or equity points in, scalar
//! out. The equity curve is sampled intraday, so daily statistics first
//! reduce it to one close per session.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thetalab_core::domain::Trade;
use thetalab_core::ledger::EquityPoint;

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub trade_count: usize,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub total_commission: f64,
    pub total_slippage: f64,
    /// Per-strategy totals, keyed by strategy tag.
    pub by_strategy: BTreeMap<String, StrategyBreakdown>,
}

/// Totals for one strategy tag within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyBreakdown {
    pub trades: usize,
    pub net_pnl: f64,
    pub win_rate: f64,
}

impl PerformanceMetrics {
    /// Compute all metrics from the trade tape and equity curve.
    pub fn compute(trades: &[Trade], curve: &[EquityPoint], initial_capital: f64) -> Self {
        Self {
            total_return: total_return(curve, initial_capital),
            sharpe: sharpe_ratio(curve, initial_capital, 0.0),
            max_drawdown: max_drawdown(curve, initial_capital),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            trade_count: trades.len(),
            avg_win: avg_win(trades),
            avg_loss: avg_loss(trades),
            largest_win: largest_win(trades),
            largest_loss: largest_loss(trades),
            total_commission: trades.iter().map(|t| t.commission).sum(),
            total_slippage: trades.iter().map(|t| t.slippage).sum(),
            by_strategy: by_strategy(trades),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final equity - initial) / initial.
pub fn total_return(curve: &[EquityPoint], initial_capital: f64) -> f64 {
    if initial_capital <= 0.0 {
        return 0.0;
    }
    match curve.last() {
        Some(point) => (point.equity - initial_capital) / initial_capital,
        None => 0.0,
    }
}

/// Annualized Sharpe ratio from daily returns.
///
/// Sharpe = mean(daily returns - rf) / std(daily returns) * sqrt(252).
/// Returns 0.0 if variance is zero or fewer than 2 sessions.
pub fn sharpe_ratio(curve: &[EquityPoint], initial_capital: f64, risk_free_rate: f64) -> f64 {
    let returns = daily_returns(curve, initial_capital);
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / 252.0;
    let excess: Vec<f64> = returns.iter().map(|r| r - daily_rf).collect();
    let mean = mean_f64(&excess);
    let std = std_dev(&excess);
    if std < 1e-15 {
        return 0.0;
    }
    (mean / std) * (252.0_f64).sqrt()
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// The peak starts at initial capital, so a run that only loses from the
/// first mark still registers a drawdown.
pub fn max_drawdown(curve: &[EquityPoint], initial_capital: f64) -> f64 {
    let mut peak = initial_capital.max(0.0);
    let mut max_dd = 0.0_f64;

    for point in curve {
        if point.equity > peak {
            peak = point.equity;
        }
        if peak > 0.0 {
            let dd = (point.equity - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Win rate: fraction of trades that were winners.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Profit factor: gross profits / gross losses.
///
/// Capped at 100.0 for edge cases (all winners, zero losses).
pub fn profit_factor(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades
        .iter()
        .filter(|t| t.net_pnl > 0.0)
        .map(|t| t.net_pnl)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.net_pnl < 0.0)
        .map(|t| t.net_pnl.abs())
        .sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

/// Mean winning trade P&L. 0.0 with no winners.
pub fn avg_win(trades: &[Trade]) -> f64 {
    let wins: Vec<f64> = trades
        .iter()
        .filter(|t| t.net_pnl > 0.0)
        .map(|t| t.net_pnl)
        .collect();
    mean_f64(&wins)
}

/// Mean losing trade P&L, negative by convention. 0.0 with no losers.
pub fn avg_loss(trades: &[Trade]) -> f64 {
    let losses: Vec<f64> = trades
        .iter()
        .filter(|t| t.net_pnl < 0.0)
        .map(|t| t.net_pnl)
        .collect();
    mean_f64(&losses)
}

/// Best single trade by net P&L. 0.0 if no trade made money.
pub fn largest_win(trades: &[Trade]) -> f64 {
    trades.iter().map(|t| t.net_pnl).fold(0.0, f64::max)
}

/// Worst single trade by net P&L. 0.0 if no trade lost money.
pub fn largest_loss(trades: &[Trade]) -> f64 {
    trades.iter().map(|t| t.net_pnl).fold(0.0, f64::min)
}

/// Per-strategy trade count, net P&L, and win rate.
pub fn by_strategy(trades: &[Trade]) -> BTreeMap<String, StrategyBreakdown> {
    let mut acc: BTreeMap<&str, (usize, f64, usize)> = BTreeMap::new();
    for trade in trades {
        let entry = acc.entry(trade.strategy.as_str()).or_insert((0, 0.0, 0));
        entry.0 += 1;
        entry.1 += trade.net_pnl;
        if trade.is_winner() {
            entry.2 += 1;
        }
    }
    acc.into_iter()
        .map(|(tag, (count, net, wins))| {
            (
                tag.to_string(),
                StrategyBreakdown {
                    trades: count,
                    net_pnl: net,
                    win_rate: wins as f64 / count as f64,
                },
            )
        })
        .collect()
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Last equity mark of each session, in session order.
pub fn daily_closes(curve: &[EquityPoint]) -> Vec<(NaiveDate, f64)> {
    let mut closes: Vec<(NaiveDate, f64)> = Vec::new();
    for point in curve {
        let date = point.ts.date();
        match closes.last_mut() {
            Some(last) if last.0 == date => last.1 = point.equity,
            _ => closes.push((date, point.equity)),
        }
    }
    closes
}

/// Day-over-day returns of session closes.
///
/// The first session's return is measured against initial capital, so a
/// single-day run still produces one return.
pub fn daily_returns(curve: &[EquityPoint], initial_capital: f64) -> Vec<f64> {
    let closes = daily_closes(curve);
    let mut returns = Vec::with_capacity(closes.len());
    let mut prev = initial_capital;
    for (_, close) in closes {
        if prev > 0.0 {
            returns.push((close - prev) / prev);
        }
        prev = close;
    }
    returns
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
