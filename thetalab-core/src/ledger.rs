//! Append-only run ledger.
//!
//! Cash moves only through fills; trades, rejections, and equity samples
//! are appended and never rewritten. The identity the whole engine is
//! audited against: `equity = cash + open_value`, and `realized +
//! unrealized = equity - initial_capital` at every sample.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::{Fill, Trade};
use crate::error::Rejection;
use crate::positions::MarkSummary;

/// One point on the equity curve. Sampled whenever a position closes and
/// at the end of every trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub ts: NaiveDateTime,
    pub cash: f64,
    pub open_value: f64,
    pub equity: f64,
    /// Open legs marked from live quotes at this sample.
    pub observed_marks: usize,
    /// Open legs marked by the pricing model at this sample.
    pub modeled_marks: usize,
}

#[derive(Debug)]
pub struct Ledger {
    initial_capital: f64,
    multiplier: f64,
    cash: f64,
    fills: Vec<Fill>,
    trades: Vec<Trade>,
    rejections: Vec<Rejection>,
    equity_curve: Vec<EquityPoint>,
}

impl Ledger {
    pub fn new(initial_capital: f64, multiplier: f64) -> Self {
        Self {
            initial_capital,
            multiplier,
            cash: initial_capital,
            fills: Vec::new(),
            trades: Vec::new(),
            rejections: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn rejections(&self) -> &[Rejection] {
        &self.rejections
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    /// Apply one fill to cash and append it to the tape. Premium and
    /// commission both land here, at fill time.
    pub fn apply_fill(&mut self, fill: &Fill) {
        self.cash += fill.cash_delta(self.multiplier);
        self.fills.push(fill.clone());
    }

    pub fn record_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn record_rejection(&mut self, rejection: Rejection) {
        self.rejections.push(rejection);
    }

    /// Sample the equity curve at `ts` using the current mark of all open
    /// positions.
    pub fn sample_equity(&mut self, ts: NaiveDateTime, mark: &MarkSummary) {
        self.equity_curve.push(EquityPoint {
            ts,
            cash: self.cash,
            open_value: mark.open_value,
            equity: self.cash + mark.open_value,
            observed_marks: mark.observed,
            modeled_marks: mark.modeled,
        });
    }

    /// Net P&L over completed trades.
    pub fn realized_net(&self) -> f64 {
        self.trades.iter().map(|t| t.net_pnl).sum()
    }

    /// Commission deducted across every fill on the tape.
    pub fn total_commission(&self) -> f64 {
        self.fills.iter().map(|f| f.commission).sum()
    }

    pub fn total_slippage(&self) -> f64 {
        self.fills.iter().map(|f| f.slippage).sum()
    }

    /// Fraction of completed trades with positive net P&L.
    pub fn win_rate(&self) -> Option<f64> {
        if self.trades.is_empty() {
            return None;
        }
        let winners = self.trades.iter().filter(|t| t.is_winner()).count();
        Some(winners as f64 / self.trades.len() as f64)
    }

    /// Deepest peak-to-trough fall of the equity curve, in dollars.
    pub fn max_drawdown(&self) -> f64 {
        let mut peak = f64::MIN;
        let mut drawdown: f64 = 0.0;
        for point in &self.equity_curve {
            peak = peak.max(point.equity);
            drawdown = drawdown.max(peak - point.equity);
        }
        drawdown
    }

    /// BLAKE3 digest of the canonical JSON of the trade tape and final
    /// cash. Two runs of the same configuration over the same events must
    /// produce the same digest.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_vec(&(&self.trades, self.cash))?;
        Ok(blake3::hash(&canonical).to_hex().to_string())
    }
}
