//! Reporting and export — JSON, CSV, and Markdown artifact generation.
//!
//! Three export formats for backtest results:
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: trade tape and equity curve for external analysis tools
//! - **Markdown**: a human-readable single-run report
//!
//! All persisted artifacts include a `schema_version` field. Unknown newer
//! versions are rejected on load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use thetalab_core::domain::{Bar, ChainSnapshot, Trade};
use thetalab_core::ledger::EquityPoint;

use crate::runner::{BacktestResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting newer schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export the trade tape as CSV, one row per closed position.
///
/// The `legs` column packs every leg as `symbol qty entry exit`, joined
/// with `|`, so a multi-leg structure stays one row. `root` is the OCC
/// symbol root, typically the underlying.
pub fn export_trades_csv(trades: &[Trade], root: &str) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "position_id",
        "strategy",
        "opened_at",
        "closed_at",
        "exit_reason",
        "legs",
        "gross_pnl",
        "commission",
        "slippage",
        "net_pnl",
        "holding_minutes",
    ])?;

    for t in trades {
        let legs: Vec<String> = t
            .legs
            .iter()
            .map(|leg| {
                format!(
                    "{} {} {:.4} {:.4}",
                    leg.contract.occ_symbol(root),
                    leg.quantity,
                    leg.entry_price,
                    leg.exit_price
                )
            })
            .collect();

        wtr.write_record([
            &t.position_id.0.to_string(),
            &t.strategy,
            &t.opened_at.to_string(),
            &t.closed_at.to_string(),
            &t.exit_reason.to_string(),
            &legs.join("|"),
            &format!("{:.2}", t.gross_pnl),
            &format!("{:.2}", t.commission),
            &format!("{:.2}", t.slippage),
            &format!("{:.2}", t.net_pnl),
            &t.holding_minutes().to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export the equity curve as CSV, one row per mark.
pub fn export_equity_csv(curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "ts",
        "cash",
        "open_value",
        "equity",
        "observed_marks",
        "modeled_marks",
    ])?;
    for point in curve {
        wtr.write_record([
            &point.ts.to_string(),
            &format!("{:.2}", point.cash),
            &format!("{:.2}", point.open_value),
            &format!("{:.2}", point.equity),
            &point.observed_marks.to_string(),
            &point.modeled_marks.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write bar and chain event streams as CSV files under `dir`.
///
/// The layout is exactly what `data::load_events` reads back, so generated
/// data can be inspected, edited, and replayed through the CSV source.
/// Floats round-trip bit-exact through the shortest decimal form.
pub fn export_events_csv(
    bars: &[Bar],
    chains: &[ChainSnapshot],
    dir: &Path,
) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create data dir: {}", dir.display()))?;

    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["ts", "open", "high", "low", "close", "volume"])?;
    for bar in bars {
        wtr.write_record([
            bar.ts.to_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    let bars_path = dir.join("bars.csv");
    std::fs::write(&bars_path, data)
        .with_context(|| format!("failed to write {}", bars_path.display()))?;

    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["ts", "expiry", "strike", "right", "bid", "ask", "iv"])?;
    for snapshot in chains {
        for quote in &snapshot.quotes {
            wtr.write_record([
                snapshot.ts.to_string(),
                quote.contract.expiry.to_string(),
                quote.contract.strike().to_string(),
                quote.contract.right.occ_code().to_string(),
                quote.bid.to_string(),
                quote.ask.to_string(),
                quote.iv.map(|v| v.to_string()).unwrap_or_default(),
            ])?;
        }
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    let chains_path = dir.join("chains.csv");
    std::fs::write(&chains_path, data)
        .with_context(|| format!("failed to write {}", chains_path.display()))?;

    Ok((bars_path, chains_path))
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single run.
///
/// Creates a directory named `{underlying}_{run_id_prefix}/` under
/// `output_dir` containing:
/// - `manifest.json` — the full `BacktestResult`
/// - `trades.csv` — the trade tape
/// - `equity.csv` — the mark-by-mark equity curve
/// - `report.md` — the human-readable summary
///
/// The directory name is derived from the run id, so re-exporting the same
/// run overwrites its own artifacts instead of piling up copies.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!("{}_{}", result.config.underlying, short_id(&result.run_id));
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let json = export_json(result)?;
    std::fs::write(run_dir.join("manifest.json"), &json)?;

    let trades_csv = export_trades_csv(&result.trades, &result.config.underlying)?;
    std::fs::write(run_dir.join("trades.csv"), &trades_csv)?;

    let equity_csv = export_equity_csv(&result.equity_curve)?;
    std::fs::write(run_dir.join("equity.csv"), &equity_csv)?;

    std::fs::write(run_dir.join("report.md"), generate_report(result))?;

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's manifest.json.
///
/// Rejects newer schema versions.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

/// Generate a Markdown report for a single run.
pub fn generate_report(result: &BacktestResult) -> String {
    let mut md = String::with_capacity(2048);

    md.push_str("# Backtest Report\n\n");

    md.push_str("## Run\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Underlying | {} |\n", result.config.underlying));
    md.push_str(&format!(
        "| Period | {} to {} |\n",
        result.config.start_date, result.config.end_date
    ));
    md.push_str(&format!("| Strategy | {} |\n", result.config.strategy.tag()));
    md.push_str(&format!("| Run Id | {} |\n", short_id(&result.run_id)));
    md.push_str(&format!(
        "| Data | {:?} ({}) |\n",
        result.provenance.source,
        short_id(&result.provenance.dataset_digest)
    ));
    md.push_str(&format!(
        "| Initial Capital | ${:.0} |\n",
        result.config.initial_capital
    ));
    md.push_str(&format!("| Final Cash | ${:.2} |\n", result.final_cash));
    md.push('\n');

    let m = &result.metrics;
    md.push_str("## Performance\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!(
        "| Total Return | {:.2}% |\n",
        m.total_return * 100.0
    ));
    md.push_str(&format!("| Sharpe | {:.3} |\n", m.sharpe));
    md.push_str(&format!(
        "| Max Drawdown | {:.2}% |\n",
        m.max_drawdown * 100.0
    ));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", m.win_rate * 100.0));
    md.push_str(&format!("| Profit Factor | {:.2} |\n", m.profit_factor));
    md.push_str(&format!("| Trades | {} |\n", m.trade_count));
    md.push_str(&format!("| Avg Win | ${:.2} |\n", m.avg_win));
    md.push_str(&format!("| Avg Loss | ${:.2} |\n", m.avg_loss));
    md.push_str(&format!("| Largest Win | ${:.2} |\n", m.largest_win));
    md.push_str(&format!("| Largest Loss | ${:.2} |\n", m.largest_loss));
    md.push_str(&format!("| Commission | ${:.2} |\n", m.total_commission));
    md.push_str(&format!("| Slippage | ${:.2} |\n", m.total_slippage));
    md.push('\n');

    if !m.by_strategy.is_empty() {
        md.push_str("## Strategy Breakdown\n\n");
        md.push_str("| Strategy | Trades | Net P&L | Win Rate |\n");
        md.push_str("| --- | ---: | ---: | ---: |\n");
        for (tag, b) in &m.by_strategy {
            md.push_str(&format!(
                "| {} | {} | ${:.2} | {:.1}% |\n",
                tag,
                b.trades,
                b.net_pnl,
                b.win_rate * 100.0
            ));
        }
        md.push('\n');
    }

    if !result.trades.is_empty() {
        let mut reasons: BTreeMap<String, usize> = BTreeMap::new();
        for trade in &result.trades {
            *reasons.entry(trade.exit_reason.to_string()).or_default() += 1;
        }
        md.push_str("## Exit Reasons\n\n");
        md.push_str("| Reason | Count |\n");
        md.push_str("| --- | ---: |\n");
        for (reason, count) in &reasons {
            md.push_str(&format!("| {reason} | {count} |\n"));
        }
        md.push('\n');
    }

    if !result.rejections.is_empty() {
        md.push_str(&format!(
            "Rejected intents: {} (see manifest for detail)\n",
            result.rejections.len()
        ));
    }

    md
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::BTreeMap;
    use thetalab_core::domain::{
        ExitReason, OptionContract, PositionId, Right, Trade, TradeLeg,
    };
    use thetalab_core::valuation::ImpliedMove;

    use crate::data::SourceKind;
    use crate::metrics::{PerformanceMetrics, StrategyBreakdown};
    use crate::runner::DataProvenance;

    // ─── Test helpers ────────────────────────────────────────────────

    fn ts(hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    fn sample_trade() -> Trade {
        let expiry = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        Trade {
            position_id: PositionId(1),
            strategy: "SHORT_STRANGLE".into(),
            legs: vec![
                TradeLeg {
                    contract: OptionContract::new(expiry, 5040.0, Right::Call),
                    quantity: -1,
                    entry_price: 1.00,
                    exit_price: 0.20,
                },
                TradeLeg {
                    contract: OptionContract::new(expiry, 4960.0, Right::Put),
                    quantity: -1,
                    entry_price: 1.10,
                    exit_price: 0.25,
                },
            ],
            opened_at: ts(10, 0),
            closed_at: ts(15, 45),
            exit_reason: ExitReason::ForcedExpiry,
            gross_pnl: 165.0,
            commission: 2.60,
            slippage: 0.0,
            net_pnl: 162.40,
            capital_used: 10_000.0,
        }
    }

    fn sample_point(hour: u32, min: u32, equity: f64) -> EquityPoint {
        EquityPoint {
            ts: ts(hour, min),
            cash: equity,
            open_value: 0.0,
            equity,
            observed_marks: 2,
            modeled_marks: 0,
        }
    }

    fn sample_result() -> BacktestResult {
        let config = toml::from_str(
            r#"
underlying = "SPX"
start_date = "2024-03-15"
end_date = "2024-03-15"

[strategy]
type = "SHORT_STRANGLE"
contracts = 1
"#,
        )
        .unwrap();
        BacktestResult {
            schema_version: SCHEMA_VERSION,
            run_id: "deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef".into(),
            config,
            provenance: DataProvenance {
                source: SourceKind::Csv,
                dataset_digest: "abc123abc123abc123".into(),
            },
            metrics: PerformanceMetrics {
                total_return: 0.0016,
                sharpe: 0.0,
                max_drawdown: -0.001,
                win_rate: 1.0,
                profit_factor: 100.0,
                trade_count: 1,
                avg_win: 162.40,
                avg_loss: 0.0,
                largest_win: 162.40,
                largest_loss: 0.0,
                total_commission: 2.60,
                total_slippage: 0.0,
                by_strategy: BTreeMap::from([(
                    "SHORT_STRANGLE".to_string(),
                    StrategyBreakdown {
                        trades: 1,
                        net_pnl: 162.40,
                        win_rate: 1.0,
                    },
                )]),
            },
            trades: vec![sample_trade()],
            equity_curve: vec![
                sample_point(10, 0, 100_000.0),
                sample_point(15, 45, 100_162.40),
            ],
            rejections: vec![],
            daily_implied_move: vec![(
                NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
                ImpliedMove {
                    dollars: 28.5,
                    fraction: 0.0057,
                },
            )],
            final_cash: 100_162.40,
            ledger_digest: "feedfacefeedfacefeedface".into(),
        }
    }

    // ─── JSON round-trip ─────────────────────────────────────────────

    #[test]
    fn json_roundtrip() {
        let original = sample_result();
        let json = export_json(&original).unwrap();
        let restored = import_json(&json).unwrap();

        assert_eq!(restored.schema_version, SCHEMA_VERSION);
        assert_eq!(restored.run_id, original.run_id);
        assert_eq!(restored.config.underlying, "SPX");
        assert_eq!(restored.trades.len(), 1);
        assert_eq!(restored.trades[0].legs.len(), 2);
        assert_eq!(restored.equity_curve.len(), 2);
        assert!((restored.metrics.avg_win - 162.40).abs() < 1e-10);
        assert_eq!(restored.ledger_digest, original.ledger_digest);
    }

    #[test]
    fn json_rejects_newer_version() {
        let mut result = sample_result();
        result.schema_version = 99;
        let json = export_json(&result).unwrap();
        let err = import_json(&json).unwrap_err();
        assert!(err.to_string().contains("unsupported schema version 99"));
    }

    #[test]
    fn json_accepts_current_version() {
        let json = export_json(&sample_result()).unwrap();
        assert!(import_json(&json).is_ok());
    }

    // ─── CSV trades ─────────────────────────────────────────────────

    #[test]
    fn csv_trades_one_row_per_position() {
        let csv = export_trades_csv(&[sample_trade()], "SPXW").unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "position_id,strategy,opened_at,closed_at,exit_reason,legs,gross_pnl,commission,slippage,net_pnl,holding_minutes"
        );

        let row = lines[1];
        assert!(row.contains("SHORT_STRANGLE"));
        assert!(row.contains("forced_expiry"));
        assert!(row.contains("O:SPXW240315C05040000 -1 1.0000 0.2000"));
        assert!(row.contains("O:SPXW240315P04960000 -1 1.1000 0.2500"));
        assert!(row.contains("162.40"));
        assert!(row.ends_with("345"));
    }

    #[test]
    fn csv_empty_trades_is_header_only() {
        let csv = export_trades_csv(&[], "SPX").unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    // ─── CSV equity ─────────────────────────────────────────────────

    #[test]
    fn csv_equity_rows_carry_mark_counts() {
        let curve = vec![sample_point(10, 0, 100_000.0), sample_point(15, 45, 100_162.40)];
        let csv = export_equity_csv(&curve).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "ts,cash,open_value,equity,observed_marks,modeled_marks");
        assert!(lines[1].starts_with("2024-03-15 10:00:00,100000.00"));
        assert!(lines[2].contains("100162.40"));
        assert!(lines[1].ends_with("2,0"));
    }

    // ─── Markdown report ────────────────────────────────────────────

    #[test]
    fn markdown_report_has_sections() {
        let md = generate_report(&sample_result());
        assert!(md.contains("# Backtest Report"));
        assert!(md.contains("## Run"));
        assert!(md.contains("## Performance"));
        assert!(md.contains("## Strategy Breakdown"));
        assert!(md.contains("## Exit Reasons"));
        assert!(md.contains("| Run Id | deadbeefdead |"));
        assert!(md.contains("| forced_expiry | 1 |"));
        assert!(md.contains("| Profit Factor | 100.00 |"));
    }

    #[test]
    fn markdown_report_skips_empty_sections() {
        let mut result = sample_result();
        result.trades.clear();
        result.metrics.by_strategy.clear();
        let md = generate_report(&result);
        assert!(!md.contains("## Exit Reasons"));
        assert!(!md.contains("## Strategy Breakdown"));
        assert!(!md.contains("Rejected intents"));
    }

    // ─── Save/load artifacts ────────────────────────────────────────

    #[test]
    fn save_load_artifacts_roundtrip() {
        let result = sample_result();
        let dir = tempfile::tempdir().unwrap();
        let run_dir = save_artifacts(&result, dir.path()).unwrap();

        assert!(run_dir.ends_with("SPX_deadbeefdead"));
        assert!(run_dir.join("manifest.json").exists());
        assert!(run_dir.join("trades.csv").exists());
        assert!(run_dir.join("equity.csv").exists());
        assert!(run_dir.join("report.md").exists());

        let loaded = load_artifacts(&run_dir).unwrap();
        assert_eq!(loaded.run_id, result.run_id);
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
        assert_eq!(loaded.trades.len(), result.trades.len());
        assert!((loaded.final_cash - result.final_cash).abs() < 1e-9);
    }

    #[test]
    fn load_artifacts_missing_dir_fails_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = load_artifacts(&missing).unwrap_err();
        assert!(err.to_string().contains("manifest.json"));
    }

    // ─── Event CSV export ───────────────────────────────────────────

    #[test]
    fn event_csv_files_replay_to_the_same_digest() {
        use crate::config::DataConfig;
        use crate::data::load_events;
        use thetalab_core::synth::{self, SynthConfig};

        let start = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let data = synth::generate(&SynthConfig::default(), start, end).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let (bars_path, chains_path) =
            export_events_csv(&data.bars, &data.chains, dir.path()).unwrap();
        assert!(bars_path.ends_with("bars.csv"));

        let from_synth =
            load_events(&DataConfig::Synth(SynthConfig::default()), start, end).unwrap();
        let from_csv = load_events(
            &DataConfig::Csv {
                bars: bars_path,
                chains: chains_path,
            },
            start,
            end,
        )
        .unwrap();

        assert_eq!(from_csv.source, SourceKind::Csv);
        assert_eq!(from_csv.bars.len(), from_synth.bars.len());
        assert_eq!(from_csv.chains.len(), from_synth.chains.len());
        // bit-exact floats through the CSV text form
        assert_eq!(from_csv.digest, from_synth.digest);
    }
}
