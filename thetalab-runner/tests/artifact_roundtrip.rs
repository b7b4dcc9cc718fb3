//! Artifact bundles written to disk and read back.
//!
//! A synthetic run is exported with `save_artifacts` and re-imported
//! with `load_artifacts`; the manifest must reproduce the run exactly,
//! and the sidecar files must exist where the CLI expects them.

use thetalab_runner::export::{generate_report, load_artifacts, save_artifacts};
use thetalab_runner::{run_job, BacktestResult, JobConfig};

fn synth_result() -> BacktestResult {
    let job: JobConfig = toml::from_str(
        r#"
[run]
underlying = "SPX"
start_date = "2024-03-14"
end_date = "2024-03-15"

[run.strategy]
type = "SHORT_STRANGLE"

[data]
source = "SYNTH"
"#,
    )
    .unwrap();
    run_job(&job).unwrap()
}

#[test]
fn saved_run_loads_back_unchanged() {
    let result = synth_result();
    let out = tempfile::tempdir().unwrap();

    let run_dir = save_artifacts(&result, out.path()).unwrap();
    for file in ["manifest.json", "trades.csv", "equity.csv", "report.md"] {
        assert!(run_dir.join(file).exists(), "missing {file}");
    }

    let loaded = load_artifacts(&run_dir).unwrap();
    assert_eq!(loaded.schema_version, result.schema_version);
    assert_eq!(loaded.run_id, result.run_id);
    assert_eq!(loaded.ledger_digest, result.ledger_digest);
    assert_eq!(loaded.provenance, result.provenance);
    assert_eq!(loaded.trades, result.trades);
    assert_eq!(loaded.equity_curve.len(), result.equity_curve.len());
    assert_eq!(loaded.metrics.trade_count, result.metrics.trade_count);
    assert!((loaded.metrics.total_return - result.metrics.total_return).abs() < 1e-12);
    assert!((loaded.final_cash - result.final_cash).abs() < 1e-12);
}

#[test]
fn run_directory_name_tracks_underlying_and_run_id() {
    let result = synth_result();
    let out = tempfile::tempdir().unwrap();

    let run_dir = save_artifacts(&result, out.path()).unwrap();
    let name = run_dir.file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(name, format!("SPX_{}", &result.run_id[..12]));
}

#[test]
fn re_exporting_overwrites_in_place() {
    let result = synth_result();
    let out = tempfile::tempdir().unwrap();

    let first = save_artifacts(&result, out.path()).unwrap();
    let second = save_artifacts(&result, out.path()).unwrap();
    assert_eq!(first, second);

    let loaded = load_artifacts(&second).unwrap();
    assert_eq!(loaded.run_id, result.run_id);
}

#[test]
fn report_covers_run_and_exit_reasons() {
    let result = synth_result();
    let report = generate_report(&result);

    assert!(report.contains("# Backtest Report"));
    assert!(report.contains("## Performance"));
    assert!(report.contains("SPX"));
    assert!(report.contains(&result.run_id[..12]));
    assert!(report.contains("forced_expiry"));
}
