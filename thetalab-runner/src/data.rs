//! Event loading: CSV files via polars, or the core synthetic generator.
//!
//! All file I/O happens here, before the replay loop ever sees an event.
//! Loaded streams are digested (blake3 over their JSON form) so a result
//! can state exactly which data produced it.
//!
//! Expected CSV layouts (header row required, columns in this order):
//! - bars:   `ts,open,high,low,close,volume`
//! - chains: `ts,expiry,strike,right,bid,ask,iv` (iv may be empty)
//!
//! Timestamps are `YYYY-MM-DD HH:MM:SS` (a `T` separator is also accepted),
//! expiries are `YYYY-MM-DD`, rights are `C`/`CALL`/`P`/`PUT` in any case.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thetalab_core::clock::EventTape;
use thetalab_core::domain::{Bar, ChainSnapshot, OptionContract, OptionQuote, Right};
use thetalab_core::error::EngineError;
use thetalab_core::synth;
use thiserror::Error;
use tracing::info;

use crate::config::DataConfig;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {detail}")]
    ReadFailed { path: PathBuf, detail: String },
    #[error("{path} row {row}: {detail}")]
    BadRow {
        path: PathBuf,
        row: usize,
        detail: String,
    },
    #[error(transparent)]
    Synth(#[from] EngineError),
    #[error("failed to digest event streams")]
    Digest(#[from] serde_json::Error),
}

/// Which kind of source produced the event streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    Csv,
    Synthetic,
}

/// Event streams plus their provenance, ready to build a tape from.
#[derive(Debug, Clone)]
pub struct LoadedEvents {
    pub bars: Vec<Bar>,
    pub chains: Vec<ChainSnapshot>,
    pub source: SourceKind,
    /// blake3 hex digest of the loaded streams.
    pub digest: String,
}

impl LoadedEvents {
    pub fn into_tape(self) -> Result<EventTape, EngineError> {
        EventTape::build(self.bars, self.chains)
    }
}

/// Load the event streams named by a data source.
///
/// The date range only matters for the synthetic source, which generates one
/// session per weekday in `[start, end]`. CSV files are loaded whole; range
/// coverage is checked later by the tape.
pub fn load_events(
    config: &DataConfig,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<LoadedEvents, DataError> {
    match config {
        DataConfig::Csv { bars, chains } => {
            let bar_rows = load_bars_csv(bars)?;
            let chain_rows = load_chains_csv(chains)?;
            let digest = dataset_digest(&bar_rows, &chain_rows)?;
            info!(
                bars = bar_rows.len(),
                snapshots = chain_rows.len(),
                digest = %digest,
                "loaded csv event streams"
            );
            Ok(LoadedEvents {
                bars: bar_rows,
                chains: chain_rows,
                source: SourceKind::Csv,
                digest,
            })
        }
        DataConfig::Synth(config) => {
            let data = synth::generate(config, start, end)?;
            let digest = dataset_digest(&data.bars, &data.chains)?;
            info!(
                seed = config.seed,
                bars = data.bars.len(),
                snapshots = data.chains.len(),
                digest = %digest,
                "generated synthetic event streams"
            );
            Ok(LoadedEvents {
                bars: data.bars,
                chains: data.chains,
                source: SourceKind::Synthetic,
                digest,
            })
        }
    }
}

/// blake3 hex digest over the JSON form of both streams.
pub fn dataset_digest(
    bars: &[Bar],
    chains: &[ChainSnapshot],
) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(&(bars, chains))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

fn bar_schema() -> Schema {
    Schema::from_iter(vec![
        Field::new("ts".into(), DataType::String),
        Field::new("open".into(), DataType::Float64),
        Field::new("high".into(), DataType::Float64),
        Field::new("low".into(), DataType::Float64),
        Field::new("close".into(), DataType::Float64),
        Field::new("volume".into(), DataType::UInt64),
    ])
}

fn chain_schema() -> Schema {
    Schema::from_iter(vec![
        Field::new("ts".into(), DataType::String),
        Field::new("expiry".into(), DataType::String),
        Field::new("strike".into(), DataType::Float64),
        Field::new("right".into(), DataType::String),
        Field::new("bid".into(), DataType::Float64),
        Field::new("ask".into(), DataType::Float64),
        Field::new("iv".into(), DataType::Float64),
    ])
}

fn read_frame(path: &Path, schema: Schema) -> Result<DataFrame, DataError> {
    LazyCsvReader::new(path)
        .with_schema(Some(Arc::new(schema)))
        .with_has_header(true)
        .finish()
        .map_err(|e| read_failed(path, e))?
        .collect()
        .map_err(|e| read_failed(path, e))
}

fn read_failed(path: &Path, e: PolarsError) -> DataError {
    DataError::ReadFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}

fn bad_row(path: &Path, row: usize, detail: impl Into<String>) -> DataError {
    DataError::BadRow {
        path: path.to_path_buf(),
        row,
        detail: detail.into(),
    }
}

fn str_col<'a>(df: &'a DataFrame, path: &Path, name: &str) -> Result<&'a StringChunked, DataError> {
    df.column(name)
        .and_then(|c| c.str())
        .map_err(|e| read_failed(path, e))
}

fn f64_col<'a>(
    df: &'a DataFrame,
    path: &Path,
    name: &str,
) -> Result<&'a Float64Chunked, DataError> {
    df.column(name)
        .and_then(|c| c.f64())
        .map_err(|e| read_failed(path, e))
}

fn parse_ts(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

fn parse_right(raw: &str) -> Option<Right> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "C" | "CALL" => Some(Right::Call),
        "P" | "PUT" => Some(Right::Put),
        _ => None,
    }
}

/// Load minute bars from a CSV file.
///
/// Rows must be strictly increasing in time and pass the OHLC sanity check;
/// the first offending row is reported with its line number.
pub fn load_bars_csv(path: impl AsRef<Path>) -> Result<Vec<Bar>, DataError> {
    let path = path.as_ref();
    let df = read_frame(path, bar_schema())?;

    let ts = str_col(&df, path, "ts")?;
    let open = f64_col(&df, path, "open")?;
    let high = f64_col(&df, path, "high")?;
    let low = f64_col(&df, path, "low")?;
    let close = f64_col(&df, path, "close")?;
    let volume = df
        .column("volume")
        .and_then(|c| c.u64())
        .map_err(|e| read_failed(path, e))?;

    let mut bars: Vec<Bar> = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        // Header is line 1.
        let row = i + 2;
        let raw = ts
            .get(i)
            .ok_or_else(|| bad_row(path, row, "missing timestamp"))?;
        let ts = parse_ts(raw)
            .ok_or_else(|| bad_row(path, row, format!("unparseable timestamp {raw:?}")))?;
        let bar = Bar {
            ts,
            open: open.get(i).ok_or_else(|| bad_row(path, row, "missing open"))?,
            high: high.get(i).ok_or_else(|| bad_row(path, row, "missing high"))?,
            low: low.get(i).ok_or_else(|| bad_row(path, row, "missing low"))?,
            close: close
                .get(i)
                .ok_or_else(|| bad_row(path, row, "missing close"))?,
            volume: volume
                .get(i)
                .ok_or_else(|| bad_row(path, row, "missing volume"))?,
        };
        if !bar.is_sane() {
            return Err(bad_row(path, row, "inconsistent ohlc values"));
        }
        if let Some(prev) = bars.last() {
            if bar.ts <= prev.ts {
                return Err(bad_row(path, row, "timestamp not after previous row"));
            }
        }
        bars.push(bar);
    }
    Ok(bars)
}

/// Load chain snapshots from a CSV file.
///
/// Consecutive rows sharing a timestamp form one snapshot. Snapshot
/// timestamps must be non-decreasing across the file.
pub fn load_chains_csv(path: impl AsRef<Path>) -> Result<Vec<ChainSnapshot>, DataError> {
    let path = path.as_ref();
    let df = read_frame(path, chain_schema())?;

    let ts = str_col(&df, path, "ts")?;
    let expiry = str_col(&df, path, "expiry")?;
    let strike = f64_col(&df, path, "strike")?;
    let right = str_col(&df, path, "right")?;
    let bid = f64_col(&df, path, "bid")?;
    let ask = f64_col(&df, path, "ask")?;
    let iv = f64_col(&df, path, "iv")?;

    let mut chains: Vec<ChainSnapshot> = Vec::new();
    for i in 0..df.height() {
        let row = i + 2;
        let raw_ts = ts
            .get(i)
            .ok_or_else(|| bad_row(path, row, "missing timestamp"))?;
        let snap_ts = parse_ts(raw_ts)
            .ok_or_else(|| bad_row(path, row, format!("unparseable timestamp {raw_ts:?}")))?;
        let raw_expiry = expiry
            .get(i)
            .ok_or_else(|| bad_row(path, row, "missing expiry"))?;
        let expiry_date = NaiveDate::parse_from_str(raw_expiry, "%Y-%m-%d")
            .map_err(|_| bad_row(path, row, format!("unparseable expiry {raw_expiry:?}")))?;
        let raw_right = right
            .get(i)
            .ok_or_else(|| bad_row(path, row, "missing right"))?;
        let right = parse_right(raw_right)
            .ok_or_else(|| bad_row(path, row, format!("unrecognized right {raw_right:?}")))?;
        let strike = strike
            .get(i)
            .ok_or_else(|| bad_row(path, row, "missing strike"))?;
        let bid = bid.get(i).ok_or_else(|| bad_row(path, row, "missing bid"))?;
        let ask = ask.get(i).ok_or_else(|| bad_row(path, row, "missing ask"))?;
        if bid < 0.0 || ask < 0.0 || ask + 1e-9 < bid {
            return Err(bad_row(path, row, "crossed or negative quote"));
        }
        let iv = iv.get(i);
        if let Some(v) = iv {
            if v <= 0.0 {
                return Err(bad_row(path, row, "non-positive iv"));
            }
        }

        let quote = OptionQuote {
            contract: OptionContract::new(expiry_date, strike, right),
            ts: snap_ts,
            bid,
            ask,
            iv,
        };
        match chains.last_mut() {
            Some(snap) if snap.ts == snap_ts => snap.quotes.push(quote),
            Some(snap) if snap_ts < snap.ts => {
                return Err(bad_row(path, row, "snapshot timestamp goes backwards"));
            }
            _ => chains.push(ChainSnapshot {
                ts: snap_ts,
                quotes: vec![quote],
            }),
        }
    }
    Ok(chains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use thetalab_core::synth::SynthConfig;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    // ── bars ──

    #[test]
    fn loads_bars_csv() {
        let file = write_csv(
            "ts,open,high,low,close,volume\n\
             2024-03-15 09:30:00,5000.0,5002.0,4999.0,5001.0,1200\n\
             2024-03-15 09:31:00,5001.0,5003.0,5000.5,5002.5,900\n",
        );
        let bars = load_bars_csv(file.path()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(
            bars[0].ts,
            date(2024, 3, 15).and_hms_opt(9, 30, 0).unwrap()
        );
        assert_eq!(bars[0].open, 5000.0);
        assert_eq!(bars[1].volume, 900);
    }

    #[test]
    fn accepts_t_separated_timestamps() {
        let file = write_csv(
            "ts,open,high,low,close,volume\n\
             2024-03-15T09:30:00,5000.0,5000.0,5000.0,5000.0,100\n",
        );
        let bars = load_bars_csv(file.path()).unwrap();
        assert_eq!(bars.len(), 1);
    }

    #[test]
    fn rejects_disordered_bars() {
        let file = write_csv(
            "ts,open,high,low,close,volume\n\
             2024-03-15 09:31:00,5000.0,5000.0,5000.0,5000.0,100\n\
             2024-03-15 09:30:00,5000.0,5000.0,5000.0,5000.0,100\n",
        );
        let err = load_bars_csv(file.path()).unwrap_err();
        match err {
            DataError::BadRow { row, detail, .. } => {
                assert_eq!(row, 3);
                assert!(detail.contains("not after previous"));
            }
            other => panic!("expected bad row, got {other:?}"),
        }
    }

    #[test]
    fn rejects_inconsistent_ohlc() {
        // high below low
        let file = write_csv(
            "ts,open,high,low,close,volume\n\
             2024-03-15 09:30:00,5000.0,4990.0,5010.0,5000.0,100\n",
        );
        let err = load_bars_csv(file.path()).unwrap_err();
        assert!(matches!(err, DataError::BadRow { row: 2, .. }));
    }

    // ── chains ──

    #[test]
    fn groups_consecutive_rows_into_snapshots() {
        let file = write_csv(
            "ts,expiry,strike,right,bid,ask,iv\n\
             2024-03-15 10:00:00,2024-03-15,5040.0,C,1.00,1.20,0.18\n\
             2024-03-15 10:00:00,2024-03-15,4960.0,P,1.10,1.30,\n\
             2024-03-15 10:05:00,2024-03-15,5040.0,CALL,0.90,1.10,0.17\n",
        );
        let chains = load_chains_csv(file.path()).unwrap();
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].quotes.len(), 2);
        assert_eq!(chains[1].quotes.len(), 1);

        let put = &chains[0].quotes[1];
        assert_eq!(put.contract.right, Right::Put);
        assert_eq!(put.contract.strike(), 4960.0);
        assert_eq!(put.iv, None);
        assert_eq!(chains[0].quotes[0].iv, Some(0.18));
    }

    #[test]
    fn accepts_right_spellings() {
        let file = write_csv(
            "ts,expiry,strike,right,bid,ask,iv\n\
             2024-03-15 10:00:00,2024-03-15,5000.0,call,1.0,1.2,0.2\n\
             2024-03-15 10:00:00,2024-03-15,5000.0,p,1.0,1.2,0.2\n",
        );
        let chains = load_chains_csv(file.path()).unwrap();
        assert_eq!(chains[0].quotes[0].contract.right, Right::Call);
        assert_eq!(chains[0].quotes[1].contract.right, Right::Put);
    }

    #[test]
    fn rejects_crossed_quote() {
        let file = write_csv(
            "ts,expiry,strike,right,bid,ask,iv\n\
             2024-03-15 10:00:00,2024-03-15,5000.0,C,1.50,1.20,0.2\n",
        );
        let err = load_chains_csv(file.path()).unwrap_err();
        match err {
            DataError::BadRow { detail, .. } => assert!(detail.contains("crossed")),
            other => panic!("expected bad row, got {other:?}"),
        }
    }

    #[test]
    fn rejects_backwards_snapshot() {
        let file = write_csv(
            "ts,expiry,strike,right,bid,ask,iv\n\
             2024-03-15 10:05:00,2024-03-15,5000.0,C,1.0,1.2,0.2\n\
             2024-03-15 10:00:00,2024-03-15,5000.0,P,1.0,1.2,0.2\n",
        );
        let err = load_chains_csv(file.path()).unwrap_err();
        assert!(matches!(err, DataError::BadRow { row: 3, .. }));
    }

    // ── sources ──

    #[test]
    fn synthetic_load_is_deterministic() {
        let config = DataConfig::Synth(SynthConfig::default());
        let start = date(2024, 3, 14);
        let end = date(2024, 3, 15);
        let a = load_events(&config, start, end).unwrap();
        let b = load_events(&config, start, end).unwrap();
        assert_eq!(a.source, SourceKind::Synthetic);
        assert_eq!(a.digest, b.digest);
        assert_eq!(a.bars.len(), b.bars.len());
        assert!(!a.chains.is_empty());
    }

    #[test]
    fn seed_changes_the_digest() {
        let start = date(2024, 3, 15);
        let end = date(2024, 3, 15);
        let a = load_events(&DataConfig::Synth(SynthConfig::default()), start, end).unwrap();
        let other = SynthConfig {
            seed: 99,
            ..SynthConfig::default()
        };
        let b = load_events(&DataConfig::Synth(other), start, end).unwrap();
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn csv_load_builds_a_tape() {
        let bars = write_csv(
            "ts,open,high,low,close,volume\n\
             2024-03-15 09:30:00,5000.0,5001.0,4999.0,5000.0,100\n\
             2024-03-15 10:00:00,5000.0,5002.0,4999.0,5001.0,100\n",
        );
        let chains = write_csv(
            "ts,expiry,strike,right,bid,ask,iv\n\
             2024-03-15 10:00:00,2024-03-15,5040.0,C,1.00,1.20,0.18\n",
        );
        let config = DataConfig::Csv {
            bars: bars.path().to_path_buf(),
            chains: chains.path().to_path_buf(),
        };
        let loaded = load_events(&config, date(2024, 3, 15), date(2024, 3, 15)).unwrap();
        assert_eq!(loaded.source, SourceKind::Csv);
        assert_eq!(loaded.digest.len(), 64);
        let tape = loaded.into_tape().unwrap();
        assert_eq!(tape.len(), 3);
    }
}
