//! Job files: one TOML document describing a full run.
//!
//! A job pairs a core [`RunConfig`] with a data source. Keeping both in a
//! single file means a run is reproducible from the file alone: the run id
//! hashes the engine parameters and the provenance digest covers the events.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thetalab_core::config::RunConfig;
use thetalab_core::synth::SynthConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read job file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse job file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
}

/// Where the event streams come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataConfig {
    /// Minute bars and chain snapshots from CSV files on disk.
    Csv { bars: PathBuf, chains: PathBuf },
    /// Deterministic synthetic streams, seeded from the job file.
    Synth(SynthConfig),
}

/// A complete backtest job: engine parameters plus an event source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub run: RunConfig,
    pub data: DataConfig,
    /// Directory for exported artifacts. Unset means no export.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl JobConfig {
    /// Load and parse a TOML job file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }
}
