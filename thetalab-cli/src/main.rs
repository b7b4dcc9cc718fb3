//! ThetaLab CLI — run, sweep, and synth commands.
//!
//! Commands:
//! - `run` — execute one backtest job from a TOML file and save artifacts
//! - `sweep` — replay a parameter grid over the job's tape and rank results
//! - `synth` — write synthetic bar/chain CSVs for inspection and replay

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use thetalab_core::config::StrategyConfig;
use thetalab_core::synth::{self, SynthConfig};
use thetalab_runner::{
    export_events_csv, load_events, run_job, run_sweep, save_artifacts, BacktestResult,
    DataProvenance, JobConfig, ParamGrid, RankMetric, SweepResults,
};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "thetalab",
    about = "ThetaLab — same-day option expiration backtesting engine"
)]
struct Cli {
    /// Log filter when RUST_LOG is unset (e.g. info, thetalab_runner=debug).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest job from a TOML file.
    Run {
        /// Path to the job file.
        job: PathBuf,

        /// Artifact directory. Overrides `output_dir` from the job file.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Run a parameter grid over one job's tape and rank the results.
    Sweep {
        /// Path to the base job file.
        job: PathBuf,

        /// Path to a TOML grid file. Defaults to the strangle starter grid.
        #[arg(long)]
        grid: Option<PathBuf>,

        /// Rank metric: total_return, win_rate, profit_factor, sharpe.
        #[arg(long, default_value = "total_return")]
        metric: String,

        /// How many rows to print.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Write the full leaderboard CSV here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Generate synthetic bar/chain CSVs that the CSV source reads back.
    Synth {
        /// First session date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// Last session date (YYYY-MM-DD). Defaults to `start`.
        #[arg(long)]
        end: Option<String>,

        /// Generator seed.
        #[arg(long, default_value_t = 7)]
        seed: u64,

        /// Opening spot level.
        #[arg(long, default_value_t = 5000.0)]
        spot: f64,

        /// Reference volatility for quote pricing.
        #[arg(long, default_value_t = 0.18)]
        vol: f64,

        /// Output directory for bars.csv and chains.csv.
        #[arg(long, default_value = "data")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Run { job, output_dir } => run_cmd(&job, output_dir),
        Commands::Sweep {
            job,
            grid,
            metric,
            top,
            output,
        } => sweep_cmd(&job, grid, &metric, top, output),
        Commands::Synth {
            start,
            end,
            seed,
            spot,
            vol,
            out,
        } => synth_cmd(&start, end.as_deref(), seed, spot, vol, &out),
    }
}

fn run_cmd(job_path: &Path, output_dir: Option<PathBuf>) -> Result<()> {
    let job = JobConfig::load(job_path)?;
    let result = run_job(&job)?;

    print_summary(&result);

    if let Some(dir) = output_dir.or(job.output_dir) {
        let run_dir = save_artifacts(&result, &dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }

    Ok(())
}

fn sweep_cmd(
    job_path: &Path,
    grid_path: Option<PathBuf>,
    metric: &str,
    top: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    let metric: RankMetric = metric.parse().map_err(anyhow::Error::msg)?;

    let job = JobConfig::load(job_path)?;
    job.run.validate()?;

    let grid: ParamGrid = match grid_path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read grid file {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("failed to parse grid file {}", path.display()))?
        }
        None => ParamGrid::strangle_default(),
    };

    let loaded = load_events(&job.data, job.run.start_date, job.run.end_date)?;
    let provenance = DataProvenance {
        source: loaded.source,
        dataset_digest: loaded.digest.clone(),
    };
    let tape = loaded.into_tape()?;

    let results = run_sweep(&job.run, &grid, &tape, &provenance)?;
    if results.is_empty() {
        println!("Grid produced no valid configurations.");
        return Ok(());
    }

    print_leaderboard(&results, metric, top);

    if let Some(path) = output {
        let csv = results.leaderboard_csv(metric)?;
        std::fs::write(&path, csv)
            .with_context(|| format!("failed to write leaderboard to {}", path.display()))?;
        println!();
        println!("Leaderboard saved to: {}", path.display());
    }

    Ok(())
}

fn synth_cmd(
    start: &str,
    end: Option<&str>,
    seed: u64,
    spot: f64,
    vol: f64,
    out: &Path,
) -> Result<()> {
    let start_date = NaiveDate::parse_from_str(start, "%Y-%m-%d")?;
    let end_date = end
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()?
        .unwrap_or(start_date);

    let config = SynthConfig {
        seed,
        start_spot: spot,
        vol,
        ..SynthConfig::default()
    };
    let data = synth::generate(&config, start_date, end_date)?;
    println!(
        "Generated {} bars and {} chain snapshots.",
        data.bars.len(),
        data.chains.len()
    );

    let (bars_path, chains_path) = export_events_csv(&data.bars, &data.chains, out)?;
    println!("Wrote: {}", bars_path.display());
    println!("Wrote: {}", chains_path.display());

    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Underlying:     {}", result.config.underlying);
    println!(
        "Period:         {} to {}",
        result.config.start_date, result.config.end_date
    );
    println!("Strategy:       {}", result.config.strategy.tag());
    println!("Run Id:         {}", &result.run_id[..12]);
    println!(
        "Data:           {:?} ({})",
        result.provenance.source,
        &result.provenance.dataset_digest[..12]
    );
    println!("Trades:         {}", m.trade_count);
    if !result.rejections.is_empty() {
        println!("Rejections:     {}", result.rejections.len());
    }
    println!();
    println!("--- Performance ---");
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Avg Win:        ${:.2}", m.avg_win);
    println!("Avg Loss:       ${:.2}", m.avg_loss);
    println!("Commission:     ${:.2}", m.total_commission);
    println!("Slippage:       ${:.2}", m.total_slippage);
    println!("Final Cash:     ${:.2}", result.final_cash);
    println!();
}

fn print_leaderboard(results: &SweepResults, metric: RankMetric, top: usize) {
    println!();
    println!("=== Sweep Leaderboard ({} configs) ===", results.len());
    println!(
        "{:<5} {:<13} {:>6} {:>7} {:>6} {:>7} {:>9} {:>7} {:>7} {:>8}",
        "Rank", "Run Id", "Delta", "Target", "Stop", "Trades", "Return%", "Win%", "PF", "Sharpe"
    );
    for (i, result) in results.top_n(top, metric).iter().enumerate() {
        let delta = match &result.config.strategy {
            StrategyConfig::ShortStrangle(p) => format!("{:.2}", p.target_delta),
            _ => "-".into(),
        };
        println!(
            "{:<5} {:<13} {:>6} {:>7} {:>6} {:>7} {:>9.2} {:>7.1} {:>7.2} {:>8.3}",
            i + 1,
            &result.run_id[..12],
            delta,
            opt_cell(result.config.risk.profit_target_pct),
            opt_cell(result.config.risk.stop_loss_pct),
            result.metrics.trade_count,
            result.metrics.total_return * 100.0,
            result.metrics.win_rate * 100.0,
            result.metrics.profit_factor,
            result.metrics.sharpe,
        );
    }
}

fn opt_cell(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "-".into())
}
