//! trendband CLI: run the trading loop, sweep signal parameters, check configs.
//!
//! Commands:
//! - `run` starts the orchestrator from a TOML config until Ctrl-C or the cycle cap
//! - `sweep` scores generator parameter combinations over a candle series
//! - `check-config` validates a config file and prints it with secrets masked

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trendband_core::strategy::StrategyConfig;
use trendband_core::SystemClock;
use trendband_runner::{
    load_candles_csv, synthetic_candles, ExchangeRegistry, Orchestrator, ParamGrid, ParamSweep,
    RunSummary, SweepResults, SystemConfig,
};

#[derive(Parser)]
#[command(
    name = "trendband",
    about = "trendband: trend/band signal trading loop with a paper venue"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop until Ctrl-C or the configured cycle cap.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Stop after this many cycles. Overrides `runtime.max_cycles`.
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Score signal-generator parameter combinations over a candle series.
    Sweep {
        /// CSV file with timestamp,open,high,low,close,volume rows.
        #[arg(long, conflicts_with = "synthetic")]
        candles: Option<PathBuf>,

        /// Generate this many synthetic bars instead of reading a file.
        #[arg(long)]
        synthetic: Option<usize>,

        /// Seed for synthetic bars.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Starting price for synthetic bars.
        #[arg(long, default_value_t = 50_000.0)]
        start_price: f64,

        /// Optional TOML config whose `[strategy]` section is the sweep base.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of results to print.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Print the results as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Evaluate combinations on a single thread.
        #[arg(long, default_value_t = false)]
        sequential: bool,
    },
    /// Validate a config file and print it with credentials masked.
    CheckConfig {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, cycles } => cmd_run(config, cycles).await,
        Commands::Sweep {
            candles,
            synthetic,
            seed,
            start_price,
            config,
            top,
            json,
            sequential,
        } => cmd_sweep(
            SweepSource::from_args(candles, synthetic, seed, start_price)?,
            config,
            top,
            json,
            sequential,
        ),
        Commands::CheckConfig { config } => cmd_check_config(config),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn cmd_run(path: PathBuf, cycles: Option<u64>) -> Result<()> {
    let mut config = SystemConfig::load(&path)
        .with_context(|| format!("loading config {}", path.display()))?;
    if let Some(cycles) = cycles {
        if cycles == 0 {
            bail!("--cycles must be at least 1");
        }
        config.runtime.max_cycles = Some(cycles);
    }

    let orchestrator = Orchestrator::new(
        config,
        Arc::new(ExchangeRegistry::new()),
        Arc::new(SystemClock),
    )?;
    let handle = orchestrator.handle();

    let interrupt = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("received Ctrl-C, shutting down");
                interrupt.shutdown();
            }
            Err(e) => warn!(error = %e, "could not install Ctrl-C handler"),
        }
    });

    let summary = orchestrator.run().await?;
    print_run_summary(&summary)?;
    Ok(())
}

fn print_run_summary(summary: &RunSummary) -> Result<()> {
    let counters = &summary.status.counters;
    info!(
        cycles = counters.cycles,
        entries = counters.entries_filled,
        exits = counters.exits_filled,
        errors = counters.errors,
        "run finished"
    );
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

enum SweepSource {
    Csv(PathBuf),
    Synthetic {
        bars: usize,
        seed: u64,
        start_price: f64,
    },
}

impl SweepSource {
    fn from_args(
        candles: Option<PathBuf>,
        synthetic: Option<usize>,
        seed: u64,
        start_price: f64,
    ) -> Result<Self> {
        match (candles, synthetic) {
            (Some(path), None) => Ok(Self::Csv(path)),
            (None, Some(bars)) if bars > 0 => Ok(Self::Synthetic {
                bars,
                seed,
                start_price,
            }),
            (None, Some(_)) => bail!("--synthetic must be at least 1"),
            _ => bail!("pass either --candles <csv> or --synthetic <bars>"),
        }
    }
}

fn cmd_sweep(
    source: SweepSource,
    config: Option<PathBuf>,
    top: usize,
    json: bool,
    sequential: bool,
) -> Result<()> {
    let base = match config {
        Some(path) => SystemConfig::from_file(&path)
            .with_context(|| format!("loading config {}", path.display()))?
            .strategy,
        None => StrategyConfig::default(),
    };

    let candles = match source {
        SweepSource::Csv(path) => load_candles_csv(&path)
            .with_context(|| format!("loading candles {}", path.display()))?,
        SweepSource::Synthetic {
            bars,
            seed,
            start_price,
        } => synthetic_candles(bars, seed, start_price),
    };

    let results = ParamSweep::new()
        .with_parallelism(!sequential)
        .sweep(&ParamGrid::default(), &base, &candles)?;

    if json {
        println!("{}", serde_json::to_string_pretty(results.top_n(top))?);
    } else {
        print_sweep_table(&results, top);
    }
    Ok(())
}

fn print_sweep_table(results: &SweepResults, top: usize) {
    println!();
    println!("=== Parameter Sweep ({} combinations) ===", results.len());
    println!(
        "{:>4}  {:>4}  {:>4}  {:>6}  {:>5}  {:>7}  {:>8}  {:>6}",
        "rank", "fast", "slow", "period", "mult", "signals", "avg conf", "score"
    );
    for (rank, result) in results.top_n(top).iter().enumerate() {
        println!(
            "{:>4}  {:>4}  {:>4}  {:>6}  {:>5.1}  {:>7}  {:>8.3}  {:>6.3}",
            rank + 1,
            result.config.fast_window,
            result.config.slow_window,
            result.config.band_period,
            result.config.band_multiplier,
            result.signal_count,
            result.avg_confidence,
            result.score,
        );
    }
    println!();
}

fn cmd_check_config(path: PathBuf) -> Result<()> {
    let config = SystemConfig::load(&path)
        .with_context(|| format!("loading config {}", path.display()))?;
    let rendered = config.redacted().to_toml_string()?;
    info!(path = %path.display(), "config is valid");
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sweep_needs_exactly_one_source() {
        assert!(SweepSource::from_args(None, None, 1, 100.0).is_err());
        assert!(SweepSource::from_args(None, Some(0), 1, 100.0).is_err());
        assert!(matches!(
            SweepSource::from_args(None, Some(300), 1, 100.0),
            Ok(SweepSource::Synthetic { bars: 300, .. })
        ));
        assert!(Cli::try_parse_from([
            "trendband",
            "sweep",
            "--candles",
            "a.csv",
            "--synthetic",
            "5"
        ])
        .is_err());
    }

    #[test]
    fn run_accepts_cycle_override() {
        let cli = Cli::try_parse_from(["trendband", "run", "--config", "c.toml", "--cycles", "3"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Run { cycles: Some(3), .. }
        ));
    }
}
