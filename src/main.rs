use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use stratlab::commands::{
    backtest, compare, export_snapshot, generate_data, list_strategies, optimize,
};
use stratlab::config::RuntimeSettings;

#[derive(Parser)]
#[command(name = "stratlab")]
#[command(about = "Backtesting, grid-search optimization and strategy comparison engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest over a price data file
    Backtest {
        /// Strategy id (see list-strategies)
        strategy: String,
        /// Price data file (.json document or .bin snapshot)
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: PathBuf,
        /// Strategy parameters as JSON, e.g. '{"fast_period": 5, "slow_period": 20}'
        #[arg(long, value_name = "JSON")]
        params: Option<String>,
        /// Starting cash (defaults to 10000)
        #[arg(long)]
        initial_capital: Option<f64>,
        /// Commission fraction per leg (defaults to 0.001)
        #[arg(long)]
        commission: Option<f64>,
        /// Window start (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,
        /// Window end (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<String>,
        /// Write the JSON response to this file
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Grid-search strategy parameters and print the ranked results
    Optimize {
        /// Strategy id to optimize
        strategy: String,
        /// Price data file (.json document or .bin snapshot)
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: PathBuf,
        /// Ranking metric (defaults to sharpe_ratio)
        #[arg(long)]
        metric: Option<String>,
        /// Parameter ranges as JSON, e.g. '{"axes": [{"name": "fast_period", "values": [5, 10]}]}'
        #[arg(long, value_name = "JSON")]
        ranges: Option<String>,
        /// Window start (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,
        /// Window end (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<String>,
        /// Write the ranked results JSON to this file
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Compare several strategies on the same data window
    Compare {
        /// Strategy ids, comma separated
        #[arg(value_delimiter = ',', num_args = 1..)]
        strategies: Vec<String>,
        /// Price data file (.json document or .bin snapshot)
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: PathBuf,
        /// Grid-search each strategy before comparing
        #[arg(long)]
        optimize: bool,
        /// Optimization metric (defaults to sharpe_ratio)
        #[arg(long)]
        metric: Option<String>,
        /// Starting cash (defaults to 10000)
        #[arg(long)]
        initial_capital: Option<f64>,
        /// Commission fraction per leg (defaults to 0.001)
        #[arg(long)]
        commission: Option<f64>,
        /// Window start (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,
        /// Window end (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<String>,
        /// Write the comparison JSON to this file
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// List available strategies with defaults and grids
    ListStrategies,
    /// Write a deterministic synthetic OHLCV data file
    GenerateData {
        /// Destination file (.json)
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,
        /// Ticker symbol to stamp on the data
        #[arg(long, default_value = "SAMPLE")]
        symbol: String,
        /// Number of daily bars to generate
        #[arg(long, default_value_t = 504)]
        bars: usize,
        /// Random walk seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// First bar date (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,
    },
    /// Convert a price data file into a binary snapshot
    ExportSnapshot {
        /// Source data file (.json document or .bin snapshot)
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: PathBuf,
        /// Destination snapshot (.bin)
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let settings = RuntimeSettings::from_env()?;

    info!("Starting stratlab. Backtests are hypothetical; past results do not guarantee future returns.");

    match cli.command {
        Commands::Backtest {
            strategy,
            data_file,
            params,
            initial_capital,
            commission,
            start_date,
            end_date,
            output,
        } => backtest::run(
            &settings,
            &strategy,
            &data_file,
            params.as_deref(),
            initial_capital,
            commission,
            start_date.as_deref(),
            end_date.as_deref(),
            output.as_deref(),
        ),
        Commands::Optimize {
            strategy,
            data_file,
            metric,
            ranges,
            start_date,
            end_date,
            output,
        } => optimize::run(
            &settings,
            &strategy,
            &data_file,
            metric.as_deref(),
            ranges.as_deref(),
            start_date.as_deref(),
            end_date.as_deref(),
            output.as_deref(),
        ),
        Commands::Compare {
            strategies,
            data_file,
            optimize,
            metric,
            initial_capital,
            commission,
            start_date,
            end_date,
            output,
        } => compare::run(
            &settings,
            &strategies,
            &data_file,
            optimize,
            metric.as_deref(),
            initial_capital,
            commission,
            start_date.as_deref(),
            end_date.as_deref(),
            output.as_deref(),
        ),
        Commands::ListStrategies => list_strategies::run(),
        Commands::GenerateData {
            output,
            symbol,
            bars,
            seed,
            start_date,
        } => generate_data::run(&output, &symbol, bars, seed, start_date.as_deref()),
        Commands::ExportSnapshot { data_file, output } => {
            export_snapshot::run(&data_file, &output)
        }
    }
}
