//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::jsonl_checkpoint_adapter::JsonlCheckpointAdapter;
use crate::adapters::paper_broker::{CommissionConfig, PaperBroker};
use crate::domain::backtest::{run_backtest, BacktestConfig, BacktestResult};
use crate::domain::config_validation::{
    configured_codes, parse_date, validate_backtest_config, validate_strategy_config,
    validate_sweep_config,
};
use crate::domain::error::AlgotronError;
use crate::domain::metrics::{final_positions, Metrics};
use crate::domain::price_feed::{GapPolicy, PriceFeed};
use crate::domain::strategy::build_strategy;
use crate::domain::sweep::{run_sweep, ParamGrid, SWEEP_SECTION};
use crate::domain::universe::{check_coverage, survey};
use crate::ports::broker_port::BrokerPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;
pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Parser, Debug)]
#[command(name = "algotron", about = "Portfolio allocation and trend strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest and print its metrics
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the daily snapshot table (and trade log) as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print metrics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the [sweep] parameter grid, resuming from a checkpoint
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long, default_value = "sweep_checkpoint.jsonl")]
        checkpoint: PathBuf,
        /// Number of best combinations to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Validate a configuration without running it
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the final portfolio scaled to a given capital
    Positions {
        #[arg(short, long)]
        config: PathBuf,
        /// Defaults to [backtest] initial_capital
        #[arg(long)]
        capital: Option<f64>,
        #[arg(long, default_value_t = 1.0)]
        leverage: f64,
    },
    /// List symbols in the data directory with their date ranges
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            output,
            json,
        } => run_backtest_command(&config, output.as_deref(), json),
        Command::Sweep {
            config,
            checkpoint,
            top,
        } => run_sweep_command(&config, &checkpoint, top),
        Command::Validate { config } => run_validate(&config),
        Command::Positions {
            config,
            capital,
            leverage,
        } => run_positions(&config, capital, leverage),
        Command::ListSymbols { config } => run_list_symbols(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, AlgotronError> {
    FileConfigAdapter::from_file(path)
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, AlgotronError> {
    let gap_policy = match config.get_string("backtest", "gap_policy") {
        Some(raw) => raw.parse::<GapPolicy>()?,
        None => GapPolicy::default(),
    };
    Ok(BacktestConfig {
        codes: configured_codes(config)?,
        start_date: parse_date(config, "start_date")?,
        end_date: parse_date(config, "end_date")?,
        initial_capital: config.get_double("backtest", "initial_capital", DEFAULT_INITIAL_CAPITAL),
        commission_per_trade: config.get_double("backtest", "commission_per_trade", 0.0),
        commission_pct: config.get_double("backtest", "commission_pct", 0.0),
        gap_policy,
    })
}

/// `[backtest] data_dir`, relative to the config file's directory.
pub fn data_dir(config: &dyn ConfigPort, config_path: &Path) -> PathBuf {
    let dir = PathBuf::from(
        config
            .get_string("backtest", "data_dir")
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
    );
    if dir.is_absolute() {
        return dir;
    }
    match config_path.parent() {
        Some(parent) => parent.join(dir),
        None => dir,
    }
}

pub fn new_broker(bt_config: &BacktestConfig) -> PaperBroker {
    PaperBroker::with_commission(
        bt_config.initial_capital,
        CommissionConfig {
            commission_per_trade: bt_config.commission_per_trade,
            commission_pct: bt_config.commission_pct,
        },
    )
}

/// A validated config with its price data loaded.
struct Session {
    config: FileConfigAdapter,
    backtest: BacktestConfig,
    feed: PriceFeed,
}

impl Session {
    fn open(config_path: &Path) -> Result<Self, AlgotronError> {
        info!(path = %config_path.display(), "loading config");
        let config = load_config(config_path)?;
        validate_backtest_config(&config)?;
        validate_strategy_config(&config)?;
        let backtest = build_backtest_config(&config)?;

        let data = CsvAdapter::new(data_dir(&config, config_path));
        check_coverage(&data, &backtest.codes, backtest.start_date, backtest.end_date)?;
        let feed = PriceFeed::load(
            &data,
            &backtest.codes,
            backtest.start_date,
            backtest.end_date,
            backtest.gap_policy,
        )?;
        info!(bars = feed.len(), instruments = feed.instruments().len(), "price data aligned");

        Ok(Self {
            config,
            backtest,
            feed,
        })
    }

    fn backtest(&self) -> Result<BacktestResult, AlgotronError> {
        let strategy = build_strategy(&self.config, self.feed.instruments())?;
        let mut broker = new_broker(&self.backtest);
        run_backtest(&self.feed, strategy.as_ref(), &mut broker)
    }
}

fn run_backtest_command(
    config_path: &Path,
    output: Option<&Path>,
    json: bool,
) -> Result<(), AlgotronError> {
    let session = Session::open(config_path)?;
    let result = session.backtest()?;
    let metrics = Metrics::compute(&result);

    if json {
        let text = serde_json::to_string_pretty(&metrics).map_err(|e| AlgotronError::DataSource {
            reason: format!("metrics serialization failed: {e}"),
        })?;
        println!("{text}");
    } else {
        print_metrics(&result, &metrics);
    }

    if let Some(path) = output {
        CsvReportAdapter::new().write(&result, path)?;
        println!("Report written to: {}", path.display());
    }
    Ok(())
}

fn print_metrics(result: &BacktestResult, metrics: &Metrics) {
    let (first, last) = match (result.snapshots.first(), result.snapshots.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return,
    };
    println!("=== {} ===", result.strategy);
    println!("Period:            {} to {}", first.date, last.date);
    println!("Final Value:       {:.2}", last.portfolio_value);
    println!("Cumulative Return: {:.2}%", metrics.cumulative_return * 100.0);
    println!("CAGR:              {:.2}%", metrics.cagr * 100.0);
    println!("Volatility:        {:.2}%", metrics.volatility * 100.0);
    println!("Sharpe Ratio:      {:.2}", metrics.sharpe);
    println!("Max Drawdown:      -{:.1}%", metrics.max_drawdown * 100.0);
    println!("Max DD Duration:   {} bars", metrics.max_drawdown_duration);
    println!("Total Trades:      {}", metrics.total_trades);
    println!("Commission:        {:.2}", metrics.total_commission);
    println!("Dividends:         {:.2}", metrics.total_dividends);
}

fn run_sweep_command(config_path: &Path, checkpoint: &Path, top: usize) -> Result<(), AlgotronError> {
    let session = Session::open(config_path)?;
    let grid = ParamGrid::from_config(&session.config)?;
    info!(
        keys = ?grid.keys(),
        full_size = grid.full_size(),
        "parameter grid"
    );

    let backtest = session.backtest.clone();
    let factory = move || -> Box<dyn BrokerPort> { Box::new(new_broker(&backtest)) };
    let mut sink = JsonlCheckpointAdapter::new(checkpoint);
    let outcome = run_sweep(&session.feed, &session.config, &grid, &factory, &mut sink)?;

    println!(
        "{} combinations: {} resumed, {} run, {} failed",
        outcome.records.len() + outcome.failed,
        outcome.resumed,
        outcome.ran,
        outcome.failed
    );
    for (rank, record) in outcome.ranked().into_iter().take(top).enumerate() {
        let params: Vec<String> = record
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        println!(
            "{:>3}. sharpe {:>6.2}  cagr {:>7.2}%  maxdd {:>6.1}%  {}",
            rank + 1,
            record.metrics.sharpe,
            record.metrics.cagr * 100.0,
            record.metrics.max_drawdown * 100.0,
            params.join(" ")
        );
    }
    println!("Checkpoint: {}", checkpoint.display());
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), AlgotronError> {
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;
    validate_strategy_config(&config)?;
    let backtest = build_backtest_config(&config)?;
    println!("backtest: {} codes, {} to {}", backtest.codes.len(), backtest.start_date, backtest.end_date);

    let kind = config.get_string("strategy", "kind").unwrap_or_default();
    let strategy = build_strategy(&config, &backtest.codes)?;
    println!(
        "strategy: {} (warmup {} bars, rebalance every {} bars)",
        kind.trim(),
        strategy.warmup_bars(),
        strategy.rebalance_period()
    );

    if !config.keys(SWEEP_SECTION).is_empty() {
        let combinations = validate_sweep_config(&config)?;
        println!("sweep: {combinations} combinations");
    }

    let data = CsvAdapter::new(data_dir(&config, config_path));
    for coverage in check_coverage(&data, &backtest.codes, backtest.start_date, backtest.end_date)? {
        println!(
            "  {}: {} bars [{} .. {}]",
            coverage.code, coverage.bars, coverage.first, coverage.last
        );
    }
    println!("Configuration is valid");
    Ok(())
}

fn run_positions(
    config_path: &Path,
    capital: Option<f64>,
    leverage: f64,
) -> Result<(), AlgotronError> {
    let session = Session::open(config_path)?;
    let result = session.backtest()?;
    let Some(last) = result.snapshots.last() else {
        return Err(AlgotronError::NoData {
            code: session.backtest.codes.join(","),
        });
    };
    let capital = capital.unwrap_or(session.backtest.initial_capital);
    if capital <= 0.0 || leverage <= 0.0 {
        return Err(AlgotronError::invalid(
            "positions",
            "capital",
            "capital and leverage must be positive",
        ));
    }

    println!("Positions as of {} for capital {capital:.2} x{leverage}", last.date);
    println!("{:<8} {:>8} {:>12} {:>10} {:>14}", "code", "weight", "price", "shares", "value");
    for target in final_positions(last, &session.feed.last_closes(), capital, leverage) {
        println!(
            "{:<8} {:>7.2}% {:>12.2} {:>10} {:>14.2}",
            target.instrument,
            target.weight * 100.0,
            target.price,
            target.expected_size,
            target.expected_value
        );
    }
    Ok(())
}

fn run_list_symbols(config_path: &Path) -> Result<(), AlgotronError> {
    let config = load_config(config_path)?;
    let data = CsvAdapter::new(data_dir(&config, config_path));
    let symbols = data.list_symbols()?;
    if symbols.is_empty() {
        println!("No symbols found");
        return Ok(());
    }
    for coverage in survey(&data, &symbols) {
        println!(
            "{:<8} {} .. {}  {} bars",
            coverage.code, coverage.first, coverage.last, coverage.bars
        );
    }
    Ok(())
}
