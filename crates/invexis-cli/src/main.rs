mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::forecast::ForecastArgs;
use commands::InputArgs;

/// Black-Litterman return blending and Monte Carlo portfolio projection
#[derive(Parser)]
#[command(
    name = "invexis",
    version,
    about = "Black-Litterman return blending and Monte Carlo portfolio projection",
    long_about = "Blends market-implied equilibrium returns with sentiment-derived views \
                  and projects portfolio value with correlated GBM simulation. Every \
                  command reads one JSON document from --input or piped stdin."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log level for diagnostics on stderr (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log returns and sample covariance from price histories
    Returns(InputArgs),
    /// Market-implied equilibrium returns
    Equilibrium(InputArgs),
    /// Pivot-relative views from sentiment scores
    Views(InputArgs),
    /// Black-Litterman posterior returns and optimal weights
    BlackLitterman(InputArgs),
    /// Correlated GBM price paths
    SimulatePaths(InputArgs),
    /// Buy-and-hold portfolio value over simulated paths
    PortfolioValue(InputArgs),
    /// End-to-end forecast from price histories, caps and sentiment
    Forecast(ForecastArgs),
    /// Forecast, then evaluate caller weights against its paths
    Simulate(InputArgs),
    /// Content hash of a forecast input
    CacheKey(InputArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

const DEFAULT_LOG_FILTER: &str = "invexis=warn";

fn init_tracing(level: Option<&str>) {
    let env_filter = match level {
        Some(level) => EnvFilter::try_new(format!("invexis={level}"))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Returns(args) => commands::market::run_returns(args),
        Commands::Equilibrium(args) => commands::market::run_equilibrium(args),
        Commands::Views(args) => commands::views::run_views(args),
        Commands::BlackLitterman(args) => commands::black_litterman::run_black_litterman(args),
        Commands::SimulatePaths(args) => commands::monte_carlo::run_simulate_paths(args),
        Commands::PortfolioValue(args) => commands::monte_carlo::run_portfolio_value(args),
        Commands::Forecast(args) => commands::forecast::run_forecast(args),
        Commands::Simulate(args) => commands::forecast::run_simulate(args),
        Commands::CacheKey(args) => commands::forecast::run_cache_key(args),
        Commands::Version => {
            println!("invexis {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
