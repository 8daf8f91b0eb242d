pub mod black_litterman;
pub mod forecast;
pub mod market;
pub mod monte_carlo;
pub mod views;

use clap::Args;

/// Shared `--input` argument for commands that take one JSON document.
#[derive(Args)]
pub struct InputArgs {
    /// Path to JSON input file (reads piped stdin when omitted)
    #[arg(long)]
    pub input: Option<String>,
}
