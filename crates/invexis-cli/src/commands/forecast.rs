use clap::Args;
use serde::Deserialize;
use serde_json::Value;

use invexis_core::pipeline::{self, ForecastInput, SimulationRequest};
use invexis_core::ComputationOutput;

use super::InputArgs;
use crate::input;

/// Arguments for the end-to-end forecast
#[derive(Args)]
pub struct ForecastArgs {
    /// Path to JSON input file (reads piped stdin when omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// Include every simulated path instead of the summary
    #[arg(long)]
    pub full: bool,
}

/// Forecast input plus the caller weights to evaluate.
#[derive(Deserialize)]
struct SimulateInput {
    forecast: ForecastInput,
    #[serde(flatten)]
    request: SimulationRequest,
}

pub fn run_forecast(args: ForecastArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let forecast_input: ForecastInput = input::read_input(args.input.as_deref(), "forecast")?;
    let output = pipeline::run_forecast(&forecast_input)?;
    if args.full {
        return Ok(serde_json::to_value(output)?);
    }

    let summary = ComputationOutput {
        result: output.result.summary(),
        methodology: output.methodology,
        assumptions: output.assumptions,
        warnings: output.warnings,
        metadata: output.metadata,
    };
    Ok(serde_json::to_value(summary)?)
}

pub fn run_simulate(args: InputArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let sim_input: SimulateInput = input::read_input(args.input.as_deref(), "simulate")?;
    let forecast = pipeline::run_forecast(&sim_input.forecast)?;
    let mut result = pipeline::simulate_portfolio(&forecast.result, &sim_input.request)?;

    let mut warnings = forecast.warnings;
    warnings.append(&mut result.warnings);
    result.warnings = warnings;
    Ok(serde_json::to_value(result)?)
}

pub fn run_cache_key(args: InputArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let forecast_input: ForecastInput = input::read_input(args.input.as_deref(), "cache-key")?;
    let key = pipeline::cache_key(&forecast_input)?;
    Ok(serde_json::json!({ "cache_key": key }))
}
