use serde_json::Value;

use invexis_core::monte_carlo::paths::{self, PathSimulationInput};
use invexis_core::monte_carlo::portfolio::{self, PortfolioValueInput};

use super::InputArgs;
use crate::input;

pub fn run_simulate_paths(args: InputArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let sim_input: PathSimulationInput =
        input::read_input(args.input.as_deref(), "simulate-paths")?;
    let result = paths::simulate_correlated_paths(&sim_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_portfolio_value(args: InputArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let pv_input: PortfolioValueInput =
        input::read_input(args.input.as_deref(), "portfolio-value")?;
    let result = portfolio::run_portfolio_value(&pv_input)?;
    Ok(serde_json::to_value(result)?)
}
