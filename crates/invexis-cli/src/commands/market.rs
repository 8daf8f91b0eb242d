use serde_json::Value;

use invexis_core::market::equilibrium::{self, EquilibriumInput};
use invexis_core::market::returns::{self, ReturnsInput};

use super::InputArgs;
use crate::input;

pub fn run_returns(args: InputArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let returns_input: ReturnsInput = input::read_input(args.input.as_deref(), "returns")?;
    let result = returns::estimate_returns(&returns_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_equilibrium(args: InputArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let eq_input: EquilibriumInput = input::read_input(args.input.as_deref(), "equilibrium")?;
    let result = equilibrium::implied_equilibrium_returns(&eq_input)?;
    Ok(serde_json::to_value(result)?)
}
