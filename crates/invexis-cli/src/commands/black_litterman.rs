use serde_json::Value;

use invexis_core::black_litterman::blend::{self, BlackLittermanInput};

use super::InputArgs;
use crate::input;

pub fn run_black_litterman(args: InputArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let bl_input: BlackLittermanInput =
        input::read_input(args.input.as_deref(), "black-litterman")?;
    let result = blend::run_black_litterman(&bl_input)?;
    Ok(serde_json::to_value(result)?)
}
