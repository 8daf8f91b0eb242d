use serde_json::Value;

use invexis_core::views::sentiment::{self, ViewInput};

use super::InputArgs;
use crate::input;

pub fn run_views(args: InputArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let view_input: ViewInput = input::read_input(args.input.as_deref(), "views")?;
    let result = sentiment::generate_views(&view_input)?;
    Ok(serde_json::to_value(result)?)
}
