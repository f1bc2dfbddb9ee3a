//! Describe command - show merged directions and their inheritance

use crate::commands::Context;
use crate::display;
use crate::error::Result;

pub fn run(context: &Context, directions: &str, yaml: bool) -> Result<()> {
    let toolkit = context.toolkit()?;
    let directions = context.directions(&toolkit, directions)?;
    let merged = directions.merged(&toolkit)?;

    if yaml {
        print!("{}", merged.to_yaml_string()?);
    } else {
        let chain = directions.chain(&toolkit)?;
        print!("{}", display::render_directions(&merged, &chain));
    }
    Ok(())
}
