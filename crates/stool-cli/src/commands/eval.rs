//! Eval command - render a single expression against the toolkit environment

use crate::commands::Context;
use crate::error::Result;

pub fn run(context: &Context, expression: &str, stage: Option<&str>) -> Result<()> {
    let toolkit = context.toolkit()?;
    let evaluator = context.evaluator(&toolkit, stage);
    println!("{}", evaluator.eval_str(expression)?);
    Ok(())
}
