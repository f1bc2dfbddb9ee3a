//! Validate command - check every builtin bundle merges

use console::style;

use crate::commands::Context;
use crate::display::pluralize;
use crate::error::Result;

pub fn run(context: &Context) -> Result<()> {
    let toolkit = context.toolkit()?;
    toolkit.validate()?;

    let charts = toolkit.charts().count();
    println!(
        "{} Toolkit {} is valid: {}, {}, {}",
        style("✓").green().bold(),
        style(toolkit.version()).yellow(),
        pluralize(toolkit.directions_names().len(), "directions bundle", "directions bundles"),
        pluralize(charts, "chart", "charts"),
        pluralize(toolkit.scripts().len(), "script", "scripts"),
    );
    Ok(())
}
