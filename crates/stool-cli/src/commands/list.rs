//! List command - show the toolkit catalogue

use console::style;

use crate::commands::Context;
use crate::error::Result;

pub fn run(context: &Context) -> Result<()> {
    let toolkit = context.toolkit()?;

    println!("{} {}", style("Toolkit").bold(), style(toolkit.version()).yellow());
    if let Some(image) = toolkit.image() {
        println!("  {} {image}", style("image:").dim());
    }

    println!("\n{}", style("Directions:").bold());
    let mut names = toolkit.directions_names();
    names.sort_unstable();
    for name in names {
        let directions = toolkit.directions(name)?;
        let chart = directions
            .chart
            .as_deref()
            .map(|c| format!(" {}", style(format!("(chart {c})")).dim()))
            .unwrap_or_default();
        println!("  {name}{chart}");
    }

    let mut charts: Vec<_> = toolkit.charts().collect();
    charts.sort_by(|a, b| a.name.cmp(&b.name));
    if !charts.is_empty() {
        println!("\n{}", style("Charts:").bold());
        for chart in charts {
            println!(
                "  {} {}",
                chart.name,
                style(chart.version.as_deref().unwrap_or("-")).yellow()
            );
        }
    }

    if !toolkit.scripts().is_empty() {
        println!("\n{}", style("Scripts:").bold());
        for script in toolkit.scripts() {
            println!("  {}", script.name);
        }
    }
    Ok(())
}
