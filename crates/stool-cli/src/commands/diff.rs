//! Diff command - show what publishing would change

use std::path::PathBuf;

use console::style;
use stool_core::parse_set_values;
use stool_kube::{Helm, Publisher};

use crate::commands::{Context, load_previous};
use crate::display;
use crate::error::Result;

pub fn run(
    context: &Context,
    directions: &str,
    previous: Option<PathBuf>,
    set: &[String],
    allow: Option<&[String]>,
    stage: Option<&str>,
    json: bool,
) -> Result<()> {
    let toolkit = context.toolkit()?;
    let directions = context.directions(&toolkit, directions)?;
    let previous = load_previous(previous.as_deref())?;
    let overrides = parse_set_values(set)?;

    let evaluator = context.evaluator(&toolkit, stage);
    let helm = Helm::default();
    let publisher = Publisher::new(&toolkit, &evaluator, &helm);
    let resolution = publisher.resolve(&directions, &previous, &overrides, context.executor(&toolkit)?)?;

    let report = resolution.report();
    if json {
        println!("{}", serde_json::to_string(&report.to_list())?);
        if let Some(allow) = allow {
            resolution.check_allowed(allow)?;
        }
        return Ok(());
    }

    print!("{}", display::render_diff(&report));
    let hidden = resolution.diff.len() - report.len();
    if hidden > 0 {
        println!(
            "{} {} not shown",
            style("→").blue(),
            display::pluralize(hidden, "private change", "private changes")
        );
    }
    if let Some(allow) = allow {
        resolution.check_allowed(allow)?;
        println!("{} All changes allowed", style("✓").green().bold());
    }
    Ok(())
}
