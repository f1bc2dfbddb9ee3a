//! Values command - evaluate directions into values

use std::path::{Path, PathBuf};

use console::style;
use stool_core::{Values, parse_set_values};
use stool_kube::{Helm, Publisher};

use crate::commands::{Context, load_previous};
use crate::display;
use crate::error::Result;

pub struct ValuesArgs {
    pub directions: String,
    pub previous: Option<PathBuf>,
    pub set: Vec<String>,
    pub stage: Option<String>,
    pub output: Option<PathBuf>,
    pub json: bool,
    pub show_private: bool,
}

pub fn run(context: &Context, args: &ValuesArgs) -> Result<()> {
    let toolkit = context.toolkit()?;
    let directions = context.directions(&toolkit, &args.directions)?;
    let previous = load_previous(args.previous.as_deref())?;
    let overrides = parse_set_values(&args.set)?;

    let evaluator = context.evaluator(&toolkit, args.stage.as_deref());
    let helm = Helm::default();
    let publisher = Publisher::new(&toolkit, &evaluator, &helm);
    let resolution = publisher.resolve(&directions, &previous, &overrides, context.executor(&toolkit)?)?;

    if let Some(output) = &args.output {
        write_values(&resolution.values, &directions, output)?;
        return Ok(());
    }

    let private = if args.show_private {
        Vec::new()
    } else {
        resolution.private_keys()
    };
    if args.json {
        let shown: Values = resolution
            .values
            .iter()
            .map(|(k, v)| {
                let v = if private.contains(&k) { stool_core::diff::MASK } else { v };
                (k.to_string(), v.to_string())
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&shown.0)?);
    } else {
        print!("{}", display::render_values(&resolution.values, &private));
    }
    Ok(())
}

fn write_values(values: &Values, directions: &stool_core::Directions, output: &Path) -> Result<()> {
    values.write_values_file(output, Some(directions))?;
    println!(
        "{} Wrote {} to {}",
        style("✓").green().bold(),
        display::pluralize(values.len(), "value", "values"),
        style(output.display()).cyan()
    );
    Ok(())
}
