//! Publish command - apply evaluated directions to a release

use std::path::PathBuf;

use console::style;
use stool_core::parse_set_values;
use stool_kube::{Helm, PublishOptions, Publisher};

use crate::commands::{Context, load_previous};
use crate::display;
use crate::error::Result;

pub struct PublishArgs {
    pub directions: String,
    pub release: String,
    pub previous: Option<PathBuf>,
    pub set: Vec<String>,
    pub allow: Option<Vec<String>>,
    pub stage: Option<String>,
    pub upgrade: bool,
    pub dry_run: bool,
    /// Where to store the applied values for the next publish
    pub save: Option<PathBuf>,
    pub helm: Option<PathBuf>,
}

pub fn run(context: &Context, args: &PublishArgs) -> Result<()> {
    let toolkit = context.toolkit()?;
    let directions = context.directions(&toolkit, &args.directions)?;
    let previous = load_previous(args.previous.as_deref())?;

    println!(
        "{} Publishing {} as release {}",
        style("→").blue().bold(),
        style(&directions.subject).cyan(),
        style(&args.release).cyan()
    );

    let options = PublishOptions {
        release: args.release.clone(),
        upgrade: args.upgrade,
        dry_run: args.dry_run,
        allow: args.allow.clone(),
        overrides: parse_set_values(&args.set)?,
        kube_context: context.kube_context().map(str::to_string),
    };
    let evaluator = context.evaluator(&toolkit, args.stage.as_deref());
    let helm = args.helm.clone().map(Helm::new).unwrap_or_default();
    let publisher = Publisher::new(&toolkit, &evaluator, &helm);
    let outcome = publisher.publish(&directions, &previous, context.executor(&toolkit)?, &options)?;

    print!("{}", display::render_diff(&outcome.diff));
    match &outcome.output {
        None => println!(
            "{} Dry run - would {} {} with chart {}",
            style("✓").green().bold(),
            if args.upgrade { "upgrade" } else { "install" },
            style(&args.release).cyan(),
            style(&outcome.chart).yellow()
        ),
        Some(output) => {
            if !output.trim().is_empty() {
                println!("{}", output.trim_end());
            }
            println!(
                "{} Published {} with chart {}",
                style("✓").green().bold(),
                style(&args.release).cyan(),
                style(&outcome.chart).yellow()
            );
            if let Some(save) = &args.save {
                outcome.values.write_values_file(save, Some(&directions))?;
                println!("{} Saved values to {}", style("→").blue(), save.display());
            }
        }
    }
    Ok(())
}
