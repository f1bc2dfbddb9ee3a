//! Display formatting for CLI output
//!
//! Provides structured display for:
//! - Change sets with colored markers
//! - Directions with their inheritance chain

use console::style;
use stool_core::diff::MASK;
use stool_core::{Diff, Directions, Values};

/// Render a change set, one line per marker
pub fn render_diff(diff: &Diff) -> String {
    if diff.is_empty() {
        return format!("{}\n", style("no changes").dim());
    }
    let mut out = String::new();
    for line in diff.to_string().lines() {
        let styled = match line.chars().next() {
            Some('-') => style(line).red().to_string(),
            Some('+') => style(line).green().to_string(),
            Some('~') => style(line).yellow().to_string(),
            _ => line.to_string(),
        };
        out.push_str(&styled);
        out.push('\n');
    }
    out
}

/// Render a merged bundle. `chain` lists the bundles it was folded from.
pub fn render_directions(merged: &Directions, chain: &[&Directions]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", style(&merged.subject).cyan().bold()));
    let bases: Vec<&str> = chain
        .iter()
        .filter(|d| d.subject != merged.subject)
        .map(|d| d.subject.as_str())
        .collect();
    if !bases.is_empty() {
        out.push_str(&format!("  {} {}\n", style("extends:").dim(), bases.join(", ")));
    }
    if let Some(chart) = &merged.chart {
        let version = merged
            .chart_version
            .as_deref()
            .map(|v| format!(" {v}"))
            .unwrap_or_default();
        out.push_str(&format!("  {} {chart}{version}\n", style("chart:").dim()));
    }
    if let Some(origin) = &merged.origin {
        out.push_str(&format!("  {} {origin}\n", style("origin:").dim()));
    }
    if let Some(author) = &merged.author {
        out.push_str(&format!("  {} {author}\n", style("author:").dim()));
    }
    out.push('\n');

    for direction in merged.directions() {
        let mut flags = Vec::new();
        if direction.private {
            flags.push("private");
        }
        if direction.extra {
            flags.push("extra");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" {}", style(format!("[{}]", flags.join(", "))).yellow())
        };
        let shown = match direction.value() {
            Some(_) if direction.private => MASK.to_string(),
            Some(value) => value.to_string(),
            None => style(&direction.expression).blue().to_string(),
        };
        out.push_str(&format!("  {}{flags}: {shown}\n", direction.name));
        if let Some(doc) = &direction.doc {
            for line in doc.lines() {
                out.push_str(&format!("      {}\n", style(format!("# {line}")).dim()));
            }
        }
    }
    out
}

/// Values as `name: value` lines, private keys masked
pub fn render_values(values: &Values, private: &[&str]) -> String {
    let mut out = String::new();
    for (key, value) in values.iter() {
        let value = if private.contains(&key) { MASK } else { value };
        out.push_str(&format!("{}: {value}\n", style(key).cyan()));
    }
    out
}

pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}
