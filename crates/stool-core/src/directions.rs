//! Named, inheritable bundles of directions
//!
//! A [`Directions`] bundle is loaded from a YAML document whose reserved
//! upper-case keys carry the bundle metadata and whose remaining keys are
//! individual [`Direction`]s:
//!
//! ```yaml
//! DIRECTIONS: web
//! EXTENDS: base
//! CHART: webapp
//! replicas: 2
//! url:
//!   doc: public url
//!   expr: "https://${ stool.fqdn }"
//! ```

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value as YamlValue};

use crate::direction::{Direction, scalar_text, to_expression};
use crate::error::{CoreError, Result};
use crate::toolkit::Toolkit;

pub const DIRECTIONS: &str = "DIRECTIONS";
pub const EXTENDS: &str = "EXTENDS";
pub const CHART: &str = "CHART";
pub const CHART_VERSION: &str = "CHART-VERSION";
pub const ORIGIN: &str = "ORIGIN";
pub const AUTHOR: &str = "AUTHOR";

/// An ordered bundle of directions with inheritance metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Directions {
    pub subject: String,
    pub origin: Option<String>,
    pub author: Option<String>,
    pub chart: Option<String>,
    pub chart_version: Option<String>,
    pub bases: Vec<String>,
    directions: IndexMap<String, Direction>,
}

impl Directions {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            origin: None,
            author: None,
            chart: None,
            chart_version: None,
            bases: Vec::new(),
            directions: IndexMap::new(),
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.bases.push(base.into());
        self
    }

    pub fn with_chart(mut self, chart: impl Into<String>, version: Option<String>) -> Self {
        self.chart = Some(chart.into());
        self.chart_version = version;
        self
    }

    /// Parse a directions document from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let doc: YamlValue = serde_yaml::from_str(yaml)?;
        Self::load(&doc)
    }

    /// Load a directions document
    pub fn load(doc: &YamlValue) -> Result<Self> {
        let obj = doc
            .as_mapping()
            .ok_or_else(|| invalid("object expected"))?;

        let mut subject = None;
        let mut result = Self::new("");
        let mut entries = Vec::new();
        for (key, value) in obj {
            let key = key
                .as_str()
                .ok_or_else(|| invalid(format!("string key expected, got {key:?}")))?;
            match key {
                DIRECTIONS => subject = Some(reserved_text(key, value)?),
                ORIGIN => result.origin = Some(reserved_text(key, value)?),
                AUTHOR => result.author = Some(reserved_text(key, value)?),
                CHART => result.chart = Some(reserved_text(key, value)?),
                CHART_VERSION => result.chart_version = Some(reserved_text(key, value)?),
                EXTENDS => result.bases = parse_extends(value)?,
                _ => entries.push((key, value)),
            }
        }
        result.subject = subject.ok_or_else(|| invalid(format!("missing {DIRECTIONS} key")))?;
        for (name, node) in entries {
            result.add_new(Direction::for_yaml(name, node)?)?;
        }
        Ok(result)
    }

    /// Serialize back to document form
    pub fn to_yaml(&self) -> YamlValue {
        let mut obj = Mapping::new();
        obj.insert(DIRECTIONS.into(), self.subject.as_str().into());
        match self.bases.as_slice() {
            [] => {}
            [single] => {
                obj.insert(EXTENDS.into(), single.as_str().into());
            }
            many => {
                let list = many.iter().map(|b| YamlValue::from(b.as_str())).collect();
                obj.insert(EXTENDS.into(), YamlValue::Sequence(list));
            }
        }
        for (key, value) in [
            (CHART, &self.chart),
            (CHART_VERSION, &self.chart_version),
            (ORIGIN, &self.origin),
            (AUTHOR, &self.author),
        ] {
            if let Some(value) = value {
                obj.insert(key.into(), value.as_str().into());
            }
        }
        for direction in self.directions.values() {
            obj.insert(direction.name.as_str().into(), direction.to_yaml());
        }
        YamlValue::Mapping(obj)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_yaml())?)
    }

    /// Add a direction; fails if the name is already defined in this bundle
    pub fn add_new(&mut self, direction: Direction) -> Result<()> {
        if self.directions.contains_key(&direction.name) {
            return Err(CoreError::DuplicateDirection {
                subject: self.subject.clone(),
                name: direction.name,
            });
        }
        self.directions.insert(direction.name.clone(), direction);
        Ok(())
    }

    /// Replace expressions with literal values.
    ///
    /// Privacy and documentation are kept, the extra marker is cleared.
    pub fn set_values(&mut self, values: &IndexMap<String, String>) -> Result<()> {
        for (name, value) in values {
            let existing = self
                .directions
                .get_mut(name)
                .ok_or_else(|| CoreError::UnknownDirection { name: name.clone() })?;
            existing.expression = to_expression(value);
            existing.extra = false;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Direction> {
        self.directions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.directions.contains_key(name)
    }

    /// Directions in definition order
    pub fn directions(&self) -> impl Iterator<Item = &Direction> {
        self.directions.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.directions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    /// Bundles of the inheritance chain in fold order: ancestors first, this bundle last.
    ///
    /// A base reachable over several paths appears once, at its first position.
    pub fn chain<'a>(&'a self, toolkit: &'a Toolkit) -> Result<Vec<&'a Directions>> {
        let mut order = Vec::new();
        let mut stack = Vec::new();
        collect_chain(self, toolkit, &mut stack, &mut order)?;
        Ok(order)
    }

    /// Flatten the inheritance chain into one bundle with this bundle's subject.
    pub fn merged(&self, toolkit: &Toolkit) -> Result<Directions> {
        let mut merger = Merger::new(self);
        for bundle in self.chain(toolkit)? {
            merger.fold(bundle)?;
        }
        Ok(merger.result)
    }

    /// The single chart-declaring bundle of the chain, if any
    pub fn find_chart<'a>(&'a self, toolkit: &'a Toolkit) -> Result<Option<&'a Directions>> {
        let mut found: Option<&Directions> = None;
        for bundle in self.chain(toolkit)? {
            if bundle.chart.is_none() {
                continue;
            }
            match found {
                None => found = Some(bundle),
                Some(first) if same_chart(first, bundle) => {}
                Some(first) => {
                    return Err(CoreError::AmbiguousChart {
                        first: chart_label(first),
                        second: chart_label(bundle),
                    });
                }
            }
        }
        Ok(found)
    }
}

/// Walks bases depth-first. Bundles are tracked by identity, so a local bundle
/// may extend the builtin of the same subject.
fn collect_chain<'a>(
    directions: &'a Directions,
    toolkit: &'a Toolkit,
    stack: &mut Vec<&'a Directions>,
    order: &mut Vec<&'a Directions>,
) -> Result<()> {
    if stack.iter().any(|d| std::ptr::eq(*d, directions)) {
        let mut cycle: Vec<&str> = stack.iter().map(|d| d.subject.as_str()).collect();
        cycle.push(&directions.subject);
        return Err(CoreError::InheritanceCycle {
            cycle: cycle.join(" -> "),
        });
    }
    if order.iter().any(|d| std::ptr::eq(*d, directions)) {
        return Ok(());
    }
    stack.push(directions);
    for base in &directions.bases {
        collect_chain(toolkit.directions(base)?, toolkit, stack, order)?;
    }
    stack.pop();
    order.push(directions);
    Ok(())
}

/// Accumulates the fold of an inheritance chain
struct Merger {
    result: Directions,
    owners: IndexMap<String, String>,
    chart_owner: Option<String>,
}

impl Merger {
    fn new(root: &Directions) -> Self {
        let mut result = Directions::new(root.subject.clone());
        result.origin = root.origin.clone();
        result.author = root.author.clone();
        Self {
            result,
            owners: IndexMap::new(),
            chart_owner: None,
        }
    }

    fn fold(&mut self, bundle: &Directions) -> Result<()> {
        self.adopt_chart(bundle)?;
        for incoming in bundle.directions() {
            let merged = match self.result.directions.get(&incoming.name) {
                None => incoming.clone(),
                Some(existing) => {
                    if existing.private {
                        return Err(CoreError::PrivateOverride {
                            subject: bundle.subject.clone(),
                            name: incoming.name.clone(),
                        });
                    }
                    if (existing.extra || incoming.extra) && existing != incoming {
                        return Err(CoreError::ExtraNotUnique {
                            name: incoming.name.clone(),
                            first: self.owners.get(&incoming.name).cloned().unwrap_or_default(),
                            second: bundle.subject.clone(),
                        });
                    }
                    let mut merged = incoming.clone();
                    if merged.doc.is_none() {
                        merged.doc = existing.doc.clone();
                    }
                    if merged.expression.is_empty() {
                        merged.expression = existing.expression.clone();
                    }
                    merged
                }
            };
            self.owners
                .insert(incoming.name.clone(), bundle.subject.clone());
            self.result.directions.insert(incoming.name.clone(), merged);
        }
        Ok(())
    }

    fn adopt_chart(&mut self, bundle: &Directions) -> Result<()> {
        let Some(chart) = &bundle.chart else {
            return Ok(());
        };
        match &self.chart_owner {
            None => {
                self.result.chart = Some(chart.clone());
                self.result.chart_version = bundle.chart_version.clone();
                self.chart_owner = Some(bundle.subject.clone());
                Ok(())
            }
            Some(_) if same_chart(&self.result, bundle) => Ok(()),
            Some(owner) => Err(CoreError::AmbiguousChart {
                first: format!("{} ({owner})", chart_identity(&self.result)),
                second: chart_label(bundle),
            }),
        }
    }
}

fn same_chart(a: &Directions, b: &Directions) -> bool {
    a.chart == b.chart && a.chart_version == b.chart_version
}

fn chart_identity(d: &Directions) -> String {
    match (&d.chart, &d.chart_version) {
        (Some(chart), Some(version)) => format!("{chart}:{version}"),
        (Some(chart), None) => chart.clone(),
        (None, _) => String::new(),
    }
}

fn chart_label(d: &Directions) -> String {
    format!("{} ({})", chart_identity(d), d.subject)
}

fn parse_extends(value: &YamlValue) -> Result<Vec<String>> {
    match value {
        YamlValue::String(base) => Ok(vec![base.clone()]),
        YamlValue::Sequence(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(format!("{EXTENDS}: string expected, got {item:?}")))
            })
            .collect(),
        other => Err(invalid(format!(
            "{EXTENDS}: string or array expected, got {other:?}"
        ))),
    }
}

fn reserved_text(key: &str, value: &YamlValue) -> Result<String> {
    match value {
        YamlValue::Mapping(_) | YamlValue::Sequence(_) | YamlValue::Null => {
            Err(invalid(format!("{key}: scalar expected")))
        }
        other => scalar_text(other).ok_or_else(|| invalid(format!("{key}: scalar expected"))),
    }
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::InvalidDocument {
        message: message.into(),
    }
}
