//! A single named value definition

use serde_yaml::{Mapping, Value as YamlValue};

use crate::error::{CoreError, Result};

/// Marks an expression as a literal value that bypasses template evaluation
pub const VALUE_PREFIX: char = '=';

/// Environment variable consulted by the switch shorthand when no `var` is given
pub const DEFAULT_SWITCH_VAR: &str = "MODE";

/// One named, documented value definition.
///
/// The expression is either a literal value (prefixed with [`VALUE_PREFIX`]) or a
/// template that is evaluated lazily. The empty expression is the literal empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Direction {
    pub name: String,
    pub private: bool,
    pub extra: bool,
    pub doc: Option<String>,
    pub expression: String,
}

impl Direction {
    /// Create a direction with a template expression
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            private: false,
            extra: false,
            doc: None,
            expression: expression.into(),
        }
    }

    /// Create a direction holding a literal value
    pub fn literal(name: impl Into<String>, value: &str) -> Self {
        Self::new(name, to_expression(value))
    }

    /// Parse a direction from its document node.
    ///
    /// A bare scalar is a literal value. A mapping may carry `private`, `extra`,
    /// `doc` and either `expr` (a template, or a switch shorthand mapping) or `value`.
    pub fn for_yaml(name: &str, node: &YamlValue) -> Result<Self> {
        if let Some(text) = scalar_text(node) {
            return Ok(Self::literal(name, &text));
        }
        let obj = match node {
            YamlValue::Mapping(obj) => obj,
            other => return Err(malformed(name, other)),
        };

        let mut direction = Self::new(name, "");
        if let Some(flag) = obj.get("private") {
            direction.private = flag.as_bool().ok_or_else(|| malformed(name, flag))?;
        }
        if let Some(flag) = obj.get("extra") {
            direction.extra = flag.as_bool().ok_or_else(|| malformed(name, flag))?;
        }
        if let Some(doc) = obj.get("doc") {
            direction.doc = Some(scalar_text(doc).ok_or_else(|| malformed(name, doc))?);
        }
        match (obj.get("expr"), obj.get("value")) {
            (Some(_), Some(_)) => return Err(malformed(name, node)),
            (Some(expr), None) => direction.expression = compile_expr(name, expr)?,
            (None, Some(value)) => {
                let text = scalar_text(value).ok_or_else(|| malformed(name, value))?;
                direction.expression = to_expression(&text);
            }
            (None, None) => {}
        }
        Ok(direction)
    }

    /// True for literal values, including the empty expression
    pub fn is_value(&self) -> bool {
        self.expression.is_empty() || self.expression.starts_with(VALUE_PREFIX)
    }

    /// The literal value, or `None` if the expression is a template
    pub fn value(&self) -> Option<&str> {
        if self.expression.is_empty() {
            Some("")
        } else {
            self.expression.strip_prefix(VALUE_PREFIX)
        }
    }

    pub fn with_expression(&self, expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            ..self.clone()
        }
    }

    pub fn with_doc(&self, doc: Option<String>) -> Self {
        Self {
            doc,
            ..self.clone()
        }
    }

    /// Serialize back to the document form accepted by [`Direction::for_yaml`]
    pub fn to_yaml(&self) -> YamlValue {
        let mut obj = Mapping::new();
        if self.private {
            obj.insert("private".into(), true.into());
        }
        if self.extra {
            obj.insert("extra".into(), true.into());
        }
        if let Some(doc) = &self.doc {
            obj.insert("doc".into(), doc.as_str().into());
        }
        match self.value() {
            Some(value) if obj.is_empty() => YamlValue::String(value.to_string()),
            Some(value) => {
                if !value.is_empty() {
                    obj.insert("value".into(), value.into());
                }
                YamlValue::Mapping(obj)
            }
            None => {
                obj.insert("expr".into(), self.expression.as_str().into());
                YamlValue::Mapping(obj)
            }
        }
    }
}

/// Encode a literal value as an expression
pub fn to_expression(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!("{VALUE_PREFIX}{value}")
    }
}

fn compile_expr(name: &str, expr: &YamlValue) -> Result<String> {
    if let Some(text) = scalar_text(expr) {
        return Ok(text);
    }
    match expr {
        YamlValue::Mapping(arms) => compile_switch(name, arms),
        other => Err(malformed(name, other)),
    }
}

/// Compile `{var, default, key: value...}` into a `switch(...)` call on the environment
fn compile_switch(name: &str, obj: &Mapping) -> Result<String> {
    let mut var = DEFAULT_SWITCH_VAR.to_string();
    let mut default = None;
    let mut arms = Vec::new();

    for (key, value) in obj {
        let (Some(key), Some(value)) = (scalar_text(key), scalar_text(value)) else {
            return Err(malformed(name, &YamlValue::Mapping(obj.clone())));
        };
        match key.as_str() {
            "var" => var = value,
            "default" => default = Some(value),
            _ => arms.push((key, value)),
        }
    }
    let default = default.ok_or_else(|| malformed(name, &YamlValue::Mapping(obj.clone())))?;

    let mut result = format!("${{ switch(getenv('{}'), '{}'", quote(&var), quote(&default));
    for (key, value) in arms {
        result.push_str(&format!(", '{}', '{}'", quote(&key), quote(&value)));
    }
    result.push_str(") }");
    Ok(result)
}

fn quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

pub(crate) fn scalar_text(node: &YamlValue) -> Option<String> {
    match node {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Null => Some(String::new()),
        _ => None,
    }
}

fn malformed(name: &str, node: &YamlValue) -> CoreError {
    let node = serde_yaml::to_string(node)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| format!("{node:?}"));
    CoreError::MalformedExpression {
        name: name.to_string(),
        node,
    }
}
