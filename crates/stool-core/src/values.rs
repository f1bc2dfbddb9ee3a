//! Resolved values: the flat name to string map produced by evaluation

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};
use std::path::Path;

use crate::direction::scalar_text;
use crate::directions::Directions;
use crate::error::{CoreError, Result};

/// Key under which the values file carries the directions it was computed from
pub const DIRECTIONS_VALUE: &str = "_directions";

/// Ordered map of resolved values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub IndexMap<String, String>);

impl Values {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Load values from a YAML file, e.g. a previously written values file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse a flat YAML map. Scalars are converted to strings, `_directions` is skipped.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let doc: YamlValue = serde_yaml::from_str(yaml)?;
        let mut result = Self::new();
        match doc {
            YamlValue::Null => {}
            YamlValue::Mapping(entries) => {
                for (key, value) in &entries {
                    let key = key.as_str().ok_or_else(|| invalid("string key expected"))?;
                    if key == DIRECTIONS_VALUE {
                        continue;
                    }
                    let value = scalar_text(value)
                        .ok_or_else(|| invalid(format!("{key}: scalar value expected")))?;
                    result.insert(key, value);
                }
            }
            _ => return Err(invalid("object expected")),
        }
        Ok(result)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> IndexMap<String, String> {
        self.0
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }

    /// Render the values file handed to the packaging tool
    pub fn to_values_file(&self, directions: Option<&Directions>) -> Result<String> {
        let mut obj = Mapping::new();
        for (key, value) in self.iter() {
            obj.insert(key.into(), value.into());
        }
        if let Some(directions) = directions {
            obj.insert(DIRECTIONS_VALUE.into(), directions.to_yaml());
        }
        Ok(serde_yaml::to_string(&obj)?)
    }

    pub fn write_values_file(&self, path: &Path, directions: Option<&Directions>) -> Result<()> {
        std::fs::write(path, self.to_values_file(directions)?)?;
        Ok(())
    }
}

impl FromIterator<(String, String)> for Values {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parse `--set key=value` arguments. The value may itself contain `=`.
pub fn parse_set_values(args: &[String]) -> Result<IndexMap<String, String>> {
    let mut result = IndexMap::new();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .filter(|(key, _)| !key.trim().is_empty())
            .ok_or_else(|| CoreError::InvalidSet { input: arg.clone() })?;
        result.insert(key.trim().to_string(), value.to_string());
    }
    Ok(result)
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::InvalidDocument {
        message: format!("values: {}", message.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_stringifies_scalars() {
        let values = Values::from_yaml("a: 1\nb: true\nc: text\nd:\n_directions:\n  DIRECTIONS: x\n").unwrap();
        assert_eq!(values.get("a"), Some("1"));
        assert_eq!(values.get("b"), Some("true"));
        assert_eq!(values.get("c"), Some("text"));
        assert_eq!(values.get("d"), Some(""));
        assert!(!values.contains_key(DIRECTIONS_VALUE));
    }

    #[test]
    fn test_from_yaml_rejects_nested() {
        assert!(Values::from_yaml("a:\n  b: 1\n").is_err());
    }

    #[test]
    fn test_values_file_roundtrip() {
        let mut values = Values::new();
        values.insert("replicas", "2");
        values.insert("url", "http://x");
        let mut directions = Directions::new("web");
        directions
            .add_new(crate::Direction::literal("replicas", "2"))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("values.yaml");
        values.write_values_file(&file, Some(&directions)).unwrap();

        let content = std::fs::read_to_string(&file).unwrap();
        assert!(content.contains("_directions:"));
        assert_eq!(Values::from_file(&file).unwrap(), values);
    }

    #[test]
    fn test_parse_set_values() {
        let args = vec!["a=1".to_string(), "b=x=y".to_string(), "c=".to_string()];
        let parsed = parse_set_values(&args).unwrap();
        assert_eq!(parsed["a"], "1");
        assert_eq!(parsed["b"], "x=y");
        assert_eq!(parsed["c"], "");

        assert!(parse_set_values(&["novalue".to_string()]).is_err());
        assert!(parse_set_values(&["=1".to_string()]).is_err());
    }
}
