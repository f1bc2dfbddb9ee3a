//! Differences between two resolved value maps

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

use crate::values::Values;

/// Marks a missing side in the list encoding
pub const NIL: &str = "__null__";

/// Replacement text for values that must not be shown
pub const MASK: &str = "***";

/// One changed key. `None` means the key is absent on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Ordered set of changed keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    changes: IndexMap<String, Change>,
}

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys whose value differs between `previous` and `next`, in the order of
    /// `previous` followed by keys only present in `next`.
    pub fn between(previous: &Values, next: &Values) -> Self {
        let mut result = Self::new();
        for key in previous.keys().chain(next.keys()) {
            if result.changes.contains_key(key) {
                continue;
            }
            let old = previous.get(key);
            let new = next.get(key);
            if old != new {
                result.add(key, old.map(str::to_string), new.map(str::to_string));
            }
        }
        result
    }

    pub fn add(&mut self, key: impl Into<String>, old: Option<String>, new: Option<String>) {
        self.changes.insert(key.into(), Change { old, new });
    }

    pub fn get(&self, key: &str) -> Option<&Change> {
        self.changes.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Change> {
        self.changes.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Change)> {
        self.changes.iter().map(|(k, c)| (k.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// The subset of changes whose keys are not listed
    pub fn without_keys<S: AsRef<str>>(&self, keys: &[S]) -> Diff {
        let changes = self
            .changes
            .iter()
            .filter(|(key, _)| !keys.iter().any(|k| k.as_ref() == key.as_str()))
            .map(|(key, change)| (key.clone(), change.clone()))
            .collect();
        Diff { changes }
    }

    /// Copy with the values of the given keys replaced by [`MASK`]
    pub fn masked<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Diff {
        let mut result = self.clone();
        for key in keys {
            if let Some(change) = result.changes.get_mut(key) {
                change.old = change.old.as_ref().map(|_| MASK.to_string());
                change.new = change.new.as_ref().map(|_| MASK.to_string());
            }
        }
        result
    }

    /// Flat encoding as `key, old, new` triples with [`NIL`] for missing sides
    pub fn to_list(&self) -> Vec<String> {
        let mut result = Vec::with_capacity(self.changes.len() * 3);
        for (key, change) in &self.changes {
            result.push(key.clone());
            result.push(change.old.clone().unwrap_or_else(|| NIL.to_string()));
            result.push(change.new.clone().unwrap_or_else(|| NIL.to_string()));
        }
        result
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, change) in &self.changes {
            match (&change.old, &change.new) {
                (Some(old), Some(new)) if old.contains('\n') || new.contains('\n') => {
                    writeln!(f, "~ {key}:")?;
                    let diff = TextDiff::from_lines(old, new);
                    for line in diff.iter_all_changes() {
                        let sign = match line.tag() {
                            ChangeTag::Delete => '-',
                            ChangeTag::Insert => '+',
                            ChangeTag::Equal => ' ',
                        };
                        write!(f, "  {sign} {}", line.value())?;
                        if line.missing_newline() {
                            writeln!(f)?;
                        }
                    }
                }
                (old, new) => {
                    if let Some(old) = old {
                        writeln!(f, "- {key}={old}")?;
                    }
                    if let Some(new) = new {
                        writeln!(f, "+ {key}={new}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> Values {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_between() {
        let previous = values(&[("a", "1"), ("b", "2"), ("gone", "x")]);
        let next = values(&[("a", "1"), ("b", "3"), ("new", "y")]);
        let diff = Diff::between(&previous, &next);

        assert_eq!(diff.keys().collect::<Vec<_>>(), vec!["b", "gone", "new"]);
        assert_eq!(diff.get("b").unwrap().old.as_deref(), Some("2"));
        assert_eq!(diff.get("gone").unwrap().new, None);
        assert_eq!(diff.get("new").unwrap().old, None);
    }

    #[test]
    fn test_between_identical_is_empty() {
        let v = values(&[("a", "1")]);
        assert!(Diff::between(&v, &v).is_empty());
    }

    #[test]
    fn test_without_keys() {
        let previous = values(&[]);
        let next = values(&[("a", "1"), ("b", "2")]);
        let diff = Diff::between(&previous, &next);

        let forbidden = diff.without_keys(&["a"]);
        assert_eq!(forbidden.keys().collect::<Vec<_>>(), vec!["b"]);
        assert!(diff.without_keys(&["a", "b"]).is_empty());
    }

    #[test]
    fn test_masked() {
        let mut diff = Diff::new();
        diff.add("secret", Some("old".into()), None);
        diff.add("plain", None, Some("new".into()));
        let masked = diff.masked(["secret"]);
        assert_eq!(masked.get("secret").unwrap().old.as_deref(), Some(MASK));
        assert_eq!(masked.get("secret").unwrap().new, None);
        assert_eq!(masked.get("plain").unwrap().new.as_deref(), Some("new"));
    }

    #[test]
    fn test_list_encoding() {
        let mut diff = Diff::new();
        diff.add("a", None, Some("1".into()));
        diff.add("b", Some("2".into()), Some("3".into()));
        let list = diff.to_list();
        assert_eq!(list, vec!["a", NIL, "1", "b", "2", "3"]);
    }

    #[test]
    fn test_display() {
        let mut diff = Diff::new();
        diff.add("a", None, Some("1".into()));
        diff.add("b", Some("2".into()), Some("3".into()));
        diff.add("c", Some("4".into()), None);
        insta::assert_snapshot!(diff.to_string(), @r"
        + a=1
        - b=2
        + b=3
        - c=4
        ");
    }

    #[test]
    fn test_display_multiline() {
        let mut diff = Diff::new();
        diff.add("cfg", Some("x\ny\n".into()), Some("x\nz\n".into()));
        insta::assert_snapshot!(diff.to_string(), @r"
        ~ cfg:
            x
          - y
          + z
        ");
    }
}
