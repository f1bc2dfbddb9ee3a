//! Scripts shipped with a toolkit

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;

pub const SCRIPT_EXTENSION: &str = ".sh";

/// An executable script, callable from expressions by its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// File name without the `.sh` extension
    pub name: String,
    pub path: PathBuf,
}

impl Script {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Derive the script name from its file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let name = file_name
            .strip_suffix(SCRIPT_EXTENSION)
            .unwrap_or(file_name);
        if name.is_empty() || name.starts_with('.') {
            return None;
        }
        Some(Self::new(name, path))
    }

    /// File name as shipped, e.g. `cert.sh`
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}{SCRIPT_EXTENSION}", self.name))
    }

    /// All scripts directly inside `dir`, sorted by name. A missing directory has no scripts.
    pub fn scan(dir: &Path) -> Result<Vec<Script>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut scripts = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(script) = Script::from_path(entry.path()) {
                scripts.push(script);
            }
        }
        Ok(scripts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_strips_extension() {
        let script = Script::from_path(Path::new("/toolkit/scripts/cert.sh")).unwrap();
        assert_eq!(script.name, "cert");
        assert_eq!(script.file_name(), "cert.sh");
        assert!(Script::from_path(Path::new("/toolkit/scripts/.hidden")).is_none());
    }

    #[test]
    fn test_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.sh"), "#!/bin/sh\n").unwrap();
        std::fs::write(dir.path().join("a.sh"), "#!/bin/sh\n").unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();

        let scripts = Script::scan(dir.path()).unwrap();
        let names: Vec<_> = scripts.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_scan_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Script::scan(&dir.path().join("nope")).unwrap().is_empty());
    }
}
