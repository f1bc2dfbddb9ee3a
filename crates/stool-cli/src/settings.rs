//! User settings
//!
//! Read from `~/.config/stool/settings.yaml` unless `--settings` names
//! another file. Command line flags take precedence over every entry.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

pub const SETTINGS_FILE: &str = "settings.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    /// Toolkit directory
    pub toolkit: Option<PathBuf>,
    /// Registry repository the toolkit is pulled from when no directory is given
    pub toolkit_repository: Option<String>,
    pub kube_context: Option<String>,
    pub namespace: Option<String>,
    /// Host name stages are published under
    pub host: Option<String>,
    pub registry: RegistrySettings,
    /// Overrides for toolkit environment variables
    pub environment: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RegistrySettings {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Talk plain http to registries
    pub insecure: bool,
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stool").join(SETTINGS_FILE))
    }

    /// Load settings. A missing default file yields defaults, a missing explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CliError::Io {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_yaml(&content).map_err(|e| {
            CliError::usage_with_help(
                format!("{}: {e}", path.display()),
                "known keys: toolkit, toolkit-repository, kube-context, namespace, host, registry, environment",
            )
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml() {
        let settings = Settings::from_yaml(
            r#"
toolkit: /opt/toolkit
toolkit-repository: registry.example.com/stool/toolkit
kube-context: prod
host: example.com
registry:
  username: ci
  password: secret
environment:
  DOMAIN: example.com
"#,
        )
        .unwrap();
        assert_eq!(settings.toolkit.as_deref(), Some(Path::new("/opt/toolkit")));
        assert_eq!(
            settings.toolkit_repository.as_deref(),
            Some("registry.example.com/stool/toolkit")
        );
        assert_eq!(settings.kube_context.as_deref(), Some("prod"));
        assert_eq!(settings.registry.username.as_deref(), Some("ci"));
        assert!(!settings.registry.insecure);
        assert_eq!(settings.environment["DOMAIN"], "example.com");
    }

    #[test]
    fn test_empty_and_missing() {
        assert_eq!(Settings::from_yaml("").unwrap(), Settings::default());
        assert!(Settings::load(Some(Path::new("/nonexistent/settings.yaml"))).is_err());
    }

    #[test]
    fn test_unknown_shape_is_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(SETTINGS_FILE);
        std::fs::write(&file, "toolkit: [1, 2]\n").unwrap();
        assert!(matches!(
            Settings::from_file(&file),
            Err(CliError::Usage { .. })
        ));
    }

    #[test]
    fn test_misspelled_key_is_rejected() {
        assert!(Settings::from_yaml("toolkt: /opt/toolkit\n").is_err());
        assert!(Settings::from_yaml("registry:\n  user: ci\n").is_err());

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(SETTINGS_FILE);
        std::fs::write(&file, "kube-contxt: prod\n").unwrap();
        let err = Settings::from_file(&file).unwrap_err();
        assert!(matches!(err, CliError::Usage { .. }));
        assert!(err.to_string().contains("kube-contxt"));
    }
}
