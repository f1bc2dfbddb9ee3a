//! Packaging tool invocation

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{KubeError, Result};

/// One install or upgrade of a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelmRequest<'a> {
    pub release: &'a str,
    /// Chart path or registry reference
    pub chart: &'a str,
    pub values_file: &'a Path,
    pub upgrade: bool,
    pub kube_context: Option<&'a str>,
}

impl HelmRequest<'_> {
    /// Command line arguments, without the binary
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(context) = self.kube_context {
            args.push("--kube-context".to_string());
            args.push(context.to_string());
        }
        args.push(if self.upgrade { "upgrade" } else { "install" }.to_string());
        args.push("--debug".to_string());
        args.push("--values".to_string());
        args.push(self.values_file.to_string_lossy().into_owned());
        args.push(self.release.to_string());
        args.push(self.chart.to_string());
        args
    }
}

/// Applies a values file to a release
pub trait PackagingTool: Send + Sync {
    /// Install or upgrade, returning the tool's output
    fn apply(&self, request: &HelmRequest<'_>) -> Result<String>;
}

/// The `helm` command line tool
#[derive(Debug, Clone)]
pub struct Helm {
    binary: PathBuf,
}

impl Helm {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for Helm {
    fn default() -> Self {
        Self::new("helm")
    }
}

impl PackagingTool for Helm {
    fn apply(&self, request: &HelmRequest<'_>) -> Result<String> {
        let args = request.args();
        debug!(binary = %self.binary.display(), ?args, "running packaging tool");
        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .map_err(|e| KubeError::Packaging {
                message: format!("cannot run {}: {e}", self.binary.display()),
            })?;
        if !output.status.success() {
            return Err(KubeError::Packaging {
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_args() {
        let request = HelmRequest {
            release: "web",
            chart: "/toolkit/charts/webapp",
            values_file: Path::new("/tmp/values.yaml"),
            upgrade: false,
            kube_context: None,
        };
        insta::assert_snapshot!(request.args().join(" "), @"install --debug --values /tmp/values.yaml web /toolkit/charts/webapp");
    }

    #[test]
    fn test_upgrade_args_with_context() {
        let request = HelmRequest {
            release: "web",
            chart: "webapp",
            values_file: Path::new("v.yaml"),
            upgrade: true,
            kube_context: Some("prod"),
        };
        insta::assert_snapshot!(request.args().join(" "), @"--kube-context prod upgrade --debug --values v.yaml web webapp");
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_reports_stderr() {
        let helm = Helm::new("false");
        let request = HelmRequest {
            release: "web",
            chart: "webapp",
            values_file: Path::new("v.yaml"),
            upgrade: false,
            kube_context: None,
        };
        assert!(matches!(
            helm.apply(&request),
            Err(KubeError::Packaging { .. })
        ));
        assert!(matches!(
            Helm::new("/nonexistent/helm").apply(&request),
            Err(KubeError::Packaging { .. })
        ));
    }
}
