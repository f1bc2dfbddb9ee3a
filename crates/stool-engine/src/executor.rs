//! Script execution backends

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use stool_core::Script;
use tempfile::TempDir;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Argument marker replaced by the script's persistent storage directory
pub const STORAGE: &str = "__storage__";

/// Runs toolkit scripts on behalf of expressions
pub trait Executor: Send {
    /// Variables visible to every script
    fn environment(&self) -> &IndexMap<String, String>;

    /// Directory whose contents persist between calls of one operation
    fn working(&self) -> &Path;

    /// Run `script` with `args`, returning its standard output
    fn exec(&mut self, script: &Script, args: &[String]) -> Result<String>;
}

/// Executor shared with the evaluation session
pub type SharedExecutor = Arc<Mutex<dyn Executor>>;

pub fn shared(executor: impl Executor + 'static) -> SharedExecutor {
    Arc::new(Mutex::new(executor))
}

/// Runs scripts as local subprocesses
pub struct ProcessExecutor {
    environment: IndexMap<String, String>,
    working: PathBuf,
    _scope: Option<TempDir>,
}

impl ProcessExecutor {
    pub fn new(environment: IndexMap<String, String>, working: impl Into<PathBuf>) -> Self {
        Self {
            environment,
            working: working.into(),
            _scope: None,
        }
    }

    /// Executor with a fresh working directory that is removed when the executor is dropped
    pub fn scoped(environment: IndexMap<String, String>) -> Result<Self> {
        let scope = tempfile::Builder::new().prefix("stool-working-").tempdir()?;
        Ok(Self {
            environment,
            working: scope.path().to_path_buf(),
            _scope: Some(scope),
        })
    }

    fn storage(&self, script: &Script) -> Result<PathBuf> {
        let dir = self.working.join(&script.name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

impl Executor for ProcessExecutor {
    fn environment(&self) -> &IndexMap<String, String> {
        &self.environment
    }

    fn working(&self) -> &Path {
        &self.working
    }

    fn exec(&mut self, script: &Script, args: &[String]) -> Result<String> {
        let mut command = Command::new(&script.path);
        for arg in args {
            if arg == STORAGE {
                command.arg(self.storage(script)?);
            } else {
                command.arg(arg);
            }
        }
        command.current_dir(&self.working).envs(&self.environment);

        debug!(script = %script.name, ?args, "running script");
        let output = command.output().map_err(|e| EngineError::ScriptFailed {
            script: script.name.clone(),
            message: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(EngineError::ScriptFailed {
                script: script.name.clone(),
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

#[cfg(all(test, unix))]
pub(crate) mod testing {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use stool_core::Script;

    /// Write an executable shell script into `dir`
    pub fn write_script(dir: &Path, name: &str, body: &str) -> Script {
        let path = dir.join(format!("{name}.sh"));
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Script::new(name, path)
    }
}
