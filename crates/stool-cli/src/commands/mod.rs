//! CLI commands

pub mod describe;
pub mod diff;
pub mod eval;
pub mod list;
pub mod publish;
pub mod reference;
pub mod validate;
pub mod values;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stool_core::{Directions, Toolkit, Values};
use stool_engine::{Evaluator, SharedExecutor, StageInfo};
use stool_kube::{ClusterEngine, KubeEngine, executor_for};
use stool_repo::{DirectionsRef, OciRegistry, RegistryToolkit};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::error::{CliError, Result};
use crate::settings::Settings;

/// State shared by every command: settings, runtime and the command line overrides
pub struct Context {
    pub settings: Settings,
    pub runtime: Runtime,
    pub toolkit_path: Option<PathBuf>,
    pub kube_context: Option<String>,
    pub namespace: Option<String>,
}

impl Context {
    pub fn new(settings: Settings, runtime: Runtime) -> Self {
        Self {
            settings,
            runtime,
            toolkit_path: None,
            kube_context: None,
            namespace: None,
        }
    }

    pub fn kube_context(&self) -> Option<&str> {
        self.kube_context
            .as_deref()
            .or(self.settings.kube_context.as_deref())
    }

    /// Load the toolkit and apply environment overrides from the settings.
    /// A toolkit directory wins over a toolkit repository.
    pub fn toolkit(&self) -> Result<Toolkit> {
        let path = self.toolkit_path.as_ref().or(self.settings.toolkit.as_ref());
        let mut toolkit = match (path, self.settings.toolkit_repository.as_deref()) {
            (Some(path), _) => {
                debug!(path = %path.display(), "loading toolkit");
                Toolkit::load(path)?
            }
            (None, Some(repository)) => self.pull_toolkit(repository)?,
            (None, None) => {
                return Err(CliError::usage_with_help(
                    "no toolkit configured",
                    "pass --toolkit, set STOOL_TOOLKIT or add `toolkit:` or `toolkit-repository:` to the settings file",
                ));
            }
        };
        toolkit.override_environment(&self.settings.environment)?;
        Ok(toolkit)
    }

    fn pull_toolkit(&self, repository: &str) -> Result<Toolkit> {
        let cache_root = RegistryToolkit::default_cache_root()
            .ok_or_else(|| CliError::usage("cannot determine a cache directory for the toolkit"))?;
        let source = RegistryToolkit::new(repository, &cache_root)?;
        debug!(repository, cache = %source.dir().display(), "resolving toolkit");
        Ok(self.runtime.block_on(source.resolve(&self.registry()))?)
    }

    fn registry(&self) -> OciRegistry {
        OciRegistry::configured(self.registry_credentials(), self.settings.registry.insecure)
    }

    /// Resolve a command line argument or serialized reference into directions
    pub fn directions(&self, toolkit: &Toolkit, arg: &str) -> Result<Directions> {
        let reference = parse_reference(arg)?;
        debug!(kind = reference.kind().as_str(), origin = reference.origin(), "resolving directions");
        Ok(self
            .runtime
            .block_on(reference.resolve(toolkit, &self.registry()))?)
    }

    fn registry_credentials(&self) -> Option<(String, String)> {
        let registry = &self.settings.registry;
        registry.username.clone().zip(registry.password.clone())
    }

    pub fn evaluator(&self, toolkit: &Toolkit, stage: Option<&str>) -> Evaluator {
        let mut builder = Evaluator::builder().environment(toolkit.environment().clone());
        if let Some(stage) = stage {
            let host = self.settings.host.as_deref().unwrap_or("localhost");
            builder = builder.stage(StageInfo::new(stage, host));
        }
        builder.build()
    }

    /// Script backend for the toolkit; connects to the cluster only when the toolkit has an image
    pub fn executor(&self, toolkit: &Toolkit) -> Result<SharedExecutor> {
        let cluster = match toolkit.image() {
            Some(_) => {
                let namespace = self.namespace.as_deref().or(self.settings.namespace.as_deref());
                let engine = self
                    .runtime
                    .block_on(KubeEngine::connect(self.kube_context(), namespace))?;
                let engine: Arc<dyn ClusterEngine> = Arc::new(engine);
                Some((engine, self.runtime.handle().clone()))
            }
            None => None,
        };
        Ok(executor_for(toolkit, cluster)?)
    }
}

/// Serialized references are taken as is, anything else is classified by shape
pub fn parse_reference(arg: &str) -> Result<DirectionsRef> {
    let serialized = ["BUILTIN+", "INLINE+", "IMAGE+"]
        .iter()
        .any(|prefix| arg.starts_with(prefix));
    if serialized {
        Ok(DirectionsRef::parse(arg)?)
    } else {
        Ok(DirectionsRef::create(arg)?)
    }
}

/// Previous values, empty when no file is given
pub fn load_previous(path: Option<&Path>) -> Result<Values> {
    match path {
        Some(path) if path.exists() => Ok(Values::from_file(path)?),
        Some(path) => Err(CliError::Io {
            message: format!("previous values not found: {}", path.display()),
        }),
        None => Ok(Values::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stool_repo::RefKind;

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse_reference("web").unwrap().kind(), RefKind::Builtin);
        assert_eq!(parse_reference("reg/web:1").unwrap().kind(), RefKind::Image);

        let serialized = DirectionsRef::new(RefKind::Inline, "DIRECTIONS: x\n", "x.yaml").serialize();
        let parsed = parse_reference(&serialized).unwrap();
        assert_eq!(parsed.kind(), RefKind::Inline);
        assert_eq!(parsed.origin(), "x.yaml");
    }

    #[test]
    fn test_load_previous() {
        assert!(load_previous(None).unwrap().is_empty());
        assert!(load_previous(Some(Path::new("/nonexistent/values.yaml"))).is_err());

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("values.yaml");
        std::fs::write(&file, "replicas: 2\n_directions:\n  DIRECTIONS: web\n").unwrap();
        let values = load_previous(Some(&file)).unwrap();
        assert_eq!(values.get("replicas"), Some("2"));
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_toolkit_requires_path() {
        let context = Context::new(Settings::default(), Runtime::new().unwrap());
        assert!(matches!(context.toolkit(), Err(CliError::Usage { .. })));
    }

    #[test]
    fn test_toolkit_directory_wins_over_repository() {
        let settings = Settings {
            toolkit: Some(PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures/toolkit"))),
            toolkit_repository: Some("registry.invalid/stool/toolkit".to_string()),
            ..Default::default()
        };
        let context = Context::new(settings, Runtime::new().unwrap());
        assert_eq!(context.toolkit().unwrap().version(), "1.4.0");
    }

    #[test]
    fn test_tagged_toolkit_repository_is_usage_error() {
        let settings = Settings {
            toolkit_repository: Some("registry.invalid/stool/toolkit:1.0".to_string()),
            ..Default::default()
        };
        let context = Context::new(settings, Runtime::new().unwrap());
        let err = context.toolkit().unwrap_err();
        assert!(matches!(err, CliError::Usage { .. }));
        assert!(err.to_string().contains("invalid toolkit repository"));
    }
}
