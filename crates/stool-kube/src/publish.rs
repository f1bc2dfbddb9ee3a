//! Resolve directions and apply them to a release
//!
//! Publishing runs merge, overrides, evaluation and the allow-list check
//! before anything leaves the process. Only a change set that passes the
//! gate is written to a values file and handed to the packaging tool.

use indexmap::IndexMap;
use stool_core::{Diff, Directions, Toolkit, Values};
use stool_engine::{Evaluator, SharedExecutor};
use tracing::{debug, info};

use crate::error::{KubeError, Result};
use crate::helm::{HelmRequest, PackagingTool};

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub release: String,
    /// Upgrade an existing release instead of installing
    pub upgrade: bool,
    pub dry_run: bool,
    /// Keys allowed to change; `None` allows everything
    pub allow: Option<Vec<String>>,
    /// Literal values replacing direction expressions
    pub overrides: IndexMap<String, String>,
    pub kube_context: Option<String>,
}

/// Evaluated directions and their changes against the previous values
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The flattened bundle that was evaluated
    pub directions: Directions,
    pub values: Values,
    /// Every change, private keys included
    pub diff: Diff,
}

impl Resolution {
    pub fn private_keys(&self) -> Vec<&str> {
        self.directions
            .directions()
            .filter(|d| d.private)
            .map(|d| d.name.as_str())
            .collect()
    }

    /// The change set shown to users: private keys removed
    pub fn report(&self) -> Diff {
        self.diff.without_keys(&self.private_keys())
    }

    /// Reject changes to keys outside `allow`, private values masked in the error
    pub fn check_allowed<S: AsRef<str>>(&self, allow: &[S]) -> Result<()> {
        let rejected = self.diff.without_keys(allow);
        if rejected.is_empty() {
            return Ok(());
        }
        Err(KubeError::ForbiddenChange {
            diff: rejected.masked(self.private_keys()),
        })
    }
}

#[derive(Debug)]
pub struct PublishOutcome {
    pub chart: String,
    pub values: Values,
    /// Reported changes, private keys removed
    pub diff: Diff,
    /// Packaging tool output, `None` on dry run
    pub output: Option<String>,
}

/// Runs the resolve, gate and apply sequence against one toolkit
pub struct Publisher<'a> {
    toolkit: &'a Toolkit,
    evaluator: &'a Evaluator,
    tool: &'a dyn PackagingTool,
}

impl<'a> Publisher<'a> {
    pub fn new(toolkit: &'a Toolkit, evaluator: &'a Evaluator, tool: &'a dyn PackagingTool) -> Self {
        Self {
            toolkit,
            evaluator,
            tool,
        }
    }

    /// Merge, apply overrides and evaluate, without touching the release
    pub fn resolve(
        &self,
        directions: &Directions,
        previous: &Values,
        overrides: &IndexMap<String, String>,
        executor: SharedExecutor,
    ) -> Result<Resolution> {
        let merged = self.prepare(directions, overrides)?;
        self.evaluate(merged, previous, executor)
    }

    pub fn publish(
        &self,
        directions: &Directions,
        previous: &Values,
        executor: SharedExecutor,
        options: &PublishOptions,
    ) -> Result<PublishOutcome> {
        let merged = self.prepare(directions, &options.overrides)?;
        let chart_name = merged.chart.clone().ok_or_else(|| KubeError::NoChart {
            subject: directions.subject.clone(),
        })?;
        let chart = self.toolkit.chart(&chart_name)?;

        let resolution = self.evaluate(merged, previous, executor)?;
        if let Some(allow) = &options.allow {
            resolution.check_allowed(allow)?;
        }
        let report = resolution.report();
        debug!(changes = report.len(), "computed changes");

        let values_file = tempfile::Builder::new()
            .prefix("stool-values-")
            .suffix(".yaml")
            .tempfile()?;
        resolution
            .values
            .write_values_file(values_file.path(), Some(directions))?;

        let request = HelmRequest {
            release: &options.release,
            chart: &chart.reference,
            values_file: values_file.path(),
            upgrade: options.upgrade,
            kube_context: options.kube_context.as_deref(),
        };
        let output = if options.dry_run {
            info!(release = %options.release, chart = %chart.name, "dry run - skipped");
            None
        } else {
            info!(release = %options.release, chart = %chart.name, upgrade = options.upgrade, "applying values");
            Some(self.tool.apply(&request)?)
        };

        Ok(PublishOutcome {
            chart: chart.name.clone(),
            values: resolution.values,
            diff: report,
            output,
        })
    }

    fn prepare(&self, directions: &Directions, overrides: &IndexMap<String, String>) -> Result<Directions> {
        let mut merged = directions.merged(self.toolkit)?;
        merged.set_values(overrides)?;
        Ok(merged)
    }

    fn evaluate(&self, merged: Directions, previous: &Values, executor: SharedExecutor) -> Result<Resolution> {
        let values = self
            .evaluator
            .eval(previous, &merged, self.toolkit.scripts(), executor)?;
        let diff = Diff::between(previous, &values);
        Ok(Resolution {
            directions: merged,
            values,
            diff,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use stool_core::{Chart, CoreError, Direction};
    use stool_engine::{ProcessExecutor, shared};

    use super::*;

    #[derive(Default)]
    struct RecordingTool {
        calls: Mutex<Vec<(Vec<String>, String)>>,
    }

    impl RecordingTool {
        fn calls(&self) -> Vec<(Vec<String>, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PackagingTool for RecordingTool {
        fn apply(&self, request: &HelmRequest<'_>) -> Result<String> {
            let values = fs::read_to_string(request.values_file)?;
            self.calls.lock().unwrap().push((request.args(), values));
            Ok("deployed".to_string())
        }
    }

    const WEB: &str = r#"
DIRECTIONS: web
EXTENDS: webapp
replicas: 2
password:
  private: true
  value: s3cret
host:
  expr: "web.${ env.DOMAIN }"
"#;

    fn toolkit() -> Toolkit {
        let mut toolkit = Toolkit::new("1");
        toolkit.set_environment("DOMAIN", "example.com");
        let mut chart = Chart::new("webapp", Some("1.0.0".to_string()), "/toolkit/charts/webapp");
        chart.directions.add_new(Direction::literal("replicas", "1")).unwrap();
        chart.directions.add_new(Direction::literal("image", "nginx")).unwrap();
        toolkit.add_chart(chart).unwrap();
        toolkit.add_directions(Directions::from_yaml_str(WEB).unwrap()).unwrap();
        toolkit
    }

    fn previous() -> Values {
        [
            ("replicas", "1"),
            ("image", "nginx"),
            ("password", "old"),
            ("host", "web.example.com"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn executor() -> SharedExecutor {
        shared(ProcessExecutor::scoped(IndexMap::new()).unwrap())
    }

    fn options() -> PublishOptions {
        PublishOptions {
            release: "web".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_publish_redacts_private_keys_but_applies_them() {
        let toolkit = toolkit();
        let evaluator = Evaluator::new(toolkit.environment().clone());
        let tool = RecordingTool::default();
        let publisher = Publisher::new(&toolkit, &evaluator, &tool);

        let outcome = publisher
            .publish(toolkit.directions("web").unwrap(), &previous(), executor(), &options())
            .unwrap();

        assert_eq!(outcome.chart, "webapp");
        assert_eq!(outcome.output.as_deref(), Some("deployed"));
        insta::assert_snapshot!(outcome.diff.to_string(), @r"
        - replicas=1
        + replicas=2
        ");
        assert_eq!(outcome.values.get("password"), Some("s3cret"));

        let calls = tool.calls();
        assert_eq!(calls.len(), 1);
        let (args, values) = &calls[0];
        assert_eq!(args[0], "install");
        assert_eq!(&args[args.len() - 2..], ["web", "/toolkit/charts/webapp"]);
        assert!(values.contains("password: s3cret"));
        assert!(values.contains("_directions:"));
    }

    #[test]
    fn test_forbidden_change_masks_private_values() {
        let toolkit = toolkit();
        let evaluator = Evaluator::new(toolkit.environment().clone());
        let tool = RecordingTool::default();
        let publisher = Publisher::new(&toolkit, &evaluator, &tool);
        let options = PublishOptions {
            allow: Some(vec!["replicas".to_string()]),
            ..options()
        };

        let err = publisher
            .publish(toolkit.directions("web").unwrap(), &previous(), executor(), &options)
            .unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r"
        change is forbidden:
        - password=***
        + password=***
        ");
        assert!(tool.calls().is_empty());
    }

    #[test]
    fn test_allowed_changes_pass_the_gate() {
        let toolkit = toolkit();
        let evaluator = Evaluator::new(toolkit.environment().clone());
        let tool = RecordingTool::default();
        let publisher = Publisher::new(&toolkit, &evaluator, &tool);
        let options = PublishOptions {
            allow: Some(vec!["replicas".to_string(), "password".to_string()]),
            upgrade: true,
            ..options()
        };

        publisher
            .publish(toolkit.directions("web").unwrap(), &previous(), executor(), &options)
            .unwrap();
        assert_eq!(tool.calls()[0].0[0], "upgrade");
    }

    #[test]
    fn test_dry_run_skips_tool() {
        let toolkit = toolkit();
        let evaluator = Evaluator::new(toolkit.environment().clone());
        let tool = RecordingTool::default();
        let publisher = Publisher::new(&toolkit, &evaluator, &tool);
        let options = PublishOptions {
            dry_run: true,
            ..options()
        };

        let outcome = publisher
            .publish(toolkit.directions("web").unwrap(), &previous(), executor(), &options)
            .unwrap();
        assert!(outcome.output.is_none());
        assert_eq!(outcome.diff.keys().collect::<Vec<_>>(), vec!["replicas"]);
        assert!(tool.calls().is_empty());
    }

    #[test]
    fn test_unknown_override_stops_before_tool() {
        let toolkit = toolkit();
        let evaluator = Evaluator::new(toolkit.environment().clone());
        let tool = RecordingTool::default();
        let publisher = Publisher::new(&toolkit, &evaluator, &tool);
        let mut options = options();
        options.overrides.insert("unknownKey".to_string(), "v".to_string());

        let err = publisher
            .publish(toolkit.directions("web").unwrap(), &previous(), executor(), &options)
            .unwrap_err();
        assert!(matches!(
            err,
            KubeError::Core(CoreError::UnknownDirection { ref name }) if name == "unknownKey"
        ));
        assert!(tool.calls().is_empty());
    }

    #[test]
    fn test_publish_requires_chart() {
        let mut toolkit = toolkit();
        toolkit
            .add_directions(Directions::from_yaml_str("DIRECTIONS: loose\na: 1\n").unwrap())
            .unwrap();
        let evaluator = Evaluator::new(toolkit.environment().clone());
        let tool = RecordingTool::default();
        let publisher = Publisher::new(&toolkit, &evaluator, &tool);

        let err = publisher
            .publish(toolkit.directions("loose").unwrap(), &Values::new(), executor(), &options())
            .unwrap_err();
        assert_eq!(err.to_string(), "directions without chart: loose");
    }

    #[test]
    fn test_resolve_overrides() {
        let toolkit = toolkit();
        let evaluator = Evaluator::new(toolkit.environment().clone());
        let tool = RecordingTool::default();
        let publisher = Publisher::new(&toolkit, &evaluator, &tool);
        let mut overrides = IndexMap::new();
        overrides.insert("replicas".to_string(), "5".to_string());

        let resolution = publisher
            .resolve(toolkit.directions("web").unwrap(), &previous(), &overrides, executor())
            .unwrap();
        assert_eq!(resolution.values.get("replicas"), Some("5"));
        assert_eq!(resolution.private_keys(), vec!["password"]);
        assert!(resolution.diff.get("password").is_some());
        assert!(resolution.report().get("password").is_none());
    }
}
