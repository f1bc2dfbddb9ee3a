//! Lazy, memoized evaluation of directions
//!
//! Expressions are MiniJinja templates with `${ ... }` as variable delimiters.
//! Blocks and comments also start with `${` (`${% if x %}`, `${# note #}`),
//! so plain text only needs escaping where it contains `${`.
//! Each call to [`Evaluator::eval`] opens a session that owns all transient
//! state: the per-name slots, the cross-reference functions and the executor.
//! The session is dropped when `eval` returns, on success and on failure.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use minijinja::value::{Rest, Value};
use minijinja::{Environment, Error, ErrorKind, State, UndefinedBehavior, context};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use stool_core::{Direction, Directions, Script, Values};
use tracing::debug;

use crate::error::{EngineError, Result, TemplateError};
use crate::executor::{STORAGE, SharedExecutor};
use crate::suggestions::{AVAILABLE_FUNCTIONS, CONTEXT_VARIABLES, suggest_direction};
use crate::{filters, functions};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Names scripts cannot shadow as functions; such scripts remain callable via `exec`
const RESERVED_NAMES: &[&str] = &[
    "true", "false", "none", "True", "False", "None", "and", "or", "not", "in", "is", "if",
    "else", "range", "dict", "namespace", "debug",
];

/// Stage identity exposed to expressions as `stool`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageInfo {
    pub stage: String,
    pub host: String,
    pub fqdn: String,
}

impl StageInfo {
    pub fn new(stage: impl Into<String>, host: impl Into<String>) -> Self {
        let stage = stage.into();
        let host = host.into();
        let fqdn = format!("{stage}.{host}");
        Self { stage, host, fqdn }
    }
}

/// Evaluator builder
#[derive(Debug, Default)]
pub struct EvaluatorBuilder {
    environment: IndexMap<String, String>,
    stage: Option<StageInfo>,
}

impl EvaluatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only environment exposed as `env`
    pub fn environment(mut self, environment: IndexMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn stage(mut self, stage: StageInfo) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn build(self) -> Evaluator {
        Evaluator {
            environment: self.environment,
            stage: self.stage,
        }
    }
}

/// Resolves directions into values
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    environment: IndexMap<String, String>,
    stage: Option<StageInfo>,
}

impl Evaluator {
    pub fn new(environment: IndexMap<String, String>) -> Self {
        Self {
            environment,
            stage: None,
        }
    }

    pub fn builder() -> EvaluatorBuilder {
        EvaluatorBuilder::new()
    }

    pub fn environment(&self) -> &IndexMap<String, String> {
        &self.environment
    }

    /// Resolve every direction, in bundle order.
    ///
    /// `previous` is exposed as `prev`. Any failure aborts the whole evaluation.
    pub fn eval(
        &self,
        previous: &Values,
        directions: &Directions,
        scripts: &[Script],
        executor: SharedExecutor,
    ) -> Result<Values> {
        let session = Arc::new(Session::new(
            directions,
            scripts,
            Some(executor),
            self.context(previous),
        ));
        let env = create_environment(&session)?;

        debug!(subject = %directions.subject, count = directions.len(), "evaluating directions");
        let mut result = Values::new();
        for name in directions.names() {
            let value = session.eval_value(&env, name)?;
            result.insert(name, value);
        }
        Ok(result)
    }

    /// Render a single expression without cross references or scripts
    pub fn eval_str(&self, expression: &str) -> Result<String> {
        let session = Arc::new(Session::new(
            &Directions::new(""),
            &[],
            None,
            self.context(&Values::new()),
        ));
        let env = create_environment(&session)?;
        session.render(&env, &Direction::new("<expression>", expression))
    }

    fn context(&self, previous: &Values) -> Value {
        context! {
            env => &self.environment,
            prev => &previous.0,
            stool => &self.stage,
            storage => STORAGE,
        }
    }
}

enum Slot {
    Pending(Direction),
    InProgress,
    Resolved(String),
}

/// Transient state of one evaluation
struct Session {
    slots: Mutex<IndexMap<String, Slot>>,
    scripts: Vec<Script>,
    executor: Option<SharedExecutor>,
    context: Value,
    /// Innermost typed error, surfaced instead of the template engine's wrapper
    failure: Mutex<Option<EngineError>>,
}

impl Session {
    fn new(
        directions: &Directions,
        scripts: &[Script],
        executor: Option<SharedExecutor>,
        context: Value,
    ) -> Self {
        let slots = directions
            .directions()
            .map(|d| (d.name.clone(), Slot::Pending(d.clone())))
            .collect();
        Self {
            slots: Mutex::new(slots),
            scripts: scripts.to_vec(),
            executor,
            context,
            failure: Mutex::new(None),
        }
    }

    fn slots(&self) -> MutexGuard<'_, IndexMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn eval_value(&self, env: &Environment<'_>, name: &str) -> Result<String> {
        let direction = {
            let mut slots = self.slots();
            let Some(slot) = slots.get_mut(name) else {
                let suggestion = suggest_direction(name, slots.keys().map(String::as_str));
                return Err(EngineError::UnknownDirection {
                    name: name.to_string(),
                    suggestion,
                });
            };
            match std::mem::replace(slot, Slot::InProgress) {
                Slot::Resolved(value) => {
                    *slot = Slot::Resolved(value.clone());
                    return Ok(value);
                }
                Slot::InProgress => {
                    return Err(EngineError::Cycle {
                        name: name.to_string(),
                    });
                }
                Slot::Pending(direction) => direction,
            }
        };

        let value = match direction.value() {
            Some(literal) => literal.to_string(),
            None => self.render(env, &direction)?,
        };
        self.slots()
            .insert(name.to_string(), Slot::Resolved(value.clone()));
        Ok(value)
    }

    fn render(&self, env: &Environment<'_>, direction: &Direction) -> Result<String> {
        env.render_str(&direction.expression, self.context.clone())
            .map_err(|err| match self.take_failure() {
                Some(inner) => inner,
                None => TemplateError::from_minijinja(err, &direction.name, &direction.expression)
                    .into(),
            })
    }

    fn run_script(&self, script: &Script, args: &[Value]) -> std::result::Result<String, Error> {
        let args = functions::flatten_args(args)?;
        let executor = self.executor.as_ref().ok_or_else(|| {
            self.fail(EngineError::ScriptFailed {
                script: script.name.clone(),
                message: "no executor available".to_string(),
            })
        })?;
        let mut executor = executor.lock().unwrap_or_else(PoisonError::into_inner);
        executor.exec(script, &args).map_err(|e| self.fail(e))
    }

    fn find_script(&self, name: &str) -> Option<&Script> {
        self.scripts.iter().find(|s| s.name == name)
    }

    /// Record `err` unless an inner failure is already recorded, and convert it for the template engine
    fn fail(&self, err: EngineError) -> Error {
        let message = err.to_string();
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if failure.is_none() {
            *failure = Some(err);
        }
        Error::new(ErrorKind::InvalidOperation, message)
    }

    fn take_failure(&self) -> Option<EngineError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Build the template environment bound to one session
fn create_environment(session: &Arc<Session>) -> Result<Environment<'static>> {
    let syntax = minijinja::syntax::SyntaxConfig::builder()
        .variable_delimiters("${", "}")
        .block_delimiters("${%", "%}")
        .comment_delimiters("${#", "#}")
        .build()
        .map_err(|e| TemplateError::from_minijinja(e, "<syntax>", ""))?;

    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.set_syntax(syntax);

    env.add_filter("b64encode", filters::b64encode);
    env.add_filter("b64decode", filters::b64decode);
    env.add_filter("comma_list", filters::comma_list);
    env.add_filter("quote", filters::quote);

    env.add_function("switch", functions::switch);
    env.add_function("getenv", functions::getenv);
    env.add_function("comma_list", functions::comma_list);
    env.add_function("to_base64", functions::to_base64);
    env.add_function("from_base64", functions::from_base64);

    for alias in ["value", "direction"] {
        let session = Arc::clone(session);
        env.add_function(alias, move |state: &State, name: String| {
            session
                .eval_value(state.env(), &name)
                .map_err(|e| session.fail(e))
        });
    }

    let exec_session = Arc::clone(session);
    env.add_function("exec", move |name: String, args: Rest<Value>| {
        let script = exec_session.find_script(&name).cloned().ok_or_else(|| {
            Error::new(ErrorKind::UnknownFunction, format!("unknown script: {name}"))
        })?;
        exec_session.run_script(&script, &args)
    });

    for script in &session.scripts {
        if !callable_name(&script.name) {
            continue;
        }
        let session = Arc::clone(session);
        let script = script.clone();
        env.add_function(script.name.clone(), move |args: Rest<Value>| {
            session.run_script(&script, &args)
        });
    }
    Ok(env)
}

fn callable_name(name: &str) -> bool {
    IDENTIFIER.is_match(name)
        && !RESERVED_NAMES.contains(&name)
        && !AVAILABLE_FUNCTIONS.contains(&name)
        && !CONTEXT_VARIABLES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ProcessExecutor, shared};

    fn directions(doc: &str) -> Directions {
        Directions::from_yaml_str(doc).unwrap()
    }

    fn executor() -> SharedExecutor {
        shared(ProcessExecutor::scoped(IndexMap::new()).unwrap())
    }

    fn eval(evaluator: &Evaluator, doc: &str) -> Result<Values> {
        evaluator.eval(&Values::new(), &directions(doc), &[], executor())
    }

    fn env(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_hello() {
        let values = eval(&Evaluator::default(), "DIRECTIONS: x\none: hello").unwrap();
        assert_eq!(values.get("one"), Some("hello"));
    }

    #[test]
    fn test_expressions() {
        let values = eval(
            &Evaluator::default(),
            "DIRECTIONS: x\none:\n  expr: \"${ 1 + 2 }\"\ntwo:\n  expr: \"pre-${ 'a' ~ 'b' }-post\"",
        )
        .unwrap();
        assert_eq!(values.get("one"), Some("3"));
        assert_eq!(values.get("two"), Some("pre-ab-post"));
    }

    #[test]
    fn test_literal_skips_template_engine() {
        let values = eval(&Evaluator::default(), "DIRECTIONS: x\nraw: \"${ not a template\"").unwrap();
        assert_eq!(values.get("raw"), Some("${ not a template"));
    }

    #[test]
    fn test_forward_reference() {
        let values = eval(
            &Evaluator::default(),
            "DIRECTIONS: x\ntwo:\n  expr: \"${ value('one') ~ '2' }\"\none: 1",
        )
        .unwrap();
        assert_eq!(values.get("two"), Some("12"));
        assert_eq!(values.keys().collect::<Vec<_>>(), vec!["two", "one"]);
    }

    #[test]
    fn test_direction_alias() {
        let values = eval(
            &Evaluator::default(),
            "DIRECTIONS: x\na: 1\nb:\n  expr: \"${ direction('a') }\"",
        )
        .unwrap();
        assert_eq!(values.get("b"), Some("1"));
    }

    #[test]
    fn test_environment() {
        let evaluator = Evaluator::new(env(&[("HOME_DIR", "/home/stool")]));
        let values = eval(&evaluator, "DIRECTIONS: x\nhome:\n  expr: \"${ env.HOME_DIR }\"").unwrap();
        assert_eq!(values.get("home"), Some("/home/stool"));
    }

    #[test]
    fn test_undefined_environment_fails() {
        let err = eval(&Evaluator::default(), "DIRECTIONS: x\nhome:\n  expr: \"${ env.MISSING }\"")
            .unwrap_err();
        match err {
            EngineError::Template(template) => {
                assert_eq!(template.direction, "home");
                assert_eq!(template.kind(), crate::TemplateErrorKind::UndefinedVariable);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_switch() {
        let evaluator = Evaluator::new(env(&[("TIER", "prod")]));
        let values = eval(
            &evaluator,
            "DIRECTIONS: x\na:\n  expr: \"${ switch(env.TIER, 'dev', 'prod', 'live') }\"",
        )
        .unwrap();
        assert_eq!(values.get("a"), Some("live"));
    }

    #[test]
    fn test_switch_shorthand() {
        let doc = "DIRECTIONS: x\na:\n  expr:\n    default: '0'\n    a: '1'\n    b: '2'";
        for (mode, expected) in [("a", "1"), ("b", "2"), ("c", "0")] {
            let evaluator = Evaluator::new(env(&[("MODE", mode)]));
            let values = eval(&evaluator, doc).unwrap();
            assert_eq!(values.get("a"), Some(expected), "MODE={mode}");
        }
    }

    #[test]
    fn test_switch_shorthand_unknown_variable_fails() {
        let doc = "DIRECTIONS: x\na:\n  expr:\n    var: TIER\n    default: '0'";
        let err = eval(&Evaluator::default(), doc).unwrap_err();
        assert!(
            err.to_string().contains("env variable not found: TIER"),
            "{err}"
        );
    }

    #[test]
    fn test_braces_in_plain_text() {
        let evaluator = Evaluator::new(env(&[("A", "red")]));
        assert_eq!(
            evaluator.eval_str("color {#fff} {% raw %} ${ env.A }").unwrap(),
            "color {#fff} {% raw %} red"
        );
    }

    #[test]
    fn test_blocks_and_comments() {
        let evaluator = Evaluator::new(env(&[("A", "on")]));
        assert_eq!(
            evaluator
                .eval_str("${# flag #}${% if env.A == 'on' %}enabled${% else %}disabled${% endif %}")
                .unwrap(),
            "enabled"
        );
    }

    #[test]
    fn test_getenv() {
        let evaluator = Evaluator::new(env(&[("TIER", "prod")]));
        assert_eq!(evaluator.eval_str("${ getenv('TIER') }").unwrap(), "prod");
        assert!(evaluator.eval_str("${ getenv('MISSING') }").is_err());
    }

    #[test]
    fn test_prev() {
        let mut previous = Values::new();
        previous.insert("counter", "41");
        let values = Evaluator::default()
            .eval(
                &previous,
                &directions("DIRECTIONS: x\ncounter:\n  expr: \"${ prev.counter | int + 1 }\""),
                &[],
                executor(),
            )
            .unwrap();
        assert_eq!(values.get("counter"), Some("42"));
    }

    #[test]
    fn test_stage_info() {
        let evaluator = Evaluator::builder()
            .stage(StageInfo::new("hello", "example.com"))
            .build();
        let values = eval(&evaluator, "DIRECTIONS: x\nurl:\n  expr: \"https://${ stool.fqdn }/\"").unwrap();
        assert_eq!(values.get("url"), Some("https://hello.example.com/"));
    }

    #[test]
    fn test_self_recursion() {
        let err = eval(&Evaluator::default(), "DIRECTIONS: x\na:\n  expr: \"${ value('a') }\"")
            .unwrap_err();
        assert!(matches!(err, EngineError::Cycle { ref name } if name == "a"));
    }

    #[test]
    fn test_mutual_recursion() {
        let err = eval(
            &Evaluator::default(),
            "DIRECTIONS: x\na:\n  expr: \"${ value('b') }\"\nb:\n  expr: \"${ value('a') }\"",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "invalid recursion on direction a");
    }

    #[test]
    fn test_unknown_direction() {
        let err = eval(
            &Evaluator::default(),
            "DIRECTIONS: x\nhostname: h\nurl:\n  expr: \"${ value('hostnme') }\"",
        )
        .unwrap_err();
        match err {
            EngineError::UnknownDirection { name, suggestion } => {
                assert_eq!(name, "hostnme");
                assert_eq!(suggestion.as_deref(), Some("did you mean `hostname`?"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nested_error_is_innermost() {
        let err = eval(
            &Evaluator::default(),
            "DIRECTIONS: x\na:\n  expr: \"${ value('b') }\"\nb:\n  expr: \"${ env.NOPE }\"",
        )
        .unwrap_err();
        match err {
            EngineError::Template(template) => assert_eq!(template.direction, "b"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sessions_are_independent() {
        let evaluator = Evaluator::default();
        let doc = "DIRECTIONS: x\na:\n  expr: \"${ value('a') }\"";
        assert!(eval(&evaluator, doc).is_err());
        let values = eval(&evaluator, "DIRECTIONS: x\na: 1").unwrap();
        assert_eq!(values.get("a"), Some("1"));
    }

    #[test]
    fn test_utilities() {
        let values = eval(
            &Evaluator::default(),
            "DIRECTIONS: x\nencoded:\n  expr: \"${ to_base64('hi') }\"\ndecoded:\n  expr: \"${ value('encoded') | b64decode }\"\nfirst:\n  expr: \"${ comma_list('a, b') | first }\"",
        )
        .unwrap();
        assert_eq!(values.get("encoded"), Some("aGk="));
        assert_eq!(values.get("decoded"), Some("hi"));
        assert_eq!(values.get("first"), Some("a"));
    }

    #[test]
    fn test_eval_str() {
        let evaluator = Evaluator::new(env(&[("NAME", "stool")]));
        assert_eq!(evaluator.eval_str("hi ${ env.NAME }").unwrap(), "hi stool");
        assert!(evaluator.eval_str("${ value('x') }").is_err());
    }

    #[cfg(unix)]
    mod scripts {
        use super::*;
        use crate::executor::testing::write_script;

        #[test]
        fn test_script_function() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(dir.path(), "hello", "echo \"arg:$1\"");
            let values = Evaluator::default()
                .eval(
                    &Values::new(),
                    &directions("DIRECTIONS: x\nout:\n  expr: \"${ hello('hello') }\""),
                    &[script],
                    executor(),
                )
                .unwrap();
            assert_eq!(values.get("out"), Some("arg:hello\n"));
        }

        #[test]
        fn test_exec_with_list_args() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(dir.path(), "my-args", "echo \"$#:$*\"");
            let values = Evaluator::default()
                .eval(
                    &Values::new(),
                    &directions("DIRECTIONS: x\nout:\n  expr: \"${ exec('my-args', 'a', ['b', 'c']) | trim }\""),
                    &[script],
                    executor(),
                )
                .unwrap();
            assert_eq!(values.get("out"), Some("3:a b c"));
        }

        #[test]
        fn test_script_failure_aborts() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(dir.path(), "broken", "exit 1");
            let err = Evaluator::default()
                .eval(
                    &Values::new(),
                    &directions("DIRECTIONS: x\na: 1\nout:\n  expr: \"${ broken() }\""),
                    &[script],
                    executor(),
                )
                .unwrap_err();
            assert!(matches!(err, EngineError::ScriptFailed { ref script, .. } if script == "broken"));
        }

        #[test]
        fn test_storage_persists_within_one_executor() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(
                dir.path(),
                "counter",
                "echo x >> \"$1/count\"; wc -l < \"$1/count\" | tr -d ' \\n'",
            );
            let doc = directions("DIRECTIONS: x\nn:\n  expr: \"${ counter(storage) }\"");
            let scripts = vec![script];

            let shared_executor = executor();
            let first = Evaluator::default()
                .eval(&Values::new(), &doc, &scripts, shared_executor.clone())
                .unwrap();
            let second = Evaluator::default()
                .eval(&Values::new(), &doc, &scripts, shared_executor)
                .unwrap();
            assert_eq!(first.get("n"), Some("1"));
            assert_eq!(second.get("n"), Some("2"));

            let fresh = Evaluator::default()
                .eval(&Values::new(), &doc, &scripts, executor())
                .unwrap();
            assert_eq!(fresh.get("n"), Some("1"));
        }
    }
}
