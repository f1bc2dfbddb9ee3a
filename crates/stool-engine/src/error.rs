//! Evaluation error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use stool_core::CoreError;
use thiserror::Error;

use crate::suggestions::{AVAILABLE_FILTERS, AVAILABLE_FUNCTIONS};

/// Main evaluation error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown direction: {name}")]
    UnknownDirection {
        name: String,
        suggestion: Option<String>,
    },

    #[error("invalid recursion on direction {name}")]
    Cycle { name: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("{script}: script failed: {message}")]
    ScriptFailed { script: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    InvalidOperation,
    Other,
}

/// An expression that failed to render, with its source for diagnostics
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{direction}: failed to compute direction: {message}")]
#[diagnostic(code(stool::eval::template))]
pub struct TemplateError {
    /// Name of the direction whose expression failed
    pub direction: String,

    pub message: String,

    pub kind: TemplateErrorKind,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    pub fn from_minijinja(err: minijinja::Error, direction: &str, expression: &str) -> Self {
        let kind = categorize(&err);
        let message = err
            .detail()
            .map(str::to_string)
            .unwrap_or_else(|| err.kind().to_string());
        let span = err
            .range()
            .map(|range| SourceSpan::new(range.start.into(), range.len()));

        Self {
            direction: direction.to_string(),
            message,
            kind,
            src: NamedSource::new(direction, expression.to_string()),
            span,
            suggestion: suggestion_for(kind),
        }
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

fn categorize(err: &minijinja::Error) -> TemplateErrorKind {
    match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        minijinja::ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
        minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
            TemplateErrorKind::TypeError
        }
        _ => TemplateErrorKind::Other,
    }
}

fn suggestion_for(kind: TemplateErrorKind) -> Option<String> {
    match kind {
        TemplateErrorKind::UndefinedVariable => Some(
            "environment variables are read with `env.NAME` and must be defined by the toolkit; \
             other directions are read with `value('name')`"
                .to_string(),
        ),
        TemplateErrorKind::UnknownFunction => Some(format!(
            "available functions: {} (plus one function per toolkit script)",
            AVAILABLE_FUNCTIONS.join(", ")
        )),
        TemplateErrorKind::UnknownFilter => Some(format!(
            "available filters: {} and the Jinja builtins",
            AVAILABLE_FILTERS.join(", ")
        )),
        TemplateErrorKind::SyntaxError => {
            Some("expressions are written as `${ ... }`".to_string())
        }
        _ => None,
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
