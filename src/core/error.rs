//! Canonical error type for Terramate operations.
//!
//! Every fallible public function in this crate returns `Result<T, TmError>`.
//! `TmError` carries a `kind` implicitly through its variant, a human message,
//! an optional source range for diagnostics, and an optional wrapped cause.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::hcl::SourceRange;

/// Canonical error type for all Terramate operations.
#[derive(Error, Debug)]
pub enum TmError {
    #[error("schema error in {file}: {message}")]
    SchemaError {
        file: PathBuf,
        message: String,
        range: Option<SourceRange>,
    },

    #[error("parse error in {file}: {message}")]
    ParseError {
        file: PathBuf,
        message: String,
        range: Option<SourceRange>,
    },

    #[error("evaluation error: {message}")]
    EvalError {
        message: String,
        range: Option<SourceRange>,
    },

    #[error("cycle detected: {description}")]
    CycleError { description: String },

    #[error("conflicting configuration: {message}")]
    ConflictingConfig {
        message: String,
        range: Option<SourceRange>,
    },

    #[error("invalid generate block label {label:?}: {message}")]
    InvalidGenBlockLabel { label: String, message: String },

    #[error("refusing to overwrite manually-written file: {path}")]
    ManualCodeExists { path: PathBuf },

    #[error("command failed in stack {stack}: {message}")]
    ExecFailed { stack: PathBuf, message: String },

    #[error("command canceled in stack {stack}")]
    ExecCanceled { stack: PathBuf },

    #[error("VCS error: {0}")]
    VCSError(String),

    #[error("I/O error: {0}")]
    IOError(#[from] io::Error),

    #[error("unknown reference {reference:?}")]
    UnknownReference {
        reference: String,
        range: Option<SourceRange>,
    },

    #[error("version mismatch: tool is {tool_version} but project requires {required}")]
    VersionMismatch {
        tool_version: String,
        required: String,
    },

    #[error("assertion failed: {message}")]
    AssertionFailed { message: String, warning: bool },

    #[error("{0}")]
    Other(String),
}

impl TmError {
    /// Stable kind tag used for report grouping and `--format json` output.
    pub fn kind(&self) -> &'static str {
        match self {
            TmError::SchemaError { .. } => "SchemaError",
            TmError::ParseError { .. } => "ParseError",
            TmError::EvalError { .. } => "EvalError",
            TmError::CycleError { .. } => "CycleError",
            TmError::ConflictingConfig { .. } => "ConflictingConfig",
            TmError::InvalidGenBlockLabel { .. } => "InvalidGenBlockLabel",
            TmError::ManualCodeExists { .. } => "ManualCodeExists",
            TmError::ExecFailed { .. } => "ExecFailed",
            TmError::ExecCanceled { .. } => "ExecCanceled",
            TmError::VCSError(_) => "VCSError",
            TmError::IOError(_) => "IOError",
            TmError::UnknownReference { .. } => "UnknownReference",
            TmError::VersionMismatch { .. } => "VersionMismatch",
            TmError::AssertionFailed { .. } => "AssertionFailed",
            TmError::Other(_) => "Other",
        }
    }

    /// Source range, when the error can point at an offending expression.
    pub fn range(&self) -> Option<&SourceRange> {
        match self {
            TmError::SchemaError { range, .. }
            | TmError::ParseError { range, .. }
            | TmError::EvalError { range, .. }
            | TmError::ConflictingConfig { range, .. }
            | TmError::UnknownReference { range, .. } => range.as_ref(),
            _ => None,
        }
    }

    /// `tm_try` only swallows evaluation-time failures, never schema or cycle errors.
    pub fn is_try_catchable(&self) -> bool {
        matches!(
            self,
            TmError::EvalError { .. } | TmError::UnknownReference { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable_for_display() {
        let err = TmError::CycleError {
            description: "a -> b -> a".to_string(),
        };
        assert_eq!(err.kind(), "CycleError");
        assert_eq!(format!("{err}"), "cycle detected: a -> b -> a");
    }

    #[test]
    fn eval_error_is_try_catchable_but_cycle_is_not() {
        let eval = TmError::EvalError {
            message: "undefined".into(),
            range: None,
        };
        assert!(eval.is_try_catchable());

        let cycle = TmError::CycleError {
            description: "x".into(),
        };
        assert!(!cycle.is_try_catchable());
    }
}
