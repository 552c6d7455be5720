//! Error types.
//!
//! Loading errors ([`LoadError`]) abort the whole run. Execution errors
//! ([`ExecError`]) are local to the path that raised them: the path is marked
//! failed and reported as a [`Violation`][crate::checker::Violation], while
//! sibling paths keep running.

use std::fmt;

use thiserror::Error;

use crate::location::Loc;
use crate::types::Span;

/// Classification of every error the checker can report.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ErrorKind {
    SyntaxError,
    UnsupportedConstruct,
    NullDerefError,
    UseAfterFreeError,
    DoubleFreeError,
    ShapeMismatchError,
    UndefinedVariableError,
    AssertionError,
    LoopBoundError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Fatal error raised while loading a program.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum LoadError {
    #[error("{span}: syntax error: {message}")]
    Syntax { span: Span, message: String },
    #[error("{span}: unsupported construct: {construct}")]
    Unsupported { span: Span, construct: String },
}

impl LoadError {
    pub fn syntax(span: Span, message: impl Into<String>) -> Self {
        LoadError::Syntax {
            span,
            message: message.into(),
        }
    }

    pub fn unsupported(span: Span, construct: impl Into<String>) -> Self {
        LoadError::Unsupported {
            span,
            construct: construct.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::Syntax { .. } => ErrorKind::SyntaxError,
            LoadError::Unsupported { .. } => ErrorKind::UnsupportedConstruct,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            LoadError::Syntax { span, .. } | LoadError::Unsupported { span, .. } => *span,
        }
    }
}

/// Path-local error raised during abstract execution.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ExecError {
    #[error("null pointer dereference")]
    NullDeref,
    #[error("use after free of {0}")]
    UseAfterFree(Loc),
    #[error("double free of {0}")]
    DoubleFree(Loc),
    #[error("shape mismatch: {reason}")]
    ShapeMismatch { loc: Option<Loc>, reason: String },
    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),
    #[error("assertion `{0}` may fail")]
    Assertion(String),
    #[error("loop head did not stabilize within {0} shapes")]
    LoopBound(usize),
}

impl ExecError {
    pub fn mismatch(loc: impl Into<Option<Loc>>, reason: impl Into<String>) -> Self {
        ExecError::ShapeMismatch {
            loc: loc.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::NullDeref => ErrorKind::NullDerefError,
            ExecError::UseAfterFree(_) => ErrorKind::UseAfterFreeError,
            ExecError::DoubleFree(_) => ErrorKind::DoubleFreeError,
            ExecError::ShapeMismatch { .. } => ErrorKind::ShapeMismatchError,
            ExecError::UndefinedVariable(_) => ErrorKind::UndefinedVariableError,
            ExecError::Assertion(_) => ErrorKind::AssertionError,
            ExecError::LoopBound(_) => ErrorKind::LoopBoundError,
        }
    }

    /// The location involved in the error, if any.
    pub fn location(&self) -> Option<Loc> {
        match self {
            ExecError::UseAfterFree(loc) | ExecError::DoubleFree(loc) => Some(*loc),
            ExecError::ShapeMismatch { loc, .. } => *loc,
            _ => None,
        }
    }
}
