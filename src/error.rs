//! Compiler error taxonomy.
//!
//! One enum threaded by `?` through every pass. Every variant carries a
//! [`Span`] or byte position, matching the diagnostics every other IR node
//! already carries. Hand-rolled `Display`/`Error` impls rather than a
//! `thiserror` derive, in keeping with the rest of this crate's error types
//! (see `target::CodeGenError`): the dependency isn't one this codebase
//! reaches for.

use crate::span::Span;
use std::fmt;

/// Fails-fast: there is no recovery path. The first error any pass produces
/// aborts the pipeline.
#[derive(Debug)]
pub enum CompileError {
    /// Unrecognized byte in the source text.
    Lex { pos: usize },
    /// Unexpected token.
    Parse { pos: usize },
    /// Unification failure, occurs-check failure, arity mismatch, unbound
    /// identifier, or a non-function callee.
    Type { span: Span, message: String },
    /// An IR verifier failure. Should be unreachable given correct
    /// construction; treated as an internal error, not a user-facing one.
    Lowering { message: String },
    /// The linker (`cc`) returned non-zero, or couldn't be found.
    Link { message: String },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex { pos } => write!(f, "LexError at byte {pos}"),
            CompileError::Parse { pos } => write!(f, "ParseError at byte {pos}"),
            CompileError::Type { span, message } => {
                write!(f, "TypeError at {span}: {message}")
            }
            CompileError::Lowering { message } => {
                write!(f, "LoweringError (internal): {message}")
            }
            CompileError::Link { message } => write!(f, "LinkError: {message}"),
        }
    }
}

impl std::error::Error for CompileError {}

impl CompileError {
    pub fn ty(span: Span, message: impl Into<String>) -> Self {
        CompileError::Type {
            span,
            message: message.into(),
        }
    }

    pub fn lowering(message: impl Into<String>) -> Self {
        CompileError::Lowering {
            message: message.into(),
        }
    }

    pub fn link(message: impl Into<String>) -> Self {
        CompileError::Link {
            message: message.into(),
        }
    }
}
