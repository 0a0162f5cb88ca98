//! The untyped surface AST.
//!
//! This is the *output type* of the parser collaborator: the
//! lexer and parser are explicitly out of scope for this crate and are
//! reached only through the [`Frontend`] trait below. Production callers
//! supply their own `Frontend`; this crate's own tests implement `Frontend`
//! by building [`Program`] values directly rather than feeding literal
//! source text through a real lexer.

use crate::error::CompileError;
use crate::interner::{Interner, Name};
use crate::span::Span;

/// A single top-level definition. Only function definitions exist in this
/// language.
#[derive(Debug, Clone)]
pub struct FunDef {
    pub name: Name,
    pub params: Vec<(Name, TypeExpr)>,
    pub codomain: TypeExpr,
    pub body: Expr,
    pub span: Span,
}

/// A whole compilation unit: an ordered list of definitions.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub defs: Vec<FunDef>,
}

/// A type as written in source — `bool`, `i64`, or left implicit (never
/// produced by this language's grammar, but kept so the checker's
/// annotation-driven design has a uniform input shape: every declared type
/// comes from an explicit annotation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Bool,
    I64,
}

/// The only pattern form in scope: a bare identifier.
#[derive(Debug, Clone)]
pub struct IdPat {
    pub name: Name,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Val { pat: IdPat, expr: Expr },
}

/// The primitive operations the parser resolves from `__addWI64` etc.
/// tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimOp {
    AddWI64,
    SubWI64,
    MulWI64,
    EqI64,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Id {
        name: Name,
        span: Span,
    },
    Bool {
        value: bool,
        span: Span,
    },
    I64 {
        digits: String,
        span: Span,
    },
    PrimApp {
        op: PrimOp,
        args: Vec<Expr>,
        span: Span,
    },
    If {
        cond: Box<Expr>,
        conseq: Box<Expr>,
        alt: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Block {
        stmts: Vec<Stmt>,
        body: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Id { span, .. }
            | Expr::Bool { span, .. }
            | Expr::I64 { span, .. }
            | Expr::PrimApp { span, .. }
            | Expr::If { span, .. }
            | Expr::Call { span, .. }
            | Expr::Block { span, .. } => span,
        }
    }
}

/// The parser collaborator contract: source text and an
/// interner in, a `Program` out. No implementation ships in this crate —
/// lexing and parsing are explicitly out of scope.
pub trait Frontend {
    fn parse(&mut self, source: &str, interner: &mut Interner) -> Result<Program, CompileError>;
}

/// A `Frontend` that always fails. No lexer or parser ships in this crate,
/// so the reference binary has nothing real to parse source text with;
/// library consumers link their own `Frontend` against [`crate::driver`]
/// directly. This exists only so `main` has a concrete type to hand the
/// driver.
pub struct UnimplementedFrontend;

impl Frontend for UnimplementedFrontend {
    fn parse(&mut self, _source: &str, _interner: &mut Interner) -> Result<Program, CompileError> {
        Err(CompileError::Parse { pos: 0 })
    }
}
