//! F-AST: the type-annotated first-order tree the checker builds.
//!
//! Immutable once built. Every [`Expr`] carries the [`Type`] it was checked
//! or synthesized at. This is the checker's *output*; the CPS
//! converter (`convert`) is the only consumer.

use crate::ast::PrimOp;
use crate::interner::Name;
use crate::span::Span;
use crate::types::Type;

#[derive(Debug, Clone)]
pub struct IdPat {
    pub name: Name,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Val { pat: IdPat, expr: Expr },
}

#[derive(Debug, Clone)]
pub enum Expr {
    Id {
        name: Name,
        ty: Type,
        span: Span,
    },
    Bool {
        value: bool,
        span: Span,
    },
    I64 {
        value: i64,
        span: Span,
    },
    PrimApp {
        op: PrimOp,
        args: Vec<Expr>,
        ty: Type,
        span: Span,
    },
    If {
        cond: Box<Expr>,
        conseq: Box<Expr>,
        alt: Box<Expr>,
        ty: Type,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        ty: Type,
        span: Span,
    },
    Block {
        stmts: Vec<Stmt>,
        body: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    /// The type this expression was checked or synthesized at.
    pub fn ty(&self) -> Type {
        match self {
            Expr::Id { ty, .. } => ty.clone(),
            Expr::Bool { .. } => Type::Bool,
            Expr::I64 { .. } => Type::I64,
            Expr::PrimApp { ty, .. } => ty.clone(),
            Expr::If { ty, .. } => ty.clone(),
            Expr::Call { ty, .. } => ty.clone(),
            Expr::Block { body, .. } => body.ty(),
        }
    }

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

/// A checked function definition: declared type is `Fn(domain, codomain)`;
/// `params` carry the freshened per-definition parameter names.
#[derive(Debug, Clone)]
pub struct FunDef {
    pub name: Name,
    pub params: Vec<(Name, Type)>,
    pub codomain: Type,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub defs: Vec<FunDef>,
}
