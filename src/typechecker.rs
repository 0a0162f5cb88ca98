//! Bidirectional type checker: untyped [`ast::Program`] to typed
//! [`fast::Program`].
//!
//! Two phases over a `Program`: *declare* each definition's
//! annotated type into the top-level environment, then *check* each body
//! against its declared codomain. Fails fast — the first `TypeError`
//! aborts the pass.

use crate::ast::{self, PrimOp};
use crate::error::CompileError;
use crate::fast;
use crate::interner::{Interner, Name};
use crate::types::{self, Type, Types};
use std::collections::HashMap;

/// A lexical stack of frames, keyed by the *source* name a binder was
/// written with. `declare` installs a binding in the current (innermost)
/// frame under that source name, but records the freshened `Name` the
/// binding actually resolves to — every later `ast::Expr::Id` occurrence
/// of the same source name looks up the same key and gets back the one
/// freshened identity, which is what `fast::Expr::Id` carries forward.
/// `find` walks outward to the root.
struct Env {
    frames: Vec<HashMap<Name, (Name, Type)>>,
}

impl Env {
    fn new() -> Self {
        Env {
            frames: vec![HashMap::new()],
        }
    }

    fn push_child(&mut self) {
        self.frames.push(HashMap::new());
    }

    fn pop_child(&mut self) {
        self.frames.pop();
    }

    fn declare(&mut self, name: Name, resolved: Name, ty: Type) {
        self.frames
            .last_mut()
            .expect("env always has at least one frame")
            .insert(name, (resolved, ty));
    }

    fn find(&self, name: &Name) -> Option<(Name, Type)> {
        self.frames.iter().rev().find_map(|f| f.get(name).cloned())
    }
}

pub struct TypeChecker {
    types: Types,
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeChecker {
    pub fn new() -> Self {
        TypeChecker {
            types: Types::new(),
        }
    }

    /// Runs both phases over `program`, producing the typed tree or the
    /// first `TypeError` encountered.
    #[tracing::instrument(skip_all)]
    pub fn check_program(
        &mut self,
        program: &ast::Program,
        interner: &mut Interner,
    ) -> Result<fast::Program, CompileError> {
        let mut top = Env::new();

        // Phase 1: declare.
        for def in &program.defs {
            let domain: Vec<Type> = def
                .params
                .iter()
                .map(|(_, t)| lower_type_expr(t))
                .collect();
            let codomain = lower_type_expr(&def.codomain);
            let fn_ty = self.types.fn_ty(domain, codomain);
            top.declare(def.name.clone(), def.name.clone(), fn_ty);
        }

        // Phase 2: check bodies.
        let mut defs = Vec::with_capacity(program.defs.len());
        for def in &program.defs {
            defs.push(self.check_def(def, &top, interner)?);
        }
        Ok(fast::Program { defs })
    }

    fn check_def(
        &mut self,
        def: &ast::FunDef,
        top: &Env,
        interner: &mut Interner,
    ) -> Result<fast::FunDef, CompileError> {
        let mut env = Env::new();
        env.frames[0] = top.frames[0].clone();
        env.push_child();

        let mut params = Vec::with_capacity(def.params.len());
        for (name, type_expr) in &def.params {
            let ty = lower_type_expr(type_expr);
            let fresh = interner.freshen(name);
            env.declare(name.clone(), fresh.clone(), ty.clone());
            params.push((fresh, ty));
        }

        let codomain = lower_type_expr(&def.codomain);
        let body = self.check(&def.body, &mut env, &codomain, interner)?;
        env.pop_child();

        Ok(fast::FunDef {
            name: def.name.clone(),
            params,
            codomain,
            body,
            span: def.span.clone(),
        })
    }

    /// `synthesize(e, env) -> (node, type)` for expressions whose type is
    /// directly inferrable.
    fn synthesize(
        &mut self,
        expr: &ast::Expr,
        env: &mut Env,
        interner: &mut Interner,
    ) -> Result<fast::Expr, CompileError> {
        match expr {
            ast::Expr::I64 { digits, span } => {
                let value: i64 = digits.parse().map_err(|_| {
                    CompileError::ty(span.clone(), format!("invalid i64 literal: {digits}"))
                })?;
                Ok(fast::Expr::I64 {
                    value,
                    span: span.clone(),
                })
            }
            ast::Expr::Bool { value, span } => Ok(fast::Expr::Bool {
                value: *value,
                span: span.clone(),
            }),
            ast::Expr::Id { name, span } => {
                let (resolved, ty) = env.find(name).ok_or_else(|| {
                    CompileError::ty(span.clone(), format!("unbound identifier: {name}"))
                })?;
                Ok(fast::Expr::Id {
                    name: resolved,
                    ty,
                    span: span.clone(),
                })
            }
            ast::Expr::PrimApp { op, args, span } => {
                let (arg_ty, result_ty) = prim_signature(*op, &self.types);
                if args.len() != arg_ty.len() {
                    return Err(CompileError::ty(
                        span.clone(),
                        format!(
                            "{op:?} expects {} argument(s), found {}",
                            arg_ty.len(),
                            args.len()
                        ),
                    ));
                }
                let mut checked = Vec::with_capacity(args.len());
                for (arg, expected) in args.iter().zip(arg_ty.iter()) {
                    checked.push(self.check(arg, env, expected, interner)?);
                }
                Ok(fast::Expr::PrimApp {
                    op: *op,
                    args: checked,
                    ty: result_ty,
                    span: span.clone(),
                })
            }
            ast::Expr::If {
                cond,
                conseq,
                alt,
                span,
            } => {
                let bool_ty = self.types.bool_ty();
                let cond = self.check(cond, env, &bool_ty, interner)?;
                let conseq = self.synthesize(conseq, env, interner)?;
                let conseq_ty = conseq.ty();
                let alt = self.check(alt, env, &conseq_ty, interner)?;
                Ok(fast::Expr::If {
                    cond: Box::new(cond),
                    conseq: Box::new(conseq),
                    alt: Box::new(alt),
                    ty: conseq_ty,
                    span: span.clone(),
                })
            }
            ast::Expr::Call { callee, args, span } => {
                let callee = self.synthesize(callee, env, interner)?;
                let (domain, codomain) = match types::find(&callee.ty()) {
                    Type::Fn { domain, codomain } => (domain, *codomain),
                    other => {
                        return Err(CompileError::ty(
                            span.clone(),
                            format!("cannot call a non-function type: {other}"),
                        ));
                    }
                };
                if args.len() != domain.len() {
                    return Err(CompileError::ty(
                        span.clone(),
                        format!(
                            "call expects {} argument(s), found {}",
                            domain.len(),
                            args.len()
                        ),
                    ));
                }
                let mut checked = Vec::with_capacity(args.len());
                for (arg, expected) in args.iter().zip(domain.iter()) {
                    checked.push(self.check(arg, env, expected, interner)?);
                }
                Ok(fast::Expr::Call {
                    callee: Box::new(callee),
                    args: checked,
                    ty: codomain,
                    span: span.clone(),
                })
            }
            ast::Expr::Block { stmts, body, span } => {
                env.push_child();
                let result = (|| {
                    let mut checked_stmts = Vec::with_capacity(stmts.len());
                    for stmt in stmts {
                        let ast::Stmt::Val { pat, expr } = stmt;
                        let checked_expr = self.synthesize(expr, env, interner)?;
                        let fresh = interner.freshen(&pat.name);
                        env.declare(pat.name.clone(), fresh.clone(), checked_expr.ty());
                        checked_stmts.push(fast::Stmt::Val {
                            pat: fast::IdPat { name: fresh },
                            expr: checked_expr,
                        });
                    }
                    let checked_body = self.synthesize(body, env, interner)?;
                    Ok(fast::Expr::Block {
                        stmts: checked_stmts,
                        body: Box::new(checked_body),
                        span: span.clone(),
                    })
                })();
                env.pop_child();
                result
            }
        }
    }

    /// `check(e, env, expected) = synthesize then unify`.
    fn check(
        &mut self,
        expr: &ast::Expr,
        env: &mut Env,
        expected: &Type,
        interner: &mut Interner,
    ) -> Result<fast::Expr, CompileError> {
        let node = self.synthesize(expr, env, interner)?;
        let ty = node.ty();
        self.types.unify(&ty, expected, node.span())?;
        Ok(node)
    }
}

fn lower_type_expr(t: &ast::TypeExpr) -> Type {
    match t {
        ast::TypeExpr::Bool => Type::Bool,
        ast::TypeExpr::I64 => Type::I64,
    }
}

/// `(domain) -> result` for each primitive operation.
fn prim_signature(op: PrimOp, types: &Types) -> (Vec<Type>, Type) {
    let i64_ty = types.i64_ty();
    match op {
        PrimOp::AddWI64 | PrimOp::SubWI64 | PrimOp::MulWI64 => {
            (vec![i64_ty.clone(), i64_ty], types.i64_ty())
        }
        PrimOp::EqI64 => (vec![i64_ty.clone(), i64_ty], types.bool_ty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{Pos, Span};
    use std::path::PathBuf;

    fn span() -> Span {
        Span::point(PathBuf::from("t.fl"), Pos::new(0, 0))
    }

    #[test]
    fn identity_function_checks() {
        let mut interner = Interner::new();
        let x = interner.sourced("x");
        let program = ast::Program {
            defs: vec![ast::FunDef {
                name: interner.sourced("id"),
                params: vec![(x, ast::TypeExpr::I64)],
                codomain: ast::TypeExpr::I64,
                body: ast::Expr::Id {
                    name: x,
                    span: span(),
                },
                span: span(),
            }],
        };
        let mut checker = TypeChecker::new();
        let typed = checker.check_program(&program, &mut interner).unwrap();
        assert_eq!(typed.defs.len(), 1);
        assert_eq!(typed.defs[0].body.ty(), Type::I64);
    }

    #[test]
    fn boolean_literal_against_i64_codomain_is_a_type_error() {
        let mut interner = Interner::new();
        let program = ast::Program {
            defs: vec![ast::FunDef {
                name: interner.sourced("bad"),
                params: vec![],
                codomain: ast::TypeExpr::I64,
                body: ast::Expr::Bool {
                    value: true,
                    span: span(),
                },
                span: span(),
            }],
        };
        let mut checker = TypeChecker::new();
        let err = checker.check_program(&program, &mut interner);
        assert!(matches!(err, Err(CompileError::Type { .. })));
    }

    #[test]
    fn if_requires_matching_branch_types() {
        let mut interner = Interner::new();
        let program = ast::Program {
            defs: vec![ast::FunDef {
                name: interner.sourced("mismatched"),
                params: vec![],
                codomain: ast::TypeExpr::I64,
                body: ast::Expr::If {
                    cond: Box::new(ast::Expr::Bool {
                        value: true,
                        span: span(),
                    }),
                    conseq: Box::new(ast::Expr::I64 {
                        digits: "1".into(),
                        span: span(),
                    }),
                    alt: Box::new(ast::Expr::Bool {
                        value: false,
                        span: span(),
                    }),
                    span: span(),
                },
                span: span(),
            }],
        };
        let mut checker = TypeChecker::new();
        assert!(checker.check_program(&program, &mut interner).is_err());
    }

    #[test]
    fn unbound_identifier_is_a_type_error() {
        let mut interner = Interner::new();
        let unbound = interner.sourced("nope");
        let program = ast::Program {
            defs: vec![ast::FunDef {
                name: interner.sourced("f"),
                params: vec![],
                codomain: ast::TypeExpr::I64,
                body: ast::Expr::Id {
                    name: unbound,
                    span: span(),
                },
                span: span(),
            }],
        };
        let mut checker = TypeChecker::new();
        assert!(checker.check_program(&program, &mut interner).is_err());
    }

    #[test]
    fn let_binding_checks_and_shadows() {
        let mut interner = Interner::new();
        let x = interner.sourced("x");
        let y = interner.sourced("y");
        // fun g(x : i64) : i64 { val y = __addWI64(x, 1); __mulWI64(y, y) }
        let body = ast::Expr::Block {
            stmts: vec![ast::Stmt::Val {
                pat: ast::IdPat { name: y },
                expr: ast::Expr::PrimApp {
                    op: PrimOp::AddWI64,
                    args: vec![
                        ast::Expr::Id {
                            name: x,
                            span: span(),
                        },
                        ast::Expr::I64 {
                            digits: "1".into(),
                            span: span(),
                        },
                    ],
                    span: span(),
                },
            }],
            body: Box::new(ast::Expr::PrimApp {
                op: PrimOp::MulWI64,
                args: vec![
                    ast::Expr::Id {
                        name: y,
                        span: span(),
                    },
                    ast::Expr::Id {
                        name: y,
                        span: span(),
                    },
                ],
                span: span(),
            }),
            span: span(),
        };
        let program = ast::Program {
            defs: vec![ast::FunDef {
                name: interner.sourced("g"),
                params: vec![(x, ast::TypeExpr::I64)],
                codomain: ast::TypeExpr::I64,
                body,
                span: span(),
            }],
        };
        let mut checker = TypeChecker::new();
        let typed = checker.check_program(&program, &mut interner).unwrap();
        assert_eq!(typed.defs[0].body.ty(), Type::I64);
    }
}
