//! CPS converter: typed F-AST to the CPS IR.
//!
//! The converter is a recursive descent over [`fast::Expr`] parameterized
//! by a reified *current continuation*, [`ToCpsCont`] — "what to do with
//! the value this subexpression produces". `Next(hint)` is the non-tail
//! case: bind an optional name and hand the value back to the caller.
//! `Trivial(cont)` is the tail case: the destination is already a named
//! target (a `Return` or a one-parameter join block), so reaching it is
//! just `Goto(cont, v)`.

use crate::cps::{self, BlockId, Cont as CpsCont, ExprData, ExprId, ExprKind, FnData, FnId, Transfer};
use crate::fast;
use crate::interner::{Interner, Name};
use crate::span::Span;
use crate::types::Type;
use std::collections::HashMap;

/// The reified continuation a conversion call is running under.
pub enum ToCpsCont {
    /// Non-tail: bind `v` to `hint` if given, and hand `v` back to the
    /// recursive caller. Never touches `current_block`.
    Next(Option<Name>),
    /// Tail-like: `cont` is already a `Return` or a one-parameter join
    /// block. Receiving a value terminates the current block with
    /// `Goto(cont, v)`.
    Trivial(CpsCont),
}

impl ToCpsCont {
    fn apply(&self, b: &mut Builder, span: &Span, value: ExprId) {
        match self {
            ToCpsCont::Next(hint) => {
                if let Some(name) = hint {
                    b.env.insert(name.clone(), value);
                }
            }
            ToCpsCont::Trivial(dest) => {
                b.arena.set_transfer(
                    b.current_block,
                    Transfer::Goto {
                        dest: *dest,
                        arg: value,
                        span: span.clone(),
                    },
                );
            }
        }
    }

    /// Dispatches a call the way this continuation wants it handled:
    /// `Trivial` routes the call straight to its target; `Next` allocates
    /// a fresh one-parameter join block and continues there.
    fn call_to(
        &self,
        b: &mut Builder,
        span: Span,
        callee: ExprId,
        args: Vec<ExprId>,
        result_ty: Type,
    ) -> ExprId {
        match self {
            ToCpsCont::Trivial(dest) => {
                b.arena.set_transfer(
                    b.current_block,
                    Transfer::Call {
                        callee,
                        args,
                        cont: *dest,
                        span,
                    },
                );
                callee
            }
            ToCpsCont::Next(hint) => {
                let param_name = b.interner.fresh_with("call");
                let param = b.arena.alloc_expr(ExprData {
                    span: span.clone(),
                    name: param_name,
                    ty: result_ty,
                    kind: ExprKind::Param,
                });
                let join_name = b.interner.fresh_with("join");
                let join = b.arena.alloc_block(join_name, vec![param]);
                b.arena.set_transfer(
                    b.current_block,
                    Transfer::Call {
                        callee,
                        args,
                        cont: CpsCont::Block(join),
                        span,
                    },
                );
                b.current_block = join;
                if let Some(name) = hint {
                    b.env.insert(name.clone(), param);
                }
                param
            }
        }
    }
}

struct Builder<'a> {
    arena: &'a mut cps::Arena,
    interner: &'a mut Interner,
    fn_ids: &'a HashMap<Name, FnId>,
    current_block: BlockId,
    env: HashMap<Name, ExprId>,
}

impl<'a> Builder<'a> {
    fn resolve(&mut self, name: &Name, ty: &Type, span: &Span) -> ExprId {
        if let Some(id) = self.env.get(name) {
            return *id;
        }
        let fn_id = *self
            .fn_ids
            .get(name)
            .expect("unbound identifier survived type checking");
        self.arena.alloc_expr(ExprData {
            span: span.clone(),
            name: name.clone(),
            ty: ty.clone(),
            kind: ExprKind::FnRef(fn_id),
        })
    }
}

fn convert_expr(b: &mut Builder, expr: &fast::Expr, k: &ToCpsCont) -> ExprId {
    match expr {
        fast::Expr::I64 { value, span } => {
            let node = b.arena.alloc_expr(ExprData {
                span: span.clone(),
                name: b.interner.fresh(),
                ty: Type::I64,
                kind: ExprKind::I64(*value),
            });
            k.apply(b, span, node);
            node
        }
        fast::Expr::Bool { value, span } => {
            let node = b.arena.alloc_expr(ExprData {
                span: span.clone(),
                name: b.interner.fresh(),
                ty: Type::Bool,
                kind: ExprKind::Bool(*value),
            });
            k.apply(b, span, node);
            node
        }
        fast::Expr::Id { name, ty, span } => {
            let node = b.resolve(name, ty, span);
            k.apply(b, span, node);
            node
        }
        fast::Expr::PrimApp { op, args, ty, span } => {
            let converted: Vec<ExprId> = args
                .iter()
                .map(|a| convert_expr(b, a, &ToCpsCont::Next(None)))
                .collect();
            let kind = match op {
                crate::ast::PrimOp::AddWI64 => ExprKind::AddWI64(converted[0], converted[1]),
                crate::ast::PrimOp::SubWI64 => ExprKind::SubWI64(converted[0], converted[1]),
                crate::ast::PrimOp::MulWI64 => ExprKind::MulWI64(converted[0], converted[1]),
                crate::ast::PrimOp::EqI64 => ExprKind::EqI64(converted[0], converted[1]),
            };
            let node = b.arena.alloc_expr(ExprData {
                span: span.clone(),
                name: b.interner.fresh(),
                ty: ty.clone(),
                kind,
            });
            k.apply(b, span, node);
            node
        }
        fast::Expr::If {
            cond,
            conseq,
            alt,
            ty,
            span,
        } => {
            let c = convert_expr(b, cond, &ToCpsCont::Next(None));
            let conseq_name = b.interner.fresh_with("if_then");
            let alt_name = b.interner.fresh_with("if_else");
            let conseq_block = b.arena.alloc_block(conseq_name, vec![]);
            let alt_block = b.arena.alloc_block(alt_name, vec![]);
            b.arena.set_transfer(
                b.current_block,
                Transfer::If {
                    cond: c,
                    conseq: CpsCont::Block(conseq_block),
                    alt: CpsCont::Block(alt_block),
                    span: span.clone(),
                },
            );

            match k {
                ToCpsCont::Trivial(_) => {
                    b.current_block = conseq_block;
                    convert_expr(b, conseq, k);
                    b.current_block = alt_block;
                    convert_expr(b, alt, k);
                    // Both branches already terminated their own block; the
                    // value returned here is never consumed by this arm's
                    // caller.
                    c
                }
                ToCpsCont::Next(hint) => {
                    let param_name = b.interner.fresh_with("join");
                    let param = b.arena.alloc_expr(ExprData {
                        span: span.clone(),
                        name: param_name,
                        ty: ty.clone(),
                        kind: ExprKind::Param,
                    });
                    let join_name = b.interner.fresh_with("if_join");
                    let join = b.arena.alloc_block(join_name, vec![param]);
                    let trivial = ToCpsCont::Trivial(CpsCont::Block(join));

                    b.current_block = conseq_block;
                    convert_expr(b, conseq, &trivial);
                    b.current_block = alt_block;
                    convert_expr(b, alt, &trivial);

                    b.current_block = join;
                    if let Some(name) = hint {
                        b.env.insert(name.clone(), param);
                    }
                    param
                }
            }
        }
        fast::Expr::Call {
            callee,
            args,
            ty,
            span,
        } => {
            let callee_id = convert_expr(b, callee, &ToCpsCont::Next(None));
            let arg_ids: Vec<ExprId> = args
                .iter()
                .map(|a| convert_expr(b, a, &ToCpsCont::Next(None)))
                .collect();
            k.call_to(b, span.clone(), callee_id, arg_ids, ty.clone())
        }
        fast::Expr::Block { stmts, body, span: _ } => {
            for stmt in stmts {
                let fast::Stmt::Val { pat, expr } = stmt;
                convert_expr(b, expr, &ToCpsCont::Next(Some(pat.name.clone())));
            }
            convert_expr(b, body, k)
        }
    }
}

/// Converts a whole checked program. Two phases across the program: first
/// every `FunDef` gets a shell (a fresh entry block with its declared
/// `Param`s, a function type, and a `FnId` so later `Call`s can resolve it
/// before it's converted — needed for forward and mutually-recursive
/// references), then each body is converted under `Trivial(Return)`.
#[tracing::instrument(skip_all)]
pub fn to_cps(program: &fast::Program, interner: &mut Interner) -> cps::Program {
    let mut arena = cps::Arena::new();
    let mut fn_ids = HashMap::new();
    let mut shells = Vec::with_capacity(program.defs.len());

    for def in &program.defs {
        let domain: Vec<Type> = def.params.iter().map(|(_, t)| t.clone()).collect();
        let fn_ty = Type::Fn {
            domain,
            codomain: Box::new(def.codomain.clone()),
        };
        let mut param_ids = Vec::with_capacity(def.params.len());
        let mut env = HashMap::with_capacity(def.params.len());
        for (name, ty) in &def.params {
            let id = arena.alloc_expr(ExprData {
                span: def.span.clone(),
                name: name.clone(),
                ty: ty.clone(),
                kind: ExprKind::Param,
            });
            param_ids.push(id);
            env.insert(name.clone(), id);
        }
        let entry_hint = format!("{}.entry", def.name.hint().unwrap_or("fn"));
        let entry_name = interner.fresh_with(entry_hint);
        let entry = arena.alloc_block(entry_name, param_ids);
        let fn_id = FnId::new(shells.len());
        fn_ids.insert(def.name.clone(), fn_id);
        shells.push((entry, env, fn_ty));
    }

    let mut fns = Vec::with_capacity(program.defs.len());
    for (def, (entry, env, fn_ty)) in program.defs.iter().zip(shells.into_iter()) {
        let mut builder = Builder {
            arena: &mut arena,
            interner,
            fn_ids: &fn_ids,
            current_block: entry,
            env,
        };
        convert_expr(&mut builder, &def.body, &ToCpsCont::Trivial(CpsCont::Return));
        fns.push(FnData {
            name: def.name.clone(),
            ty: fn_ty,
            entry,
        });
    }

    cps::Program { arena, fns }
}
