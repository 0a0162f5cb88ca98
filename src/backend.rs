//! Lowers a scheduled [`cps::Program`] to a [`TargetModule`].
//!
//! Grounded on `Fn::llvm_define` in `to_llvm.cpp`: that function runs
//! four passes over the dominator-tree preorder —
//! declare empty blocks and pre-create each block's phi nodes, fill in
//! every block's instructions and terminator, patch each phi's incoming
//! edges once every predecessor has been filled, then verify. It can get
//! away with filling a block before every predecessor branching into it
//! has been visited because `llvm::PHINode` is a live object that accepts
//! new incoming edges at any time — the dominator-preorder only has to
//! guarantee that a dominating *value* exists before a dominated block
//! reads it, not that every predecessor already branched.
//!
//! `TargetModule` has no such object graph, just accumulated text, so this
//! backend keeps the same three real passes (declare / fill / patch-and-
//! emit) but fills each block into its own `String` buffer instead of
//! `TargetModule` directly, and only calls `emit_block` — prefixed with
//! its now-complete phi instruction — in the assemble pass at the end.
//! Dominator preorder is still what makes the fill pass correct: every
//! value a block's instructions reference is scheduled to that block or
//! a dominating ancestor, and ancestors are always filled (and thus
//! materialized) first.

use crate::cps::{self, BlockId, Cont, ExprId, ExprKind, FnId, Transfer};
use crate::doms::DomTree;
use crate::error::CompileError;
use crate::interner::Name;
use crate::schedule::schedule_late;
use crate::target::{IrType, TargetModule};
use crate::types::Type;
use std::collections::HashMap;

/// Sanitizes a `Name`'s display hint into a valid LLVM identifier fragment
/// and appends its numeric id — escape-then-disambiguate rather than
/// trusting source spellings to already be unique or legal.
fn mangle(name: &Name) -> String {
    let hint = name.hint().unwrap_or("v");
    let mut out = String::with_capacity(hint.len());
    for c in hint.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    out.push('_');
    out.push_str(&name.id().to_string());
    out
}

#[tracing::instrument(skip_all)]
pub fn lower_program(program: &cps::Program) -> Result<TargetModule, CompileError> {
    let mut target = TargetModule::new();
    let mut fn_names = HashMap::with_capacity(program.fns.len());
    for (i, f) in program.fns.iter().enumerate() {
        fn_names.insert(FnId::new(i), mangle(&f.name));
    }
    for f in &program.fns {
        lower_fn(&program.arena, f, &fn_names, &mut target)?;
    }
    target.verify()?;
    Ok(target)
}

fn lower_fn(
    arena: &cps::Arena,
    f: &cps::FnData,
    fn_names: &HashMap<FnId, String>,
    target: &mut TargetModule,
) -> Result<(), CompileError> {
    let codomain_ty = match crate::types::find(&f.ty) {
        Type::Fn { codomain, .. } => IrType::from_type(&codomain),
        other => {
            return Err(CompileError::lowering(format!(
                "function {} has non-function type {other}",
                f.name
            )));
        }
    };

    let dom_tree = DomTree::build(arena, f.entry);
    let schedule = schedule_late(arena, f.entry);
    let order = dom_tree.preorder_blocks();

    // index `schedule` the other way: which exprs does each block own.
    // Ascending `ExprId` order is already a valid dependency order within
    // a block, since the converter always allocates an operand's id
    // before the id of any expression built from it.
    let mut owned: HashMap<BlockId, Vec<ExprId>> = HashMap::new();
    for i in 0..arena.num_exprs() {
        let id = ExprId::new(i);
        if let Some(&block) = schedule.get(&id) {
            owned.entry(block).or_default().push(id);
        }
    }

    let mut materialized: HashMap<ExprId, String> = HashMap::new();
    let mut labels: HashMap<BlockId, String> = HashMap::new();
    let mut phi_dest: HashMap<BlockId, (String, IrType)> = HashMap::new();
    let mut phi_edges: HashMap<BlockId, Vec<(String, String)>> = HashMap::new();
    let mut entry_params: Vec<(String, IrType)> = Vec::new();

    // Declare: every block's label, and either its phi destination (a
    // join block) or its argument registers (the entry block — these are
    // the function's own parameters, never a phi, since entry has no
    // predecessor to phi over).
    for &block in &order {
        let prefix = mangle(&arena.block(block).name);
        labels.insert(block, target.fresh_block(&prefix));
        let params = &arena.block(block).params;
        if block == f.entry {
            for &pid in params {
                let reg = mangle(&arena.expr(pid).name);
                let ty = IrType::from_type(&arena.expr(pid).ty);
                materialized.insert(pid, format!("%{reg}"));
                entry_params.push((reg, ty));
            }
        } else if let Some(&pid) = params.first() {
            let dest = target.fresh_temp();
            let ty = IrType::from_type(&arena.expr(pid).ty);
            materialized.insert(pid, format!("%{dest}"));
            phi_dest.insert(block, (dest, ty));
        }
    }

    target.begin_function(&mangle(&f.name), &entry_params, codomain_ty)?;

    // Fill: each block's owned expressions, then its terminator. Visiting
    // a `Goto`/`Call` into a join block records this block's contribution
    // to that join's phi here, before the join itself has necessarily
    // been filled.
    let mut bodies: HashMap<BlockId, String> = HashMap::new();
    for &block in &order {
        let mut body = String::new();
        if let Some(exprs) = owned.get(&block) {
            for &id in exprs {
                if matches!(arena.expr(id).kind, ExprKind::Param) {
                    continue;
                }
                materialize(arena, id, fn_names, &mut materialized, &mut body, target)?;
            }
        }
        let label = labels[&block].clone();
        match arena.block(block).transfer() {
            Transfer::If { cond, conseq, alt, .. } => {
                let cond_val = materialize(arena, *cond, fn_names, &mut materialized, &mut body, target)?;
                let cond_bit = target.trunc(&mut body, &cond_val)?;
                let then_label = label_of(&labels, conseq)?;
                let else_label = label_of(&labels, alt)?;
                target.cond_br(&mut body, &format!("%{cond_bit}"), &then_label, &else_label)?;
            }
            Transfer::Goto { dest, arg, .. } => {
                let value = materialize(arena, *arg, fn_names, &mut materialized, &mut body, target)?;
                match dest {
                    Cont::Return => target.ret(&mut body, codomain_ty, &value)?,
                    Cont::Block(join) => {
                        phi_edges.entry(*join).or_default().push((value, label.clone()));
                        target.br(&mut body, &labels[join])?;
                    }
                }
            }
            Transfer::Call { callee, args, cont, .. } => {
                let callee_val = materialize(arena, *callee, fn_names, &mut materialized, &mut body, target)?;
                let mut arg_vals = Vec::with_capacity(args.len());
                for &a in args {
                    let v = materialize(arena, a, fn_names, &mut materialized, &mut body, target)?;
                    arg_vals.push((IrType::from_type(&arena.expr(a).ty), v));
                }
                let (result_ty, tail) = match cont {
                    Cont::Return => (codomain_ty, true),
                    Cont::Block(join) => {
                        let pid = arena.block(*join).params[0];
                        (IrType::from_type(&arena.expr(pid).ty), false)
                    }
                };
                let dest = target.call(&mut body, result_ty, &callee_val, &arg_vals, tail)?;
                if let Cont::Block(join) = cont {
                    phi_edges.entry(*join).or_default().push((format!("%{dest}"), label.clone()));
                    target.br(&mut body, &labels[join])?;
                }
            }
        }
        bodies.insert(block, body);
    }

    // Assemble: prefix each block's body with its now-complete phi (every
    // predecessor has had a chance to contribute an edge by this point,
    // since the fill pass above already walked every block), then emit.
    for &block in &order {
        let mut full = String::new();
        if let Some((dest, ty)) = phi_dest.get(&block) {
            let edges = phi_edges.get(&block).cloned().unwrap_or_default();
            target.phi(&mut full, dest, *ty, &edges)?;
        }
        full.push_str(&bodies[&block]);
        target.emit_block(&labels[&block], &full)?;
    }

    target.end_function()?;
    Ok(())
}

fn label_of(labels: &HashMap<BlockId, String>, cont: &Cont) -> Result<String, CompileError> {
    match cont {
        Cont::Block(b) => Ok(labels[b].clone()),
        Cont::Return => Err(CompileError::lowering("an `If` branch may not target `Return` directly")),
    }
}

/// Materializes one expression into a value reference, recursing into its
/// operands first and memoizing by [`ExprId`] — the same postorder-with-
/// sharing shape as `cps::visit_expr_postorder`, except each node also
/// emits its instruction text as it's visited rather than just recording
/// an order.
fn materialize(
    arena: &cps::Arena,
    id: ExprId,
    fn_names: &HashMap<FnId, String>,
    materialized: &mut HashMap<ExprId, String>,
    out: &mut String,
    target: &mut TargetModule,
) -> Result<String, CompileError> {
    if let Some(v) = materialized.get(&id) {
        return Ok(v.clone());
    }
    let value = match &arena.expr(id).kind {
        ExprKind::Param => unreachable!("params are seeded before any block is filled"),
        ExprKind::I64(v) => TargetModule::int_literal(*v),
        ExprKind::Bool(b) => TargetModule::bool_literal(*b),
        ExprKind::FnRef(fn_id) => format!("@{}", fn_names[fn_id]),
        ExprKind::AddWI64(a, b) => {
            let (l, r) = materialize_operands(arena, *a, *b, fn_names, materialized, out, target)?;
            format!("%{}", target.add_i64(out, &l, &r)?)
        }
        ExprKind::SubWI64(a, b) => {
            let (l, r) = materialize_operands(arena, *a, *b, fn_names, materialized, out, target)?;
            format!("%{}", target.sub_i64(out, &l, &r)?)
        }
        ExprKind::MulWI64(a, b) => {
            let (l, r) = materialize_operands(arena, *a, *b, fn_names, materialized, out, target)?;
            format!("%{}", target.mul_i64(out, &l, &r)?)
        }
        ExprKind::EqI64(a, b) => {
            let (l, r) = materialize_operands(arena, *a, *b, fn_names, materialized, out, target)?;
            format!("%{}", target.icmp_eq_i64(out, &l, &r)?)
        }
    };
    materialized.insert(id, value.clone());
    Ok(value)
}

fn materialize_operands(
    arena: &cps::Arena,
    a: ExprId,
    b: ExprId,
    fn_names: &HashMap<FnId, String>,
    materialized: &mut HashMap<ExprId, String>,
    out: &mut String,
    target: &mut TargetModule,
) -> Result<(String, String), CompileError> {
    let lhs = materialize(arena, a, fn_names, materialized, out, target)?;
    let rhs = materialize(arena, b, fn_names, materialized, out, target)?;
    Ok((lhs, rhs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cps::{Arena, ExprData, FnData};
    use crate::interner::Interner;
    use crate::span::{Pos, Span};

    fn span() -> Span {
        Span::point(std::path::PathBuf::from("t"), Pos::new(0, 0))
    }

    /// `fn f(x: i64) -> i64 = if x == 0 { x + 1 } else { x - 1 }`, built
    /// directly against the CPS arena (bypassing `convert`) so this test
    /// exercises only the backend's join/phi handling.
    fn diamond_program() -> cps::Program {
        let mut arena = Arena::new();
        let mut interner = Interner::new();

        let x = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh_with("x"),
            ty: Type::I64,
            kind: ExprKind::Param,
        });
        let entry = arena.alloc_block(interner.fresh_with("entry"), vec![x]);

        let zero = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh(),
            ty: Type::I64,
            kind: ExprKind::I64(0),
        });
        let cond = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh_with("cond"),
            ty: Type::Bool,
            kind: ExprKind::EqI64(x, zero),
        });

        let then_block = arena.alloc_block(interner.fresh_with("then"), vec![]);
        let one = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh(),
            ty: Type::I64,
            kind: ExprKind::I64(1),
        });
        let then_val = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh_with("then_val"),
            ty: Type::I64,
            kind: ExprKind::AddWI64(x, one),
        });

        let else_block = arena.alloc_block(interner.fresh_with("else"), vec![]);
        let else_val = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh_with("else_val"),
            ty: Type::I64,
            kind: ExprKind::SubWI64(x, one),
        });

        arena.set_transfer(
            entry,
            Transfer::If {
                cond,
                conseq: Cont::Block(then_block),
                alt: Cont::Block(else_block),
                span: span(),
            },
        );
        arena.set_transfer(then_block, Transfer::Goto { dest: Cont::Return, arg: then_val, span: span() });
        arena.set_transfer(else_block, Transfer::Goto { dest: Cont::Return, arg: else_val, span: span() });

        cps::Program {
            arena,
            fns: vec![FnData {
                name: interner.fresh_with("f"),
                ty: Type::Fn { domain: vec![Type::I64], codomain: Box::new(Type::I64) },
                entry,
            }],
        }
    }

    #[test]
    fn diamond_lowers_to_one_function_with_two_rets() {
        let program = diamond_program();
        let module = lower_program(&program).expect("well-formed program lowers");
        assert_eq!(module.text().matches("define ").count(), 1);
        assert_eq!(module.text().matches("  ret i64 ").count(), 2);
        assert!(module.verify().is_ok());
    }

    #[test]
    fn shared_entry_value_is_not_recomputed_in_either_branch() {
        let program = diamond_program();
        let module = lower_program(&program).unwrap();
        // `x` is the entry's own argument register, referenced directly by
        // both `add` and `sub` rather than recomputed.
        assert_eq!(module.text().matches("add i64 %x_").count(), 1);
        assert_eq!(module.text().matches("sub i64 %x_").count(), 1);
    }

    /// A function whose body is a single call under `Call{cont: Return}`
    /// must compile to a `musttail call` immediately followed by `ret`,
    /// with no join block or phi at all.
    #[test]
    fn tail_call_under_return_needs_no_join_block() {
        let mut arena = Arena::new();
        let mut interner = Interner::new();

        let callee_param = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh_with("k"),
            ty: Type::Fn { domain: vec![Type::I64], codomain: Box::new(Type::I64) },
            kind: ExprKind::Param,
        });
        let arg_param = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh_with("x"),
            ty: Type::I64,
            kind: ExprKind::Param,
        });
        let entry = arena.alloc_block(interner.fresh_with("entry"), vec![callee_param, arg_param]);
        arena.set_transfer(
            entry,
            Transfer::Call {
                callee: callee_param,
                args: vec![arg_param],
                cont: Cont::Return,
                span: span(),
            },
        );

        let program = cps::Program {
            arena,
            fns: vec![FnData {
                name: interner.fresh_with("apply"),
                ty: Type::Fn {
                    domain: vec![
                        Type::Fn { domain: vec![Type::I64], codomain: Box::new(Type::I64) },
                        Type::I64,
                    ],
                    codomain: Box::new(Type::I64),
                },
                entry,
            }],
        };

        let module = lower_program(&program).unwrap();
        assert!(module.text().contains("musttail call"));
        assert!(!module.text().contains("phi"));
    }

    /// `fn f(x: i64) -> i64 = if x == 0 { 1 } else { 2 }` joined into a
    /// single block with a parameter — the real shape `convert::to_cps`
    /// builds for an `If` under a non-tail continuation. Exercises the
    /// phi-patch path: both branches must contribute an edge to the same
    /// phi before the join block is emitted.
    #[test]
    fn if_under_non_tail_continuation_produces_one_two_edge_phi() {
        let mut arena = Arena::new();
        let mut interner = Interner::new();

        let x = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh_with("x"),
            ty: Type::I64,
            kind: ExprKind::Param,
        });
        let entry = arena.alloc_block(interner.fresh_with("entry"), vec![x]);
        let zero = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh(),
            ty: Type::I64,
            kind: ExprKind::I64(0),
        });
        let cond = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh_with("cond"),
            ty: Type::Bool,
            kind: ExprKind::EqI64(x, zero),
        });

        let then_block = arena.alloc_block(interner.fresh_with("then"), vec![]);
        let one = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh(),
            ty: Type::I64,
            kind: ExprKind::I64(1),
        });

        let else_block = arena.alloc_block(interner.fresh_with("else"), vec![]);
        let two = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh(),
            ty: Type::I64,
            kind: ExprKind::I64(2),
        });

        let join_param = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh_with("r"),
            ty: Type::I64,
            kind: ExprKind::Param,
        });
        let join = arena.alloc_block(interner.fresh_with("join"), vec![join_param]);

        arena.set_transfer(
            entry,
            Transfer::If {
                cond,
                conseq: Cont::Block(then_block),
                alt: Cont::Block(else_block),
                span: span(),
            },
        );
        arena.set_transfer(then_block, Transfer::Goto { dest: Cont::Block(join), arg: one, span: span() });
        arena.set_transfer(else_block, Transfer::Goto { dest: Cont::Block(join), arg: two, span: span() });
        arena.set_transfer(join, Transfer::Goto { dest: Cont::Return, arg: join_param, span: span() });

        let program = cps::Program {
            arena,
            fns: vec![FnData {
                name: interner.fresh_with("f"),
                ty: Type::Fn { domain: vec![Type::I64], codomain: Box::new(Type::I64) },
                entry,
            }],
        };

        let module = lower_program(&program).unwrap();
        assert_eq!(module.text().matches(" = phi i64 ").count(), 1);
        assert_eq!(module.text().matches('[').count(), 2, "phi should have exactly two incoming edges");
        assert_eq!(module.text().matches("  ret i64 ").count(), 1);
    }
}
