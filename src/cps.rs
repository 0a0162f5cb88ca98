//! The CPS IR: a graph, not a tree.
//!
//! Pure value nodes ([`ExprKind`]) float free of basic blocks until the
//! scheduler (`schedule`) assigns each one to a block; only [`Transfer`]s
//! and the [`BlockData::params`] that seed a block are anchored from the
//! start. Every node lives in one [`Arena`], indexed by newtype ids —
//! physical sharing becomes "same `ExprId`", which is exactly what the
//! scheduler and backend key their caches on.

use crate::interner::Name;
use crate::span::Span;
use crate::types::Type;
use std::collections::HashSet;

macro_rules! newtype_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            pub(crate) fn new(i: usize) -> Self {
                $name(i as u32)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

newtype_id!(ExprId);
newtype_id!(BlockId);
newtype_id!(FnId);

/// A continuation reference: either a join-point block or the function's
/// single `Return` sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cont {
    Block(BlockId),
    Return,
}

/// A pure value node. Floating: it belongs to no block until scheduled,
/// except `Param`, which is pinned to its owning block at construction
/// time.
#[derive(Debug, Clone)]
pub enum ExprKind {
    Param,
    I64(i64),
    Bool(bool),
    AddWI64(ExprId, ExprId),
    SubWI64(ExprId, ExprId),
    MulWI64(ExprId, ExprId),
    EqI64(ExprId, ExprId),
    /// A reference to a top-level function, the callee value produced when
    /// an `Id` resolves to a `FunDef` rather than a local binding.
    FnRef(FnId),
}

impl ExprKind {
    /// Operand slots, in the fixed order used for both scheduling and
    /// lowering. Constants and `Param`/`FnRef` have none.
    pub fn operands(&self) -> Vec<ExprId> {
        match self {
            ExprKind::Param | ExprKind::I64(_) | ExprKind::Bool(_) | ExprKind::FnRef(_) => vec![],
            ExprKind::AddWI64(a, b)
            | ExprKind::SubWI64(a, b)
            | ExprKind::MulWI64(a, b)
            | ExprKind::EqI64(a, b) => vec![*a, *b],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExprData {
    pub span: Span,
    pub name: Name,
    pub ty: Type,
    pub kind: ExprKind,
}

/// A block's terminator. Every block has exactly one.
#[derive(Debug, Clone)]
pub enum Transfer {
    If {
        cond: ExprId,
        conseq: Cont,
        alt: Cont,
        span: Span,
    },
    Call {
        callee: ExprId,
        args: Vec<ExprId>,
        cont: Cont,
        span: Span,
    },
    /// Supplies exactly one argument, matching the join-point convention:
    /// every block this system builds has zero or one parameter.
    Goto {
        dest: Cont,
        arg: ExprId,
        span: Span,
    },
}

impl Transfer {
    pub fn operands(&self) -> Vec<ExprId> {
        match self {
            Transfer::If { cond, .. } => vec![*cond],
            Transfer::Call { callee, args, .. } => {
                let mut ops = vec![*callee];
                ops.extend(args.iter().copied());
                ops
            }
            Transfer::Goto { arg, .. } => vec![*arg],
        }
    }

    pub fn successors(&self) -> Vec<Cont> {
        match self {
            Transfer::If { conseq, alt, .. } => vec![*conseq, *alt],
            Transfer::Call { cont, .. } => vec![*cont],
            Transfer::Goto { dest, .. } => vec![*dest],
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            Transfer::If { span, .. } | Transfer::Call { span, .. } | Transfer::Goto { span, .. } => {
                span
            }
        }
    }
}

/// A basic block: a name (for diagnostics), its parameters (always zero or
/// one — join points receive the unified branch result), and its
/// terminator. `transfer` is `None` only transiently, between block
/// allocation and the converter filling it in.
#[derive(Debug, Clone)]
pub struct BlockData {
    pub name: Name,
    pub params: Vec<ExprId>,
    pub transfer: Option<Transfer>,
}

impl BlockData {
    pub fn transfer(&self) -> &Transfer {
        self.transfer
            .as_ref()
            .expect("block consumed before its transfer was set")
    }
}

/// One function: entry block plus its (always-present) single `Return`
/// sink. Arity and domain/codomain live on `ty`.
#[derive(Debug, Clone)]
pub struct FnData {
    pub name: Name,
    pub ty: Type,
    pub entry: BlockId,
}

/// Owns every node for one program. Arenas are moved between passes; no
/// node outlives the arena it was allocated from.
#[derive(Debug, Default)]
pub struct Arena {
    exprs: Vec<ExprData>,
    blocks: Vec<BlockData>,
}

impl Arena {
    pub fn new() -> Self {
        Arena::default()
    }

    pub fn expr(&self, id: ExprId) -> &ExprData {
        &self.exprs[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &BlockData {
        &self.blocks[id.index()]
    }

    pub fn alloc_expr(&mut self, data: ExprData) -> ExprId {
        let id = ExprId::new(self.exprs.len());
        self.exprs.push(data);
        id
    }

    /// Allocates a block with no transfer yet; the builder fills it in
    /// once the block's body has been converted.
    pub fn alloc_block(&mut self, name: Name, params: Vec<ExprId>) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(BlockData {
            name,
            params,
            transfer: None,
        });
        id
    }

    pub fn set_transfer(&mut self, block: BlockId, transfer: Transfer) {
        self.blocks[block.index()].transfer = Some(transfer);
    }

    pub fn num_exprs(&self) -> usize {
        self.exprs.len()
    }
}

/// A whole compiled program: every function plus the arena that owns all
/// of their nodes.
#[derive(Debug, Default)]
pub struct Program {
    pub arena: Arena,
    pub fns: Vec<FnData>,
}

/// Postorder traversal of the blocks reachable from `entry` (children
/// before parents; `entry` itself is visited last). This is the ordering
/// the dominator tree is built from.
pub fn postorder_blocks(arena: &Arena, entry: BlockId) -> Vec<BlockId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit_block(arena, entry, &mut visited, &mut order);
    order
}

fn visit_block(arena: &Arena, b: BlockId, visited: &mut HashSet<BlockId>, order: &mut Vec<BlockId>) {
    if visited.insert(b) {
        for succ in arena.block(b).transfer().successors() {
            if let Cont::Block(bb) = succ {
                visit_block(arena, bb, visited, order);
            }
        }
        order.push(b);
    }
}

/// Postorder traversal of one expression's operand DAG (operands before
/// the expression itself), deduplicated against nodes already visited —
/// the mechanism that lets a shared node appear exactly once in the
/// scheduler's and backend's postorder lists.
pub fn visit_expr_postorder(
    arena: &Arena,
    id: ExprId,
    visited: &mut HashSet<ExprId>,
    out: &mut Vec<ExprId>,
) {
    if visited.insert(id) {
        for operand in arena.expr(id).kind.operands() {
            visit_expr_postorder(arena, operand, visited, out);
        }
        out.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::Interner;
    use crate::span::Pos;
    use std::path::PathBuf;

    fn span() -> Span {
        Span::point(PathBuf::from("t"), Pos::new(0, 0))
    }

    #[test]
    fn shared_node_has_one_id_used_twice() {
        let mut arena = Arena::new();
        let mut interner = Interner::new();
        let x = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh(),
            ty: Type::I64,
            kind: ExprKind::I64(3),
        });
        let mul = arena.alloc_expr(ExprData {
            span: span(),
            name: interner.fresh(),
            ty: Type::I64,
            kind: ExprKind::MulWI64(x, x),
        });
        assert_eq!(arena.expr(mul).kind.operands(), vec![x, x]);
    }

    #[test]
    fn postorder_visits_entry_last() {
        let mut arena = Arena::new();
        let mut interner = Interner::new();
        let entry = arena.alloc_block(interner.fresh(), vec![]);
        let join = arena.alloc_block(interner.fresh(), vec![]);
        arena.set_transfer(
            join,
            Transfer::Goto {
                dest: Cont::Return,
                arg: arena.alloc_expr(ExprData {
                    span: span(),
                    name: interner.fresh(),
                    ty: Type::I64,
                    kind: ExprKind::I64(0),
                }),
                span: span(),
            },
        );
        arena.set_transfer(
            entry,
            Transfer::Goto {
                dest: Cont::Block(join),
                arg: arena.alloc_expr(ExprData {
                    span: span(),
                    name: interner.fresh(),
                    ty: Type::I64,
                    kind: ExprKind::I64(1),
                }),
                span: span(),
            },
        );
        let order = postorder_blocks(&arena, entry);
        assert_eq!(order, vec![join, entry]);
    }
}
