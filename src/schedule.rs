//! Schedule-late: assigns every floating [`ExprId`] to a block.
//!
//! Processes expressions in reverse postorder: by the time
//! an expression is scheduled, every expression and transfer that uses it
//! has already been scheduled, so its placement is simply the LCA (in the
//! dominator tree) of all its users' blocks — the latest block that still
//! dominates every use. `Param`s are never scheduled here; they're pinned
//! to their owning block at CPS-construction time and are seeded into the
//! result directly.

use crate::cps::{Arena, BlockId, ExprId, ExprKind};
use crate::doms::DomTree;
use std::collections::{HashMap, HashSet};

pub type Schedule = HashMap<ExprId, BlockId>;

#[tracing::instrument(skip_all)]
pub fn schedule_late(arena: &Arena, entry: BlockId) -> Schedule {
    let dom_tree = DomTree::build(arena, entry);
    let blocks = crate::cps::postorder_blocks(arena, entry);

    let mut schedule: Schedule = HashMap::new();
    for &block in &blocks {
        for &param in &arena.block(block).params {
            schedule.insert(param, block);
        }
    }

    let mut visited = HashSet::new();
    let mut post_order = Vec::new();
    let mut use_exprs: HashMap<ExprId, Vec<ExprId>> = HashMap::new();
    let mut use_transfers: HashMap<ExprId, Vec<BlockId>> = HashMap::new();

    for &block in &blocks {
        let transfer = arena.block(block).transfer();
        for operand in transfer.operands() {
            use_transfers.entry(operand).or_default().push(block);
            visit(arena, operand, &mut visited, &mut post_order, &mut use_exprs);
        }
    }

    for expr in post_order.into_iter().rev() {
        if schedule.contains_key(&expr) {
            continue; // a Param, already pinned
        }
        let mut parent: Option<BlockId> = None;
        let mut extend = |candidate: BlockId, parent: &mut Option<BlockId>| {
            *parent = Some(match *parent {
                None => candidate,
                Some(p) => dom_tree.lca(p, candidate),
            });
        };
        if let Some(users) = use_exprs.get(&expr) {
            for &user in users {
                extend(schedule[&user], &mut parent);
            }
        }
        if let Some(users) = use_transfers.get(&expr) {
            for &user_block in users {
                extend(user_block, &mut parent);
            }
        }
        let parent = parent.expect("scheduled expression has no recorded use");
        schedule.insert(expr, parent);
    }

    schedule
}

fn visit(
    arena: &Arena,
    id: ExprId,
    visited: &mut HashSet<ExprId>,
    post_order: &mut Vec<ExprId>,
    use_exprs: &mut HashMap<ExprId, Vec<ExprId>>,
) {
    if visited.insert(id) {
        for operand in arena.expr(id).kind.operands() {
            use_exprs.entry(operand).or_default().push(id);
            visit(arena, operand, visited, post_order, use_exprs);
        }
        post_order.push(id);
    }
}

/// True if `id` names a `Param` rather than a floating expression — used
/// by the backend to tell "already placed" apart from "scheduled here".
pub fn is_param(arena: &Arena, id: ExprId) -> bool {
    matches!(arena.expr(id).kind, ExprKind::Param)
}
