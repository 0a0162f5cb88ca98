//! Dominator tree construction.
//!
//! The classic Cooper-Harvey-Kennedy algorithm: number
//! blocks by postorder (the entry gets the highest number, since it's
//! visited last), seed the entry as its own immediate dominator, then
//! repeat an `intersect`-based fixpoint over predecessors until nothing
//! changes. `intersect` relies on the postorder numbering: a block with a
//! *smaller* number is farther from the entry, so the walk always moves
//! the smaller finger up until both fingers land on the same block.
//!
//! The public tree reports `None` for the entry's immediate dominator
//! (it has none) even though the fixpoint internally self-seeds it —
//! the entry is its own sentinel during the algorithm, not a real parent.

use crate::cps::{Arena, BlockId, Cont, postorder_blocks};
use std::collections::HashMap;

pub struct DomTree {
    post_index: HashMap<BlockId, usize>,
    order: Vec<BlockId>,
    idom: Vec<usize>,
    root_index: usize,
}

fn intersect(idom: &[usize], mut finger1: usize, mut finger2: usize) -> usize {
    while finger1 != finger2 {
        while finger1 < finger2 {
            finger1 = idom[finger1];
        }
        while finger2 < finger1 {
            finger2 = idom[finger2];
        }
    }
    finger1
}

impl DomTree {
    #[tracing::instrument(skip_all)]
    pub fn build(arena: &Arena, entry: BlockId) -> Self {
        let order = postorder_blocks(arena, entry);
        let n = order.len();
        let mut post_index = HashMap::with_capacity(n);
        for (i, &b) in order.iter().enumerate() {
            post_index.insert(b, i);
        }

        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, &b) in order.iter().enumerate() {
            for succ in arena.block(b).transfer().successors() {
                if let Cont::Block(s) = succ {
                    preds[post_index[&s]].push(i);
                }
            }
        }

        let root_index = n - 1;
        const UNSET: usize = usize::MAX;
        let mut idom: Vec<usize> = vec![UNSET; n];
        idom[root_index] = root_index;

        // Predecessors always carry a strictly higher postorder number than
        // their successor (postorder visits a block's successors before the
        // block itself), so a single descending sweep already has every
        // predecessor's idom available. This graph has no loops (this
        // language has no loop construct), so the fixpoint below converges
        // in one pass; it stays a fixpoint so the algorithm keeps working if
        // that ever changes.
        let mut changed = true;
        while changed {
            changed = false;
            for i in (0..root_index).rev() {
                let mut new_idom = UNSET;
                for &p in &preds[i] {
                    if idom[p] != UNSET {
                        new_idom = if new_idom == UNSET {
                            p
                        } else {
                            intersect(&idom, p, new_idom)
                        };
                    }
                }
                if new_idom != UNSET && idom[i] != new_idom {
                    idom[i] = new_idom;
                    changed = true;
                }
            }
        }

        DomTree {
            post_index,
            order,
            idom,
            root_index,
        }
    }

    pub fn post_index(&self, block: BlockId) -> usize {
        self.post_index[&block]
    }

    /// The immediate dominator, or `None` for the entry block.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        let i = self.post_index(block);
        if i == self.root_index {
            None
        } else {
            Some(self.order[self.idom[i]])
        }
    }

    /// The lowest common ancestor in the dominator tree — the nearest
    /// block that dominates both `a` and `b`.
    pub fn lca(&self, a: BlockId, b: BlockId) -> BlockId {
        let i = intersect(&self.idom, self.post_index(a), self.post_index(b));
        self.order[i]
    }

    /// Every block reachable from the entry, in dominator-tree preorder
    /// (a block always precedes every block it dominates). The backend
    /// declares blocks in this order so a dominating phi is always
    /// already declared when a dominated block references it.
    pub fn preorder_blocks(&self) -> Vec<BlockId> {
        let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..self.order.len() {
            if i != self.root_index {
                children.entry(self.idom[i]).or_default().push(i);
            }
        }
        let mut out = Vec::with_capacity(self.order.len());
        let mut stack = vec![self.root_index];
        while let Some(i) = stack.pop() {
            out.push(self.order[i]);
            if let Some(kids) = children.get(&i) {
                for &k in kids.iter().rev() {
                    stack.push(k);
                }
            }
        }
        out
    }
}
