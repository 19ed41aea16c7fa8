//! Dominator tree and block orderings.
//!
//! Immediate dominators are computed with the iterative algorithm of
//! Cooper, Harvey and Kennedy over reverse post-order. Dominator-tree
//! children are kept sorted by RPO number, which makes the tree pre-order
//! visit every forward predecessor of a block before the block itself.

use cranelift_entity::SecondaryMap;
use cranelift_entity::packed_option::PackedOption;

use crate::graph::Graph;
use crate::refs::{BlockRef, InstRef};

#[derive(Clone, Debug)]
pub struct DominatorTree {
    entry: BlockRef,
    post_order: Vec<BlockRef>,
    rpo_number: SecondaryMap<BlockRef, Option<u32>>,
    idom: SecondaryMap<BlockRef, PackedOption<BlockRef>>,
    children: SecondaryMap<BlockRef, Vec<BlockRef>>,
    /// Pre-order entry/exit numbers on the dominator tree.
    dfs_in: SecondaryMap<BlockRef, u32>,
    dfs_out: SecondaryMap<BlockRef, u32>,
    preorder: Vec<BlockRef>,
}

impl DominatorTree {
    pub fn compute(graph: &Graph) -> Self {
        let entry = graph.entry();
        let post_order = compute_post_order(graph, entry);

        let mut rpo_number = SecondaryMap::new();
        for (n, &b) in post_order.iter().rev().enumerate() {
            rpo_number[b] = Some(n as u32);
        }

        // Working idoms indexed by block; the entry points to itself until
        // the fixpoint is reached.
        let mut doms: SecondaryMap<BlockRef, PackedOption<BlockRef>> = SecondaryMap::new();
        doms[entry] = entry.into();
        let mut changed = true;
        while changed {
            changed = false;
            for &b in post_order.iter().rev() {
                if b == entry {
                    continue;
                }
                let mut new_idom: Option<BlockRef> = None;
                for &p in graph.preds(b) {
                    if doms[p].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&doms, &rpo_number, p, cur),
                    });
                }
                if let Some(new_idom) = new_idom
                    && doms[b].expand() != Some(new_idom)
                {
                    doms[b] = new_idom.into();
                    changed = true;
                }
            }
        }
        doms[entry] = None.into();

        let mut children: SecondaryMap<BlockRef, Vec<BlockRef>> = SecondaryMap::new();
        for &b in post_order.iter().rev() {
            if let Some(parent) = doms[b].expand() {
                children[parent].push(b);
            }
        }

        let mut tree = Self {
            entry,
            post_order,
            rpo_number,
            idom: doms,
            children,
            dfs_in: SecondaryMap::new(),
            dfs_out: SecondaryMap::new(),
            preorder: Vec::new(),
        };
        tree.number_tree();
        tree
    }

    /// Walk the tree once to assign pre-order and entry/exit numbers.
    fn number_tree(&mut self) {
        let mut counter = 0u32;
        let mut stack: Vec<(BlockRef, usize)> = vec![(self.entry, 0)];
        self.dfs_in[self.entry] = counter;
        self.preorder.push(self.entry);
        while let Some(top) = stack.last_mut() {
            let b = top.0;
            if let Some(&child) = self.children[b].get(top.1) {
                top.1 += 1;
                counter += 1;
                self.dfs_in[child] = counter;
                self.preorder.push(child);
                stack.push((child, 0));
            } else {
                self.dfs_out[b] = counter;
                stack.pop();
            }
        }
    }

    pub fn entry(&self) -> BlockRef {
        self.entry
    }

    pub fn is_reachable(&self, b: BlockRef) -> bool {
        self.rpo_number[b].is_some()
    }

    pub fn rpo_number(&self, b: BlockRef) -> Option<u32> {
        self.rpo_number[b]
    }

    /// Reachable blocks in post-order.
    pub fn post_order(&self) -> &[BlockRef] {
        &self.post_order
    }

    /// Reachable blocks in reverse post-order.
    pub fn rpo(&self) -> impl Iterator<Item = BlockRef> + '_ {
        self.post_order.iter().rev().copied()
    }

    /// Reachable blocks in dominator-tree pre-order.
    pub fn preorder(&self) -> &[BlockRef] {
        &self.preorder
    }

    pub fn idom(&self, b: BlockRef) -> Option<BlockRef> {
        self.idom[b].expand()
    }

    /// Blocks immediately dominated by `b`, in RPO order.
    pub fn children(&self, b: BlockRef) -> &[BlockRef] {
        &self.children[b]
    }

    /// Whether `a` dominates `b`. Every block dominates itself; unreachable
    /// blocks neither dominate nor are dominated.
    pub fn dominates(&self, a: BlockRef, b: BlockRef) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        self.dfs_in[a] <= self.dfs_in[b] && self.dfs_out[b] <= self.dfs_out[a]
    }

    pub fn strictly_dominates(&self, a: BlockRef, b: BlockRef) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Whether instruction `a` executes before `b` on every path reaching `b`.
    /// An instruction dominates itself.
    pub fn inst_dominates(&self, graph: &Graph, a: InstRef, b: InstRef) -> bool {
        let (Some(ba), Some(bb)) = (graph.block_of(a), graph.block_of(b)) else {
            return false;
        };
        if ba != bb {
            return self.dominates(ba, bb);
        }
        graph.position_in_block(a) <= graph.position_in_block(b)
    }
}

fn intersect(
    doms: &SecondaryMap<BlockRef, PackedOption<BlockRef>>,
    rpo_number: &SecondaryMap<BlockRef, Option<u32>>,
    mut a: BlockRef,
    mut b: BlockRef,
) -> BlockRef {
    let rpo = |x: BlockRef| rpo_number[x].unwrap_or(u32::MAX);
    while a != b {
        while rpo(a) > rpo(b) {
            a = doms[a].expand().unwrap_or(a);
        }
        while rpo(b) > rpo(a) {
            b = doms[b].expand().unwrap_or(b);
        }
    }
    a
}

fn compute_post_order(graph: &Graph, entry: BlockRef) -> Vec<BlockRef> {
    let mut visited: SecondaryMap<BlockRef, bool> = SecondaryMap::new();
    let mut order = Vec::with_capacity(graph.block_count());
    let mut stack: Vec<(BlockRef, usize)> = vec![(entry, 0)];
    visited[entry] = true;
    while let Some(top) = stack.last_mut() {
        let b = top.0;
        if let Some(&succ) = graph.succs(b).get(top.1) {
            top.1 += 1;
            if !visited[succ] {
                visited[succ] = true;
                stack.push((succ, 0));
            }
        } else {
            order.push(b);
            stack.pop();
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::types::Type;

    /// entry -> (left | right) -> join -> loop header <-> body, header -> exit
    fn sample() -> (Graph, [BlockRef; 7]) {
        let mut graph = Graph::new("f");
        let mut b = GraphBuilder::new(&mut graph);
        let entry = b.current_block();
        let left = b.create_block();
        let right = b.create_block();
        let join = b.create_block();
        let header = b.create_block();
        let body = b.create_block();
        let exit = b.create_block();

        let c = b.constant(1, Type::Bool);
        b.if_(c, left, right);
        b.switch_to_block(left);
        b.goto(join);
        b.switch_to_block(right);
        b.goto(join);
        b.switch_to_block(join);
        b.goto(header);
        b.switch_to_block(header);
        b.if_(c, body, exit);
        b.switch_to_block(body);
        b.goto(header);
        b.switch_to_block(exit);
        b.ret_void();

        (graph, [entry, left, right, join, header, body, exit])
    }

    #[test]
    fn immediate_dominators() {
        let (graph, [entry, left, right, join, header, body, exit]) = sample();
        let doms = DominatorTree::compute(&graph);

        assert_eq!(doms.idom(entry), None);
        assert_eq!(doms.idom(left), Some(entry));
        assert_eq!(doms.idom(right), Some(entry));
        assert_eq!(doms.idom(join), Some(entry));
        assert_eq!(doms.idom(header), Some(join));
        assert_eq!(doms.idom(body), Some(header));
        assert_eq!(doms.idom(exit), Some(header));
    }

    #[test]
    fn dominance_queries() {
        let (graph, [entry, left, _right, join, header, body, _exit]) = sample();
        let doms = DominatorTree::compute(&graph);

        assert!(doms.dominates(entry, body));
        assert!(doms.dominates(join, join));
        assert!(!doms.strictly_dominates(join, join));
        assert!(!doms.dominates(left, join));
        assert!(doms.strictly_dominates(header, body));
    }

    #[test]
    fn preorder_visits_forward_preds_first() {
        let (graph, blocks) = sample();
        let doms = DominatorTree::compute(&graph);
        let pre = doms.preorder();
        assert_eq!(pre.len(), blocks.len());

        let pos = |b: BlockRef| pre.iter().position(|&x| x == b).unwrap();
        for &b in pre {
            for &p in graph.preds(b) {
                let back_edge = doms.dominates(b, p);
                if !back_edge {
                    assert!(pos(p) < pos(b), "{p} must precede {b}");
                }
            }
        }
    }

    #[test]
    fn unreachable_blocks_are_excluded() {
        let mut graph = Graph::new("f");
        let mut b = GraphBuilder::new(&mut graph);
        b.ret_void();
        let dead = b.create_block();
        b.switch_to_block(dead);
        b.ret_void();

        let doms = DominatorTree::compute(&graph);
        assert!(!doms.is_reachable(dead));
        assert!(!doms.dominates(graph.entry(), dead));
        assert_eq!(doms.post_order(), &[graph.entry()]);
    }
}
