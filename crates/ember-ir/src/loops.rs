//! Natural loop detection.
//!
//! A back edge is an edge `latch -> header` where the header dominates the
//! latch. The loop of a header is the set of blocks that reach one of its
//! latches without passing through the header. Loops sharing a header are
//! merged into one.

use cranelift_entity::packed_option::PackedOption;
use cranelift_entity::{PrimaryMap, SecondaryMap};

use crate::dominance::DominatorTree;
use crate::graph::Graph;
use crate::refs::{BlockRef, LoopRef};

#[derive(Clone, Debug)]
pub struct LoopData {
    pub header: BlockRef,
    /// Blocks with a back edge to the header.
    pub latches: Vec<BlockRef>,
    /// All blocks of the loop, header included, in RPO order.
    pub blocks: Vec<BlockRef>,
    /// Innermost enclosing loop.
    pub parent: Option<LoopRef>,
}

#[derive(Clone, Debug, Default)]
pub struct LoopForest {
    loops: PrimaryMap<LoopRef, LoopData>,
    header_loop: SecondaryMap<BlockRef, PackedOption<LoopRef>>,
    innermost: SecondaryMap<BlockRef, PackedOption<LoopRef>>,
    irreducible: bool,
}

impl LoopForest {
    pub fn compute(graph: &Graph, doms: &DominatorTree) -> Self {
        let mut forest = Self::default();

        // Headers in RPO, so an outer loop is always created before the
        // loops nested in it.
        let rpo: Vec<BlockRef> = doms.rpo().collect();
        for &header in &rpo {
            let mut latches = Vec::new();
            for &pred in graph.preds(header) {
                if !doms.is_reachable(pred) {
                    continue;
                }
                if doms.dominates(header, pred) {
                    latches.push(pred);
                } else if doms.rpo_number(pred) >= doms.rpo_number(header) {
                    forest.irreducible = true;
                }
            }
            if latches.is_empty() {
                continue;
            }

            let mut in_loop: SecondaryMap<BlockRef, bool> = SecondaryMap::new();
            in_loop[header] = true;
            let mut worklist = latches.clone();
            while let Some(b) = worklist.pop() {
                if in_loop[b] {
                    continue;
                }
                in_loop[b] = true;
                worklist.extend(
                    graph
                        .preds(b)
                        .iter()
                        .copied()
                        .filter(|&p| doms.is_reachable(p) && !in_loop[p]),
                );
            }
            let blocks: Vec<BlockRef> = rpo.iter().copied().filter(|&b| in_loop[b]).collect();

            let parent = forest.innermost[header].expand();
            let lp = forest.loops.push(LoopData {
                header,
                latches,
                blocks,
                parent,
            });
            forest.header_loop[header] = lp.into();
            for i in 0..forest.loops[lp].blocks.len() {
                let b = forest.loops[lp].blocks[i];
                forest.innermost[b] = lp.into();
            }
        }

        forest
    }

    pub fn loops(&self) -> impl Iterator<Item = (LoopRef, &LoopData)> + '_ {
        self.loops.iter()
    }

    pub fn loop_data(&self, lp: LoopRef) -> &LoopData {
        &self.loops[lp]
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// The loop headed by `block`, if it is a loop header.
    pub fn loop_for_header(&self, block: BlockRef) -> Option<LoopRef> {
        self.header_loop[block].expand()
    }

    pub fn is_loop_header(&self, block: BlockRef) -> bool {
        self.header_loop[block].is_some()
    }

    /// The innermost loop containing `block`.
    pub fn innermost_loop(&self, block: BlockRef) -> Option<LoopRef> {
        self.innermost[block].expand()
    }

    /// All loops containing `block`, innermost first.
    pub fn enclosing_loops(&self, block: BlockRef) -> impl Iterator<Item = LoopRef> + '_ {
        std::iter::successors(self.innermost_loop(block), |&lp| self.loops[lp].parent)
    }

    pub fn contains(&self, lp: LoopRef, block: BlockRef) -> bool {
        self.enclosing_loops(block).any(|l| l == lp)
    }

    pub fn is_back_edge(&self, from: BlockRef, to: BlockRef) -> bool {
        self.loop_for_header(to)
            .is_some_and(|lp| self.loops[lp].latches.contains(&from))
    }

    /// Whether a retreating edge enters a block that does not dominate its
    /// source. Such edges do not form natural loops.
    pub fn has_irreducible_flow(&self) -> bool {
        self.irreducible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::types::Type;

    #[test]
    fn nested_loops() {
        // entry -> outer -> inner <-> inner_body; inner -> outer_latch -> outer; outer -> exit
        let mut graph = Graph::new("f");
        let mut b = GraphBuilder::new(&mut graph);
        let entry = b.current_block();
        let outer = b.create_block();
        let inner = b.create_block();
        let inner_body = b.create_block();
        let outer_latch = b.create_block();
        let exit = b.create_block();
        let c = b.constant(1, Type::Bool);
        b.goto(outer);
        b.switch_to_block(outer);
        b.if_(c, inner, exit);
        b.switch_to_block(inner);
        b.if_(c, inner_body, outer_latch);
        b.switch_to_block(inner_body);
        b.goto(inner);
        b.switch_to_block(outer_latch);
        b.goto(outer);
        b.switch_to_block(exit);
        b.ret_void();

        let doms = DominatorTree::compute(&graph);
        let loops = LoopForest::compute(&graph, &doms);

        let outer_loop = loops.loop_for_header(outer).unwrap();
        let inner_loop = loops.loop_for_header(inner).unwrap();
        assert_eq!(loops.loop_data(inner_loop).parent, Some(outer_loop));
        assert_eq!(loops.loop_data(outer_loop).parent, None);
        assert_eq!(
            loops.loop_data(outer_loop).blocks,
            vec![outer, inner, outer_latch, inner_body]
        );
        assert_eq!(loops.innermost_loop(inner_body), Some(inner_loop));
        assert_eq!(loops.innermost_loop(outer_latch), Some(outer_loop));
        assert_eq!(loops.innermost_loop(exit), None);
        assert!(loops.contains(outer_loop, inner_body));
        assert!(loops.is_back_edge(inner_body, inner));
        assert!(!loops.is_back_edge(entry, outer));
        assert!(!loops.has_irreducible_flow());
    }

    #[test]
    fn irreducible_flow_is_flagged() {
        // entry branches into both a and b, which jump to each other.
        let mut graph = Graph::new("f");
        let mut bld = GraphBuilder::new(&mut graph);
        let a = bld.create_block();
        let b = bld.create_block();
        let c = bld.constant(1, Type::Bool);
        bld.if_(c, a, b);
        bld.switch_to_block(a);
        bld.goto(b);
        bld.switch_to_block(b);
        bld.if_(c, a, b);

        let doms = DominatorTree::compute(&graph);
        let loops = LoopForest::compute(&graph, &doms);
        assert!(loops.has_irreducible_flow());
    }
}
