//! Structural checks for method graphs.
//!
//! The graph API keeps use-chains consistent on its own, but passes can
//! still produce graphs that break SSA form (a rewired use that is no
//! longer dominated by its definition, a phi that lost an input). [`verify`]
//! reports such problems as data so callers can decide what to do with a
//! broken method.

use std::fmt;

use cranelift_entity::SecondaryMap;
use derive_more::Display;

use crate::dominance::DominatorTree;
use crate::graph::Graph;
use crate::refs::{BlockRef, InstRef};

/// A single broken graph invariant.
#[derive(Clone, Debug, PartialEq, Eq, Display)]
pub enum InvariantViolation {
    #[display("phi {phi} in {block} has {found} input(s) for {expected} predecessor(s)")]
    PhiInputCount {
        phi: InstRef,
        block: BlockRef,
        expected: usize,
        found: usize,
    },
    #[display("{block} does not end with a terminator")]
    MissingTerminator { block: BlockRef },
    #[display("terminator {inst} is not the last instruction of {block}")]
    MisplacedTerminator { inst: InstRef, block: BlockRef },
    #[display("{block} has {found} successor(s) but its terminator requires {expected}")]
    SuccessorCount {
        block: BlockRef,
        expected: usize,
        found: usize,
    },
    #[display("input #{index} of {user} is {def}, which does not dominate it")]
    NotDominated {
        user: InstRef,
        index: usize,
        def: InstRef,
    },
    #[display("{inst} is listed in {actual} but records {recorded:?} as its block")]
    BlockMismatch {
        inst: InstRef,
        recorded: Option<BlockRef>,
        actual: BlockRef,
    },
    #[display("input #{index} of {user} refers to removed instruction {input}")]
    RemovedInput {
        user: InstRef,
        index: usize,
        input: InstRef,
    },
    #[display("use-chain mismatch: {message}")]
    UseChain { message: String },
    #[display("entry block {block} has predecessors")]
    EntryHasPredecessors { block: BlockRef },
}

/// Result of [`verify`].
#[derive(Clone, Debug, Default)]
pub struct ValidationResult {
    pub violations: Vec<InvariantViolation>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn into_result(self) -> Result<(), Vec<InvariantViolation>> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self.violations)
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "validation passed");
        }
        writeln!(f, "{} invariant violation(s) found:", self.violations.len())?;
        for v in &self.violations {
            writeln!(f, "  - {v}")?;
        }
        Ok(())
    }
}

/// Check every structural invariant of `graph`.
pub fn verify(graph: &Graph) -> ValidationResult {
    let mut violations = Vec::new();
    check_blocks(graph, &mut violations);
    check_use_chains(graph, &mut violations);
    let doms = DominatorTree::compute(graph);
    check_dominance(graph, &doms, &mut violations);
    ValidationResult { violations }
}

fn check_blocks(graph: &Graph, out: &mut Vec<InvariantViolation>) {
    let entry = graph.entry();
    if !graph.preds(entry).is_empty() {
        out.push(InvariantViolation::EntryHasPredecessors { block: entry });
    }

    for block in graph.blocks() {
        for inst in graph.block_insts(block) {
            if graph.block_of(inst) != Some(block) {
                out.push(InvariantViolation::BlockMismatch {
                    inst,
                    recorded: graph.block_of(inst),
                    actual: block,
                });
            }
        }

        let preds = graph.preds(block).len();
        for &phi in graph.phis(block) {
            let found = graph.inputs(phi).len();
            if found != preds {
                out.push(InvariantViolation::PhiInputCount {
                    phi,
                    block,
                    expected: preds,
                    found,
                });
            }
        }

        let insts = graph.insts(block);
        let Some((&last, body)) = insts.split_last() else {
            out.push(InvariantViolation::MissingTerminator { block });
            continue;
        };
        for &inst in body {
            if graph.kind(inst).is_terminator() {
                out.push(InvariantViolation::MisplacedTerminator { inst, block });
            }
        }
        match graph.kind(last).successor_count() {
            None => out.push(InvariantViolation::MissingTerminator { block }),
            Some(expected) => {
                let found = graph.succs(block).len();
                if found != expected {
                    out.push(InvariantViolation::SuccessorCount {
                        block,
                        expected,
                        found,
                    });
                }
            }
        }
    }
}

fn check_use_chains(graph: &Graph, out: &mut Vec<InvariantViolation>) {
    for user in graph.all_insts() {
        for (index, &input) in graph.inputs(user).iter().enumerate() {
            if graph.is_removed(input) {
                out.push(InvariantViolation::RemovedInput { user, index, input });
                continue;
            }
            let recorded = graph
                .uses(input)
                .iter()
                .any(|u| u.user == user && u.index as usize == index);
            if !recorded {
                out.push(InvariantViolation::UseChain {
                    message: format!("input #{index} of {user} is missing from the uses of {input}"),
                });
            }
        }
        for u in graph.uses(user) {
            let matches = !graph.is_removed(u.user)
                && graph.inputs(u.user).get(u.index as usize) == Some(&user);
            if !matches {
                out.push(InvariantViolation::UseChain {
                    message: format!(
                        "{user} records a use by {} at #{} that does not exist",
                        u.user, u.index
                    ),
                });
            }
        }
    }
}

fn check_dominance(graph: &Graph, doms: &DominatorTree, out: &mut Vec<InvariantViolation>) {
    let mut position: SecondaryMap<InstRef, u32> = SecondaryMap::new();
    for block in graph.blocks() {
        for (pos, inst) in graph.block_insts(block).enumerate() {
            position[inst] = pos as u32;
        }
    }
    let defined_before = |def: InstRef, user: InstRef| -> bool {
        match (graph.block_of(def), graph.block_of(user)) {
            (Some(db), Some(ub)) if db == ub => position[def] < position[user],
            (Some(db), Some(ub)) => doms.dominates(db, ub),
            _ => false,
        }
    };

    for block in doms.preorder().iter().copied() {
        let preds = graph.preds(block);
        for &phi in graph.phis(block) {
            for (index, (&def, &pred)) in graph.inputs(phi).iter().zip(preds).enumerate() {
                if graph.is_removed(def) || !doms.is_reachable(pred) {
                    continue;
                }
                let ok = graph.block_of(def).is_some_and(|db| doms.dominates(db, pred));
                if !ok {
                    out.push(InvariantViolation::NotDominated {
                        user: phi,
                        index,
                        def,
                    });
                }
            }
        }
        for &user in graph.insts(block) {
            for (index, &def) in graph.inputs(user).iter().enumerate() {
                if !graph.is_removed(def) && !defined_before(def, user) {
                    out.push(InvariantViolation::NotDominated { user, index, def });
                }
            }
        }
    }
}
