//! Dead code elimination.
//!
//! Removes instructions whose values are never used and which neither
//! write memory nor may throw. Uses the graph's use-chains, so a dead
//! instruction is found in O(1); the sweep repeats until nothing changes
//! because removing one instruction can make its inputs dead.

use ember_ir::{DominatorTree, Graph, InstKind, InstRef};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OptError;
use crate::pass::{AnalysisSet, CompilationUnit, GraphPass, Pass};
use crate::side_effects::effects_of;
use crate::stats::Stat;

/// Configuration for dead code elimination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DceConfig {
    /// Maximum fixpoint iterations before giving up. Default: 100.
    pub max_iterations: usize,
}

impl Default for DceConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
        }
    }
}

/// Result of running dead code elimination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DceResult {
    /// Total number of instructions removed.
    pub removed_count: usize,
    /// Number of fixpoint iterations performed.
    pub iterations: usize,
    /// Whether fixpoint was reached (no more changes possible).
    pub reached_fixpoint: bool,
}

pub fn eliminate_dead_code(graph: &mut Graph, config: &DceConfig) -> DceResult {
    let max_iterations = if config.max_iterations == 0 {
        DceConfig::default().max_iterations
    } else {
        config.max_iterations
    };

    // Unreachable blocks are left alone; nothing sweeps them.
    let blocks = DominatorTree::compute(graph).post_order().to_vec();
    let mut total_removed = 0;

    for iteration in 0..max_iterations {
        let mut removed = 0;
        for &block in &blocks {
            let insts: Vec<InstRef> = graph.block_insts(block).collect();
            for &inst in insts.iter().rev() {
                if is_dead(graph, inst) {
                    graph.remove_inst(inst);
                    removed += 1;
                }
            }
        }

        if removed == 0 {
            return DceResult {
                removed_count: total_removed,
                iterations: iteration + 1,
                reached_fixpoint: true,
            };
        }
        total_removed += removed;
    }

    DceResult {
        removed_count: total_removed,
        iterations: max_iterations,
        reached_fixpoint: false,
    }
}

fn is_dead(graph: &Graph, inst: InstRef) -> bool {
    let kind = graph.kind(inst);
    if kind.is_terminator() || matches!(kind, InstKind::Parameter { .. }) {
        return false;
    }
    !graph.has_uses(inst) && !kind.can_throw() && !effects_of(graph, inst).does_any_write()
}

#[derive(Debug, Default)]
pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead_code_elimination"
    }

    fn preserved_analyses(&self) -> AnalysisSet {
        AnalysisSet::DOMINATORS | AnalysisSet::LOOPS | AnalysisSet::NULLABILITY
    }
}

impl GraphPass for DeadCodeElimination {
    fn run(&mut self, unit: &mut CompilationUnit) -> Result<bool, OptError> {
        let result = eliminate_dead_code(&mut unit.graph, &unit.config.dce);
        debug!(
            removed = result.removed_count,
            iterations = result.iterations,
            fixpoint = result.reached_fixpoint,
            "dead code elimination done"
        );
        unit.stats
            .record(Stat::RemovedDeadInstruction, result.removed_count as u64);
        Ok(result.removed_count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ir::{parse_test_method, print_graph};
    use insta::assert_snapshot;

    #[test]
    fn removes_dead_chains_and_keeps_effects() {
        let mut graph = parse_test_method(
            r#"
            method @f(%0: ref, %1: int) {
              field @Obj.f : int {offset = 8}
              field @G.s : int {offset = 0, static = true}
            ^bb0:
              %2 = const {value = 1} : int
              %3 = add %1, %2 : int
              %4 = mul %3, %3 : int
              %5 = div %1, %2 : int
              %6 = static_get {field = @G.s} : int
              %7 = instance_get %0 {field = @Obj.f} : int
              static_set %1 {field = @G.s}
              return %1
            }
            "#,
        );
        let result = eliminate_dead_code(&mut graph, &DceConfig::default());

        assert_eq!(result.removed_count, 3);
        assert!(result.reached_fixpoint);
        assert_snapshot!(print_graph(&graph), @r"
        method @f(%0: ref, %1: int) {
          field @Obj.f : int {offset = 8}
          field @G.s : int {offset = 0, static = true}
        ^bb0:
          %2 = const {value = 1} : int
          %3 = div %1, %2 : int
          %4 = instance_get %0 {field = @Obj.f} : int
          static_set %1 {field = @G.s}
          return %1
        }
        ");
    }

    #[test]
    fn phi_cycles_are_not_removed() {
        let mut graph = parse_test_method(
            r#"
            method @f(%0: bool, %1: int) {
            ^bb0:
              goto [^bb1]
            ^bb1:
              %2 = phi [^bb0: %1, ^bb2: %3] : int
              if %0 [^bb2, ^bb3]
            ^bb2:
              %3 = add %2, %1 : int
              goto [^bb1]
            ^bb3:
              return %1
            }
            "#,
        );
        let result = eliminate_dead_code(&mut graph, &DceConfig { max_iterations: 1 });

        // The phi and the add keep each other alive.
        assert_eq!(result.removed_count, 0);
        assert!(result.reached_fixpoint);
    }
}
