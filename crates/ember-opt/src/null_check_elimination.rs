//! Removes null checks on values proven not null.

use ember_ir::{InstKind, InstRef};
use tracing::trace;

use crate::error::OptError;
use crate::pass::{AnalysisSet, CompilationUnit, GraphPass, Pass};
use crate::stats::Stat;

#[derive(Debug, Default)]
pub struct NullCheckElimination;

impl Pass for NullCheckElimination {
    fn name(&self) -> &'static str {
        "null_check_elimination"
    }

    fn gate(&self, unit: &CompilationUnit) -> bool {
        unit.analyses.nullability().is_some()
    }

    fn preserved_analyses(&self) -> AnalysisSet {
        AnalysisSet::DOMINATORS | AnalysisSet::LOOPS | AnalysisSet::NULLABILITY
    }
}

impl GraphPass for NullCheckElimination {
    fn run(&mut self, unit: &mut CompilationUnit) -> Result<bool, OptError> {
        unit.analyses.ensure_dominators(&unit.graph);
        let (Some(doms), Some(map)) = (unit.analyses.dominators(), unit.analyses.nullability())
        else {
            return Err(OptError::MissingAnalysis {
                pass: "null_check_elimination",
                analysis: "nullability",
            });
        };

        let graph = &unit.graph;
        let redundant: Vec<(InstRef, InstRef)> = graph
            .all_insts()
            .filter(|&i| matches!(graph.kind(i), InstKind::NullCheck))
            .map(|check| (check, graph.input(check, 0)))
            .filter(|&(check, object)| map.is_non_null_at(graph, doms, object, check))
            .collect();

        let graph = &mut unit.graph;
        for &(check, object) in &redundant {
            trace!(%check, %object, "null check removed");
            graph.replace_all_uses(check, object);
            graph.remove_inst(check);
        }
        if !redundant.is_empty()
            && let Some(mut map) = unit.analyses.take_nullability()
        {
            let graph = &unit.graph;
            map.retain_deref_points(|point| !graph.is_removed(point));
            unit.analyses.set_nullability(map);
        }
        unit.stats
            .record(Stat::RemovedNullCheck, redundant.len() as u64);
        Ok(!redundant.is_empty())
    }
}
