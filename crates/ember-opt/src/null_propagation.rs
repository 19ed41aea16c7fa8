//! Null propagation.
//!
//! Computes, for every reference value, whether it is proven not to be
//! null. Allocations, null-check results and the receiver of an instance
//! method are never null. A value that has been dereferenced is not null
//! at every point the dereference strictly dominates, since a null value
//! would have faulted there.
//!
//! Phis start optimistic at `NotNull` and only ever move to `MaybeNull`,
//! so the sweep over them terminates after at most one change per phi.

use std::fmt;

use ember_ir::cranelift_entity::SecondaryMap;
use ember_ir::{DominatorTree, Graph, InstKind, InstRef};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::error::OptError;
use crate::lse::original_reference;
use crate::pass::{AnalysisSet, CompilationUnit, GraphPass, Pass};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Nullability {
    NotNull,
    #[default]
    MaybeNull,
}

impl Nullability {
    #[must_use]
    pub fn join(self, other: Nullability) -> Nullability {
        if self == Nullability::NotNull && other == Nullability::NotNull {
            Nullability::NotNull
        } else {
            Nullability::MaybeNull
        }
    }
}

impl fmt::Display for Nullability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Nullability::NotNull => "not null",
            Nullability::MaybeNull => "maybe null",
        })
    }
}

/// Per-value nullability plus the instructions that dereference each value.
#[derive(Clone, Debug, Default)]
pub struct NullabilityMap {
    values: SecondaryMap<InstRef, Nullability>,
    deref_points: SecondaryMap<InstRef, SmallVec<[InstRef; 2]>>,
    sweeps: usize,
}

impl NullabilityMap {
    pub fn compute(graph: &Graph, doms: &DominatorTree) -> Result<NullabilityMap, OptError> {
        Self::compute_with_limit(graph, doms, None)
    }

    /// Like [`compute`](Self::compute), but gives up after `limit` phi
    /// sweeps instead of one more than the number of reference phis.
    fn compute_with_limit(
        graph: &Graph,
        doms: &DominatorTree,
        limit: Option<usize>,
    ) -> Result<NullabilityMap, OptError> {
        let mut map = NullabilityMap {
            values: SecondaryMap::with_capacity(graph.inst_capacity()),
            deref_points: SecondaryMap::with_capacity(graph.inst_capacity()),
            sweeps: 0,
        };
        let mut phis = Vec::new();

        for block in doms.rpo() {
            for inst in graph.block_insts(block) {
                map.values[inst] = seed(graph, inst);
                if graph.kind(inst).is_phi() && graph.ty(inst).is_reference() {
                    phis.push(inst);
                }
                if let Some(index) = graph.kind(inst).dereferenced_input() {
                    let reference = graph.input(inst, index);
                    map.deref_points[reference].push(inst);
                    let original = original_reference(graph, reference);
                    if original != reference {
                        map.deref_points[original].push(inst);
                    }
                }
            }
        }

        let limit = limit.unwrap_or(phis.len() + 1);
        for iteration in 1..=limit {
            let mut changed = false;
            for &phi in &phis {
                let state = map.phi_state(graph, doms, phi);
                if state != map.values[phi] {
                    trace!(%phi, %state, "phi updated");
                    map.values[phi] = state;
                    changed = true;
                }
            }
            if !changed {
                debug!(iteration, phis = phis.len(), "nullability converged");
                map.sweeps = iteration;
                return Ok(map);
            }
        }
        Err(OptError::FixpointNotReached {
            pass: "null_propagation",
            iterations: limit,
        })
    }

    fn phi_state(&self, graph: &Graph, doms: &DominatorTree, phi: InstRef) -> Nullability {
        let Some(block) = graph.block_of(phi) else {
            return Nullability::MaybeNull;
        };
        graph
            .inputs(phi)
            .iter()
            .zip(graph.preds(block))
            .filter(|&(_, &pred)| doms.is_reachable(pred))
            .fold(Nullability::NotNull, |acc, (&input, &pred)| {
                let dereferenced = self.deref_points[input].iter().any(|&d| {
                    graph
                        .block_of(d)
                        .is_some_and(|db| doms.dominates(db, pred))
                });
                let state = if dereferenced {
                    Nullability::NotNull
                } else {
                    self.values[input]
                };
                acc.join(state)
            })
    }

    pub fn nullability(&self, value: InstRef) -> Nullability {
        self.values[value]
    }

    pub fn is_non_null(&self, value: InstRef) -> bool {
        self.values[value] == Nullability::NotNull
    }

    /// Whether `value` is proven not null when `point` executes.
    pub fn is_non_null_at(
        &self,
        graph: &Graph,
        doms: &DominatorTree,
        value: InstRef,
        point: InstRef,
    ) -> bool {
        self.is_non_null(value)
            || self.deref_points[value]
                .iter()
                .any(|&d| d != point && doms.inst_dominates(graph, d, point))
    }

    /// Instructions that fault when `value` is null.
    pub fn deref_points(&self, value: InstRef) -> &[InstRef] {
        &self.deref_points[value]
    }

    /// Phi sweeps taken to converge, the last one changing nothing.
    pub fn sweeps(&self) -> usize {
        self.sweeps
    }

    /// Forget dereferences by instructions no longer in the graph.
    pub fn retain_deref_points(&mut self, mut keep: impl FnMut(InstRef) -> bool) {
        for (_, points) in self.deref_points.iter_mut() {
            points.retain(|p| keep(*p));
        }
    }
}

fn seed(graph: &Graph, inst: InstRef) -> Nullability {
    if !graph.ty(inst).is_reference() {
        return Nullability::NotNull;
    }
    match graph.kind(inst) {
        InstKind::NewInstance { .. } | InstKind::NewArray { .. } | InstKind::NullCheck => {
            Nullability::NotNull
        }
        InstKind::Parameter { index: 0 } if !graph.is_static() => Nullability::NotNull,
        InstKind::Phi => Nullability::NotNull,
        _ => Nullability::MaybeNull,
    }
}

/// Publishes a [`NullabilityMap`] for the unit. Never changes the graph.
#[derive(Debug, Default)]
pub struct NullPropagation;

impl Pass for NullPropagation {
    fn name(&self) -> &'static str {
        "null_propagation"
    }

    fn preserved_analyses(&self) -> AnalysisSet {
        AnalysisSet::all()
    }
}

impl GraphPass for NullPropagation {
    fn run(&mut self, unit: &mut CompilationUnit) -> Result<bool, OptError> {
        let doms = unit.analyses.ensure_dominators(&unit.graph);
        let map = NullabilityMap::compute(&unit.graph, doms)?;
        unit.analyses.set_nullability(map);
        Ok(false)
    }
}
