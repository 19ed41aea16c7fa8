//! Load/store elimination.
//!
//! Blocks are visited in dominator-tree pre-order, threading a map from
//! [`HeapLocation`] to the value currently known to be stored there. A
//! load from a known location is replaced by the known value. A store of
//! the value a location already holds is redundant. A store that is
//! overwritten before anything could observe it is dead.
//!
//! A store stays *pending* while it is the known value of its location and
//! nothing has observed it. Whatever might observe it (a may-aliasing read,
//! a call, a throwing instruction, a method exit, a merge that loses track
//! of it) marks it *kept*. Stores that end up neither pending-and-dropped
//! nor kept are removed when the pass ends.

mod heap_location;

pub use heap_location::{HeapLocation, LocationKind, original_reference};

use std::collections::HashMap;

use ember_ir::cranelift_entity::SecondaryMap;
use ember_ir::{BlockRef, DominatorTree, Graph, InstKind, InstRef};
use tracing::{debug, trace};

use crate::error::OptError;
use crate::escape::{EscapeInfo, calculate_escape};
use crate::pass::{AnalysisSet, BlockOrder, BlockPass, CompilationUnit, Pass};
use crate::side_effects::SideEffectsAnalysis;
use crate::stats::Stat;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HeapValue {
    value: InstRef,
    /// The store that put `value` there, while it is unobserved.
    store: Option<InstRef>,
}

type HeapMap = HashMap<HeapLocation, HeapValue>;

#[derive(Debug, Default)]
pub struct LoadStoreElimination {
    block_exits: HashMap<BlockRef, HeapMap>,
    escape: SecondaryMap<InstRef, EscapeInfo>,
    substitutions: SecondaryMap<InstRef, Option<InstRef>>,
    removed_loads: Vec<InstRef>,
    candidate_stores: Vec<InstRef>,
    kept_stores: SecondaryMap<InstRef, bool>,
    redundant_stores: Vec<InstRef>,
    has_monitors: bool,
}

impl LoadStoreElimination {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(&self, mut value: InstRef) -> InstRef {
        while let Some(next) = self.substitutions[value] {
            value = next;
        }
        value
    }

    fn is_singleton(&self, reference: InstRef) -> bool {
        self.escape[reference].is_singleton
    }

    /// Whether a location lives in an object no one outside this method
    /// can see.
    fn is_private(&self, loc: &HeapLocation) -> bool {
        loc.reference
            .is_some_and(|r| self.escape[r].is_singleton_and_non_escaping)
    }

    fn keep(&mut self, store: Option<InstRef>) {
        if let Some(store) = store {
            self.kept_stores[store] = true;
        }
    }

    fn keep_all(&mut self, heap: &HeapMap, filter: impl Fn(&Self, &HeapLocation) -> bool) {
        let this: &Self = self;
        let stores: Vec<InstRef> = heap
            .iter()
            .filter(|&(loc, _)| filter(this, loc))
            .filter_map(|(_, hv)| hv.store)
            .collect();
        for store in stores {
            self.kept_stores[store] = true;
        }
    }

    // ========================================================================
    // Block entry
    // ========================================================================

    fn entry_state(
        &mut self,
        graph: &Graph,
        doms: &DominatorTree,
        analysis: &SideEffectsAnalysis,
        block: BlockRef,
    ) -> HeapMap {
        let loops = analysis.loops();
        let preds: Vec<BlockRef> = graph
            .preds(block)
            .iter()
            .copied()
            .filter(|&p| doms.is_reachable(p) && !loops.is_back_edge(p, block))
            .collect();
        let Some((&first, rest)) = preds.split_first() else {
            return HeapMap::new();
        };

        if preds.iter().any(|p| !self.block_exits.contains_key(p)) {
            // Reached by a retreating edge from a block not visited yet.
            for p in &preds {
                if let Some(exit) = self.block_exits.get(p) {
                    let stores: Vec<_> = exit.values().filter_map(|hv| hv.store).collect();
                    stores.into_iter().for_each(|s| self.keep(Some(s)));
                }
            }
            return HeapMap::new();
        }

        let mut merged = self.block_exits[&first].clone();
        for p in rest {
            let other = &self.block_exits[p];
            let kept = &mut self.kept_stores;
            merged.retain(|loc, hv| match other.get(loc) {
                Some(theirs) if theirs.value == hv.value => {
                    if theirs.store != hv.store {
                        for store in [hv.store, theirs.store].into_iter().flatten() {
                            kept[store] = true;
                        }
                        hv.store = None;
                    }
                    true
                }
                _ => {
                    if let Some(store) = hv.store {
                        kept[store] = true;
                    }
                    false
                }
            });
            for (loc, theirs) in other {
                if !merged.contains_key(loc)
                    && let Some(store) = theirs.store
                {
                    kept[store] = true;
                }
            }
        }

        if loops.is_loop_header(block) {
            let written = analysis.loop_effects(block);
            let kept = &mut self.kept_stores;
            merged.retain(|loc, hv| {
                if !written.may_write(loc.category(graph)) {
                    return true;
                }
                if let Some(store) = hv.store {
                    kept[store] = true;
                }
                false
            });
        }
        merged
    }

    // ========================================================================
    // Instructions
    // ========================================================================

    /// Whether `inst` may throw given what is known at this point. Accesses
    /// through a reference that is already dereferenced on every path to
    /// here, freshly allocated, or `this` cannot fault on null. An array
    /// element already accessed at the same index cannot fault either.
    fn may_throw(&self, graph: &Graph, heap: &HeapMap, inst: InstRef) -> bool {
        let kind = graph.kind(inst);
        if !kind.can_throw() {
            return false;
        }
        match kind {
            InstKind::InstanceFieldGet { .. }
            | InstKind::InstanceFieldSet { .. }
            | InstKind::NullCheck
            | InstKind::ArrayLength => {
                let reference = original_reference(graph, graph.input(inst, 0));
                !is_known_non_null(graph, heap, reference)
            }
            InstKind::ArrayGet | InstKind::ArraySet => {
                HeapLocation::of(graph, inst).is_none_or(|loc| !heap.contains_key(&loc))
            }
            _ => true,
        }
    }

    fn visit_load(&mut self, graph: &Graph, heap: &mut HeapMap, load: InstRef, loc: HeapLocation) {
        if let Some(hv) = heap.get(&loc) {
            let value = self.resolve(hv.value);
            if graph.ty(value) == graph.ty(load) {
                trace!(%load, %value, "redundant load");
                self.substitutions[load] = Some(value);
                self.removed_loads.push(load);
                return;
            }
        }

        let aliasing: Vec<Option<InstRef>> = heap
            .iter()
            .filter(|(other, _)| other.may_alias(&loc, graph, |r| self.is_singleton(r)))
            .map(|(_, hv)| hv.store)
            .collect();
        aliasing.into_iter().for_each(|s| self.keep(s));
        heap.insert(
            loc,
            HeapValue {
                value: load,
                store: None,
            },
        );
    }

    fn visit_store(
        &mut self,
        graph: &Graph,
        heap: &mut HeapMap,
        store: InstRef,
        loc: HeapLocation,
        must_keep: bool,
    ) {
        let value_index = graph.inputs(store).len() - 1;
        let value = self.resolve(graph.input(store, value_index));

        if let Some(hv) = heap.get(&loc)
            && self.resolve(hv.value) == value
            && !must_keep
        {
            trace!(%store, "redundant store");
            self.redundant_stores.push(store);
            return;
        }

        let mut invalidated = Vec::new();
        heap.retain(|other, hv| {
            let clobbered = *other != loc && other.may_alias(&loc, graph, |r| self.is_singleton(r));
            if clobbered {
                invalidated.push(hv.store);
            }
            !clobbered
        });
        invalidated.into_iter().for_each(|s| self.keep(s));

        // Overwriting the exact location does not observe the old store.
        heap.insert(
            loc,
            HeapValue {
                value,
                store: Some(store),
            },
        );
        self.candidate_stores.push(store);
        if must_keep {
            self.keep(Some(store));
        }
    }

    fn visit_other(
        &mut self,
        graph: &Graph,
        analysis: &SideEffectsAnalysis,
        heap: &mut HeapMap,
        inst: InstRef,
    ) {
        let kind = graph.kind(inst);
        if kind.is_exit() {
            self.keep_all(heap, |this, loc| !this.is_private(loc));
        }

        let effects = analysis.instruction_effects(inst);
        let inputs = graph.inputs(inst);
        // A private object survives calls and unknown operations unless
        // it is handed to them.
        let exempt = |this: &Self, loc: &HeapLocation| {
            this.is_private(loc) && loc.reference.is_some_and(|r| !inputs.contains(&r))
        };

        if effects.does_any_read() {
            self.keep_all(heap, |this, loc| {
                effects.may_read(loc.category(graph)) && !exempt(this, loc)
            });
        }
        if effects.does_any_write() {
            let this: &Self = self;
            let mut invalidated = Vec::new();
            heap.retain(|loc, hv| {
                let clobbered = effects.may_write(loc.category(graph)) && !exempt(this, loc);
                if clobbered {
                    invalidated.push(hv.store);
                }
                !clobbered
            });
            invalidated.into_iter().for_each(|s| self.keep(s));
        }
    }

    fn visit(
        &mut self,
        graph: &Graph,
        analysis: &SideEffectsAnalysis,
        heap: &mut HeapMap,
        inst: InstRef,
        next: Option<InstRef>,
    ) {
        let throws = self.may_throw(graph, heap, inst);
        if throws {
            self.keep_all(heap, |this, loc| !this.is_private(loc));
        }

        let location = HeapLocation::of(graph, inst);
        match (graph.kind(inst), location) {
            (
                InstKind::InstanceFieldGet { .. } | InstKind::StaticFieldGet { .. } | InstKind::ArrayGet,
                Some(loc),
            ) => self.visit_load(graph, heap, inst, loc),
            (
                InstKind::InstanceFieldSet { .. } | InstKind::StaticFieldSet { .. } | InstKind::ArraySet,
                Some(loc),
            ) => {
                let before_monitor_exit = self.has_monitors
                    && next.is_some_and(|n| matches!(graph.kind(n), InstKind::MonitorExit));
                // A store that may fault is what later accesses rely on
                // for their own null and bounds safety.
                self.visit_store(graph, heap, inst, loc, before_monitor_exit || throws);
            }
            _ => self.visit_other(graph, analysis, heap, inst),
        }
    }
}

fn is_known_non_null(graph: &Graph, heap: &HeapMap, reference: InstRef) -> bool {
    let kind = graph.kind(reference);
    kind.is_allocation()
        || (matches!(kind, InstKind::Parameter { index: 0 }) && !graph.is_static())
        || heap.keys().any(|loc| loc.reference == Some(reference))
}

impl Pass for LoadStoreElimination {
    fn name(&self) -> &'static str {
        "load_store_elimination"
    }

    fn gate(&self, unit: &CompilationUnit) -> bool {
        unit.analyses
            .side_effects()
            .is_some_and(SideEffectsAnalysis::has_run)
    }

    fn start(&mut self, unit: &mut CompilationUnit) -> Result<(), OptError> {
        *self = Self::default();
        let graph = &unit.graph;
        self.has_monitors = unit.has_monitors();
        for inst in graph.all_insts() {
            if graph.kind(inst).is_allocation() {
                self.escape[inst] = calculate_escape(graph, inst);
            }
        }
        unit.analyses.ensure_dominators(&unit.graph);
        Ok(())
    }

    fn end(&mut self, unit: &mut CompilationUnit) -> Result<bool, OptError> {
        let graph = &mut unit.graph;

        for &load in &self.removed_loads {
            let value = self.resolve(load);
            graph.replace_all_uses(load, value);
        }
        for &load in &self.removed_loads {
            graph.remove_inst(load);
        }

        let dead_stores = self
            .candidate_stores
            .iter()
            .copied()
            .filter(|&s| !self.kept_stores[s]);
        let stores: Vec<InstRef> = self.redundant_stores.iter().copied().chain(dead_stores).collect();
        for &store in &stores {
            trace!(%store, "removing store");
            graph.remove_inst(store);
        }

        let loads = self.removed_loads.len();
        debug!(loads, stores = stores.len(), "load/store elimination done");
        unit.stats.record(Stat::RemovedLoad, loads as u64);
        unit.stats.record(Stat::RemovedStore, stores.len() as u64);
        Ok(loads > 0 || !stores.is_empty())
    }

    fn preserved_analyses(&self) -> AnalysisSet {
        AnalysisSet::DOMINATORS | AnalysisSet::LOOPS
    }
}

impl BlockPass for LoadStoreElimination {
    fn order(&self) -> BlockOrder {
        BlockOrder::DominatorPreOrder
    }

    fn worker(&mut self, unit: &mut CompilationUnit, block: BlockRef) -> Result<bool, OptError> {
        let graph = &unit.graph;
        let analysis = unit
            .analyses
            .side_effects()
            .ok_or(OptError::MissingAnalysis {
                pass: "load_store_elimination",
                analysis: "side_effects",
            })?;
        let doms = unit
            .analyses
            .dominators()
            .ok_or(OptError::MissingAnalysis {
                pass: "load_store_elimination",
                analysis: "dominators",
            })?;

        let mut heap = self.entry_state(graph, doms, analysis, block);
        let insts = graph.insts(block);
        for (pos, &inst) in insts.iter().enumerate() {
            self.visit(graph, analysis, &mut heap, inst, insts.get(pos + 1).copied());
        }

        // Values flowing along a retreating edge reach blocks that are
        // already processed, so nothing pending may be dropped.
        if graph
            .succs(block)
            .iter()
            .any(|s| self.block_exits.contains_key(s))
        {
            self.keep_all(&heap, |_, _| true);
        }
        self.block_exits.insert(block, heap);
        Ok(false)
    }
}

#[cfg(test)]
mod tests;
