//! Pass framework.
//!
//! A pass is either a [`BlockPass`], whose worker is called once per block
//! in a traversal order the pass chooses, or a [`GraphPass`], which handles
//! the whole graph at once. Both share the [`Pass`] lifecycle: `gate`, then
//! `start`, the per-block workers or `run`, then `end`.
//!
//! Analyses are cached in the [`CompilationUnit`]. Whenever a pass reports
//! that it changed the graph, every cached analysis it does not declare as
//! preserved is dropped.

use bitflags::bitflags;
use ember_ir::validation::verify;
use ember_ir::{BlockRef, DominatorTree, Graph, LoopForest};
use tracing::{debug, info_span, trace};

use crate::error::OptError;
use crate::null_propagation::NullabilityMap;
use crate::pipeline::OptimizationConfig;
use crate::side_effects::SideEffectsAnalysis;
use crate::stats::MethodStats;

bitflags! {
    /// A set of cached analyses.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AnalysisSet: u8 {
        const DOMINATORS = 1 << 0;
        const LOOPS = 1 << 1;
        const SIDE_EFFECTS = 1 << 2;
        const NULLABILITY = 1 << 3;
    }
}

/// Analyses computed for the current state of a unit's graph.
#[derive(Debug, Default)]
pub struct Analyses {
    dominators: Option<DominatorTree>,
    loops: Option<LoopForest>,
    side_effects: Option<SideEffectsAnalysis>,
    nullability: Option<NullabilityMap>,
}

impl Analyses {
    pub fn dominators(&self) -> Option<&DominatorTree> {
        self.dominators.as_ref()
    }

    pub fn loops(&self) -> Option<&LoopForest> {
        self.loops.as_ref()
    }

    pub fn side_effects(&self) -> Option<&SideEffectsAnalysis> {
        self.side_effects.as_ref()
    }

    pub fn nullability(&self) -> Option<&NullabilityMap> {
        self.nullability.as_ref()
    }

    pub fn set_side_effects(&mut self, analysis: SideEffectsAnalysis) {
        self.side_effects = Some(analysis);
    }

    pub fn set_nullability(&mut self, map: NullabilityMap) {
        self.nullability = Some(map);
    }

    pub fn take_nullability(&mut self) -> Option<NullabilityMap> {
        self.nullability.take()
    }

    pub fn ensure_dominators(&mut self, graph: &Graph) -> &DominatorTree {
        self.dominators
            .get_or_insert_with(|| DominatorTree::compute(graph))
    }

    pub fn ensure_loops(&mut self, graph: &Graph) -> &LoopForest {
        let forest = match self.loops.take() {
            Some(forest) => forest,
            None => LoopForest::compute(graph, self.ensure_dominators(graph)),
        };
        self.loops.insert(forest)
    }

    /// Drop every cached analysis not in `preserved`.
    pub fn invalidate(&mut self, preserved: AnalysisSet) {
        if !preserved.contains(AnalysisSet::DOMINATORS) {
            self.dominators = None;
        }
        if !preserved.contains(AnalysisSet::LOOPS) {
            self.loops = None;
        }
        if !preserved.contains(AnalysisSet::SIDE_EFFECTS) {
            self.side_effects = None;
        }
        if !preserved.contains(AnalysisSet::NULLABILITY) {
            self.nullability = None;
        }
    }

    /// The analyses currently cached.
    pub fn available(&self) -> AnalysisSet {
        let mut set = AnalysisSet::empty();
        set.set(AnalysisSet::DOMINATORS, self.dominators.is_some());
        set.set(AnalysisSet::LOOPS, self.loops.is_some());
        set.set(AnalysisSet::SIDE_EFFECTS, self.side_effects.is_some());
        set.set(AnalysisSet::NULLABILITY, self.nullability.is_some());
        set
    }
}

/// Everything a pass may look at or modify while one method is compiled.
/// A unit is owned by exactly one thread for its whole lifetime.
#[derive(Debug)]
pub struct CompilationUnit {
    pub graph: Graph,
    pub config: OptimizationConfig,
    pub stats: MethodStats,
    pub analyses: Analyses,
}

impl CompilationUnit {
    pub fn new(graph: Graph, config: OptimizationConfig) -> Self {
        Self {
            graph,
            config,
            stats: MethodStats::default(),
            analyses: Analyses::default(),
        }
    }

    /// Whether the method synchronizes on a monitor anywhere.
    pub fn has_monitors(&self) -> bool {
        self.graph.is_synchronized() || self.graph.has_monitor_operations()
    }
}

/// Lifecycle shared by all passes.
pub trait Pass {
    fn name(&self) -> &'static str;

    /// Whether the pass should run on this unit. When this returns `false`
    /// nothing else of the pass is called.
    fn gate(&self, _unit: &CompilationUnit) -> bool {
        true
    }

    fn start(&mut self, _unit: &mut CompilationUnit) -> Result<(), OptError> {
        Ok(())
    }

    /// Finish the pass. Returns whether the graph changed.
    fn end(&mut self, _unit: &mut CompilationUnit) -> Result<bool, OptError> {
        Ok(false)
    }

    /// Analyses still valid after this pass changed the graph.
    fn preserved_analyses(&self) -> AnalysisSet {
        AnalysisSet::empty()
    }
}

/// Order in which a [`BlockPass`] visits reachable blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockOrder {
    ReversePostOrder,
    /// Pre-order walk of the dominator tree, children in RPO. Every forward
    /// predecessor of a block is visited before the block itself.
    DominatorPreOrder,
}

pub trait BlockPass: Pass {
    fn order(&self) -> BlockOrder {
        BlockOrder::ReversePostOrder
    }

    /// Visit one block. Returns whether the graph changed.
    fn worker(&mut self, unit: &mut CompilationUnit, block: BlockRef) -> Result<bool, OptError>;
}

pub trait GraphPass: Pass {
    /// Returns whether the graph changed.
    fn run(&mut self, unit: &mut CompilationUnit) -> Result<bool, OptError>;
}

/// A pass placed in a pipeline.
pub enum PipelinePass {
    Block(Box<dyn BlockPass>),
    Graph(Box<dyn GraphPass>),
}

impl PipelinePass {
    fn as_pass(&self) -> &dyn Pass {
        match self {
            PipelinePass::Block(p) => p.as_ref(),
            PipelinePass::Graph(p) => p.as_ref(),
        }
    }

    fn as_pass_mut(&mut self) -> &mut dyn Pass {
        match self {
            PipelinePass::Block(p) => p.as_mut(),
            PipelinePass::Graph(p) => p.as_mut(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.as_pass().name()
    }
}

/// Runs passes over one compilation unit, in order, exactly once each.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<PipelinePass>,
    verify: bool,
}

impl PassManager {
    pub fn new(verify: bool) -> Self {
        Self {
            passes: Vec::new(),
            verify,
        }
    }

    pub fn add_block_pass(&mut self, pass: impl BlockPass + 'static) -> &mut Self {
        self.passes.push(PipelinePass::Block(Box::new(pass)));
        self
    }

    pub fn add_graph_pass(&mut self, pass: impl GraphPass + 'static) -> &mut Self {
        self.passes.push(PipelinePass::Graph(Box::new(pass)));
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(PipelinePass::name).collect()
    }

    pub fn run(&mut self, unit: &mut CompilationUnit) -> Result<(), OptError> {
        for pass in &mut self.passes {
            let name = pass.name();
            let _span = info_span!("pass", name).entered();

            if !pass.as_pass().gate(unit) {
                debug!("gate closed, skipping");
                continue;
            }

            let changed = run_pass(pass, unit)?;
            trace!(changed, "pass finished");
            if changed {
                unit.analyses
                    .invalidate(pass.as_pass().preserved_analyses());
                if self.verify {
                    verify(&unit.graph)
                        .into_result()
                        .map_err(|violations| OptError::InvariantViolation {
                            pass: name,
                            violations,
                        })?;
                }
            }
        }
        Ok(())
    }
}

fn run_pass(pass: &mut PipelinePass, unit: &mut CompilationUnit) -> Result<bool, OptError> {
    pass.as_pass_mut().start(unit)?;
    let mut changed = match pass {
        PipelinePass::Block(p) => {
            let blocks = block_order(unit, p.order());
            let mut changed = false;
            for block in blocks {
                changed |= p.worker(unit, block)?;
            }
            changed
        }
        PipelinePass::Graph(p) => p.run(unit)?,
    };
    changed |= pass.as_pass_mut().end(unit)?;
    Ok(changed)
}

fn block_order(unit: &mut CompilationUnit, order: BlockOrder) -> Vec<BlockRef> {
    let doms = unit.analyses.ensure_dominators(&unit.graph);
    match order {
        BlockOrder::ReversePostOrder => doms.rpo().collect(),
        BlockOrder::DominatorPreOrder => doms.preorder().to_vec(),
    }
}
